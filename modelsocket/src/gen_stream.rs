//! `GenStream`: the caller-facing handle around one generation's chunks.

use futures::Stream;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// One streamed unit produced by a generation.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub text: String,
    pub tokens: Option<Vec<i64>>,
    pub hidden: bool,
}

/// The generation slot's capacity: a bounded channel the actor awaits
/// sending into, so a stalled consumer applies back-pressure to the
/// dispatch loop rather than buffering chunks without bound.
pub const GEN_CHANNEL_CAPACITY: usize = 64;

/// A thin handle around the readable half of one generation's chunk slot.
///
/// Hidden chunks are filtered out of every derived view (`text_stream`,
/// `text`, `text_and_tokens`) but remain observable on the raw `stream()`.
pub struct GenStream {
    rx: mpsc::Receiver<Chunk>,
}

impl GenStream {
    pub(crate) fn new(rx: mpsc::Receiver<Chunk>) -> Self {
        Self { rx }
    }

    /// The raw stream of chunks, hidden and visible alike.
    pub fn stream(self) -> impl Stream<Item = Chunk> {
        ReceiverStream::new(self.rx)
    }

    /// The visible-text-only derived stream: drops hidden chunks, yields
    /// each chunk's `text`.
    pub fn text_stream(self) -> impl Stream<Item = String> {
        ReceiverStream::new(self.rx)
            .filter(|chunk| std::future::ready(!chunk.hidden))
            .map(|chunk| chunk.text)
    }

    /// Concatenates all non-hidden text.
    pub async fn text(self) -> String {
        let mut out = String::new();
        let mut stream = self.text_stream();
        while let Some(piece) = stream.next().await {
            out.push_str(&piece);
        }
        out
    }

    /// Concatenates non-hidden text and flattens non-hidden `tokens`.
    pub async fn text_and_tokens(self) -> (String, Vec<i64>) {
        let mut text = String::new();
        let mut tokens = Vec::new();
        let mut stream = ReceiverStream::new(self.rx).filter(|chunk| std::future::ready(!chunk.hidden));
        while let Some(chunk) = stream.next().await {
            text.push_str(&chunk.text);
            if let Some(chunk_tokens) = chunk.tokens {
                tokens.extend(chunk_tokens);
            }
        }
        (text, tokens)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn chunk(text: &str, hidden: bool) -> Chunk {
        Chunk {
            text: text.to_string(),
            tokens: None,
            hidden,
        }
    }

    #[tokio::test]
    async fn text_concatenates_visible_chunks_only() {
        let (tx, rx) = mpsc::channel(GEN_CHANNEL_CAPACITY);
        tx.send(chunk("Hel", false)).await.unwrap();
        tx.send(chunk("<think>", true)).await.unwrap();
        tx.send(chunk("lo", false)).await.unwrap();
        drop(tx);

        let gen = GenStream::new(rx);
        assert_eq!(gen.text().await, "Hello");
    }

    #[tokio::test]
    async fn raw_stream_includes_hidden_chunks() {
        let (tx, rx) = mpsc::channel(GEN_CHANNEL_CAPACITY);
        tx.send(chunk("Hel", false)).await.unwrap();
        tx.send(chunk("<think>", true)).await.unwrap();
        tx.send(chunk("lo", false)).await.unwrap();
        drop(tx);

        let gen = GenStream::new(rx);
        let all: Vec<Chunk> = gen.stream().collect().await;
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn text_and_tokens_flattens_visible_token_runs() {
        let (tx, rx) = mpsc::channel(GEN_CHANNEL_CAPACITY);
        tx.send(Chunk {
            text: "Hi".to_string(),
            tokens: Some(vec![1, 2]),
            hidden: false,
        })
        .await
        .unwrap();
        tx.send(Chunk {
            text: "secret".to_string(),
            tokens: Some(vec![99]),
            hidden: true,
        })
        .await
        .unwrap();
        drop(tx);

        let gen = GenStream::new(rx);
        let (text, tokens) = gen.text_and_tokens().await;
        assert_eq!(text, "Hi");
        assert_eq!(tokens, vec![1, 2]);
    }
}
