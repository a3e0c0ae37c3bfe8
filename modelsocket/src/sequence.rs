//! The caller-facing [`Sequence`] handle.

use std::future::Future;
use std::sync::Arc;

use modelsocket_protocol::GenOpts;
use tokio::sync::oneshot;
use tracing::debug;
use tracing::warn;

use crate::connection::ActorMsg;
use crate::connection::ConnectionShared;
use crate::error::LifecycleError;
use crate::error::ModelSocketError;
use crate::error::Result;
use crate::gen_stream::GEN_CHANNEL_CAPACITY;
use crate::gen_stream::GenStream;
use crate::tool::Tool;

/// Either a text append or a token-sequence append — exactly one of `text`
/// or `tokens` is ever sent on the wire.
pub enum AppendInput {
    Text(String),
    Tokens(Vec<i64>),
}

impl From<&str> for AppendInput {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for AppendInput {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<i64>> for AppendInput {
    fn from(value: Vec<i64>) -> Self {
        Self::Tokens(value)
    }
}

impl From<&[i64]> for AppendInput {
    fn from(value: &[i64]) -> Self {
        Self::Tokens(value.to_vec())
    }
}

/// `{role?, hidden?}` passed to [`Sequence::append`].
#[derive(Debug, Clone, Default)]
pub struct AppendOptions {
    pub role: Option<String>,
    pub hidden: Option<bool>,
}

/// One server-side conversational sequence. Cheap to clone: every clone
/// shares the same connection actor and cid counter.
#[derive(Clone)]
pub struct Sequence {
    seq_id: modelsocket_protocol::SeqId,
    model: String,
    tools_enabled: bool,
    conn: Arc<ConnectionShared>,
}

impl Sequence {
    pub(crate) fn new(
        seq_id: modelsocket_protocol::SeqId,
        model: String,
        tools_enabled: bool,
        conn: Arc<ConnectionShared>,
    ) -> Self {
        Self {
            seq_id,
            model,
            tools_enabled,
            conn,
        }
    }

    pub fn seq_id(&self) -> &modelsocket_protocol::SeqId {
        &self.seq_id
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn tools_enabled(&self) -> bool {
        self.tools_enabled
    }

    /// Appends text or tokens to the sequence's context. Completes on
    /// `seq_append_finish`.
    pub async fn append(&self, input: impl Into<AppendInput>, opts: AppendOptions) -> Result<()> {
        let (text, tokens) = match input.into() {
            AppendInput::Text(text) => (Some(text), None),
            AppendInput::Tokens(tokens) => (None, Some(tokens)),
        };
        let cid = self.conn.next_cid();
        let (respond, rx) = oneshot::channel();
        debug!(%cid, seq_id = %self.seq_id, "sending append");
        self.conn.send(ActorMsg::Append {
            seq_id: self.seq_id.clone(),
            cid,
            text,
            tokens,
            role: opts.role,
            hidden: opts.hidden,
            respond,
        })?;
        rx.await
            .map_err(|_| ModelSocketError::Lifecycle(LifecycleError::SeqClosed))?
    }

    /// Starts a generation and returns its stream immediately — `gen` itself
    /// never suspends: it hands the frame to the connection actor and
    /// returns without waiting for any reply.
    pub fn gen(&self, opts: GenOpts) -> Result<GenStream> {
        let cid = self.conn.next_cid();
        let (tx, rx) = tokio::sync::mpsc::channel(GEN_CHANNEL_CAPACITY);
        debug!(%cid, seq_id = %self.seq_id, "sending gen");
        self.conn.send(ActorMsg::Gen {
            seq_id: self.seq_id.clone(),
            cid,
            opts,
            tx,
        })?;
        Ok(GenStream::new(rx))
    }

    /// Forks this sequence server-side and returns the new child sequence.
    /// `seq_fork_finish` does not carry the parent's installed tools, so the
    /// child starts with an empty tool table; callers must re-`install` any
    /// tools they want on it.
    pub async fn create_fork(&self) -> Result<Sequence> {
        let cid = self.conn.next_cid();
        let (respond, rx) = oneshot::channel();
        self.conn.send(ActorMsg::Fork {
            seq_id: self.seq_id.clone(),
            cid,
            respond,
        })?;
        let child_seq_id = rx
            .await
            .map_err(|_| ModelSocketError::Lifecycle(LifecycleError::SeqClosed))??;
        Ok(Sequence::new(
            child_seq_id,
            self.model.clone(),
            self.tools_enabled,
            self.conn.clone(),
        ))
    }

    /// Forks, runs `f` against the child, and requests the child's `close()`
    /// regardless of whether `f` succeeded — without awaiting that close.
    /// Close errors are logged, not propagated.
    pub async fn with_fork<F, Fut, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(Sequence) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let child = self.create_fork().await?;
        let closer = child.clone();
        let result = f(child).await;
        tokio::spawn(async move {
            if let Err(e) = closer.close().await {
                warn!("error closing forked sequence: {e}");
            }
        });
        result
    }

    /// Closes the sequence; completes on the matching `seq_closed`.
    pub async fn close(&self) -> Result<()> {
        let cid = self.conn.next_cid();
        let (respond, rx) = oneshot::channel();
        self.conn.send(ActorMsg::Close {
            seq_id: self.seq_id.clone(),
            cid,
            respond,
        })?;
        rx.await
            .map_err(|_| ModelSocketError::Lifecycle(LifecycleError::SeqClosed))?
    }

    /// Validates and registers a tool, announcing it to the server via a
    /// hidden system `append`. Requires `tools_enabled`; rejects a
    /// duplicate name before any I/O.
    pub async fn install(&self, tool: Tool) -> Result<()> {
        if !self.tools_enabled {
            return Err(ModelSocketError::Caller(
                "tools are not enabled on this sequence".to_string(),
            ));
        }
        let (respond, rx) = oneshot::channel();
        self.conn.send(ActorMsg::CheckToolName {
            seq_id: self.seq_id.clone(),
            name: tool.name.clone(),
            respond,
        })?;
        rx.await
            .map_err(|_| ModelSocketError::Lifecycle(LifecycleError::SeqClosed))??;

        let announcement = tool.announcement_text()?;
        self.append(
            announcement,
            AppendOptions {
                role: Some("system".to_string()),
                hidden: Some(true),
            },
        )
        .await?;

        self.conn.send(ActorMsg::CommitTool {
            seq_id: self.seq_id.clone(),
            tool,
        })?;
        Ok(())
    }
}
