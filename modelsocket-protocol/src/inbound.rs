use serde::Deserialize;

use crate::Cid;
use crate::SeqId;
use crate::ToolCallRequest;

/// An inbound event frame, tagged on the wire by its `event` field.
///
/// Every inbound frame must be a JSON object with a string `event` field.
/// Frames whose `event` is not one of the kinds below still parse, landing
/// in [`InboundEvent::Unknown`]; the dispatch loop logs and drops those
/// rather than failing outright.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum InboundEvent {
    SeqOpened {
        cid: Cid,
        seq_id: SeqId,
    },
    SeqClosed {
        #[serde(default)]
        cid: Option<Cid>,
        seq_id: SeqId,
    },
    SeqText {
        cid: Cid,
        seq_id: SeqId,
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        tokens: Option<Vec<i64>>,
        #[serde(default)]
        hidden: Option<bool>,
    },
    SeqAppendFinish {
        cid: Cid,
        seq_id: SeqId,
    },
    SeqGenFinish {
        cid: Cid,
        seq_id: SeqId,
    },
    SeqForkFinish {
        cid: Cid,
        seq_id: SeqId,
        #[serde(default)]
        child_seq_id: Option<SeqId>,
    },
    SeqToolCall {
        cid: Cid,
        seq_id: SeqId,
        tool_calls: Vec<ToolCallRequest>,
    },
    Error {
        #[serde(default)]
        cid: Option<Cid>,
        #[serde(default)]
        message: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn parses_seq_text_with_hidden_chunk() {
        let raw = r#"{"event":"seq_text","cid":"cid_2","seq_id":"S","text":"<think>","hidden":true}"#;
        let parsed: InboundEvent = serde_json::from_str(raw).unwrap();
        match parsed {
            InboundEvent::SeqText {
                cid,
                seq_id,
                text,
                hidden,
                ..
            } => {
                assert_eq!(cid.as_str(), "cid_2");
                assert_eq!(seq_id.as_str(), "S");
                assert_eq!(text.as_deref(), Some("<think>"));
                assert_eq!(hidden, Some(true));
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn unrecognized_event_kind_parses_as_unknown() {
        let raw = r#"{"event":"seq_mystery","cid":"x"}"#;
        let parsed: InboundEvent = serde_json::from_str(raw).unwrap();
        assert!(matches!(parsed, InboundEvent::Unknown));
    }

    #[test]
    fn missing_event_field_fails_to_parse() {
        let raw = r#"{"cid":"x"}"#;
        let parsed = serde_json::from_str::<InboundEvent>(raw);
        assert!(parsed.is_err());
    }
}
