use serde::Serialize;

use crate::Cid;
use crate::GenOpts;
use crate::SeqId;
use crate::ToolResultPayload;

/// An outbound request frame: `{cid, request, seq_id?, data}`.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundFrame {
    pub cid: Cid,
    pub request: RequestKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seq_id: Option<SeqId>,
    pub data: OutboundPayload,
}

impl OutboundFrame {
    /// Build the `seq_open` frame that opens a new sequence.
    pub fn seq_open(cid: Cid, data: SeqOpenData) -> Self {
        Self {
            cid,
            request: RequestKind::SeqOpen,
            seq_id: None,
            data: OutboundPayload::Open(data),
        }
    }

    /// Build a `seq_command` frame targeting an already-open sequence.
    pub fn seq_command(cid: Cid, seq_id: SeqId, data: SeqCommandData) -> Self {
        Self {
            cid,
            request: RequestKind::SeqCommand,
            seq_id: Some(seq_id),
            data: OutboundPayload::Command(data),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    SeqOpen,
    SeqCommand,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum OutboundPayload {
    Open(SeqOpenData),
    Command(SeqCommandData),
}

/// `seq_open.data`.
#[derive(Debug, Clone, Serialize)]
pub struct SeqOpenData {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_prelude: Option<bool>,
}

/// `seq_command.data`, internally tagged by `command`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum SeqCommandData {
    Append {
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        tokens: Option<Vec<i64>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        role: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        hidden: Option<bool>,
    },
    Gen {
        #[serde(skip_serializing_if = "Option::is_none")]
        role: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        tokens: Option<i64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        temperature: Option<f64>,
    },
    Fork {},
    Close {},
    ToolReturn {
        gen_opts: GenOpts,
        results: Vec<ToolResultPayload>,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn append_with_text_omits_tokens() {
        let frame = OutboundFrame::seq_command(
            Cid::new("cid_1"),
            SeqId::new("S"),
            SeqCommandData::Append {
                text: Some("x".to_string()),
                tokens: None,
                role: None,
                hidden: None,
            },
        );
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["data"]["command"], "append");
        assert_eq!(value["data"]["text"], "x");
        assert!(value["data"].get("tokens").is_none());
    }

    #[test]
    fn append_with_tokens_omits_text() {
        let frame = OutboundFrame::seq_command(
            Cid::new("cid_1"),
            SeqId::new("S"),
            SeqCommandData::Append {
                text: None,
                tokens: Some(vec![1, 2]),
                role: None,
                hidden: None,
            },
        );
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["data"]["tokens"], serde_json::json!([1, 2]));
        assert!(value["data"].get("text").is_none());
    }

    #[test]
    fn seq_open_has_no_seq_id() {
        let frame = OutboundFrame::seq_open(
            Cid::new("cid_0"),
            SeqOpenData {
                model: "demo".to_string(),
                tools_enabled: Some(true),
                tool_prompt: None,
                skip_prelude: None,
            },
        );
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["request"], "seq_open");
        assert!(value.get("seq_id").is_none());
    }

    #[test]
    fn tool_return_echoes_cid_and_gen_opts() {
        let frame = OutboundFrame::seq_command(
            Cid::new("cid_2"),
            SeqId::new("S"),
            SeqCommandData::ToolReturn {
                gen_opts: GenOpts {
                    role: Some("assistant".to_string()),
                    tokens: None,
                    temperature: Some(0.7),
                },
                results: vec![ToolResultPayload {
                    name: "get_time".to_string(),
                    result: "\"12:00\"".to_string(),
                }],
            },
        );
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["cid"], "cid_2");
        assert_eq!(value["data"]["gen_opts"]["role"], "assistant");
        assert_eq!(value["data"]["results"][0]["result"], "\"12:00\"");
    }
}
