use serde::Deserialize;
use serde::Serialize;

/// Options for the most recent in-flight `gen` command on a sequence.
///
/// Stashed by the engine when `gen` is sent and echoed back verbatim in the
/// `tool_return` command's `gen_opts` field so the server can resume
/// generation with identical settings after a tool call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenOpts {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}
