use serde::Deserialize;
use serde::Serialize;

/// One entry of the `tool_calls` array on a `seq_tool_call` event.
///
/// `args` is the raw string the server sent; it is not guaranteed to be
/// valid JSON, so parsing is the caller's responsibility.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallRequest {
    pub name: String,
    pub args: String,
}

/// One entry of the `results` array sent back in a `tool_return` command.
///
/// `result` is a JSON-encoded string (the serialized return value of the
/// tool's invoke function), not a raw JSON value.
#[derive(Debug, Clone, Serialize)]
pub struct ToolResultPayload {
    pub name: String,
    pub result: String,
}
