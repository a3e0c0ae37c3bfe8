use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// Correlation id. Opaque ASCII string, unique within one connection
/// lifetime, assigned monotonically by the client. Every request carries a
/// cid; the server echoes it on the completion event.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cid(String);

impl Cid {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Cid {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Cid {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Sequence id. Opaque string chosen by the server, returned in
/// `seq_opened`, and included in every subsequent event and command for
/// that sequence.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeqId(String);

impl SeqId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SeqId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SeqId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SeqId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}
