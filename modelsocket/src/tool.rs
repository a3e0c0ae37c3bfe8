//! The per-sequence tool definition table and its validation rules.

use std::fmt;
use std::future::Future;
use std::sync::LazyLock;

use futures::future::BoxFuture;
use regex_lite::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::error::ModelSocketError;
use crate::error::Result;

static NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    #![allow(clippy::expect_used)]
    Regex::new("^[A-Za-z0-9_]+$").expect("static tool-name pattern")
});

type InvokeFn = Box<dyn Fn(Value) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// One entry of the per-sequence tool table: `{name, description,
/// parameters, invoke-fn}`.
pub struct Tool {
    pub name: String,
    pub description: String,
    pub parameters: Option<Value>,
    invoke: InvokeFn,
}

impl Tool {
    /// Builds a tool, validating `name`, `description`, and `parameters`
    /// up front. `invoke` may return any `Serialize` value; its async or
    /// sync nature is erased behind the boxed future so callers can pass
    /// either kind of closure.
    pub fn new<F, Fut, T>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Option<Value>,
        invoke: F,
    ) -> Result<Self>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Serialize,
    {
        let name = name.into();
        let description = description.into();
        validate(&name, &description, &parameters)?;
        let boxed: InvokeFn = Box::new(move |args| {
            let fut = invoke(args);
            Box::pin(async move {
                let value = fut.await?;
                Ok(serde_json::to_value(value)?)
            })
        });
        Ok(Self {
            name,
            description,
            parameters,
            invoke: boxed,
        })
    }

    pub(crate) async fn invoke(&self, args: Value) -> Result<Value> {
        (self.invoke)(args).await
    }

    /// The hidden system-append text `install` sends before registering the
    /// tool: a one-line description followed by a two-space-indented JSON
    /// object and two trailing newlines.
    pub(crate) fn announcement_text(&self) -> Result<String> {
        let schema = serde_json::json!({
            "name": self.name,
            "description": self.description,
            "parameters": self.parameters,
        });
        let indented = indent_json(&schema)?;
        Ok(format!(
            "Use the function '{}' to: {}\n{indented}\n\n",
            self.name, self.description
        ))
    }
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

fn indent_json(value: &Value) -> Result<String> {
    let compact = serde_json::to_string(value)?;
    Ok(format!("  {compact}"))
}

fn validate(name: &str, description: &str, parameters: &Option<Value>) -> Result<()> {
    if name.is_empty() || !NAME_PATTERN.is_match(name) {
        return Err(ModelSocketError::Caller(format!(
            "invalid tool name {name:?}: must match ^[A-Za-z0-9_]+$ and be non-empty"
        )));
    }
    if description.is_empty() {
        return Err(ModelSocketError::Caller(
            "tool description must be a non-empty string".to_string(),
        ));
    }
    if let Some(params) = parameters
        && !params.is_object()
    {
        return Err(ModelSocketError::Caller(
            "tool parameters, if present, must be a JSON object".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    async fn echo(args: Value) -> Result<Value> {
        Ok(args)
    }

    #[test]
    fn rejects_names_outside_pattern() {
        let err = Tool::new("bad name!", "desc", None, echo).unwrap_err();
        assert!(matches!(err, ModelSocketError::Caller(_)));
    }

    #[test]
    fn rejects_empty_description() {
        let err = Tool::new("get_time", "", None, echo).unwrap_err();
        assert!(matches!(err, ModelSocketError::Caller(_)));
    }

    #[test]
    fn rejects_non_object_parameters() {
        let err = Tool::new(
            "get_time",
            "returns the time",
            Some(Value::String("nope".to_string())),
            echo,
        )
        .unwrap_err();
        assert!(matches!(err, ModelSocketError::Caller(_)));
    }

    #[test]
    fn accepts_valid_tool() {
        let tool = Tool::new("get_time", "returns the time", None, echo).unwrap();
        assert_eq!(tool.name, "get_time");
    }

    #[tokio::test]
    async fn invoke_runs_closure() {
        let tool = Tool::new("echo", "echoes args", None, echo).unwrap();
        let result = tool.invoke(serde_json::json!({"a": 1})).await.unwrap();
        assert_eq!(result, serde_json::json!({"a": 1}));
    }

    #[test]
    fn announcement_text_has_expected_shape() {
        let tool = Tool::new(
            "get_time",
            "returns the time",
            Some(serde_json::json!({"type": "object"})),
            echo,
        )
        .unwrap();
        let text = tool.announcement_text().unwrap();
        assert!(text.starts_with("Use the function 'get_time' to: returns the time\n"));
        assert!(text.ends_with("\n\n"));
        assert!(text.contains("\"name\":\"get_time\""));
    }
}
