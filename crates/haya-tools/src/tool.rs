// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::Value;

/// A tool call requested by the model, as forwarded to the registry.
/// `arguments` is kept as raw JSON text (spec.md §3 ToolCall/ToolResult) —
/// the model supplies it that way and parsing is the registry's job, with
/// its own defined failure mode.
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// The outcome of executing one [`ToolCall`].
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn ok(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self { tool_call_id: tool_call_id.into(), content: content.into(), is_error: false }
    }

    pub fn error(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self { tool_call_id: tool_call_id.into(), content: content.into(), is_error: true }
    }
}

/// Default policy a tool declares for itself (spec.md §3 AgentTool). The
/// [`crate::policy::PolicyEngine`] attached to the registry is authoritative
/// and may override this, but callers that build their own policy engine can
/// consult it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolPolicyDecision {
    Allow,
    Deny,
    Ask,
}

/// A JSON-schema-described tool surfaced to a model (spec.md §3 AgentTool).
#[async_trait]
pub trait AgentTool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters(&self) -> Value;
    fn default_policy(&self) -> Option<ToolPolicyDecision> {
        None
    }
    /// Execute the tool against parsed arguments. Any `Err` is captured by
    /// the registry as a non-propagating `ToolResult{is_error:true}` — tools
    /// never need to encode their own error string format.
    async fn execute(&self, args: &Value) -> anyhow::Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl AgentTool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes its input"
        }
        fn parameters(&self) -> Value {
            json!({ "type": "object" })
        }
        async fn execute(&self, args: &Value) -> anyhow::Result<String> {
            Ok(args.to_string())
        }
    }

    #[test]
    fn default_policy_is_none_by_default() {
        assert!(EchoTool.default_policy().is_none());
    }

    #[tokio::test]
    async fn execute_echoes_input() {
        let out = EchoTool.execute(&json!({"x": 1})).await.unwrap();
        assert_eq!(out, r#"{"x":1}"#);
    }

    #[test]
    fn tool_result_ok_is_not_error() {
        let r = ToolResult::ok("id1", "fine");
        assert!(!r.is_error);
        assert_eq!(r.content, "fine");
    }

    #[test]
    fn tool_result_error_sets_flag() {
        let r = ToolResult::error("id1", "bad");
        assert!(r.is_error);
    }
}
