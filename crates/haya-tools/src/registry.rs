// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use futures::future::join_all;
use thiserror::Error;

use crate::policy::PolicyEngine;
use crate::tool::{AgentTool, ToolCall, ToolResult};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("tool already registered: {0}")]
    DuplicateName(String),
}

/// Central registry for [`AgentTool`]s, gated by an optional [`PolicyEngine`]
/// (spec.md §4.4). Read-mostly after startup: registration/unregistration
/// take a write lock; `execute` and lookups only ever read.
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn AgentTool>>>,
    policy_engine: RwLock<Option<Arc<dyn PolicyEngine>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: RwLock::new(HashMap::new()), policy_engine: RwLock::new(None) }
    }

    /// Re-registering an existing name is a hard error (spec.md §3 AgentTool
    /// invariant).
    pub fn register(&self, tool: Arc<dyn AgentTool>) -> Result<(), RegistryError> {
        let mut tools = self.tools.write().expect("tool registry lock poisoned");
        if tools.contains_key(tool.name()) {
            return Err(RegistryError::DuplicateName(tool.name().to_string()));
        }
        tools.insert(tool.name().to_string(), tool);
        Ok(())
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.tools.write().expect("tool registry lock poisoned").remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn AgentTool>> {
        self.tools.read().expect("tool registry lock poisoned").get(name).cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.read().expect("tool registry lock poisoned").contains_key(name)
    }

    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> =
            self.tools.read().expect("tool registry lock poisoned").keys().cloned().collect();
        names.sort();
        names
    }

    pub fn size(&self) -> usize {
        self.tools.read().expect("tool registry lock poisoned").len()
    }

    pub fn set_policy_engine(&self, engine: Option<Arc<dyn PolicyEngine>>) {
        *self.policy_engine.write().expect("policy engine lock poisoned") = engine;
    }

    /// Run the spec.md §4.4 execute algorithm for a single call. Never
    /// returns `Err` — all failure modes are captured as `ToolResult{is_error:true}`.
    pub async fn execute(&self, call: &ToolCall) -> ToolResult {
        let Some(tool) = self.get(&call.name) else {
            return ToolResult::error(&call.id, format!("Tool not found: {}", call.name));
        };

        let args: serde_json::Value = match serde_json::from_str(&call.arguments) {
            Ok(v @ serde_json::Value::Object(_)) => v,
            Ok(_) | Err(_) => {
                return ToolResult::error(
                    &call.id,
                    format!("Invalid tool arguments: {}", call.arguments),
                );
            }
        };

        let engine = self.policy_engine.read().expect("policy engine lock poisoned").clone();
        if let Some(engine) = engine {
            let decision = engine.check_policy(&call.name, &args).await;
            if !decision.allowed {
                let reason = decision.reason.unwrap_or_else(|| "denied".to_string());
                return ToolResult::error(&call.id, format!("Tool blocked by policy: {reason}"));
            }
        }

        match tool.execute(&args).await {
            Ok(content) => ToolResult::ok(&call.id, content),
            Err(e) => ToolResult::error(&call.id, format!("Tool execution error: {e}")),
        }
    }

    /// Run every call in `calls` concurrently; preserves input order in the
    /// output, and one tool's failure never cancels the others (spec.md §4.4,
    /// §5).
    pub async fn execute_all(&self, calls: &[ToolCall]) -> Vec<ToolResult> {
        join_all(calls.iter().map(|call| self.execute(call))).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
