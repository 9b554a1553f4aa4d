// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

/// Result of a policy check (spec.md §4.4).
#[derive(Debug, Clone)]
pub struct PolicyDecision {
    pub allowed: bool,
    pub reason: Option<String>,
}

impl PolicyDecision {
    pub fn allow() -> Self {
        Self { allowed: true, reason: None }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self { allowed: false, reason: Some(reason.into()) }
    }
}

/// A pluggable capability gating tool execution (spec.md §4.4). The engine
/// is authoritative over a tool's own `default_policy()` — it informs the
/// engine but never replaces it.
#[async_trait]
pub trait PolicyEngine: Send + Sync {
    async fn check_policy(&self, name: &str, args: &Value) -> PolicyDecision;
}

/// A glob-pattern policy engine grounded on the teacher's shell-glob tool
/// policy (SPEC_FULL.md §4.4 supplement), generalized from matching shell
/// command strings to matching `(tool name, args)` pairs. Deny patterns take
/// priority over allow patterns; anything unmatched falls through to `ask`.
pub struct GlobPolicyEngine {
    allow: Vec<Regex>,
    deny: Vec<Regex>,
    default_decision: PolicyDecision,
}

impl GlobPolicyEngine {
    pub fn new(allow: &[&str], deny: &[&str]) -> Self {
        let compile = |patterns: &[&str]| -> Vec<Regex> { patterns.iter().filter_map(|p| glob_to_regex(p)).collect() };
        Self {
            allow: compile(allow),
            deny: compile(deny),
            default_decision: PolicyDecision::deny("no matching policy rule (default: ask)"),
        }
    }
}

#[async_trait]
impl PolicyEngine for GlobPolicyEngine {
    async fn check_policy(&self, name: &str, _args: &Value) -> PolicyDecision {
        if self.deny.iter().any(|re| re.is_match(name)) {
            return PolicyDecision::deny(format!("tool '{name}' matches a deny pattern"));
        }
        if self.allow.iter().any(|re| re.is_match(name)) {
            return PolicyDecision::allow();
        }
        self.default_decision.clone()
    }
}

/// Converts a simple shell glob pattern to a [`Regex`], grounded on the
/// teacher's `ToolPolicy::glob_to_regex`. Only `*` (match anything) and `?`
/// (match one char) are supported.
fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let mut re = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            c => {
                for esc in regex::escape(&c.to_string()).chars() {
                    re.push(esc);
                }
            }
        }
    }
    re.push('$');
    Regex::new(&re).ok()
}
