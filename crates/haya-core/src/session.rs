// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use haya_model::{Message, Role};

/// An append-only, id-keyed conversation history.
///
/// The gateway never garbage-collects sessions (spec.md §3 Lifecycles) — that
/// policy lives outside this crate. `Session` only owns the in-process
/// message log; [`crate::history::HistoryManager`] is what serializes
/// concurrent access to it.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    messages: Vec<Message>,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), messages: Vec::new() }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Append a message, clamping its timestamp forward so the
    /// non-decreasing-timestamp invariant (spec.md §3) always holds even if
    /// a caller races two appends with out-of-order wall-clock reads.
    pub fn push(&mut self, mut msg: Message) {
        if let Some(last) = self.messages.last() {
            if msg.timestamp_ms < last.timestamp_ms {
                msg.timestamp_ms = last.timestamp_ms;
            }
        }
        self.messages.push(msg);
    }

    /// Check the two invariants spec.md §3 states for a `Session`: messages
    /// are in non-decreasing timestamp order, and every `role=tool` message
    /// is preceded somewhere by an assistant message whose `tool_calls`
    /// contains its `tool_call_id`. Used in tests and as a defensive check
    /// before persisting.
    pub fn check_invariants(&self) -> Result<(), String> {
        let mut last_ts = i64::MIN;
        let mut seen_tool_call_ids = std::collections::HashSet::new();
        for msg in &self.messages {
            if msg.timestamp_ms < last_ts {
                return Err(format!(
                    "timestamp went backwards: {} < {}",
                    msg.timestamp_ms, last_ts
                ));
            }
            last_ts = msg.timestamp_ms;

            if let Some(calls) = &msg.tool_calls {
                for call in calls {
                    seen_tool_call_ids.insert(call.id.clone());
                }
            }
            if msg.role == Role::Tool {
                let Some(id) = &msg.tool_call_id else {
                    return Err("tool message missing tool_call_id".into());
                };
                if !seen_tool_call_ids.contains(id) {
                    return Err(format!(
                        "tool message references unknown tool_call_id: {id}"
                    ));
                }
            }
        }
        Ok(())
    }
}
