// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use haya_model::{Message, Role};

use crate::token::TokenCounter;

/// Tokens reserved for the model's reply; never counted against the budget
/// available to history (spec.md §4.2).
pub const RESERVE_FOR_RESPONSE: usize = 4096;

/// The most recent messages are always kept regardless of budget (spec.md §4.2).
pub const RECENT_MESSAGE_COUNT: usize = 10;

/// Produces a replacement summary for a dropped head-of-history prefix.
///
/// Compaction calls this only when the caller configures one; otherwise
/// dropped messages are simply omitted (spec.md §9 Open Questions: the
/// summarizer contract is an async provider the source only declares the
/// shape of). Resolved here as a trait so callers can plug in a real
/// model-backed summarizer or a deterministic stub for tests.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, messages: &[Message]) -> anyhow::Result<String>;
}

/// Parameters for [`compact_for_budget`], mirroring spec.md §4.2's
/// `getHistory` options.
pub struct CompactionOptions<'a> {
    pub max_tokens: usize,
    pub system_prompt_tokens: usize,
    pub recent_message_count: usize,
    pub reserve_for_response: usize,
    pub summarizer: Option<&'a (dyn Summarizer + Send + Sync)>,
}

impl Default for CompactionOptions<'_> {
    fn default() -> Self {
        Self {
            max_tokens: 0,
            system_prompt_tokens: 0,
            recent_message_count: RECENT_MESSAGE_COUNT,
            reserve_for_response: RESERVE_FOR_RESPONSE,
            summarizer: None,
        }
    }
}

fn per_message_cost(counter: &dyn TokenCounter, msg: &Message) -> usize {
    counter.count(&msg.content) + 4
}

/// Walk backward from `boundary` (exclusive) to make sure a tool_call/tool
/// pair is never split across the kept/dropped line. If the message just
/// inside the kept region is a tool result, pull its issuing assistant
/// message (and anything between them) into the kept region too.
fn extend_to_pair_boundary(messages: &[Message], mut boundary: usize) -> usize {
    loop {
        if boundary >= messages.len() {
            return boundary;
        }
        let first_kept = &messages[boundary];
        if first_kept.role != Role::Tool {
            return boundary;
        }
        let Some(tool_call_id) = &first_kept.tool_call_id else {
            return boundary;
        };
        // Find the assistant message (searching backward from the boundary)
        // that issued this tool_call_id.
        let issuer = messages[..boundary].iter().rposition(|m| {
            m.tool_calls
                .as_ref()
                .is_some_and(|calls| calls.iter().any(|c| &c.id == tool_call_id))
        });
        match issuer {
            Some(idx) if idx < boundary => boundary = idx,
            _ => return boundary,
        }
    }
}

/// Apply spec.md §4.2's token-budget compaction contract.
///
/// `messages` is the already-count-truncated (step 3) history. Returns the
/// messages a caller should actually send to the model.
pub async fn compact_for_budget(
    messages: &[Message],
    counter: &dyn TokenCounter,
    opts: &CompactionOptions<'_>,
) -> Vec<Message> {
    if messages.is_empty() {
        return Vec::new();
    }

    let budget = opts
        .max_tokens
        .saturating_sub(opts.system_prompt_tokens)
        .saturating_sub(opts.reserve_for_response);

    let n = messages.len();
    let recent_start = n.saturating_sub(opts.recent_message_count);
    let recent_start = extend_to_pair_boundary(messages, recent_start);

    let mut used: usize = messages[recent_start..]
        .iter()
        .map(|m| per_message_cost(counter, m))
        .sum();

    // Walk backward from just before the tail, including older messages
    // while they still fit the budget.
    let mut head_start = recent_start;
    while head_start > 0 {
        let candidate = head_start - 1;
        let cost = per_message_cost(counter, &messages[candidate]);
        if used + cost > budget {
            break;
        }
        used += cost;
        head_start = candidate;
    }
    head_start = extend_to_pair_boundary(messages, head_start);

    let dropped = &messages[..head_start];
    let kept = &messages[head_start..];

    if dropped.is_empty() {
        return kept.to_vec();
    }

    let Some(summarizer) = opts.summarizer else {
        return kept.to_vec();
    };

    match summarizer.summarize(dropped).await {
        Ok(summary_text) => {
            let summary_ts = kept.first().map(|m| m.timestamp_ms).unwrap_or(0);
            let mut out = Vec::with_capacity(kept.len() + 1);
            out.push(Message::system(summary_text, summary_ts));
            out.extend_from_slice(kept);
            out
        }
        // A failing summarizer must never make history fail to fit a
        // budget; fall back to the plain truncation.
        Err(_) => kept.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use haya_model::ToolCallRecord;

    struct CannedSummarizer(String);

    #[async_trait]
    impl Summarizer for CannedSummarizer {
        async fn summarize(&self, _messages: &[Message]) -> anyhow::Result<String> {
            Ok(self.0.clone())
        }
    }

    struct FailingSummarizer;

    #[async_trait]
    impl Summarizer for FailingSummarizer {
        async fn summarize(&self, _messages: &[Message]) -> anyhow::Result<String> {
            Err(anyhow::anyhow!("boom"))
        }
    }

    fn msgs(n: usize) -> Vec<Message> {
        (0..n)
            .map(|i| Message::user(format!("message number {i}"), i as i64))
            .collect()
    }

    #[tokio::test]
    async fn empty_history_returns_empty() {
        let counter = crate::token::SimpleTokenCounter;
        let opts = CompactionOptions { max_tokens: 1000, ..Default::default() };
        let out = compact_for_budget(&[], &counter, &opts).await;
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn keeps_everything_when_budget_is_generous() {
        let counter = crate::token::SimpleTokenCounter;
        let history = msgs(5);
        let opts = CompactionOptions { max_tokens: 1_000_000, ..Default::default() };
        let out = compact_for_budget(&history, &counter, &opts).await;
        assert_eq!(out.len(), 5);
    }

    #[tokio::test]
    async fn always_keeps_recent_message_count_even_under_tiny_budget() {
        let counter = crate::token::SimpleTokenCounter;
        let history = msgs(20);
        let opts = CompactionOptions {
            max_tokens: 1,
            reserve_for_response: 0,
            recent_message_count: 3,
            ..Default::default()
        };
        let out = compact_for_budget(&history, &counter, &opts).await;
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].content, "message number 17");
        assert_eq!(out[2].content, "message number 19");
    }

    #[tokio::test]
    async fn preserves_relative_order() {
        let counter = crate::token::SimpleTokenCounter;
        let history = msgs(30);
        let opts = CompactionOptions { max_tokens: 200, recent_message_count: 5, reserve_for_response: 0, ..Default::default() };
        let out = compact_for_budget(&history, &counter, &opts).await;
        let timestamps: Vec<i64> = out.iter().map(|m| m.timestamp_ms).collect();
        let mut sorted = timestamps.clone();
        sorted.sort();
        assert_eq!(timestamps, sorted);
    }

    #[tokio::test]
    async fn without_summarizer_dropped_messages_are_just_omitted() {
        let counter = crate::token::SimpleTokenCounter;
        let history = msgs(20);
        let opts = CompactionOptions { max_tokens: 1, reserve_for_response: 0, recent_message_count: 2, ..Default::default() };
        let out = compact_for_budget(&history, &counter, &opts).await;
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|m| m.role != Role::System));
    }

    #[tokio::test]
    async fn with_summarizer_inserts_single_system_summary_before_tail() {
        let counter = crate::token::SimpleTokenCounter;
        let history = msgs(20);
        let summarizer = CannedSummarizer("condensed history".into());
        let opts = CompactionOptions {
            max_tokens: 1,
            reserve_for_response: 0,
            recent_message_count: 2,
            summarizer: Some(&summarizer),
            ..Default::default()
        };
        let out = compact_for_budget(&history, &counter, &opts).await;
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].role, Role::System);
        assert_eq!(out[0].content, "condensed history");
    }

    #[tokio::test]
    async fn failing_summarizer_falls_back_to_plain_truncation() {
        let counter = crate::token::SimpleTokenCounter;
        let history = msgs(20);
        let summarizer = FailingSummarizer;
        let opts = CompactionOptions {
            max_tokens: 1,
            reserve_for_response: 0,
            recent_message_count: 2,
            summarizer: Some(&summarizer),
            ..Default::default()
        };
        let out = compact_for_budget(&history, &counter, &opts).await;
        assert_eq!(out.len(), 2);
    }

    #[tokio::test]
    async fn never_splits_tool_call_pair_across_boundary() {
        let counter = crate::token::SimpleTokenCounter;
        let mut history = msgs(5);
        history.push(Message::assistant_with_tool_calls(
            "",
            vec![ToolCallRecord { id: "c1".into(), name: "search".into(), arguments: "{}".into() }],
            5,
        ));
        history.push(Message::tool_result("c1", "result text here", 6));
        history.extend(msgs(3).into_iter().map(|mut m| {
            m.timestamp_ms += 7;
            m
        }));
        // recent_message_count=1 would normally start the tail at the very
        // last message, splitting it from its tool_call — verify it gets
        // pulled back to include the assistant message too.
        let opts = CompactionOptions { max_tokens: 1_000_000, recent_message_count: 1, ..Default::default() };
        let out = compact_for_budget(&history, &counter, &opts).await;
        let has_tool_call = out.iter().any(|m| m.tool_calls.is_some());
        let has_tool_result = out.iter().any(|m| m.role == Role::Tool);
        assert_eq!(has_tool_call, has_tool_result, "tool_call/tool pair must not be split");
    }
}
