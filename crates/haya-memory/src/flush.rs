// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use haya_model::Message;

/// Inputs to [`should_run_memory_flush`] (spec.md §4.6).
#[derive(Debug, Clone, Copy)]
pub struct MemoryFlushCheck {
    pub total_tokens: i64,
    pub context_window_tokens: i64,
    pub reserve_tokens: i64,
    pub soft_threshold_tokens: i64,
    pub has_run_for_cycle: bool,
}

/// Decides whether a pre-compaction memory-flush turn should run
/// (spec.md §4.6, §8 universal invariant).
pub fn should_run_memory_flush(check: MemoryFlushCheck) -> bool {
    if check.total_tokens <= 0 || check.has_run_for_cycle {
        return false;
    }
    let threshold = (check.context_window_tokens - check.reserve_tokens - check.soft_threshold_tokens).max(0);
    if threshold <= 0 {
        return false;
    }
    check.total_tokens >= threshold
}

const DEFAULT_SYSTEM_PROMPT: &str = "Pre-compaction memory flush turn. \
Persist any durable facts worth remembering before older context is discarded, then stop.";

const DEFAULT_USER_PROMPT: &str = "Pre-compaction memory flush. The session is approaching context limits. \
If there are important facts, preferences, or decisions from this conversation that should be remembered \
long-term, use the save_memory tool to persist them now. If nothing needs saving, reply with a brief \
acknowledgment.";

/// Optional overrides for the flush-turn prompts (spec.md §4.6: "Both are
/// overridable by config").
#[derive(Debug, Clone, Default)]
pub struct MemoryFlushPrompts {
    pub system_prompt: Option<String>,
    pub user_prompt: Option<String>,
}

/// Builds the two-message turn submitted to the runtime when a flush is
/// triggered.
pub fn build_memory_flush_messages(prompts: &MemoryFlushPrompts) -> Vec<Message> {
    let system = prompts.system_prompt.as_deref().unwrap_or(DEFAULT_SYSTEM_PROMPT);
    let user = prompts.user_prompt.as_deref().unwrap_or(DEFAULT_USER_PROMPT);
    let now = now_ms();
    vec![Message::system(system, now), Message::user(user, now)]
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
