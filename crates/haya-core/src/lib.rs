// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Session history and token-budget compaction (spec.md §4.2, §4.3).
mod compact;
mod history;
mod session;
mod token;

pub use compact::{
    compact_for_budget, CompactionOptions, Summarizer, RECENT_MESSAGE_COUNT, RESERVE_FOR_RESPONSE,
};
pub use history::{GetHistoryOptions, HistoryManager};
pub use session::Session;
pub use token::{SimpleTokenCounter, TokenCounter};
