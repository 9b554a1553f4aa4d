// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single durable memory (spec.md §4.5 "Memory entries are created
/// externally"; §4.7 hybrid search result shape).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryEntry {
    pub id: String,
    pub content: String,
    pub source: String,
    #[serde(default)]
    pub metadata: Value,
}

/// One [`MemoryEntry`] annotated with its hybrid search score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredMemory {
    pub id: String,
    pub content: String,
    pub source: String,
    pub score: f64,
    pub metadata: Value,
}
