// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;

use crate::db::MemoryDatabase;
use crate::entry::ScoredMemory;
use crate::vector::VectorIndex;

/// Hybrid search options (spec.md §4.7), all with defaults matching the
/// spec's literal values.
#[derive(Debug, Clone, Copy)]
pub struct SearchOptions {
    pub limit: usize,
    pub min_score: f64,
    pub vector_weight: f64,
    pub text_weight: f64,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self { limit: 10, min_score: 0.0, vector_weight: 0.7, text_weight: 0.3 }
    }
}

/// `vectorScore = 1/(1+d)`: monotonically decreasing in distance, range (0,1].
fn distance_to_score(d: f64) -> f64 {
    1.0 / (1.0 + d.max(0.0))
}

/// `textScore = 1/(1+max(0,rank))`: FTS5 ranks are negative for a match, so
/// this maps any match to 1.0 and decays as rank increases past zero.
fn rank_to_score(rank: f64) -> f64 {
    1.0 / (1.0 + rank.max(0.0))
}

/// Runs the spec.md §4.7 hybrid search algorithm: fetch candidates from
/// whichever modalities are available, fuse their scores by normalized
/// weight, filter/sort/truncate, then re-resolve surviving ids against the
/// store of record (dropping any that vanished between search and lookup).
pub async fn hybrid_search(
    query: &str,
    query_embedding: Option<&[f32]>,
    memory_db: &dyn MemoryDatabase,
    vector_index: Option<&dyn VectorIndex>,
    options: SearchOptions,
) -> anyhow::Result<Vec<ScoredMemory>> {
    let candidate_limit = options.limit * 4;

    let mut vector_scores: HashMap<String, f64> = HashMap::new();
    if let (Some(index), Some(embedding)) = (vector_index, query_embedding) {
        for (id, distance) in index.search(embedding, candidate_limit).await? {
            vector_scores.insert(id, distance_to_score(distance));
        }
    }

    let mut text_scores: HashMap<String, f64> = HashMap::new();
    for (id, rank) in memory_db.search_lexical(query, candidate_limit).await? {
        text_scores.insert(id, rank_to_score(rank));
    }

    let (vw, tw) = normalize_weights(options.vector_weight, options.text_weight);

    let mut ids: Vec<String> = vector_scores.keys().chain(text_scores.keys()).cloned().collect();
    ids.sort();
    ids.dedup();

    let mut combined: Vec<(String, f64)> = ids
        .into_iter()
        .map(|id| {
            let v = vector_scores.get(&id).copied().unwrap_or(0.0);
            let t = text_scores.get(&id).copied().unwrap_or(0.0);
            let score = vw * v + tw * t;
            (id, score)
        })
        .filter(|(_, score)| *score >= options.min_score)
        .collect();

    // Descending by score; ties broken by ascending id (stable insertion order).
    combined.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then(a.0.cmp(&b.0)));
    combined.truncate(options.limit);

    let mut results = Vec::with_capacity(combined.len());
    for (id, score) in combined {
        if let Some(entry) = memory_db.get_by_id(&id).await? {
            results.push(ScoredMemory { id: entry.id, content: entry.content, source: entry.source, score, metadata: entry.metadata });
        }
    }
    Ok(results)
}

/// Scales `(vector_weight, text_weight)` to sum to 1; falls back to the
/// spec's default split when both are zero.
fn normalize_weights(vector_weight: f64, text_weight: f64) -> (f64, f64) {
    let sum = vector_weight + text_weight;
    if sum <= 0.0 {
        return (0.7, 0.3);
    }
    (vector_weight / sum, text_weight / sum)
}
