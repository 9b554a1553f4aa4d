// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::RwLock;

use async_trait::async_trait;

/// A dense-vector ANN index over embedded memory entries (spec.md §6 "Memory
/// DB: ... two optional indices (FTS5-style lexical, dense-vector ANN)").
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(&self, id: &str, embedding: Vec<f32>) -> anyhow::Result<()>;
    async fn remove(&self, id: &str) -> anyhow::Result<()>;
    /// Returns up to `limit` `(id, distance)` pairs ordered closest-first.
    async fn search(&self, embedding: &[f32], limit: usize) -> anyhow::Result<Vec<(String, f64)>>;
}

/// Brute-force cosine-distance index, adequate for the memory volumes a
/// single-session gateway accumulates. A production deployment with a large
/// corpus would swap this for an external ANN service behind the same trait.
#[derive(Default)]
pub struct BruteForceVectorIndex {
    vectors: RwLock<Vec<(String, Vec<f32>)>>,
}

impl BruteForceVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    let similarity = (dot / (norm_a * norm_b)).clamp(-1.0, 1.0);
    (1.0 - similarity as f64).max(0.0)
}

#[async_trait]
impl VectorIndex for BruteForceVectorIndex {
    async fn upsert(&self, id: &str, embedding: Vec<f32>) -> anyhow::Result<()> {
        let mut vectors = self.vectors.write().expect("vector index lock poisoned");
        if let Some(entry) = vectors.iter_mut().find(|(existing, _)| existing == id) {
            entry.1 = embedding;
        } else {
            vectors.push((id.to_string(), embedding));
        }
        Ok(())
    }

    async fn remove(&self, id: &str) -> anyhow::Result<()> {
        self.vectors.write().expect("vector index lock poisoned").retain(|(existing, _)| existing != id);
        Ok(())
    }

    async fn search(&self, embedding: &[f32], limit: usize) -> anyhow::Result<Vec<(String, f64)>> {
        let vectors = self.vectors.read().expect("vector index lock poisoned");
        let mut scored: Vec<(String, f64)> =
            vectors.iter().map(|(id, v)| (id.clone(), cosine_distance(embedding, v))).collect();
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal).then(a.0.cmp(&b.0)));
        scored.truncate(limit);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn search_returns_closest_first() {
        let index = BruteForceVectorIndex::new();
        index.upsert("a", vec![1.0, 0.0]).await.unwrap();
        index.upsert("b", vec![0.0, 1.0]).await.unwrap();
        index.upsert("c", vec![0.9, 0.1]).await.unwrap();
        let results = index.search(&[1.0, 0.0], 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, "a");
        assert_eq!(results[1].0, "c");
    }

    #[tokio::test]
    async fn upsert_replaces_existing_embedding() {
        let index = BruteForceVectorIndex::new();
        index.upsert("a", vec![1.0, 0.0]).await.unwrap();
        index.upsert("a", vec![0.0, 1.0]).await.unwrap();
        let results = index.search(&[0.0, 1.0], 1).await.unwrap();
        assert_eq!(results[0].0, "a");
        assert!(results[0].1 < 0.01);
    }

    #[tokio::test]
    async fn remove_drops_from_future_searches() {
        let index = BruteForceVectorIndex::new();
        index.upsert("a", vec![1.0, 0.0]).await.unwrap();
        index.remove("a").await.unwrap();
        let results = index.search(&[1.0, 0.0], 10).await.unwrap();
        assert!(results.is_empty());
    }
}
