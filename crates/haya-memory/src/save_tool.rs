// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use haya_tools::AgentTool;
use serde_json::{json, Value};

use crate::db::MemoryDatabase;
use crate::entry::MemoryEntry;
use crate::vector::VectorIndex;

/// Embeds free text into a vector for the [`VectorIndex`]. Implementations
/// typically wrap a remote embedding API call (spec.md §6
/// `memory.embeddingProviderApiKeyEnvVar`); a missing embedder degrades the
/// tool to lexical-only persistence rather than failing.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;
}

/// The `save_memory` tool called by the model (spec.md §4.5: "Memory entries
/// are created externally (`save_memory` tool)").
pub struct SaveMemoryTool {
    db: Arc<dyn MemoryDatabase>,
    vector_index: Option<Arc<dyn VectorIndex>>,
    embedder: Option<Arc<dyn Embedder>>,
}

impl SaveMemoryTool {
    pub fn new(db: Arc<dyn MemoryDatabase>) -> Self {
        Self { db, vector_index: None, embedder: None }
    }

    pub fn with_vector_index(mut self, vector_index: Arc<dyn VectorIndex>, embedder: Arc<dyn Embedder>) -> Self {
        self.vector_index = Some(vector_index);
        self.embedder = Some(embedder);
        self
    }
}

#[async_trait]
impl AgentTool for SaveMemoryTool {
    fn name(&self) -> &str {
        "save_memory"
    }

    fn description(&self) -> &str {
        "Persists a durable fact, preference, or decision so it can be recalled in future sessions."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "content": { "type": "string", "description": "The fact to remember." },
                "source": { "type": "string", "description": "Where this memory came from, e.g. the session id." }
            },
            "required": ["content"]
        })
    }

    async fn execute(&self, args: &Value) -> anyhow::Result<String> {
        let content = args
            .get("content")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("missing required field: content"))?
            .to_string();
        let source = args.get("source").and_then(Value::as_str).unwrap_or("agent").to_string();

        let id = uuid::Uuid::new_v4().to_string();
        self.db
            .insert(MemoryEntry { id: id.clone(), content: content.clone(), source, metadata: json!({}) })
            .await?;

        if let (Some(index), Some(embedder)) = (&self.vector_index, &self.embedder) {
            if let Ok(embedding) = embedder.embed(&content).await {
                index.upsert(&id, embedding).await?;
            }
        }

        Ok(json!({ "id": id, "saved": true }).to_string())
    }
}
