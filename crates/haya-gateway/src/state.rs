// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Shared gateway state, assembled once at startup and handed to every
//! connection/method handler (spec.md §9 "global singletons → explicit
//! context").
use std::collections::HashMap;
use std::sync::Arc;

use haya_channels::{ChannelRegistry, Dock};
use haya_config::Config;
use haya_core::HistoryManager;
use haya_memory::{MemoryDatabase, VectorIndex};
use haya_model::AgentRuntime;
use haya_scheduler::Scheduler;
use haya_tools::ToolRegistry;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::auth::GatewayAuth;

/// Per-session bookkeeping the dispatcher needs that doesn't belong in any
/// single subsystem crate: whether this cycle's memory flush has already
/// run (spec.md §4.6).
#[derive(Default)]
struct MemoryFlushCycle {
    has_run_for_cycle: bool,
}

/// Tracks `hasRunForCycle` per session and in-flight cancellation tokens
/// keyed by request id, so `chat.cancel` can reach a specific in-flight
/// `chat.send`.
pub struct GatewayRuntimeState {
    memory_flush: Mutex<HashMap<String, MemoryFlushCycle>>,
    in_flight: Mutex<HashMap<String, CancellationToken>>,
}

impl GatewayRuntimeState {
    fn new() -> Self {
        Self { memory_flush: Mutex::new(HashMap::new()), in_flight: Mutex::new(HashMap::new()) }
    }

    pub async fn has_run_for_cycle(&self, session_id: &str) -> bool {
        self.memory_flush.lock().await.get(session_id).is_some_and(|c| c.has_run_for_cycle)
    }

    pub async fn mark_flushed(&self, session_id: &str) {
        self.memory_flush.lock().await.entry(session_id.to_string()).or_default().has_run_for_cycle = true;
    }

    /// Called once compaction has actually dropped messages from history —
    /// a new cycle begins, so the flush may run again (spec.md §4.6).
    pub async fn reset_cycle(&self, session_id: &str) {
        if let Some(cycle) = self.memory_flush.lock().await.get_mut(session_id) {
            cycle.has_run_for_cycle = false;
        }
    }

    pub async fn register_in_flight(&self, request_id: &str) -> CancellationToken {
        let token = CancellationToken::new();
        self.in_flight.lock().await.insert(request_id.to_string(), token.clone());
        token
    }

    pub async fn clear_in_flight(&self, request_id: &str) {
        self.in_flight.lock().await.remove(request_id);
    }

    pub async fn cancel(&self, request_id: &str) -> bool {
        match self.in_flight.lock().await.get(request_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

/// Everything a method handler or connection task needs, cloned cheaply via
/// `Arc` fields (the struct itself is shared behind one `Arc<AppState>`).
pub struct AppState {
    pub config: Config,
    pub history: Arc<HistoryManager>,
    pub tools: Arc<ToolRegistry>,
    pub channels: Arc<ChannelRegistry>,
    pub dock: Arc<Dock>,
    pub scheduler: Arc<Scheduler>,
    pub memory_db: Option<Arc<dyn MemoryDatabase>>,
    pub vector_index: Option<Arc<dyn VectorIndex>>,
    pub runtime: Arc<dyn AgentRuntime>,
    pub auth: Arc<GatewayAuth>,
    pub runtime_state: GatewayRuntimeState,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        history: Arc<HistoryManager>,
        tools: Arc<ToolRegistry>,
        channels: Arc<ChannelRegistry>,
        dock: Arc<Dock>,
        scheduler: Arc<Scheduler>,
        memory_db: Option<Arc<dyn MemoryDatabase>>,
        vector_index: Option<Arc<dyn VectorIndex>>,
        runtime: Arc<dyn AgentRuntime>,
        auth: Arc<GatewayAuth>,
    ) -> Self {
        Self {
            config,
            history,
            tools,
            channels,
            dock,
            scheduler,
            memory_db,
            vector_index,
            runtime,
            auth,
            runtime_state: GatewayRuntimeState::new(),
        }
    }
}
