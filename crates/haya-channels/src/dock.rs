// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::plugin::{ChannelStatus, InboundMessage};
use crate::registry::ChannelRegistry;

#[derive(Debug, Error)]
pub enum DockError {
    #[error("channel not registered: {0}")]
    NotRegistered(String),
    #[error("channel {0} failed to start: {1}")]
    StartFailed(String, String),
}

/// Per-channel lifecycle state (spec.md §4.5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Starting,
    Running,
    Stopping,
    Failed(String),
}

impl ChannelState {
    fn as_str(&self) -> &'static str {
        match self {
            ChannelState::Disconnected => "disconnected",
            ChannelState::Starting => "starting",
            ChannelState::Running => "running",
            ChannelState::Stopping => "stopping",
            ChannelState::Failed(_) => "failed",
        }
    }
}

/// Drives every registered channel's start/stop state machine
/// (spec.md §4.5):
///
/// ```text
///   Disconnected ──start──► Starting ──ok──► Running ──stop──► Stopping ──ok──► Disconnected
///        ▲                      │                                  │
///        └──────────────────────┴── fail ───────────────────────────┘ (enters Failed; retryable)
/// ```
///
/// `startChannel` on a channel already `Running` is a no-op; on `Starting`
/// it awaits the in-flight attempt rather than racing a second one, via a
/// per-channel mutex.
pub struct Dock {
    registry: Arc<ChannelRegistry>,
    states: RwLock<HashMap<String, ChannelState>>,
    locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
}

impl Dock {
    pub fn new(registry: Arc<ChannelRegistry>) -> Self {
        Self { registry, states: RwLock::new(HashMap::new()), locks: RwLock::new(HashMap::new()) }
    }

    async fn lock_for(&self, id: &str) -> Arc<Mutex<()>> {
        if let Some(lock) = self.locks.read().await.get(id) {
            return lock.clone();
        }
        let mut locks = self.locks.write().await;
        locks.entry(id.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    async fn state_of(&self, id: &str) -> ChannelState {
        self.states.read().await.get(id).cloned().unwrap_or(ChannelState::Disconnected)
    }

    async fn set_state(&self, id: &str, state: ChannelState) {
        self.states.write().await.insert(id.to_string(), state);
    }

    /// Starts a channel. Idempotent on `Running`; serializes concurrent
    /// callers against the same channel so only one start attempt runs.
    pub async fn start_channel(&self, id: &str) -> Result<(), DockError> {
        let plugin = self.registry.get(id).ok_or_else(|| DockError::NotRegistered(id.to_string()))?;
        let lock = self.lock_for(id).await;
        let _guard = lock.lock().await;

        if self.state_of(id).await == ChannelState::Running {
            return Ok(());
        }

        self.set_state(id, ChannelState::Starting).await;
        let registry = self.registry.clone();
        let on_message = Arc::new(move |msg: InboundMessage| registry.dispatch(msg));

        match plugin.start(on_message).await {
            Ok(()) => {
                info!(channel = id, "channel started");
                self.set_state(id, ChannelState::Running).await;
                Ok(())
            }
            Err(e) => {
                let msg = e.to_string();
                warn!(channel = id, error = %msg, "channel failed to start");
                self.set_state(id, ChannelState::Failed(msg.clone())).await;
                Err(DockError::StartFailed(id.to_string(), msg))
            }
        }
    }

    /// Stops a channel. Idempotent on `Disconnected`.
    pub async fn stop_channel(&self, id: &str) -> Result<(), DockError> {
        let plugin = self.registry.get(id).ok_or_else(|| DockError::NotRegistered(id.to_string()))?;
        let lock = self.lock_for(id).await;
        let _guard = lock.lock().await;

        if self.state_of(id).await == ChannelState::Disconnected {
            return Ok(());
        }

        self.set_state(id, ChannelState::Stopping).await;
        match plugin.stop().await {
            Ok(()) => {
                self.set_state(id, ChannelState::Disconnected).await;
                Ok(())
            }
            Err(e) => {
                let msg = e.to_string();
                self.set_state(id, ChannelState::Failed(msg.clone())).await;
                Err(DockError::StartFailed(id.to_string(), msg))
            }
        }
    }

    /// Snapshot for every registered channel (spec.md §4.5).
    pub async fn status(&self) -> Vec<ChannelStatus> {
        let mut out = Vec::new();
        for id in self.registry.list() {
            let Some(plugin) = self.registry.get(&id) else { continue };
            let state = self.state_of(&id).await;
            let error = match &state {
                ChannelState::Failed(msg) => Some(msg.clone()),
                _ => None,
            };
            out.push(ChannelStatus {
                id: id.clone(),
                name: plugin.display_name().to_string(),
                state: state.as_str().to_string(),
                connected: state == ChannelState::Running && plugin.connected(),
                error,
            });
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::{ChannelPlugin, OutboundMessage};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct ScriptedPlugin {
        id: &'static str,
        fail_start: AtomicBool,
        start_calls: AtomicUsize,
        stop_calls: AtomicUsize,
    }

    #[async_trait]
    impl ChannelPlugin for ScriptedPlugin {
        fn id(&self) -> &str {
            self.id
        }
        fn display_name(&self) -> &str {
            self.id
        }
        async fn start(&self, _on_message: Arc<dyn Fn(InboundMessage) + Send + Sync>) -> anyhow::Result<()> {
            self.start_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_start.load(Ordering::SeqCst) {
                anyhow::bail!("connection refused");
            }
            Ok(())
        }
        async fn stop(&self) -> anyhow::Result<()> {
            self.stop_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn send(&self, _message: OutboundMessage) -> anyhow::Result<()> {
            Ok(())
        }
        fn connected(&self) -> bool {
            true
        }
    }

    fn plugin(id: &'static str, fail: bool) -> Arc<ScriptedPlugin> {
        Arc::new(ScriptedPlugin {
            id,
            fail_start: AtomicBool::new(fail),
            start_calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn start_unregistered_channel_errors() {
        let registry = Arc::new(ChannelRegistry::new());
        let dock = Dock::new(registry);
        assert!(dock.start_channel("nope").await.is_err());
    }

    #[tokio::test]
    async fn start_then_running_then_idempotent() {
        let registry = Arc::new(ChannelRegistry::new());
        let p = plugin("discord", false);
        registry.register(p.clone()).unwrap();
        let dock = Dock::new(registry);

        dock.start_channel("discord").await.unwrap();
        dock.start_channel("discord").await.unwrap();
        assert_eq!(p.start_calls.load(Ordering::SeqCst), 1);

        let status = dock.status().await;
        assert_eq!(status[0].state, "running");
        assert!(status[0].connected);
    }

    #[tokio::test]
    async fn failed_start_transitions_to_failed_with_error() {
        let registry = Arc::new(ChannelRegistry::new());
        let p = plugin("discord", true);
        registry.register(p).unwrap();
        let dock = Dock::new(registry);

        assert!(dock.start_channel("discord").await.is_err());
        let status = dock.status().await;
        assert_eq!(status[0].state, "failed");
        assert_eq!(status[0].error.as_deref(), Some("connection refused"));
        assert!(!status[0].connected);
    }

    #[tokio::test]
    async fn stop_is_idempotent_on_disconnected() {
        let registry = Arc::new(ChannelRegistry::new());
        let p = plugin("discord", false);
        registry.register(p.clone()).unwrap();
        let dock = Dock::new(registry);

        dock.stop_channel("discord").await.unwrap();
        assert_eq!(p.stop_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn start_then_stop_returns_to_disconnected() {
        let registry = Arc::new(ChannelRegistry::new());
        let p = plugin("discord", false);
        registry.register(p).unwrap();
        let dock = Dock::new(registry);

        dock.start_channel("discord").await.unwrap();
        dock.stop_channel("discord").await.unwrap();
        let status = dock.status().await;
        assert_eq!(status[0].state, "disconnected");
    }

    #[tokio::test]
    async fn failed_channel_is_retryable() {
        let registry = Arc::new(ChannelRegistry::new());
        let p = plugin("discord", true);
        registry.register(p.clone()).unwrap();
        let dock = Dock::new(registry);

        assert!(dock.start_channel("discord").await.is_err());
        p.fail_start.store(false, Ordering::SeqCst);
        dock.start_channel("discord").await.unwrap();
        let status = dock.status().await;
        assert_eq!(status[0].state, "running");
    }
}
