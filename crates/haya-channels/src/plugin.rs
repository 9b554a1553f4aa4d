// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A message received from a channel, bound for the gateway's session
/// history (spec.md §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub channel_id: String,
    pub sender_id: String,
    pub text: String,
}

/// A message the gateway asks a channel plugin to deliver outbound.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub recipient_id: String,
    pub text: String,
}

/// Snapshot of a single channel's lifecycle state, as reported by [`crate::Dock::status`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelStatus {
    pub id: String,
    pub name: String,
    pub state: String,
    pub connected: bool,
    pub error: Option<String>,
}

/// Receives every inbound message from every registered channel. Implementations
/// must be safe to call concurrently (spec.md §5: "invoked from each plugin's
/// thread/task") and are responsible for serializing into the session they target.
pub type ChannelMessageHandler = std::sync::Arc<dyn Fn(InboundMessage) + Send + Sync>;

/// A vendor-specific messaging transport (spec.md §4.5, §9 "duck-typed
/// plugins → explicit capability set"). Implementations own their own
/// connection machinery; the [`crate::Dock`] only ever calls `start`/`stop`
/// and relies on `send`/`status` afterward.
#[async_trait]
pub trait ChannelPlugin: Send + Sync {
    /// Stable, unique identifier (e.g. `"discord"`, `"slack"`).
    fn id(&self) -> &str;

    fn display_name(&self) -> &str;

    /// Begin connecting. Must return once the transport either is ready to
    /// accept traffic or has definitively failed; it must not block forever.
    async fn start(&self, on_message: std::sync::Arc<dyn Fn(InboundMessage) + Send + Sync>) -> anyhow::Result<()>;

    /// Disconnect. Idempotent: calling `stop` on an already-stopped plugin
    /// succeeds without error.
    async fn stop(&self) -> anyhow::Result<()>;

    async fn send(&self, message: OutboundMessage) -> anyhow::Result<()>;

    /// Best-effort connectivity snapshot, independent of the Dock's own
    /// state machine (a plugin may report `connected: false` transiently
    /// even while the Dock still considers it Running).
    fn connected(&self) -> bool;
}
