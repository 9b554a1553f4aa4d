// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use thiserror::Error;

use crate::plugin::{ChannelMessageHandler, ChannelPlugin, InboundMessage};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChannelRegistryError {
    #[error("channel already registered: {0}")]
    DuplicateId(String),
}

/// Stores `{id -> ChannelPlugin}` and fans every inbound message out to a
/// single registered handler (spec.md §4.5). Read-mostly after startup.
pub struct ChannelRegistry {
    channels: RwLock<HashMap<String, Arc<dyn ChannelPlugin>>>,
    handler: RwLock<Option<ChannelMessageHandler>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self { channels: RwLock::new(HashMap::new()), handler: RwLock::new(None) }
    }

    pub fn register(&self, plugin: Arc<dyn ChannelPlugin>) -> Result<(), ChannelRegistryError> {
        let mut channels = self.channels.write().expect("channel registry lock poisoned");
        if channels.contains_key(plugin.id()) {
            return Err(ChannelRegistryError::DuplicateId(plugin.id().to_string()));
        }
        channels.insert(plugin.id().to_string(), plugin);
        Ok(())
    }

    pub fn unregister(&self, id: &str) -> bool {
        self.channels.write().expect("channel registry lock poisoned").remove(id).is_some()
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn ChannelPlugin>> {
        self.channels.read().expect("channel registry lock poisoned").get(id).cloned()
    }

    pub fn has(&self, id: &str) -> bool {
        self.channels.read().expect("channel registry lock poisoned").contains_key(id)
    }

    pub fn list(&self) -> Vec<String> {
        let mut ids: Vec<String> =
            self.channels.read().expect("channel registry lock poisoned").keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn size(&self) -> usize {
        self.channels.read().expect("channel registry lock poisoned").len()
    }

    /// Registers the single callback invoked for every inbound message from
    /// every channel. Replaces any previously registered handler.
    pub fn on_message<F>(&self, handler: F)
    where
        F: Fn(InboundMessage) + Send + Sync + 'static,
    {
        *self.handler.write().expect("handler lock poisoned") = Some(Arc::new(handler));
    }

    /// Dispatches a message to the registered handler, if any. Plugins call
    /// this (indirectly, via the closure handed to `start`) from their own
    /// task; it must tolerate concurrent calls from multiple channels.
    pub fn dispatch(&self, message: InboundMessage) {
        if let Some(handler) = self.handler.read().expect("handler lock poisoned").clone() {
            handler(message);
        }
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::OutboundMessage;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NoopPlugin(&'static str);

    #[async_trait]
    impl ChannelPlugin for NoopPlugin {
        fn id(&self) -> &str {
            self.0
        }
        fn display_name(&self) -> &str {
            self.0
        }
        async fn start(&self, _on_message: Arc<dyn Fn(InboundMessage) + Send + Sync>) -> anyhow::Result<()> {
            Ok(())
        }
        async fn stop(&self) -> anyhow::Result<()> {
            Ok(())
        }
        async fn send(&self, _message: OutboundMessage) -> anyhow::Result<()> {
            Ok(())
        }
        fn connected(&self) -> bool {
            true
        }
    }

    #[test]
    fn register_then_get_returns_same_plugin() {
        let reg = ChannelRegistry::new();
        reg.register(Arc::new(NoopPlugin("discord"))).unwrap();
        assert!(reg.get("discord").is_some());
    }

    #[test]
    fn duplicate_register_is_hard_error() {
        let reg = ChannelRegistry::new();
        reg.register(Arc::new(NoopPlugin("discord"))).unwrap();
        let err = reg.register(Arc::new(NoopPlugin("discord"))).unwrap_err();
        assert_eq!(err, ChannelRegistryError::DuplicateId("discord".into()));
    }

    #[test]
    fn unregister_then_has_is_false() {
        let reg = ChannelRegistry::new();
        reg.register(Arc::new(NoopPlugin("slack"))).unwrap();
        assert!(reg.unregister("slack"));
        assert!(!reg.has("slack"));
    }

    #[test]
    fn list_is_sorted_and_size_matches() {
        let reg = ChannelRegistry::new();
        reg.register(Arc::new(NoopPlugin("slack"))).unwrap();
        reg.register(Arc::new(NoopPlugin("discord"))).unwrap();
        assert_eq!(reg.list(), vec!["discord".to_string(), "slack".to_string()]);
        assert_eq!(reg.size(), 2);
    }

    #[test]
    fn dispatch_invokes_registered_handler() {
        let reg = ChannelRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        reg.on_message(move |_msg| {
            count2.fetch_add(1, Ordering::SeqCst);
        });
        reg.dispatch(InboundMessage {
            channel_id: "discord".into(),
            sender_id: "u1".into(),
            text: "hi".into(),
        });
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dispatch_without_handler_is_a_noop() {
        let reg = ChannelRegistry::new();
        reg.dispatch(InboundMessage { channel_id: "x".into(), sender_id: "u".into(), text: "hi".into() });
    }
}
