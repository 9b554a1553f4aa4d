// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Channel plugin registry and lifecycle dock (spec.md §4.5).
mod config;
mod dock;
mod plugin;
mod registry;

pub use config::{
    require_env, resolve_env, resolve_kakao_config, resolve_line_config, EnvError, KakaoConfig, LineConfig,
};
pub use dock::{ChannelState, Dock, DockError};
pub use plugin::{ChannelMessageHandler, ChannelPlugin, ChannelStatus, InboundMessage, OutboundMessage};
pub use registry::{ChannelRegistry, ChannelRegistryError};
