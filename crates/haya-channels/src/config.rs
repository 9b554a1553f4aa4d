// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Pure functions resolving per-channel configuration and environment-backed
//! secrets. Channel configuration resolution is otherwise unspecified by
//! spec.md beyond its literal examples (SPEC_FULL.md §4.5 supplement); these
//! mirror the style of [`haya_config::schema`]'s validated defaults.
use std::collections::HashMap;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("environment variable {0} not set")]
pub struct EnvError(pub String);

/// Fails hard if `name` is unset or set to the empty string (spec.md §6,
/// §8 scenario 7).
pub fn require_env(name: &str) -> Result<String, EnvError> {
    match std::env::var(name) {
        Ok(v) if !v.is_empty() => Ok(v),
        _ => Err(EnvError(format!("{name} not set"))),
    }
}

/// Returns `None` for unset or empty; never errors (spec.md §6).
pub fn resolve_env(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(v) if !v.is_empty() => Some(v),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KakaoConfig {
    pub port: u16,
    pub path: String,
    pub bot_name: String,
    pub max_payload_bytes: usize,
}

impl Default for KakaoConfig {
    fn default() -> Self {
        Self { port: 9091, path: "/kakao/skill".to_string(), bot_name: "kakao-bot".to_string(), max_payload_bytes: 1_048_576 }
    }
}

/// Resolves the KakaoTalk skill-server channel config from a partially
/// specified input map. Unparseable or missing fields fall back to their
/// default (spec.md §8 scenario 3: `{port:"not-a-number"}` resolves to all
/// defaults, the bad port included).
pub fn resolve_kakao_config(input: &HashMap<String, String>) -> KakaoConfig {
    let defaults = KakaoConfig::default();
    KakaoConfig {
        port: input.get("port").and_then(|v| v.parse().ok()).unwrap_or(defaults.port),
        path: input.get("path").cloned().unwrap_or(defaults.path),
        bot_name: input.get("botName").cloned().unwrap_or(defaults.bot_name),
        max_payload_bytes: input
            .get("maxPayloadBytes")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_payload_bytes),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineConfig {
    pub channel_access_token_env_var: String,
    pub channel_secret_env_var: String,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            channel_access_token_env_var: "LINE_CHANNEL_ACCESS_TOKEN".to_string(),
            channel_secret_env_var: "LINE_CHANNEL_SECRET".to_string(),
        }
    }
}

/// Resolves the LINE messaging-API channel config (spec.md §8 scenario 4:
/// an explicit `channelAccessTokenEnvVar` is kept, `channelSecretEnvVar`
/// falls back to its default).
pub fn resolve_line_config(input: &HashMap<String, String>) -> LineConfig {
    let defaults = LineConfig::default();
    LineConfig {
        channel_access_token_env_var: input
            .get("channelAccessTokenEnvVar")
            .cloned()
            .unwrap_or(defaults.channel_access_token_env_var),
        channel_secret_env_var: input
            .get("channelSecretEnvVar")
            .cloned()
            .unwrap_or(defaults.channel_secret_env_var),
    }
}
