// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Serde default helper — returns `true`.
///
/// `#[serde(default)]` on a `bool` always falls back to `bool::default()`
/// (i.e. `false`), so fields that should default on need a named function.
fn default_true() -> bool {
    true
}

fn default_gateway_port() -> u16 {
    18789
}

fn default_max_history_messages() -> usize {
    100
}

fn default_ws_path() -> String {
    "/ws".into()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    /// Scheduled jobs run by the cron subsystem. Order is insertion order;
    /// duplicate `name`s are rejected at validation time.
    #[serde(default)]
    pub cron: Vec<CronJobConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Ordered list of channel plugin identifiers to start at boot.
    #[serde(default)]
    pub plugins: Vec<String>,
}

impl Config {
    /// Schema-level validation beyond what serde's types already enforce.
    /// Config errors are startup-fatal: callers must propagate this, never
    /// fall back to defaults on failure.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.gateway.validate()?;
        let mut seen = std::collections::HashSet::new();
        for job in &self.cron {
            if !seen.insert(job.name.clone()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate cron job name: {}",
                    job.name
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ─── gateway.* ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    #[serde(default)]
    pub bind: BindPolicy,
    /// Explicit interface address, only consulted when `bind = custom`.
    pub bind_address: Option<String>,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub tls: TlsConfig,
    /// CIDR ranges trusted to set forwarding headers when `bind = lan`.
    #[serde(default)]
    pub trusted_proxies: Vec<String>,
    #[serde(default = "default_ws_path")]
    pub ws_path: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: BindPolicy::default(),
            bind_address: None,
            auth: AuthConfig::default(),
            tls: TlsConfig::default(),
            trusted_proxies: Vec::new(),
            ws_path: default_ws_path(),
        }
    }
}

impl GatewayConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            // Port 0 means "pick any free port" and is explicitly allowed for
            // tests (spec.md §4.8). Nothing else to validate there.
        }
        if matches!(self.bind, BindPolicy::Custom) && self.bind_address.is_none() {
            return Err(ConfigError::Invalid(
                "gateway.bind = custom requires gateway.bind_address".into(),
            ));
        }
        self.auth.validate()?;
        if self.tls.enabled && (self.tls.cert_path.is_none() || self.tls.key_path.is_none()) {
            return Err(ConfigError::Invalid(
                "gateway.tls.enabled requires certPath and keyPath".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindPolicy {
    #[default]
    Loopback,
    Lan,
    Custom,
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub mode: AuthMode,
    pub token: Option<String>,
    pub password: Option<String>,
}

/// Redacts `token`/`password` so a stray `tracing::debug!(?config, ...)` or
/// panic message never puts a credential into a log file.
impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("mode", &self.mode)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl AuthConfig {
    const MIN_TOKEN_LEN: usize = 32;
    const MIN_PASSWORD_LEN: usize = 16;

    fn validate(&self) -> Result<(), ConfigError> {
        match self.mode {
            AuthMode::Token => {
                let len = self.token.as_deref().unwrap_or("").len();
                if len < Self::MIN_TOKEN_LEN {
                    return Err(ConfigError::Invalid(format!(
                        "gateway.auth.token must be at least {} characters",
                        Self::MIN_TOKEN_LEN
                    )));
                }
            }
            AuthMode::Password => {
                let len = self.password.as_deref().unwrap_or("").len();
                if len < Self::MIN_PASSWORD_LEN {
                    return Err(ConfigError::Invalid(format!(
                        "gateway.auth.password must be at least {} characters",
                        Self::MIN_PASSWORD_LEN
                    )));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    #[default]
    Token,
    Password,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TlsConfig {
    #[serde(default)]
    pub enabled: bool,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

// ─── agent.* ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub default_model: Option<String>,
    pub default_provider_api_key_env_var: Option<String>,
    pub system_prompt: Option<String>,
    /// Messages kept before token-budget compaction even considers trimming
    /// further (spec §4.2 step 3).
    #[serde(default = "default_max_history_messages")]
    pub max_history_messages: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            default_model: None,
            default_provider_api_key_env_var: None,
            system_prompt: None,
            max_history_messages: default_max_history_messages(),
        }
    }
}

// ─── memory.* ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub db_path: Option<String>,
    pub embedding_provider_api_key_env_var: Option<String>,
}

// ─── cron[] ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronJobConfig {
    pub name: String,
    /// Standard 5- or 6-field cron expression, parsed by the `cron` crate.
    pub schedule: String,
    /// Opaque action identifier dispatched by the scheduler; interpretation
    /// is the host application's responsibility (§1: out of scope here).
    pub action: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

// ─── logging.* ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Silly,
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    /// Map onto a `tracing`/`EnvFilter` directive. `silly` and `fatal` have no
    /// direct tracing equivalent; `silly` collapses to `trace`, `fatal` to
    /// `error` (tracing has no level above error).
    pub fn as_filter_directive(self) -> &'static str {
        match self {
            LogLevel::Silly => "trace",
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Fatal => "error",
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
