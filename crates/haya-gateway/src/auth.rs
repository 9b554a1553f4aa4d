// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Connection authentication (spec.md §4.8, §6 `gateway.auth`).
//!
//! The raw credential is never retained; only its SHA-256 digest is held in
//! memory, and comparison uses [`subtle::ConstantTimeEq`] so a timing oracle
//! can't leak which prefix byte was wrong.
use std::net::{IpAddr, Ipv4Addr};

use governor::clock::DefaultClock;
use governor::state::keyed::DashMapStateStore;
use governor::{Quota, RateLimiter};
use haya_config::{AuthConfig, AuthMode};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

type IpLimiter = RateLimiter<IpAddr, DashMapStateStore<IpAddr>, DefaultClock>;

/// Verifies inbound credentials against the configured auth mode, and
/// throttles repeated failures per source IP so a brute-force guesser can't
/// hammer the handshake endpoint (loopback callers are exempt — a process
/// with loopback access already has local access to the machine).
pub struct GatewayAuth {
    mode: AuthMode,
    secret_hash: [u8; 32],
    failed_attempts: IpLimiter,
}

impl GatewayAuth {
    /// Builds auth state from an already-[`AuthConfig::validate`]d config —
    /// the minimum-length checks are the config layer's job, not this one's.
    pub fn from_config(config: &AuthConfig) -> anyhow::Result<Self> {
        let secret = match config.mode {
            AuthMode::Token => {
                config.token.as_deref().ok_or_else(|| anyhow::anyhow!("gateway.auth.token is not set"))?
            }
            AuthMode::Password => {
                config.password.as_deref().ok_or_else(|| anyhow::anyhow!("gateway.auth.password is not set"))?
            }
        };
        Ok(Self { mode: config.mode, secret_hash: hash(secret), failed_attempts: new_limiter() })
    }

    pub fn mode(&self) -> AuthMode {
        self.mode
    }

    /// Constant-time comparison against the stored digest.
    pub fn verify(&self, credential: &str) -> bool {
        let provided_hash = hash(credential);
        provided_hash.ct_eq(&self.secret_hash).into()
    }

    /// Records and checks a failed auth attempt from `ip`. Returns `true`
    /// once the caller has exceeded the failure quota and should be locked
    /// out (spec.md §6 error taxonomy: RateLimit → drop + close).
    pub fn note_failed_attempt(&self, ip: IpAddr) -> bool {
        if is_loopback(ip) {
            return false;
        }
        self.failed_attempts.check_key(&ip).is_err()
    }
}

fn new_limiter() -> IpLimiter {
    // 5 failed attempts per minute, burst of 2 — matches the gateway's
    // non-WebSocket HTTP auth posture.
    let quota = Quota::per_minute(std::num::NonZeroU32::new(5).unwrap()).allow_burst(std::num::NonZeroU32::new(2).unwrap());
    RateLimiter::keyed(quota)
}

fn is_loopback(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4 == Ipv4Addr::LOCALHOST,
        IpAddr::V6(v6) => v6.is_loopback(),
    }
}

fn hash(secret: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.finalize().into()
}

/// Extracts a bearer credential from an `Authorization: Bearer <token>`
/// header value, or a `token` query parameter as a browser-WebSocket
/// fallback (browsers cannot set arbitrary headers on the WS handshake).
pub fn extract_credential<'a>(authorization_header: Option<&'a str>, query_token: Option<&'a str>) -> Option<&'a str> {
    if let Some(header) = authorization_header {
        if let Some(token) = header.strip_prefix("Bearer ") {
            return Some(token);
        }
    }
    query_token
}
