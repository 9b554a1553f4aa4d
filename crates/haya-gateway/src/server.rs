// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! HTTP/WebSocket server bootstrap (spec.md §4.8, §6).
//!
//! Assembles the axum router, resolves the configured bind policy to a
//! concrete socket address, and — when TLS is enabled — terminates behind
//! `axum-server`'s rustls acceptor instead of a bare `axum::serve` listener.
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tracing::info;

/// Caps request bodies on the plain HTTP surface; WebSocket frames are not
/// subject to this (the connection's own bounded queue, §5, governs those).
const MAX_HTTP_BODY_BYTES: usize = 1_048_576;

use haya_config::{BindPolicy, Config};

use crate::auth::extract_credential;
use crate::connection::handle_connection;
use crate::security::{csrf_guard, security_headers};
use crate::state::AppState;

/// A running server instance. Callers in tests bind port 0 and read
/// [`ServerHandle::local_addr`] back to discover the OS-assigned port
/// (spec.md §8 scenario 5).
pub struct ServerHandle {
    pub local_addr: SocketAddr,
    join: tokio::task::JoinHandle<anyhow::Result<()>>,
}

impl ServerHandle {
    /// Blocks until the server task exits (normally only on a bind/TLS
    /// error, since the accept loop otherwise runs forever).
    pub async fn wait(self) -> anyhow::Result<()> {
        self.join.await.map_err(|e| anyhow::anyhow!("server task panicked: {e}"))?
    }

    pub fn abort(&self) {
        self.join.abort();
    }
}

/// Resolves `gateway.bind`/`gateway.port`/`gateway.bind_address` to a
/// concrete socket address (spec.md §4.8 Bind policy).
fn resolve_bind_addr(config: &Config) -> anyhow::Result<SocketAddr> {
    match config.gateway.bind {
        BindPolicy::Loopback => Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), config.gateway.port)),
        BindPolicy::Lan => Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), config.gateway.port)),
        BindPolicy::Custom => {
            let raw = config
                .gateway
                .bind_address
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("gateway.bind = custom requires gateway.bind_address"))?;
            raw.parse::<SocketAddr>().map_err(|e| anyhow::anyhow!("invalid gateway.bind_address {raw:?}: {e}"))
        }
    }
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    token: Option<String>,
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({"name": "haya", "status": "running"}))
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({"error": "Not found"})))
}

/// `GET <ws_path>` handler: authenticates via `Authorization: Bearer` header
/// or `?token=` query param, then upgrades and hands the socket to
/// [`handle_connection`]. An unauthenticated caller is still upgraded (a
/// browser WebSocket has no way to see a 401 before upgrading) but the
/// first thing it receives is a protocol-level UNAUTHORIZED error frame and
/// an immediate close, per spec.md §4.8. Repeated failures from the same
/// non-loopback IP are throttled before the upgrade even happens.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(query): Query<WsQuery>,
) -> Response {
    let authorization = headers.get(axum::http::header::AUTHORIZATION).and_then(|v| v.to_str().ok());
    let credential = extract_credential(authorization, query.token.as_deref());
    let authenticated = credential.is_some_and(|c| state.auth.verify(c));

    if !authenticated {
        if state.auth.note_failed_attempt(peer.ip()) {
            return (StatusCode::TOO_MANY_REQUESTS, [(axum::http::header::RETRY_AFTER, "60")], "Too Many Requests")
                .into_response();
        }
        return ws.on_upgrade(move |socket| handle_connection(socket, state, false));
    }

    ws.on_upgrade(move |socket| handle_connection(socket, state, true))
}

/// Builds the full axum [`Router`], with security headers and the CSRF
/// guard layered over every route (spec.md §6 CSP, §7 propagation policy).
pub fn build_router(state: Arc<AppState>, ws_path: &str) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/", get(root))
        .route(ws_path, get(ws_handler))
        .fallback(not_found)
        .layer(RequestBodyLimitLayer::new(MAX_HTTP_BODY_BYTES))
        .layer(axum::middleware::from_fn(csrf_guard))
        .layer(axum::middleware::from_fn(|req, next| security_headers(false, req, next)))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}

/// Loads a rustls server config from `cert_path`/`key_path`, generating a
/// self-signed ECDSA P-256 certificate at those paths first if they don't
/// exist yet (dev convenience — operators who set `tls.enabled` without
/// running a separate CA step still get a working HTTPS listener).
async fn load_or_generate_tls(cert_path: &str, key_path: &str) -> anyhow::Result<axum_server::tls_rustls::RustlsConfig> {
    if !Path::new(cert_path).exists() || !Path::new(key_path).exists() {
        info!(cert_path, key_path, "no TLS certificate found, generating a self-signed one");
        let generated = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])?;
        if let Some(parent) = Path::new(cert_path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(cert_path, generated.cert.pem())?;
        std::fs::write(key_path, generated.key_pair.serialize_pem())?;
    }
    axum_server::tls_rustls::RustlsConfig::from_pem_file(cert_path, key_path)
        .await
        .map_err(|e| anyhow::anyhow!("loading TLS cert/key: {e}"))
}

/// Binds and starts the gateway's HTTP/WebSocket server per the resolved
/// bind policy and TLS configuration. Returns immediately with the bound
/// address; the accept loop runs in a spawned task.
pub async fn serve(config: &Config, state: Arc<AppState>) -> anyhow::Result<ServerHandle> {
    let addr = resolve_bind_addr(config)?;
    let app = build_router(state, &config.gateway.ws_path);

    if config.gateway.tls.enabled {
        let cert_path = config.gateway.tls.cert_path.as_deref().expect("validated: tls.enabled requires certPath");
        let key_path = config.gateway.tls.key_path.as_deref().expect("validated: tls.enabled requires keyPath");
        let tls_config = load_or_generate_tls(cert_path, key_path).await?;

        let listener = std::net::TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, "gateway listening (TLS)");

        let join = tokio::spawn(async move {
            axum_server::from_tcp_rustls(listener, tls_config)
                .serve(app.into_make_service_with_connect_info::<SocketAddr>())
                .await
                .map_err(|e| anyhow::anyhow!("TLS server error: {e}"))
        });
        return Ok(ServerHandle { local_addr, join });
    }

    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    info!(%local_addr, "gateway listening");

    let join = tokio::spawn(async move {
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .map_err(|e| anyhow::anyhow!("server error: {e}"))
    });

    Ok(ServerHandle { local_addr, join })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg_with(bind: BindPolicy, port: u16, bind_address: Option<&str>) -> Config {
        let mut c = Config::default();
        c.gateway.bind = bind;
        c.gateway.port = port;
        c.gateway.bind_address = bind_address.map(|s| s.to_string());
        c
    }

    #[test]
    fn loopback_binds_127_0_0_1() {
        let addr = resolve_bind_addr(&cfg_with(BindPolicy::Loopback, 9999, None)).unwrap();
        assert_eq!(addr, SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 9999));
    }

    #[test]
    fn lan_binds_unspecified() {
        let addr = resolve_bind_addr(&cfg_with(BindPolicy::Lan, 9999, None)).unwrap();
        assert_eq!(addr, SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 9999));
    }

    #[test]
    fn custom_uses_explicit_bind_address() {
        let addr = resolve_bind_addr(&cfg_with(BindPolicy::Custom, 9999, Some("10.0.0.5:4444"))).unwrap();
        assert_eq!(addr, "10.0.0.5:4444".parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn custom_without_bind_address_is_an_error() {
        assert!(resolve_bind_addr(&cfg_with(BindPolicy::Custom, 9999, None)).is_err());
    }

    #[test]
    fn loopback_port_zero_is_allowed_for_tests() {
        let addr = resolve_bind_addr(&cfg_with(BindPolicy::Loopback, 0, None)).unwrap();
        assert_eq!(addr.port(), 0);
    }
}
