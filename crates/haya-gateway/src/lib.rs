// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The Haya gateway: wire protocol, connection handling, method dispatch,
//! and the HTTP/WebSocket server that ties them together (spec.md §4.8).
mod auth;
mod connection;
mod dispatch;
mod protocol;
mod security;
mod server;
mod state;

pub use auth::{extract_credential, GatewayAuth};
pub use connection::{handle_connection, OUTBOUND_QUEUE_CAPACITY};
pub use dispatch::dispatch;
pub use protocol::{
    build_error_response, build_event, build_response, parse_request, serialize_frame, OutgoingFrame, Request,
    RpcError, FORBIDDEN, INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR,
    RATE_LIMITED, UNAUTHORIZED,
};
pub use server::{build_router, serve, ServerHandle};
pub use state::{AppState, GatewayRuntimeState};
