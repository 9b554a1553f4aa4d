// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Per-connection reader/writer tasks and the bounded outbound queue
//! (spec.md §5: "Each WebSocket connection owns one inbound reader task and
//! one outbound writer task, communicating through a bounded queue").
use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::stream::StreamExt;
use futures::SinkExt;
use tracing::debug;

use crate::dispatch::dispatch;
use crate::protocol::{build_error_response, parse_request, serialize_frame, OutgoingFrame, RpcError, RATE_LIMITED};
use crate::state::AppState;

/// Queue depth at which a slow client is dropped rather than allowed to
/// backlog frames indefinitely (spec.md §5, N=1024).
pub const OUTBOUND_QUEUE_CAPACITY: usize = 1024;

/// Drives one WebSocket connection end to end: spawns the writer task, reads
/// frames, dispatches every request, and tears both tasks down on
/// disconnect. Authentication (spec.md §4.8) happens at the HTTP upgrade,
/// before this function is ever called — `authenticated` is the outcome of
/// that check, and an unauthenticated connection is closed immediately
/// without processing any frame.
pub async fn handle_connection(socket: WebSocket, state: Arc<AppState>, authenticated: bool) {
    let (mut ws_sink, mut ws_stream) = socket.split();

    if !authenticated {
        let frame = build_error_response(String::new(), RpcError::new(crate::protocol::UNAUTHORIZED, "authentication required"));
        let _ = ws_sink.send(WsMessage::Text(serialize_frame(&frame))).await;
        let _ = ws_sink.close().await;
        return;
    }

    let (tx, mut rx) = tokio::sync::mpsc::channel::<OutgoingFrame>(OUTBOUND_QUEUE_CAPACITY);
    // A single-slot priority channel for the RATE_LIMITED notice: it must
    // reach the client even when the main queue is already full of backlog,
    // so it never competes for the same slots it's reporting as exhausted.
    let (close_tx, mut close_rx) = tokio::sync::mpsc::channel::<OutgoingFrame>(1);

    let writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                frame = close_rx.recv() => {
                    if let Some(frame) = frame {
                        let _ = ws_sink.send(WsMessage::Text(serialize_frame(&frame))).await;
                    }
                    break;
                }
                frame = rx.recv() => {
                    match frame {
                        Some(frame) => {
                            if ws_sink.send(WsMessage::Text(serialize_frame(&frame))).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        }
        let _ = ws_sink.close().await;
    });

    let emit: Arc<dyn Fn(OutgoingFrame) + Send + Sync> = {
        let tx = tx.clone();
        let close_tx = close_tx.clone();
        Arc::new(move |frame: OutgoingFrame| {
            // try_send enforces the backpressure policy: a client that can't
            // keep its queue drained gets rate-limited and dropped rather
            // than letting the writer task's backlog grow unbounded. The
            // notice itself goes out over `close_tx` so it can't be starved
            // by the very backlog it's reporting.
            if tx.try_send(frame).is_err() {
                let _ = close_tx.try_send(build_error_response(
                    String::new(),
                    RpcError::new(RATE_LIMITED, "client is too slow, disconnecting"),
                ));
            }
        })
    };

    loop {
        let ws_msg = tokio::select! {
            // `close_tx.closed()` resolves once the writer task has dropped
            // `close_rx` (it does so right after shutting the socket down),
            // so the reader stops dispatching against a connection that's
            // already gone instead of waiting on its next `next()` poll.
            _ = close_tx.closed() => break,
            msg = ws_stream.next() => msg,
        };
        let ws_msg = match ws_msg {
            Some(Ok(ws_msg)) => ws_msg,
            _ => break,
        };
        let text = match ws_msg {
            WsMessage::Text(text) => text,
            WsMessage::Close(_) => break,
            _ => continue,
        };

        let request = match parse_request(&text) {
            Ok(req) => req,
            Err(error) => {
                let _ = tx.send(build_error_response(String::new(), error)).await;
                continue;
            }
        };

        let state = state.clone();
        let emit = emit.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let response = dispatch(request.id, &request.method, request.params, &state, emit).await;
            let _ = tx.send(response).await;
        });
    }

    debug!("connection closed");
    drop(tx);
    drop(close_tx);
    let _ = writer.await;
}
