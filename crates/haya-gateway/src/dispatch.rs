// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Method dispatch table (spec.md §4.8, §9 "dynamic JSON params → typed
//! variants").
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{SystemTime, UNIX_EPOCH};

use haya_core::{GetHistoryOptions, SimpleTokenCounter, TokenCounter};
use haya_memory::{build_memory_flush_messages, should_run_memory_flush, MemoryFlushCheck, MemoryFlushPrompts};
use haya_model::{ChatEvent, ChatRequest, Message};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::protocol::{
    build_error_response, build_event, build_response, OutgoingFrame, RpcError, INTERNAL_ERROR, INVALID_PARAMS,
    METHOD_NOT_FOUND,
};
use crate::state::AppState;

/// The gateway has no direct knowledge of a model's real context window —
/// `AgentConfig` doesn't carry one (spec.md §6 only lists `maxHistoryMessages`)
/// — so the memory-flush trigger and compaction budget use fixed, documented
/// defaults rather than a fabricated config key.
const DEFAULT_CONTEXT_WINDOW_TOKENS: i64 = 128_000;
const DEFAULT_SOFT_THRESHOLD_TOKENS: i64 = 2_000;
const RESERVE_FOR_RESPONSE_TOKENS: i64 = 4_096;

fn now_ms() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
}

fn parse_params<T: DeserializeOwned>(params: &Value) -> Result<T, RpcError> {
    serde_json::from_value(params.clone()).map_err(|e| RpcError::new(INVALID_PARAMS, format!("invalid params: {e}")))
}

/// Entry point: routes one parsed [`crate::protocol::Request`] to its
/// handler, emitting any intermediate events (e.g. `chat.delta`) through
/// `emit` as they happen and returning the final response frame.
pub async fn dispatch(
    request_id: String,
    method: &str,
    params: Value,
    state: &Arc<AppState>,
    emit: Arc<dyn Fn(OutgoingFrame) + Send + Sync>,
) -> OutgoingFrame {
    let result = match method {
        "chat.send" => chat_send(&request_id, params, state, emit).await,
        "chat.cancel" => chat_cancel(params, state).await,
        "channels.list" => channels_list(state).await,
        "channels.start" => channels_start(params, state).await,
        "channels.stop" => channels_stop(params, state).await,
        "cron.list" => cron_list(state).await,
        "cron.status" => cron_status(state).await,
        "gateway.status" => gateway_status(state).await,
        "gateway.config" => gateway_config(state).await,
        other => Err(RpcError::new(METHOD_NOT_FOUND, format!("unknown method: {other}"))),
    };

    match result {
        Ok(value) => build_response(request_id, value),
        Err(error) => build_error_response(request_id, error),
    }
}

#[derive(Debug, Deserialize)]
struct ChatSendParams {
    #[serde(rename = "sessionId")]
    session_id: String,
    message: String,
    model: Option<String>,
    #[serde(rename = "systemPrompt")]
    system_prompt: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatSendResult {
    #[serde(rename = "sessionId")]
    session_id: String,
    message: String,
    usage: haya_model::Usage,
}

async fn chat_send(
    request_id: &str,
    params: Value,
    state: &Arc<AppState>,
    emit: Arc<dyn Fn(OutgoingFrame) + Send + Sync>,
) -> Result<Value, RpcError> {
    let params: ChatSendParams = parse_params(&params)?;
    if params.session_id.trim().is_empty() {
        return Err(RpcError::new(INVALID_PARAMS, "sessionId must not be empty"));
    }
    if params.message.trim().is_empty() {
        return Err(RpcError::new(INVALID_PARAMS, "message must not be empty"));
    }

    let counter = SimpleTokenCounter;
    let system_prompt_tokens = params.system_prompt.as_deref().map(|s| counter.count(s)).unwrap_or(0);

    let raw_history = state
        .history
        .get_history(&params.session_id, &GetHistoryOptions { context_pruning: Some(false), ..Default::default() })
        .await;
    let total_tokens = counter.count_messages(&raw_history) as i64;
    let has_run_for_cycle = state.runtime_state.has_run_for_cycle(&params.session_id).await;

    let should_flush = should_run_memory_flush(MemoryFlushCheck {
        total_tokens,
        context_window_tokens: DEFAULT_CONTEXT_WINDOW_TOKENS,
        reserve_tokens: RESERVE_FOR_RESPONSE_TOKENS,
        soft_threshold_tokens: DEFAULT_SOFT_THRESHOLD_TOKENS,
        has_run_for_cycle,
    });

    if should_flush {
        info!(session = %params.session_id, "running pre-compaction memory flush turn");
        let flush_messages = build_memory_flush_messages(&MemoryFlushPrompts::default());
        let flush_request = ChatRequest {
            session_id: params.session_id.clone(),
            message: String::new(),
            model: params.model.clone(),
            system_prompt: None,
        };
        if let Err(e) = state.runtime.chat(flush_request, flush_messages, Box::new(|_| {})).await {
            warn!(session = %params.session_id, error = %e, "memory flush turn failed, continuing anyway");
        }
        state.runtime_state.mark_flushed(&params.session_id).await;
    }

    let history = state
        .history
        .get_history(
            &params.session_id,
            &GetHistoryOptions {
                max_tokens: Some(DEFAULT_CONTEXT_WINDOW_TOKENS as usize),
                system_prompt_tokens,
                context_pruning: Some(true),
                summarizer: None,
            },
        )
        .await;

    // Compaction actually dropped head-of-history messages: a new cycle
    // begins, so the flush trigger may fire again (spec.md §4.6).
    if history.len() < raw_history.len() {
        state.runtime_state.reset_cycle(&params.session_id).await;
    }

    let cancel_token = state.runtime_state.register_in_flight(request_id).await;
    let reply = Arc::new(StdMutex::new(String::new()));
    let reply_clone = reply.clone();
    let session_id_for_events = params.session_id.clone();
    let emit_for_events = emit.clone();
    let on_chunk = move |event: ChatEvent| match event {
        ChatEvent::Delta(text) => {
            reply_clone.lock().unwrap().push_str(&text);
            emit_for_events(build_event(
                "chat.delta",
                json!({"sessionId": session_id_for_events, "delta": text, "done": false}),
            ));
        }
        ChatEvent::Done(_) => {
            emit_for_events(build_event("chat.delta", json!({"sessionId": session_id_for_events, "delta": "", "done": true})));
        }
        ChatEvent::Error(message) => {
            emit_for_events(build_event(
                "chat.delta",
                json!({"sessionId": session_id_for_events, "delta": "", "done": true, "error": message}),
            ));
        }
    };

    let chat_request = ChatRequest {
        session_id: params.session_id.clone(),
        message: params.message.clone(),
        model: params.model.clone(),
        system_prompt: params.system_prompt.clone(),
    };

    let outcome = tokio::select! {
        _ = cancel_token.cancelled() => {
            state.runtime_state.clear_in_flight(request_id).await;
            emit(build_event(
                "chat.delta",
                json!({"sessionId": params.session_id, "delta": "", "done": true, "error": "cancelled"}),
            ));
            return Err(RpcError::new(INTERNAL_ERROR, "cancelled"));
        }
        result = state.runtime.chat(chat_request, history, Box::new(on_chunk)) => result,
    };
    state.runtime_state.clear_in_flight(request_id).await;

    let usage = outcome.map_err(|e| RpcError::new(INTERNAL_ERROR, format!("provider error: {e}")))?;

    let assembled_reply = reply.lock().unwrap().clone();
    state.history.add_message(&params.session_id, Message::user(params.message.clone(), now_ms())).await;
    state.history.add_message(&params.session_id, Message::assistant(assembled_reply.clone(), now_ms())).await;

    let result = ChatSendResult { session_id: params.session_id, message: assembled_reply, usage };
    serde_json::to_value(result).map_err(|e| RpcError::new(INTERNAL_ERROR, format!("failed to encode result: {e}")))
}

#[derive(Debug, Deserialize)]
struct ChatCancelParams {
    #[serde(rename = "requestId")]
    request_id: String,
}

async fn chat_cancel(params: Value, state: &Arc<AppState>) -> Result<Value, RpcError> {
    let params: ChatCancelParams = parse_params(&params)?;
    let cancelled = state.runtime_state.cancel(&params.request_id).await;
    Ok(json!({"cancelled": cancelled}))
}

async fn channels_list(state: &Arc<AppState>) -> Result<Value, RpcError> {
    Ok(json!({"channels": state.dock.status().await}))
}

#[derive(Debug, Deserialize)]
struct ChannelIdParams {
    id: String,
}

async fn channels_start(params: Value, state: &Arc<AppState>) -> Result<Value, RpcError> {
    let params: ChannelIdParams = parse_params(&params)?;
    state.dock.start_channel(&params.id).await.map_err(|e| RpcError::new(INTERNAL_ERROR, e.to_string()))?;
    Ok(json!({"id": params.id, "started": true}))
}

async fn channels_stop(params: Value, state: &Arc<AppState>) -> Result<Value, RpcError> {
    let params: ChannelIdParams = parse_params(&params)?;
    state.dock.stop_channel(&params.id).await.map_err(|e| RpcError::new(INTERNAL_ERROR, e.to_string()))?;
    Ok(json!({"id": params.id, "stopped": true}))
}

async fn cron_list(state: &Arc<AppState>) -> Result<Value, RpcError> {
    Ok(json!({"jobs": state.scheduler.list().await}))
}

async fn cron_status(state: &Arc<AppState>) -> Result<Value, RpcError> {
    Ok(json!({"jobs": state.scheduler.status().await}))
}

async fn gateway_status(state: &Arc<AppState>) -> Result<Value, RpcError> {
    Ok(json!({
        "name": "haya",
        "status": "running",
        "channels": state.dock.status().await,
        "cron": state.scheduler.status().await,
    }))
}

/// Returns a view of the active config with secrets stripped (spec.md §7:
/// "Secrets in any logged payload must be redacted before emission" — the
/// same rule applies to anything handed back to a client).
async fn gateway_config(state: &Arc<AppState>) -> Result<Value, RpcError> {
    let cfg = &state.config;
    Ok(json!({
        "gateway": {
            "port": cfg.gateway.port,
            "bind": format!("{:?}", cfg.gateway.bind).to_lowercase(),
            "wsPath": cfg.gateway.ws_path,
            "authMode": format!("{:?}", cfg.gateway.auth.mode).to_lowercase(),
            "tlsEnabled": cfg.gateway.tls.enabled,
        },
        "agent": {
            "defaultModel": cfg.agent.default_model,
            "maxHistoryMessages": cfg.agent.max_history_messages,
        },
        "memory": {
            "enabled": cfg.memory.enabled,
        },
        "plugins": cfg.plugins,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use haya_channels::{ChannelMessageHandler, ChannelPlugin, ChannelRegistry, Dock, InboundMessage, OutboundMessage};
    use haya_config::Config;
    use haya_core::HistoryManager;
    use haya_model::Usage;
    use haya_scheduler::Scheduler;

    use crate::auth::GatewayAuth;

    struct EchoRuntime;

    #[async_trait]
    impl haya_model::AgentRuntime for EchoRuntime {
        async fn chat(
            &self,
            request: ChatRequest,
            _history: Vec<Message>,
            mut on_chunk: Box<dyn FnMut(ChatEvent) + Send>,
        ) -> anyhow::Result<Usage> {
            on_chunk(ChatEvent::Delta(format!("echo: {}", request.message)));
            let usage = Usage { input_tokens: 1, output_tokens: 1 };
            on_chunk(ChatEvent::Done(usage.clone()));
            Ok(usage)
        }
    }

    struct NoopPlugin {
        id: &'static str,
    }

    #[async_trait]
    impl ChannelPlugin for NoopPlugin {
        fn id(&self) -> &str {
            self.id
        }
        fn display_name(&self) -> &str {
            self.id
        }
        async fn start(&self, _on_message: ChannelMessageHandler) -> anyhow::Result<()> {
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

    fn test_state() -> Arc<AppState> {
        let config = Config::default();
        let channels = Arc::new(ChannelRegistry::new());
        channels.register(Arc::new(NoopPlugin { id: "discord" })).unwrap();
        let dock = Arc::new(Dock::new(channels.clone()));
        let auth_cfg = haya_config::AuthConfig {
            mode: haya_config::AuthMode::Token,
            token: Some("a".repeat(32)),
            password: None,
        };
        Arc::new(AppState::new(
            config,
            Arc::new(HistoryManager::new(100)),
            Arc::new(haya_tools::ToolRegistry::new()),
            channels,
            dock,
            Arc::new(Scheduler::new(vec![]).unwrap()),
            None,
            None,
            Arc::new(EchoRuntime),
            Arc::new(GatewayAuth::from_config(&auth_cfg).unwrap()),
        ))
    }

    fn noop_emit() -> Arc<dyn Fn(OutgoingFrame) + Send + Sync> {
        Arc::new(|_frame| {})
    }

    #[tokio::test]
    async fn unknown_method_returns_method_not_found() {
        let state = test_state();
        let frame = dispatch("1".into(), "nonexistent", Value::Null, &state, noop_emit()).await;
        match frame {
            OutgoingFrame::Response { error: Some(e), .. } => assert_eq!(e.code, METHOD_NOT_FOUND),
            other => panic!("expected error response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn chat_send_with_empty_session_id_is_invalid_params() {
        let state = test_state();
        let params = json!({"sessionId": "", "message": "hi"});
        let frame = dispatch("1".into(), "chat.send", params, &state, noop_emit()).await;
        match frame {
            OutgoingFrame::Response { error: Some(e), .. } => assert_eq!(e.code, INVALID_PARAMS),
            other => panic!("expected error response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn chat_send_happy_path_returns_assembled_reply() {
        let state = test_state();
        let params = json!({"sessionId": "s1", "message": "hello"});
        let frame = dispatch("1".into(), "chat.send", params, &state, noop_emit()).await;
        match frame {
            OutgoingFrame::Response { result: Some(result), error: None, .. } => {
                assert_eq!(result["message"], json!("echo: hello"));
                assert_eq!(result["sessionId"], json!("s1"));
            }
            other => panic!("expected success response, got {other:?}"),
        }
        assert_eq!(state.history.get_message_count("s1").await, 2);
    }

    #[tokio::test]
    async fn chat_cancel_on_unknown_request_id_reports_not_cancelled() {
        let state = test_state();
        let frame = dispatch("1".into(), "chat.cancel", json!({"requestId": "nope"}), &state, noop_emit()).await;
        match frame {
            OutgoingFrame::Response { result: Some(result), .. } => assert_eq!(result["cancelled"], json!(false)),
            other => panic!("expected success response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn channels_list_reports_registered_channel() {
        let state = test_state();
        let frame = dispatch("1".into(), "channels.list", Value::Null, &state, noop_emit()).await;
        match frame {
            OutgoingFrame::Response { result: Some(result), .. } => {
                assert_eq!(result["channels"][0]["id"], json!("discord"));
            }
            other => panic!("expected success response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn channels_start_then_stop_round_trips() {
        let state = test_state();
        let start = dispatch("1".into(), "channels.start", json!({"id": "discord"}), &state, noop_emit()).await;
        assert!(matches!(start, OutgoingFrame::Response { error: None, .. }));
        let stop = dispatch("2".into(), "channels.stop", json!({"id": "discord"}), &state, noop_emit()).await;
        assert!(matches!(stop, OutgoingFrame::Response { error: None, .. }));
    }

    #[tokio::test]
    async fn channels_start_unknown_id_is_internal_error() {
        let state = test_state();
        let frame = dispatch("1".into(), "channels.start", json!({"id": "nope"}), &state, noop_emit()).await;
        match frame {
            OutgoingFrame::Response { error: Some(e), .. } => assert_eq!(e.code, INTERNAL_ERROR),
            other => panic!("expected error response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn gateway_config_never_includes_auth_secret() {
        let state = test_state();
        let frame = dispatch("1".into(), "gateway.config", Value::Null, &state, noop_emit()).await;
        match frame {
            OutgoingFrame::Response { result: Some(result), .. } => {
                let text = result.to_string();
                assert!(!text.contains(&"a".repeat(32)));
            }
            other => panic!("expected success response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cron_list_and_status_are_empty_with_no_jobs() {
        let state = test_state();
        let frame = dispatch("1".into(), "cron.list", Value::Null, &state, noop_emit()).await;
        match frame {
            OutgoingFrame::Response { result: Some(result), .. } => assert_eq!(result["jobs"], json!([])),
            other => panic!("expected success response, got {other:?}"),
        }
    }
}
