// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! End-to-end startup test: bind a real gateway server on an OS-assigned
//! port and drive it over plain HTTP (spec.md §8 scenario 5).
use std::sync::Arc;

use async_trait::async_trait;
use haya_channels::{ChannelRegistry, Dock};
use haya_config::{AuthConfig, AuthMode, Config};
use haya_core::HistoryManager;
use haya_gateway::{AppState, GatewayAuth};
use haya_model::{AgentRuntime, ChatEvent, ChatRequest, Message, Usage};
use haya_scheduler::Scheduler;
use haya_tools::ToolRegistry;

struct EchoRuntime;

#[async_trait]
impl AgentRuntime for EchoRuntime {
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

fn test_config() -> Config {
    let mut config = Config::default();
    config.gateway.port = 0;
    config.gateway.auth = AuthConfig { mode: AuthMode::Token, token: Some("a".repeat(32)), password: None };
    config.memory.enabled = false;
    config
}

async fn start_test_server(config: Config) -> haya_gateway::ServerHandle {
    let history = Arc::new(HistoryManager::new(config.agent.max_history_messages));
    let tools = Arc::new(ToolRegistry::new());
    let channels = Arc::new(ChannelRegistry::new());
    let dock = Arc::new(Dock::new(channels.clone()));
    let scheduler = Arc::new(Scheduler::new(Vec::new()).unwrap());
    let auth = Arc::new(GatewayAuth::from_config(&config.gateway.auth).unwrap());
    let runtime: Arc<dyn AgentRuntime> = Arc::new(EchoRuntime);

    let state =
        Arc::new(AppState::new(config.clone(), history, tools, channels, dock, scheduler, None, None, runtime, auth));

    haya_gateway::serve(&config, state).await.expect("server should bind")
}

#[tokio::test]
async fn health_root_and_not_found_respond_as_expected() {
    let server = start_test_server(test_config()).await;
    let base = format!("http://{}", server.local_addr);
    let client = reqwest::Client::new();

    let health = client.get(format!("{base}/health")).send().await.unwrap();
    assert_eq!(health.status(), 200);
    let body: serde_json::Value = health.json().await.unwrap();
    assert_eq!(body["status"], "ok");

    let root = client.get(&base).send().await.unwrap();
    assert_eq!(root.status(), 200);
    let body: serde_json::Value = root.json().await.unwrap();
    assert_eq!(body["name"], "haya");

    let missing = client.get(format!("{base}/nonexistent")).send().await.unwrap();
    assert_eq!(missing.status(), 404);

    server.abort();
}

#[tokio::test]
async fn port_zero_is_assigned_a_real_local_port() {
    let server = start_test_server(test_config()).await;
    assert_ne!(server.local_addr.port(), 0);
    server.abort();
}
