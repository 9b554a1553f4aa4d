// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;

use crate::types::{Message, Usage};

/// Parameters for one `chat.send` turn, forwarded to the runtime unchanged
/// once history has been assembled by the History Manager.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub session_id: String,
    pub message: String,
    pub model: Option<String>,
    pub system_prompt: Option<String>,
}

/// A streamed chunk of a model's reply.
#[derive(Debug, Clone)]
pub enum ChatEvent {
    /// Incremental text; forwarded to the client as a `chat.delta` event.
    Delta(String),
    /// Streaming finished successfully with final usage numbers.
    Done(Usage),
    /// Streaming finished because of an error; no further deltas follow.
    Error(String),
}

/// The external LLM-provider collaborator. Haya never talks to a model API
/// directly — every completion is routed through this trait so the gateway
/// core stays provider-agnostic. Concrete drivers (OpenAI, Anthropic, etc.)
/// live outside this crate.
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Run one turn. `history` is the message list `getHistory` produced.
    /// `on_chunk` is called for every `ChatEvent` as it arrives; the final
    /// call is always `Done` or `Error`. Cancellation is signalled by
    /// dropping the returned future via the caller's own cancellation token.
    async fn chat(
        &self,
        request: ChatRequest,
        history: Vec<Message>,
        on_chunk: Box<dyn FnMut(ChatEvent) + Send>,
    ) -> anyhow::Result<Usage>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

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

    #[tokio::test]
    async fn echo_runtime_emits_one_delta_then_done() {
        let runtime = EchoRuntime;
        let deltas = Arc::new(Mutex::new(Vec::new()));
        let deltas_clone = deltas.clone();
        let request = ChatRequest {
            session_id: "s1".into(),
            message: "hi".into(),
            model: None,
            system_prompt: None,
        };
        let usage = runtime
            .chat(
                request,
                vec![],
                Box::new(move |event| deltas_clone.lock().unwrap().push(event)),
            )
            .await
            .unwrap();
        assert_eq!(usage.input_tokens, 1);
        let recorded = deltas.lock().unwrap();
        assert_eq!(recorded.len(), 2);
        matches!(recorded[0], ChatEvent::Delta(_));
    }
}
