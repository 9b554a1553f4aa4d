// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use haya_model::Message;

use crate::compact::{self, CompactionOptions, Summarizer, RECENT_MESSAGE_COUNT, RESERVE_FOR_RESPONSE};
use crate::session::Session;
use crate::token::{SimpleTokenCounter, TokenCounter};

/// Options accepted by [`HistoryManager::get_history`] (spec.md §4.2).
#[derive(Default)]
pub struct GetHistoryOptions {
    pub max_tokens: Option<usize>,
    pub system_prompt_tokens: usize,
    /// Gates step 3 (maxHistoryMessages truncation). Defaults true; callers
    /// like `gateway.status` diagnostics that want the untouched log set it
    /// to false (SPEC_FULL.md §4.2 supplement).
    pub context_pruning: Option<bool>,
    pub summarizer: Option<Arc<dyn Summarizer>>,
}

impl GetHistoryOptions {
    fn pruning_enabled(&self) -> bool {
        self.context_pruning.unwrap_or(true)
    }
}

/// Keyed by an opaque session id (spec.md §3). Haya serves many concurrent
/// sessions, so unlike a single-session CLI agent loop this holds a map of
/// sessions each behind their own lock — `chat.send` calls targeting
/// different sessions never contend, while calls on the same session id are
/// linearized (spec.md §5 Ordering guarantees).
pub struct HistoryManager {
    sessions: RwLock<HashMap<String, Arc<Mutex<Session>>>>,
    max_history_messages: usize,
    token_counter: Arc<dyn TokenCounter>,
}

impl HistoryManager {
    pub fn new(max_history_messages: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_history_messages,
            token_counter: Arc::new(SimpleTokenCounter),
        }
    }

    pub fn with_token_counter(max_history_messages: usize, token_counter: Arc<dyn TokenCounter>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_history_messages,
            token_counter,
        }
    }

    async fn get_or_create(&self, session_id: &str) -> Arc<Mutex<Session>> {
        if let Some(existing) = self.sessions.read().await.get(session_id) {
            return existing.clone();
        }
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Session::new(session_id))))
            .clone()
    }

    /// Create the session on first write and append. Concurrent calls on the
    /// same `session_id` are serialized by the per-session mutex.
    pub async fn add_message(&self, session_id: &str, msg: Message) {
        let session = self.get_or_create(session_id).await;
        session.lock().await.push(msg);
    }

    /// Batched convenience over [`Self::add_message`] that holds the
    /// per-session lock for the whole batch.
    pub async fn add_messages(&self, session_id: &str, msgs: impl IntoIterator<Item = Message>) {
        let session = self.get_or_create(session_id).await;
        let mut session = session.lock().await;
        for msg in msgs {
            session.push(msg);
        }
    }

    /// Returns the message count, or 0 if the session doesn't exist.
    pub async fn get_message_count(&self, session_id: &str) -> usize {
        match self.sessions.read().await.get(session_id) {
            Some(session) => session.lock().await.len(),
            None => 0,
        }
    }

    /// Implements spec.md §4.2's `getHistory` algorithm end to end.
    pub async fn get_history(&self, session_id: &str, opts: &GetHistoryOptions) -> Vec<Message> {
        let session = match self.sessions.read().await.get(session_id) {
            Some(s) => s.clone(),
            None => return Vec::new(),
        };
        let mut messages = session.lock().await.messages().to_vec();

        if opts.pruning_enabled() && messages.len() > self.max_history_messages {
            messages = messages.split_off(messages.len() - self.max_history_messages);
        }

        if let Some(max_tokens) = opts.max_tokens {
            let compaction_opts = CompactionOptions {
                max_tokens,
                system_prompt_tokens: opts.system_prompt_tokens,
                recent_message_count: RECENT_MESSAGE_COUNT,
                reserve_for_response: RESERVE_FOR_RESPONSE,
                summarizer: opts.summarizer.as_deref(),
            };
            messages = compact::compact_for_budget(&messages, self.token_counter.as_ref(), &compaction_opts).await;
        }

        messages
    }
}
