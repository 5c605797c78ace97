//! Testing utilities.
//!
//! Provides `MockBackend`, a scripted dialogue backend for deterministic
//! engine tests without API calls.

use crate::backend::{BackendError, DialogueBackend};
use crate::state::Turn;
use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Mutex;

/// A scripted backend that returns queued raw replies in order.
///
/// Replies are raw text, so tests can script malformed output as easily as
/// well-formed JSON. Once the queue is exhausted, every further call returns
/// a neutral well-formed reply.
pub struct MockBackend {
    replies: Mutex<Vec<String>>,
    /// System instructions seen by the backend, for prompt assertions.
    prompts: Mutex<Vec<String>>,
}

impl MockBackend {
    /// Create a mock with scripted raw replies.
    pub fn new(replies: Vec<String>) -> Self {
        Self {
            replies: Mutex::new(replies),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock with no scripted replies; every call gets the neutral
    /// default.
    pub fn neutral() -> Self {
        Self::new(Vec::new())
    }

    /// Build a well-formed reply JSON string.
    pub fn reply(
        dialogue: &str,
        mood_summary: &str,
        annoyance_delta: i32,
        trust_delta: i32,
        world_log_update: Option<&str>,
    ) -> String {
        json!({
            "dialogue": dialogue,
            "mood_summary": mood_summary,
            "annoyance_delta": annoyance_delta,
            "trust_delta": trust_delta,
            "world_log_update": world_log_update,
        })
        .to_string()
    }

    /// Queue another raw reply.
    pub async fn queue(&self, raw: impl Into<String>) {
        self.replies.lock().await.push(raw.into());
    }

    /// The system instructions observed so far, in call order.
    pub async fn seen_prompts(&self) -> Vec<String> {
        self.prompts.lock().await.clone()
    }
}

#[async_trait]
impl DialogueBackend for MockBackend {
    async fn generate(
        &self,
        system_instruction: &str,
        _history: &[Turn],
        _player_text: &str,
    ) -> Result<String, BackendError> {
        self.prompts
            .lock()
            .await
            .push(system_instruction.to_string());

        let mut replies = self.replies.lock().await;
        if replies.is_empty() {
            Ok(Self::reply("...", "neutral", 0, 0, None))
        } else {
            Ok(replies.remove(0))
        }
    }
}

/// A backend whose every call fails, for exercising call-error paths.
pub struct FailingBackend {
    message: String,
}

impl FailingBackend {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl DialogueBackend for FailingBackend {
    async fn generate(
        &self,
        _system_instruction: &str,
        _history: &[Turn],
        _player_text: &str,
    ) -> Result<String, BackendError> {
        Err(BackendError::new(self.message.clone()))
    }
}
