//! The dialogue backend seam.
//!
//! The engine treats the generative backend as an opaque text-completion
//! service: it supplies a system instruction and conversation history and
//! gets back raw text that is expected (but not trusted) to be a JSON object.

use crate::state::{Role, Turn};
use async_trait::async_trait;
use thiserror::Error;

/// A failed backend call (network, auth, quota). Carries the backend-provided
/// message; the engine attempts no retries.
#[derive(Debug, Error)]
#[error("Backend call failed: {message}")]
pub struct BackendError {
    pub message: String,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// An external generative dialogue service.
#[async_trait]
pub trait DialogueBackend: Send + Sync {
    /// Generate a structured reply for the new player utterance, given the
    /// system instruction and recent conversation history. Returns the raw
    /// response text; the caller validates its shape.
    async fn generate(
        &self,
        system_instruction: &str,
        history: &[Turn],
        player_text: &str,
    ) -> Result<String, BackendError>;
}

#[async_trait]
impl<T: DialogueBackend + ?Sized> DialogueBackend for std::sync::Arc<T> {
    async fn generate(
        &self,
        system_instruction: &str,
        history: &[Turn],
        player_text: &str,
    ) -> Result<String, BackendError> {
        (**self).generate(system_instruction, history, player_text).await
    }
}

/// Production backend wrapping the Gemini client in JSON-object response mode.
#[derive(Clone)]
pub struct GeminiBackend {
    client: gemini::Gemini,
}

impl GeminiBackend {
    pub fn new(client: gemini::Gemini) -> Self {
        Self { client }
    }

    /// Build a backend from the GEMINI_API_KEY environment variable.
    pub fn from_env() -> Result<Self, BackendError> {
        let client = gemini::Gemini::from_env().map_err(|e| BackendError::new(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl DialogueBackend for GeminiBackend {
    async fn generate(
        &self,
        system_instruction: &str,
        history: &[Turn],
        player_text: &str,
    ) -> Result<String, BackendError> {
        let mut messages: Vec<gemini::Message> = history
            .iter()
            .map(|turn| match turn.role {
                Role::User => gemini::Message::user(turn.text()),
                Role::Model => gemini::Message::model(turn.text()),
            })
            .collect();
        messages.push(gemini::Message::user(player_text));

        let request = gemini::Request::new(messages)
            .with_system_instruction(system_instruction)
            .with_json_response();

        let response = self
            .client
            .generate(request)
            .await
            .map_err(|e| BackendError::new(e.to_string()))?;

        Ok(response.text)
    }
}
