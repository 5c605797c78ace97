//! Minimal Google Gemini API client.
//!
//! This crate provides a focused client for Gemini's generateContent API with:
//! - Single-shot text completions
//! - System instructions
//! - JSON-object response mode (`responseMimeType: application/json`)

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Errors that can occur when using the Gemini client.
#[derive(Debug, Error)]
pub enum Error {
    #[error("API key not configured")]
    NoApiKey,

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Gemini API client.
#[derive(Clone)]
pub struct Gemini {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl Gemini {
    /// Create a new Gemini client with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .connect_timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("Failed to build HTTP client"),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Create a Gemini client from the GEMINI_API_KEY environment variable.
    pub fn from_env() -> Result<Self, Error> {
        let api_key = std::env::var("GEMINI_API_KEY").map_err(|_| Error::NoApiKey)?;
        Ok(Self::new(api_key))
    }

    /// Set the default model for this client.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Send a generation request and return the full response.
    pub async fn generate(&self, request: Request) -> Result<Response, Error> {
        let model = request.model.clone().unwrap_or_else(|| self.model.clone());
        let api_request = build_api_request(&request);
        let headers = self.build_headers()?;

        let response = self
            .client
            .post(format!("{API_BASE}/models/{model}:generateContent"))
            .headers(headers)
            .json(&api_request)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status,
                message: body,
            });
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| Error::Parse(e.to_string()))?;

        parse_response(api_response)
    }

    fn build_headers(&self) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-goog-api-key",
            HeaderValue::from_str(&self.api_key)
                .map_err(|e| Error::Config(format!("Invalid API key: {e}")))?,
        );
        Ok(headers)
    }
}

// ============================================================================
// Public types
// ============================================================================

/// A generation request to send to Gemini.
#[derive(Debug, Clone)]
pub struct Request {
    pub model: Option<String>,
    pub system_instruction: Option<String>,
    pub messages: Vec<Message>,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<usize>,
    /// Request the reply as a single JSON object rather than free text.
    pub json_response: bool,
}

impl Request {
    /// Create a new request with the given messages.
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            model: None,
            system_instruction: None,
            messages,
            temperature: None,
            max_output_tokens: None,
            json_response: false,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: usize) -> Self {
        self.max_output_tokens = Some(max_output_tokens);
        self
    }

    /// Ask the model to respond with `application/json` content.
    pub fn with_json_response(mut self) -> Self {
        self.json_response = true;
        self
    }
}

/// A message in the conversation.
#[derive(Debug, Clone)]
pub struct Message {
    pub role: Role,
    pub text: String,
}

impl Message {
    /// Create a user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    /// Create a model message.
    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }
}

/// The role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Model,
}

/// A generation response from Gemini.
#[derive(Debug, Clone)]
pub struct Response {
    /// All text parts of the first candidate, concatenated.
    pub text: String,
    pub finish_reason: FinishReason,
    pub usage: Usage,
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    MaxTokens,
    Safety,
    Other,
}

/// Token usage information.
#[derive(Debug, Clone, Default)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub response_tokens: usize,
}

// ============================================================================
// Internal API types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<ApiContent>,
    contents: Vec<ApiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<ApiGenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<ApiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiPart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiResponse {
    #[serde(default)]
    candidates: Vec<ApiCandidate>,
    #[serde(default)]
    usage_metadata: Option<ApiUsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiCandidate {
    content: Option<ApiContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ApiUsageMetadata {
    #[serde(default)]
    prompt_token_count: usize,
    #[serde(default)]
    candidates_token_count: usize,
}

fn build_api_request(request: &Request) -> ApiRequest {
    let contents: Vec<ApiContent> = request
        .messages
        .iter()
        .map(|m| ApiContent {
            role: Some(
                match m.role {
                    Role::User => "user",
                    Role::Model => "model",
                }
                .to_string(),
            ),
            parts: vec![ApiPart {
                text: m.text.clone(),
            }],
        })
        .collect();

    let generation_config = if request.temperature.is_some()
        || request.max_output_tokens.is_some()
        || request.json_response
    {
        Some(ApiGenerationConfig {
            temperature: request.temperature,
            max_output_tokens: request.max_output_tokens,
            response_mime_type: request
                .json_response
                .then(|| "application/json".to_string()),
        })
    } else {
        None
    };

    ApiRequest {
        system_instruction: request.system_instruction.as_ref().map(|s| ApiContent {
            role: None,
            parts: vec![ApiPart { text: s.clone() }],
        }),
        contents,
        generation_config,
    }
}

fn parse_response(api_response: ApiResponse) -> Result<Response, Error> {
    let candidate = api_response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| Error::Parse("response contained no candidates".to_string()))?;

    let text = candidate
        .content
        .map(|c| {
            c.parts
                .into_iter()
                .map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    let finish_reason = match candidate.finish_reason.as_deref() {
        Some("STOP") | None => FinishReason::Stop,
        Some("MAX_TOKENS") => FinishReason::MaxTokens,
        Some("SAFETY") => FinishReason::Safety,
        Some(_) => FinishReason::Other,
    };

    let usage = api_response
        .usage_metadata
        .map(|u| Usage {
            prompt_tokens: u.prompt_token_count,
            response_tokens: u.candidates_token_count,
        })
        .unwrap_or_default();

    Ok(Response {
        text,
        finish_reason,
        usage,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = Gemini::new("test-key");
        assert_eq!(client.model, DEFAULT_MODEL);
    }

    #[test]
    fn test_client_with_model() {
        let client = Gemini::new("test-key").with_model("gemini-2.5-pro");
        assert_eq!(client.model, "gemini-2.5-pro");
    }

    #[test]
    fn test_request_builder() {
        let request = Request::new(vec![Message::user("Hello")])
            .with_system_instruction("You are a surly blacksmith")
            .with_max_output_tokens(1000)
            .with_temperature(0.7)
            .with_json_response();

        assert_eq!(request.max_output_tokens, Some(1000));
        assert!(request.system_instruction.is_some());
        assert_eq!(request.temperature, Some(0.7));
        assert!(request.json_response);
    }

    #[test]
    fn test_message_creation() {
        let user_msg = Message::user("Hello");
        assert!(matches!(user_msg.role, Role::User));
        assert_eq!(user_msg.text, "Hello");

        let model_msg = Message::model("Hmph. What do you want?");
        assert!(matches!(model_msg.role, Role::Model));
    }

    #[test]
    fn test_api_request_roles() {
        let request = Request::new(vec![Message::user("hi"), Message::model("hello")]);
        let api = build_api_request(&request);

        assert_eq!(api.contents.len(), 2);
        assert_eq!(api.contents[0].role.as_deref(), Some("user"));
        assert_eq!(api.contents[1].role.as_deref(), Some("model"));
        assert!(api.generation_config.is_none());
    }

    #[test]
    fn test_json_response_mode() {
        let request = Request::new(vec![Message::user("hi")]).with_json_response();
        let api = build_api_request(&request);

        let config = api.generation_config.expect("config should be set");
        assert_eq!(config.response_mime_type.as_deref(), Some("application/json"));
    }

    #[test]
    fn test_parse_response() {
        let api_response = ApiResponse {
            candidates: vec![ApiCandidate {
                content: Some(ApiContent {
                    role: Some("model".to_string()),
                    parts: vec![ApiPart {
                        text: "{\"dialogue\": \"Hi\"}".to_string(),
                    }],
                }),
                finish_reason: Some("STOP".to_string()),
            }],
            usage_metadata: Some(ApiUsageMetadata {
                prompt_token_count: 10,
                candidates_token_count: 5,
            }),
        };

        let response = parse_response(api_response).expect("should parse");
        assert_eq!(response.text, "{\"dialogue\": \"Hi\"}");
        assert_eq!(response.finish_reason, FinishReason::Stop);
        assert_eq!(response.usage.prompt_tokens, 10);
    }

    #[test]
    fn test_parse_empty_response() {
        let api_response = ApiResponse {
            candidates: vec![],
            usage_metadata: None,
        };

        assert!(matches!(
            parse_response(api_response),
            Err(Error::Parse(_))
        ));
    }
}
