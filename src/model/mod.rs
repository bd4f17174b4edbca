//! Local model transport (Ollama-compatible REST API).
//!
//! Two RPCs are used: completion (`POST /api/generate`) for the PII
//! extractor's fill-in prompt, and chat (`POST /api/chat`) for tier
//! classification and S3 direct responses. The crate never talks to a cloud
//! model; cloud egress is owned entirely by the host runtime.

use crate::config::LocalModelConfig;
use crate::error::{CurtainError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default per-request timeout against the local endpoint.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Options for a single model call.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateOptions {
    pub temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            num_predict: None,
            stop: Vec::new(),
        }
    }
}

impl GenerateOptions {
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_num_predict(mut self, num_predict: u32) -> Self {
        self.num_predict = Some(num_predict);
        self
    }

    pub fn with_stop(mut self, stop: &[&str]) -> Self {
        self.stop = stop.iter().map(|s| s.to_string()).collect();
        self
    }
}

/// One turn in a chat call.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// Transport to a local inference endpoint.
///
/// A trait seam so detectors and the orchestrator can be exercised with a
/// scripted model in tests, exactly like the runtime swaps providers.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Completion-style call.
    async fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<String>;
    /// Chat-style call.
    async fn chat(&self, messages: &[ChatMessage], options: &GenerateOptions) -> Result<String>;
    fn model_name(&self) -> &str;
}

// ── Ollama client ────────────────────────────────────────────────

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: &'a GenerateOptions,
}

#[derive(Deserialize)]
struct GenerateReply {
    response: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: &'a GenerateOptions,
}

#[derive(Deserialize)]
struct ChatReply {
    message: ChatReplyMessage,
}

#[derive(Deserialize)]
struct ChatReplyMessage {
    content: String,
}

/// HTTP client for an Ollama-compatible endpoint.
pub struct OllamaClient {
    endpoint: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(endpoint: &str, model: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CurtainError::ModelTransport(e.to_string()))?;
        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
        })
    }

    pub fn from_config(config: &LocalModelConfig) -> Result<Self> {
        Self::new(
            &config.endpoint,
            &config.model,
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        )
    }

    /// Same endpoint, different model (guard-agent override).
    pub fn with_model(&self, model: &str) -> Self {
        Self {
            endpoint: self.endpoint.clone(),
            model: model.to_string(),
            client: self.client.clone(),
        }
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &impl Serialize,
    ) -> Result<T> {
        let url = format!("{}{path}", self.endpoint);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| CurtainError::ModelTransport(format!("{url}: {e}")))?;
        if !response.status().is_success() {
            return Err(CurtainError::ModelTransport(format!(
                "{url}: HTTP {}",
                response.status()
            )));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| CurtainError::ModelTransport(format!("{url}: bad reply: {e}")))
    }
}

#[async_trait]
impl LanguageModel for OllamaClient {
    async fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<String> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options,
        };
        let reply: GenerateReply = self.post_json("/api/generate", &request).await?;
        Ok(reply.response)
    }

    async fn chat(&self, messages: &[ChatMessage], options: &GenerateOptions) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            stream: false,
            options,
        };
        let reply: ChatReply = self.post_json("/api/chat", &request).await?;
        Ok(reply.message.content)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_serialize_to_wire_shape() {
        let options = GenerateOptions::default()
            .with_temperature(0.05)
            .with_num_predict(512)
            .with_stop(&["\n\n", "Input:", "Task:"]);
        let value = serde_json::to_value(&options).unwrap();
        assert_eq!(value["temperature"], 0.05);
        assert_eq!(value["num_predict"], 512);
        assert_eq!(value["stop"][1], "Input:");
    }

    #[test]
    fn empty_stop_is_omitted() {
        let value = serde_json::to_value(GenerateOptions::default()).unwrap();
        assert!(value.get("stop").is_none());
        assert!(value.get("num_predict").is_none());
    }

    #[test]
    fn endpoint_trailing_slash_trimmed() {
        let client = OllamaClient::new(
            "http://127.0.0.1:11434/",
            "qwen3:4b",
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(client.endpoint, "http://127.0.0.1:11434");
        assert_eq!(client.model_name(), "qwen3:4b");
    }
}
