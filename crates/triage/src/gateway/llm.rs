//! LLM Gateways
//!
//! Ollama over its HTTP API, Anthropic and OpenAI through Rig, and a disabled
//! gateway that forces every caller onto its deterministic fallback.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

// Import from rig
use rig::completion::Prompt;
use rig::providers::{anthropic, openai};

use super::{with_timeout, GatewayError, LlmGateway};
use crate::config::LlmConfig;

/// Classification is always deterministic.
const CLASSIFY_TEMPERATURE: f32 = 0.0;

/// Ollama `/api/generate`, non-streaming.
pub struct OllamaGateway {
    client: reqwest::Client,
    base_url: String,
    triage_model: String,
    timeout: Duration,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaGateway {
    pub fn new(client: reqwest::Client, base_url: String, triage_model: String, timeout: Duration) -> Self {
        Self {
            client,
            base_url,
            triage_model,
            timeout,
        }
    }
}

#[async_trait]
impl LlmGateway for OllamaGateway {
    async fn classify(&self, prompt: &str) -> Result<String, GatewayError> {
        self.generate(prompt, &self.triage_model, CLASSIFY_TEMPERATURE).await
    }

    async fn generate(&self, prompt: &str, model: &str, temperature: f32) -> Result<String, GatewayError> {
        let url = format!("{}/api/generate", self.base_url.trim_end_matches('/'));
        debug!("Ollama generate with model {}", model);

        let response = self
            .client
            .post(&url)
            .json(&GenerateRequest {
                model,
                prompt,
                stream: false,
                options: GenerateOptions { temperature },
            })
            .timeout(self.timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(GatewayError::Unavailable(format!(
                "ollama returned {}: {}",
                status, error_text
            )));
        }

        let body: GenerateResponse = response.json().await?;
        Ok(body.response)
    }
}

enum RigClient {
    Anthropic(anthropic::Client),
    OpenAI(openai::Client),
}

/// Anthropic or OpenAI via Rig. An agent is built per call so the model and
/// temperature can vary by pipeline stage.
pub struct RigGateway {
    client: RigClient,
    triage_model: String,
    max_tokens: u64,
    timeout: Duration,
}

impl RigGateway {
    pub fn anthropic(api_key: Option<String>, triage_model: String, timeout: Duration) -> Self {
        let client = if let Some(key) = api_key {
            anthropic::Client::new(
                &key,
                "https://api.anthropic.com",
                None,
                anthropic::ANTHROPIC_VERSION_LATEST,
            )
        } else {
            // Reads ANTHROPIC_API_KEY
            anthropic::Client::from_env()
        };

        Self {
            client: RigClient::Anthropic(client),
            triage_model,
            max_tokens: 4096,
            timeout,
        }
    }

    pub fn openai(api_key: Option<String>, triage_model: String, timeout: Duration) -> Self {
        let client = if let Some(key) = api_key {
            openai::Client::new(&key)
        } else {
            // Reads OPENAI_API_KEY
            openai::Client::from_env()
        };

        Self {
            client: RigClient::OpenAI(client),
            triage_model,
            max_tokens: 4096,
            timeout,
        }
    }

    async fn prompt(&self, prompt: &str, model: &str, temperature: f32) -> Result<String, GatewayError> {
        match &self.client {
            RigClient::Anthropic(client) => {
                let agent = client
                    .agent(model)
                    .temperature(f64::from(temperature))
                    .max_tokens(self.max_tokens)
                    .build();

                agent
                    .prompt(prompt)
                    .await
                    .map_err(|e| GatewayError::Transport(format!("Anthropic API error: {:?}", e)))
            }
            RigClient::OpenAI(client) => {
                let agent = client
                    .agent(model)
                    .temperature(f64::from(temperature))
                    .build();

                agent
                    .prompt(prompt)
                    .await
                    .map_err(|e| GatewayError::Transport(format!("OpenAI API error: {:?}", e)))
            }
        }
    }
}

#[async_trait]
impl LlmGateway for RigGateway {
    async fn classify(&self, prompt: &str) -> Result<String, GatewayError> {
        with_timeout(self.timeout, self.prompt(prompt, &self.triage_model, CLASSIFY_TEMPERATURE)).await
    }

    async fn generate(&self, prompt: &str, model: &str, temperature: f32) -> Result<String, GatewayError> {
        with_timeout(self.timeout, self.prompt(prompt, model, temperature)).await
    }
}

/// Always unavailable. Used for offline runs.
pub struct DisabledLlm;

#[async_trait]
impl LlmGateway for DisabledLlm {
    async fn classify(&self, _prompt: &str) -> Result<String, GatewayError> {
        Err(GatewayError::Unavailable("LLM provider disabled".to_string()))
    }

    async fn generate(&self, _prompt: &str, _model: &str, _temperature: f32) -> Result<String, GatewayError> {
        Err(GatewayError::Unavailable("LLM provider disabled".to_string()))
    }
}

/// Create the gateway selected by configuration.
pub fn create_llm_gateway(config: &LlmConfig, http: reqwest::Client) -> crate::Result<Arc<dyn LlmGateway>> {
    let timeout = config.timeout();
    match config.provider.as_str() {
        "ollama" => Ok(Arc::new(OllamaGateway::new(
            http,
            config.endpoint.clone(),
            config.triage_model.clone(),
            timeout,
        ))),
        "anthropic" | "claude" => Ok(Arc::new(RigGateway::anthropic(
            config.api_key.clone(),
            config.triage_model.clone(),
            timeout,
        ))),
        "openai" => Ok(Arc::new(RigGateway::openai(
            config.api_key.clone(),
            config.triage_model.clone(),
            timeout,
        ))),
        "none" | "disabled" => Ok(Arc::new(DisabledLlm)),
        other => Err(crate::Error::Config(format!("unknown LLM provider: {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_request_shape() {
        let body = serde_json::to_value(GenerateRequest {
            model: "qwen3-vl:4b",
            prompt: "classify",
            stream: false,
            options: GenerateOptions { temperature: 0.0 },
        })
        .unwrap();

        assert_eq!(body["model"], "qwen3-vl:4b");
        assert_eq!(body["stream"], false);
        assert_eq!(body["options"]["temperature"], 0.0);
    }

    #[tokio::test]
    async fn test_disabled_gateway_always_fails() {
        let llm = DisabledLlm;
        assert!(matches!(llm.classify("x").await, Err(GatewayError::Unavailable(_))));
        assert!(matches!(llm.generate("x", "m", 0.0).await, Err(GatewayError::Unavailable(_))));
    }

    #[test]
    fn test_unknown_provider_is_config_error() {
        let config = LlmConfig {
            provider: "watson".to_string(),
            ..LlmConfig::default()
        };
        let result = create_llm_gateway(&config, reqwest::Client::new());
        assert!(matches!(result, Err(crate::Error::Config(_))));
    }
}
