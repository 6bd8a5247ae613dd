//! Model inference client
//!
//! Text-completion calls against a local inference endpoint.
//! Uses a long-lived reqwest::Client for connection pooling.

use crate::error::RouterError;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

/// Sampling options for one completion
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingOptions {
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
}

impl SamplingOptions {
    /// Near-deterministic settings used for classification
    pub const CLASSIFY: SamplingOptions = SamplingOptions {
        temperature: 0.1,
        top_p: 0.9,
        max_tokens: 256,
    };

    pub const SUGGEST: SamplingOptions = SamplingOptions {
        temperature: 0.7,
        top_p: 0.9,
        max_tokens: 300,
    };
}

/// Anything that can turn a prompt into free text
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(&self, prompt: &str, options: SamplingOptions) -> Result<String>;

    /// Upper bound the caller should wait for one completion
    fn timeout(&self) -> Duration;
}

pub struct HttpModelClient {
    client: Client,
    endpoint: String,
    model: String,
    timeout: Duration,
}

impl HttpModelClient {
    pub fn new(endpoint: &str, model: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| RouterError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            timeout,
        })
    }
}

#[async_trait]
impl ModelClient for HttpModelClient {
    async fn complete(&self, prompt: &str, options: SamplingOptions) -> Result<String> {
        let url = format!("{}/api/generate", self.endpoint);

        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: options.temperature,
                top_p: options.top_p,
                num_predict: options.max_tokens,
            },
        };

        debug!(model = %self.model, prompt_len = prompt.len(), "Calling model endpoint");

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RouterError::Timeout(self.timeout.as_millis() as u64)
                } else {
                    RouterError::ClassifierUnavailable(format!("Model endpoint error: {}", e))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!(%status, "Model endpoint error response: {}", error_text);
            return Err(RouterError::ClassifierUnavailable(format!(
                "Model endpoint returned {}: {}",
                status, error_text
            )));
        }

        let body: GenerateResponse = response.json().await.map_err(|e| {
            RouterError::MalformedClassifierOutput(format!("Model response parse error: {}", e))
        })?;

        Ok(body.response)
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
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
    top_p: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let request = GenerateRequest {
            model: "llama3.2",
            prompt: "Classify: Apple stock",
            stream: false,
            options: GenerateOptions {
                temperature: SamplingOptions::CLASSIFY.temperature,
                top_p: SamplingOptions::CLASSIFY.top_p,
                num_predict: SamplingOptions::CLASSIFY.max_tokens,
            },
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["stream"], serde_json::json!(false));
        assert_eq!(json["options"]["num_predict"], serde_json::json!(256));
        assert!(json["prompt"].as_str().unwrap().contains("Apple"));
    }

    #[test]
    fn test_response_without_text_is_empty() {
        let body: GenerateResponse = serde_json::from_str(r#"{"done": true}"#).unwrap();
        assert!(body.response.is_empty());
    }

    #[test]
    fn test_client_normalizes_endpoint_and_reports_timeout() {
        let client =
            HttpModelClient::new("http://localhost:11434/", "llama3.2", Duration::from_millis(200))
                .unwrap();
        assert_eq!(client.endpoint, "http://localhost:11434");
        assert_eq!(client.timeout(), Duration::from_millis(200));
    }
}
