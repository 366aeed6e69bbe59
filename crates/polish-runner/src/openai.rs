//! OpenAI-compatible chat completions adapter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use polish_coordination::{Provider, ProviderError, ProviderResult, ProviderStats};
use reqwest::StatusCode;
use tracing::debug;

use crate::config::EndpointConfig;

const SYSTEM_PROMPT: &str =
    "You are an expert literary translator and editor. Follow the requested response format exactly.";

pub struct OpenAiProvider {
    name: String,
    url: String,
    api_key: String,
    model: String,
    timeout: Duration,
    client: reqwest::Client,
    total: AtomicU64,
    translated: AtomicU64,
    errors: AtomicU64,
}

impl OpenAiProvider {
    pub fn new(endpoint: &EndpointConfig, api_key: String) -> Result<Self, reqwest::Error> {
        let timeout = Duration::from_secs(endpoint.timeout_secs);
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            name: endpoint.name.clone(),
            url: format!("{}/chat/completions", endpoint.base_url.trim_end_matches('/')),
            api_key,
            model: endpoint.model.clone(),
            timeout,
            client,
            total: AtomicU64::new(0),
            translated: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        })
    }

    async fn complete(&self, text: &str, hint: &str) -> ProviderResult<String> {
        let system = if hint.is_empty() {
            SYSTEM_PROMPT.to_string()
        } else {
            format!("{SYSTEM_PROMPT}\nSection: {hint}")
        };
        let request_body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": text}
            ],
            "temperature": 0.3
        });

        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(self.timeout)
                } else {
                    ProviderError::Request(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited(body),
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::Auth(body),
                _ => ProviderError::Request(format!(
                    "{} API error ({}): {}",
                    self.name, status, body
                )),
            });
        }

        let resp_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Other(format!("invalid response body: {e}")))?;

        let content = resp_json["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .trim()
            .to_string();
        if content.is_empty() {
            return Err(ProviderError::EmptyResponse);
        }
        Ok(content)
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn translate(&self, text: &str, hint: &str) -> ProviderResult<String> {
        self.total.fetch_add(1, Ordering::Relaxed);
        let result = self.complete(text, hint).await;
        match &result {
            Ok(reply) => {
                self.translated.fetch_add(1, Ordering::Relaxed);
                debug!(provider = %self.name, model = %self.model, chars = reply.len(), "Completion received");
            }
            Err(_) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
            }
        }
        result
    }

    fn stats(&self) -> ProviderStats {
        ProviderStats {
            total: self.total.load(Ordering::Relaxed),
            translated: self.translated.load(Ordering::Relaxed),
            cached: 0,
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}
