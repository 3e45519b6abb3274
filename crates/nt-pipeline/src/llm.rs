//! LLM Client implementations
//!
//! Provides the inference capability over OpenAI-compatible chat APIs
//! (OpenAI, Groq, Azure) and Ollama, plus a guard that bounds every call
//! in time and caps how many calls are in flight at once.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nt_core::{LlmClient, LlmConfig, LlmProvider, NtError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";

fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| NtError::Config(format!("Failed to build HTTP client: {e}")))
}

// ============================================================================
// OpenAI-compatible Client
// ============================================================================

/// Chat-completions client for OpenAI and compatible APIs
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl OpenAiClient {
    /// Create a new OpenAI client
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        max_tokens: u32,
        temperature: f32,
    ) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: OPENAI_BASE_URL.to_string(),
            model: model.into(),
            max_tokens,
            temperature,
        }
    }

    /// Create from config
    ///
    /// Groq uses its own key and base URL; Azure requires an explicit base URL.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let (api_key, base_url) = match config.provider {
            LlmProvider::Groq => {
                let key = config
                    .groq_api_key
                    .as_ref()
                    .ok_or_else(|| NtError::Config("Groq API key required".to_string()))?;
                let url = config
                    .openai_base_url
                    .clone()
                    .unwrap_or_else(|| GROQ_BASE_URL.to_string());
                (key.clone(), url)
            }
            LlmProvider::Azure => {
                let key = config
                    .openai_api_key
                    .as_ref()
                    .ok_or_else(|| NtError::Config("Azure API key required".to_string()))?;
                let url = config.openai_base_url.clone().ok_or_else(|| {
                    NtError::Config("Azure requires openai_base_url".to_string())
                })?;
                (key.clone(), url)
            }
            LlmProvider::OpenAI | LlmProvider::Ollama => {
                let key = config
                    .openai_api_key
                    .as_ref()
                    .ok_or_else(|| NtError::Config("OpenAI API key required".to_string()))?;
                let url = config
                    .openai_base_url
                    .clone()
                    .unwrap_or_else(|| OPENAI_BASE_URL.to_string());
                (key.clone(), url)
            }
        };

        Ok(Self {
            client: http_client(Duration::from_secs(config.timeout_secs))?,
            api_key,
            base_url,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    /// Set custom base URL (for Azure or compatible APIs)
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = OpenAiRequest {
            model: &self.model,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| NtError::Inference(format!("Request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(NtError::Inference(format!(
                "Provider returned {status}: {error_text}"
            )));
        }

        let result: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| NtError::Inference(format!("Failed to parse response: {e}")))?;

        result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| NtError::Inference("No response generated".to_string()))
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Ollama Client
// ============================================================================

/// Ollama API client
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

impl OllamaClient {
    /// Create a new Ollama client
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            temperature: 0.0,
        }
    }

    /// Create from config
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(Duration::from_secs(config.timeout_secs))?,
            base_url: config.ollama_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = OllamaRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: OllamaOptions {
                temperature: self.temperature,
            },
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| NtError::Inference(format!("Ollama request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(NtError::Inference(format!(
                "Ollama returned {status}: {error_text}"
            )));
        }

        let result: OllamaResponse = response
            .json()
            .await
            .map_err(|e| NtError::Inference(format!("Failed to parse Ollama response: {e}")))?;

        Ok(result.response)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Guard
// ============================================================================

/// Bounds each call with a timeout and limits concurrent calls.
///
/// A timed out call fails like any other inference failure. Nothing is
/// retried here.
pub struct GuardedClient {
    inner: Arc<dyn LlmClient>,
    timeout: Duration,
    permits: Arc<Semaphore>,
}

impl GuardedClient {
    pub fn new(inner: Arc<dyn LlmClient>, timeout: Duration, max_concurrent: usize) -> Self {
        Self {
            inner,
            timeout,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Calls that could start right now without waiting
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }
}

#[async_trait]
impl LlmClient for GuardedClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| NtError::Inference("inference guard closed".to_string()))?;

        debug!(client = self.inner.name(), prompt_chars = prompt.len(), "calling LLM");
        match tokio::time::timeout(self.timeout, self.inner.generate(prompt)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    client = self.inner.name(),
                    timeout_secs = self.timeout.as_secs_f32(),
                    "LLM call timed out"
                );
                Err(NtError::Inference(format!(
                    "{} did not answer within {:?}",
                    self.inner.name(),
                    self.timeout
                )))
            }
        }
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

// ============================================================================
// Factory function
// ============================================================================

/// Create an LLM client from config, guarded by its timeout and call ceiling
pub fn create_llm_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>> {
    let client: Arc<dyn LlmClient> = match config.provider {
        LlmProvider::OpenAI | LlmProvider::Groq | LlmProvider::Azure => {
            Arc::new(OpenAiClient::from_config(config)?)
        }
        LlmProvider::Ollama => Arc::new(OllamaClient::from_config(config)?),
    };

    Ok(Arc::new(GuardedClient::new(
        client,
        Duration::from_secs(config.timeout_secs),
        config.max_concurrent_calls,
    )))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct SlowClient {
        delay: Duration,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl SlowClient {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl LlmClient for SlowClient {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok("ok".to_string())
        }
    }

    #[test]
    fn test_openai_client_creation() {
        let client = OpenAiClient::new("test-key", "gpt-4o-mini", 1024, 0.0);
        assert_eq!(client.model, "gpt-4o-mini");
        assert_eq!(client.base_url, OPENAI_BASE_URL);
    }

    #[test]
    fn test_ollama_client_creation() {
        let client = OllamaClient::new("http://localhost:11434", "llama3.1");
        assert_eq!(client.model, "llama3.1");
    }

    #[test]
    fn test_groq_uses_its_base_url() {
        let config = LlmConfig {
            provider: LlmProvider::Groq,
            groq_api_key: Some("gsk-test".to_string()),
            model: "llama-3.1-8b-instant".to_string(),
            ..Default::default()
        };
        let client = OpenAiClient::from_config(&config).unwrap();
        assert_eq!(client.base_url, GROQ_BASE_URL);
        assert_eq!(client.api_key, "gsk-test");
    }

    #[test]
    fn test_missing_keys_are_config_errors() {
        let openai = LlmConfig::default();
        assert!(matches!(
            create_llm_client(&openai),
            Err(NtError::Config(_))
        ));

        let azure = LlmConfig {
            provider: LlmProvider::Azure,
            openai_api_key: Some("key".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            OpenAiClient::from_config(&azure),
            Err(NtError::Config(_))
        ));

        let ollama = LlmConfig {
            provider: LlmProvider::Ollama,
            ..Default::default()
        };
        assert!(create_llm_client(&ollama).is_ok());
    }

    #[tokio::test]
    async fn test_timeout_is_an_inference_failure() {
        let guarded = GuardedClient::new(
            Arc::new(SlowClient::new(Duration::from_secs(5))),
            Duration::from_millis(20),
            4,
        );

        let err = guarded.generate("prompt").await.unwrap_err();
        assert!(matches!(err, NtError::Inference(_)));
    }

    #[tokio::test]
    async fn test_concurrent_calls_are_capped() {
        let slow = Arc::new(SlowClient::new(Duration::from_millis(30)));
        let guarded = Arc::new(GuardedClient::new(
            slow.clone(),
            Duration::from_secs(5),
            2,
        ));

        let calls = (0..6).map(|_| {
            let guarded = guarded.clone();
            tokio::spawn(async move { guarded.generate("prompt").await })
        });
        for call in futures::future::join_all(calls).await {
            assert_eq!(call.unwrap().unwrap(), "ok");
        }

        assert!(slow.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(guarded.available_permits(), 2);
    }
}
