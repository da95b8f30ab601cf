
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::answer::{ChatMessage, Generator};
use crate::config::{ApiFlavor, Config};
use crate::embeddings::Embedder;
use crate::{RagError, Result};

const EXPONENTIAL_BACKOFF_BASE: u32 = 2;
const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

/// Bearer token that never shows up in debug output
#[derive(Clone, PartialEq, Eq)]
struct ApiKey(String);

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// HTTP client for the embedding and chat endpoints of a model service
#[derive(Debug, Clone)]
pub struct RemoteClient {
    base_url: Url,
    flavor: ApiFlavor,
    embedding_model: String,
    generation_model: String,
    api_key: Option<ApiKey>,
    agent: ureq::Agent,
    retry_attempts: u32,
    backoff: Duration,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbedResponse {
    data: Vec<OpenAiEmbedding>,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbedding {
    embedding: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: Option<ReplyMessage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct OllamaModelsResponse {
    models: Vec<OllamaModel>,
}

#[derive(Debug, Deserialize)]
struct OllamaModel {
    name: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiModelsResponse {
    data: Vec<OpenAiModel>,
}

#[derive(Debug, Deserialize)]
struct OpenAiModel {
    id: String,
}

impl RemoteClient {
    /// Build a client from the `[service]`, `[embedding]` and `[generation]`
    /// settings. The OpenAI flavour requires an API key.
    #[inline]
    pub fn new(config: &Config) -> Result<Self> {
        let base_url = config.service_url()?;
        let api_key = config.service.resolved_api_key().map(ApiKey);

        if config.service.flavor == ApiFlavor::OpenAi && api_key.is_none() {
            return Err(RagError::MissingApiKey);
        }

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.service.timeout_secs)))
            .build()
            .into();

        Ok(Self {
            base_url,
            flavor: config.service.flavor,
            embedding_model: config.embedding.model.clone(),
            generation_model: config.generation.model.clone(),
            api_key,
            agent,
            retry_attempts: config.service.retry_attempts,
            backoff: DEFAULT_BACKOFF,
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    /// Base delay before the first retry; doubles on every further attempt
    #[inline]
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    #[inline]
    pub const fn flavor(&self) -> ApiFlavor {
        self.flavor
    }

    #[inline]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Check that the service answers and serves both configured models
    #[inline]
    pub fn health_check(&self) -> Result<()> {
        debug!("Performing health check for {} at {}", self.flavor, self.base_url);

        let models = self.list_models()?;
        let missing: Vec<&str> = [
            self.embedding_model.as_str(),
            self.generation_model.as_str(),
        ]
        .into_iter()
        .filter(|wanted| !models.iter().any(|m| m == wanted))
        .collect();

        if !missing.is_empty() {
            warn!(
                "Models {:?} not found. Available models: {:?}",
                missing, models
            );
            return Err(RagError::Remote(format!(
                "models {:?} are not available; available models: {:?}",
                missing, models
            )));
        }

        info!(
            "Health check passed for {} at {} with models {} and {}",
            self.flavor, self.base_url, self.embedding_model, self.generation_model
        );
        Ok(())
    }

    /// Check that the service answers at all
    #[inline]
    pub fn ping(&self) -> Result<()> {
        self.list_models().map(|_| ())
    }

    #[inline]
    pub fn list_models(&self) -> Result<Vec<String>> {
        match self.flavor {
            ApiFlavor::Ollama => {
                let response: OllamaModelsResponse = self.get_json("/api/tags")?;
                Ok(response.models.into_iter().map(|m| m.name).collect())
            }
            ApiFlavor::OpenAi => {
                let response: OpenAiModelsResponse = self.get_json("/v1/models")?;
                Ok(response.data.into_iter().map(|m| m.id).collect())
            }
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| RagError::Config(format!("invalid endpoint {}: {}", path, e)))
    }

    fn authorize<B>(&self, request: ureq::RequestBuilder<B>) -> ureq::RequestBuilder<B> {
        match &self.api_key {
            Some(ApiKey(key)) => request.header("Authorization", format!("Bearer {}", key)),
            None => request,
        }
    }

    fn get_json<R: DeserializeOwned>(&self, path: &str) -> Result<R> {
        let url = self.endpoint(path)?;
        debug!("GET {}", url);

        let response_text = self.make_request_with_retry(|| {
            self.authorize(self.agent.get(url.as_str()))
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;

        parse_response(&url, &response_text)
    }

    fn post_json<B: Serialize, R: DeserializeOwned>(&self, path: &str, body: &B) -> Result<R> {
        let url = self.endpoint(path)?;
        let request_json = serde_json::to_string(body)?;
        debug!("POST {} ({} bytes)", url, request_json.len());

        let response_text = self.make_request_with_retry(|| {
            self.authorize(self.agent.post(url.as_str()))
                .header("Content-Type", "application/json")
                .send(&request_json)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;

        parse_response(&url, &response_text)
    }

    fn make_request_with_retry<F>(&self, mut request_fn: F) -> Result<String>
    where
        F: FnMut() -> std::result::Result<String, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!("HTTP request attempt {}/{}", attempt, self.retry_attempts);

            match request_fn() {
                Ok(response_text) => {
                    debug!("Request succeeded on attempt {}", attempt);
                    return Ok(response_text);
                }
                Err(error) => {
                    match &error {
                        ureq::Error::StatusCode(status) if *status >= 500 => {
                            warn!(
                                "Server error (status {}), attempt {}/{}",
                                status, attempt, self.retry_attempts
                            );
                        }
                        ureq::Error::StatusCode(429) => {
                            warn!(
                                "Rate limited (status 429), attempt {}/{}",
                                attempt, self.retry_attempts
                            );
                        }
                        ureq::Error::StatusCode(status) => {
                            warn!("Client error (status {}), not retrying", status);
                            return Err(RagError::Remote(format!("client error: HTTP {}", status)));
                        }
                        ureq::Error::ConnectionFailed
                        | ureq::Error::HostNotFound
                        | ureq::Error::Timeout(_)
                        | ureq::Error::Io(_) => {
                            warn!(
                                "Transport error: {}, attempt {}/{}",
                                error, attempt, self.retry_attempts
                            );
                        }
                        _ => {
                            warn!("Non-retryable error: {}", error);
                            return Err(RagError::Remote(format!("request failed: {}", error)));
                        }
                    }

                    last_error = Some(error.to_string());

                    if attempt < self.retry_attempts {
                        let delay = self.backoff * EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1);
                        debug!("Waiting {:?} before retry", delay);
                        std::thread::sleep(delay);
                    }
                }
            }
        }

        error!("All retry attempts failed for request to {}", self.base_url);

        Err(RagError::Remote(format!(
            "request failed after {} attempts: {}",
            self.retry_attempts,
            last_error.unwrap_or_else(|| "no attempt was made".to_string())
        )))
    }
}

fn parse_response<R: DeserializeOwned>(url: &Url, text: &str) -> Result<R> {
    serde_json::from_str(text)
        .map_err(|e| RagError::Remote(format!("unexpected response from {}: {}", url, e)))
}

impl Embedder for RemoteClient {
    #[inline]
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!("Generating embedding for text (length: {})", text.len());
        let request = EmbedRequest {
            model: &self.embedding_model,
            input: text,
        };

        let embedding = match self.flavor {
            ApiFlavor::Ollama => {
                let response: OllamaEmbedResponse = self.post_json("/api/embed", &request)?;
                response.embeddings.into_iter().next()
            }
            ApiFlavor::OpenAi => {
                let response: OpenAiEmbedResponse = self.post_json("/v1/embeddings", &request)?;
                response.data.into_iter().next().map(|d| d.embedding)
            }
        };

        let embedding =
            embedding.ok_or_else(|| RagError::Remote("response held no embedding".to_string()))?;
        debug!("Generated embedding with {} dimensions", embedding.len());
        Ok(embedding)
    }
}

impl Generator for RemoteClient {
    #[inline]
    fn generate(&self, messages: &[ChatMessage]) -> Result<String> {
        debug!(
            "Requesting completion from {} with {} messages",
            self.generation_model,
            messages.len()
        );

        let content = match self.flavor {
            ApiFlavor::Ollama => {
                let request = ChatRequest {
                    model: &self.generation_model,
                    messages,
                    stream: Some(false),
                };
                let response: OllamaChatResponse = self.post_json("/api/chat", &request)?;
                response.message.and_then(|m| m.content)
            }
            ApiFlavor::OpenAi => {
                let request = ChatRequest {
                    model: &self.generation_model,
                    messages,
                    stream: None,
                };
                let response: OpenAiChatResponse =
                    self.post_json("/v1/chat/completions", &request)?;
                response
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|choice| choice.message.content)
            }
        };

        content.ok_or_else(|| RagError::Remote("response held no message content".to_string()))
    }
}
