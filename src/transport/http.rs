use super::{CompletionBackend, TransportError};
use crate::tokens::ModelPricing;
use crate::types::{CompletionRequest, CompletionResponse, TokenUsage};
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::Proxy;
use serde::Deserialize;
use serde_json::json;
use std::env;
use std::time::Duration;
use tracing::debug;

/// OpenAI-compatible `chat/completions` backend.
pub struct HttpCompletionBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatBody {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

impl HttpCompletionBackend {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: Self::build_client()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
        })
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Reads `{PROVIDER}_BASE_URL` and `{PROVIDER}_API_KEY`.
    pub fn from_env(provider: &str) -> Result<Self> {
        let prefix = provider.to_uppercase().replace('-', "_");
        let base_url = env::var(format!("{}_BASE_URL", prefix)).map_err(|_| {
            Error::configuration_with_context(
                format!("{}_BASE_URL is not set", prefix),
                crate::ErrorContext::new()
                    .with_field_path(format!("{}_BASE_URL", prefix))
                    .with_source("http_backend"),
            )
        })?;
        let mut backend = Self::new(base_url)?;
        backend.api_key = env::var(format!("{}_API_KEY", prefix)).ok();
        Ok(backend)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build_client() -> Result<reqwest::Client> {
        // Per-attempt timeouts are enforced by the retry runner; this is a backstop.
        let timeout_secs = env::var("AI_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(120);

        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .pool_max_idle_per_host(
                env::var("AI_HTTP_POOL_MAX_IDLE_PER_HOST")
                    .ok()
                    .and_then(|s| s.parse::<usize>().ok())
                    .unwrap_or(32),
            )
            .pool_idle_timeout(Some(Duration::from_secs(
                env::var("AI_HTTP_POOL_IDLE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(90),
            )));

        if let Ok(proxy_url) = env::var("AI_PROXY_URL") {
            if let Ok(proxy) = Proxy::all(&proxy_url) {
                builder = builder.proxy(proxy);
            }
        }

        builder
            .build()
            .map_err(|e| Error::Transport(TransportError::Other(e.to_string())))
    }

    fn request_body(request: &CompletionRequest) -> serde_json::Value {
        let mut body = json!({
            "model": request.model,
            "messages": [{ "role": "user", "content": request.prompt }],
        });
        let params = &request.params;
        if let Some(t) = params.temperature {
            body["temperature"] = json!(t);
        }
        if let Some(p) = params.top_p {
            body["top_p"] = json!(p);
        }
        if let Some(m) = params.max_tokens {
            body["max_tokens"] = json!(m);
        }
        body
    }
}

#[async_trait]
impl CompletionBackend for HttpCompletionBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut req = self
            .client
            .post(&url)
            .json(&Self::request_body(&request))
            .header("x-docproc-task-id", request.task_id.as_str());
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| Error::Transport(TransportError::Http(e)))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::remote_status(status.as_u16(), text));
        }

        let body: ChatBody = resp
            .json()
            .await
            .map_err(|e| Error::remote(format!("malformed completion body: {}", e)))?;
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::remote("completion body has no message content"))?;
        let usage = body
            .usage
            .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();

        debug!(
            task_id = request.task_id.as_str(),
            model = request.model.as_str(),
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "completion received"
        );

        let mut response = CompletionResponse::new(content, usage);
        if let Some(pricing) = ModelPricing::for_model(&request.model) {
            response = response.with_cost(pricing.cost_of(&usage));
        }
        Ok(response)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
