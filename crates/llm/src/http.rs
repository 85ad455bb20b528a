//! HTTP-backed model provider.
//!
//! Speaks two wire dialects: OpenAI-compatible chat completions and
//! Anthropic's Messages API, chosen from the model name. Each request
//! carries a client-level timeout; a timeout surfaces as `LlmError::Timeout`
//! and callers treat it like any other call failure.

use crate::provider::{GenerateRequest, LlmError, LlmProvider};
use serde::Deserialize;
use serde_json::json;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

const CALL_TIMEOUT: Duration = Duration::from_secs(30);
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Which wire dialect a model speaks, inferred from its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Api {
    OpenAiChat,
    AnthropicMessages,
}

impl Api {
    pub fn for_model(model: &str) -> Self {
        if model.to_lowercase().starts_with("claude") {
            Self::AnthropicMessages
        } else {
            Self::OpenAiChat
        }
    }
}

/// Default API root per well-known model family; unknown names are assumed
/// to sit behind an OpenAI-compatible proxy and need an explicit base URL.
fn default_base_url(model: &str) -> &'static str {
    let m = model.to_lowercase();
    if m.starts_with("claude") {
        "https://api.anthropic.com"
    } else if m.starts_with("gemini") {
        "https://generativelanguage.googleapis.com/v1beta/openai"
    } else {
        "https://api.openai.com/v1"
    }
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Deserialize)]
struct MessagesReply {
    content: Vec<ReplyBlock>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ReplyBlock {
    Text { text: String },
    #[serde(other)]
    Other,
}

/// A model reachable over HTTP.
pub struct HttpProvider {
    api: Api,
    model: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl HttpProvider {
    pub fn new(model: String, api_key: String, base_url: Option<String>) -> Self {
        let api = Api::for_model(&model);
        let base = base_url.unwrap_or_else(|| default_base_url(&model).to_owned());
        let client = reqwest::Client::builder()
            .timeout(CALL_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            api,
            base_url: base.trim_end_matches('/').to_owned(),
            model,
            api_key,
            client,
        }
    }

    fn endpoint(&self) -> String {
        match self.api {
            Api::OpenAiChat => format!("{}/chat/completions", self.base_url),
            Api::AnthropicMessages => format!("{}/v1/messages", self.base_url),
        }
    }

    async fn call(&self, req: GenerateRequest) -> Result<String, LlmError> {
        let builder = match self.api {
            Api::OpenAiChat => self
                .client
                .post(self.endpoint())
                .bearer_auth(&self.api_key)
                .json(&json!({
                    "model": self.model,
                    "messages": [
                        {"role": "system", "content": req.system},
                        {"role": "user", "content": req.prompt},
                    ],
                    "max_tokens": req.max_tokens,
                    "temperature": req.temperature,
                })),
            Api::AnthropicMessages => self
                .client
                .post(self.endpoint())
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&json!({
                    "model": self.model,
                    "max_tokens": req.max_tokens,
                    "system": req.system,
                    "messages": [{"role": "user", "content": req.prompt}],
                    "temperature": req.temperature,
                })),
        };

        let resp = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout
            } else {
                LlmError::RequestFailed(e.to_string())
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            if status.as_u16() == 429 {
                return Err(LlmError::RateLimited);
            }
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::RequestFailed(format!("{status}: {body}")));
        }

        match self.api {
            Api::OpenAiChat => {
                let parsed: ChatCompletion = resp
                    .json()
                    .await
                    .map_err(|e| LlmError::RequestFailed(e.to_string()))?;
                Ok(parsed
                    .choices
                    .into_iter()
                    .next()
                    .map(|c| c.message.content)
                    .unwrap_or_default())
            }
            Api::AnthropicMessages => {
                let parsed: MessagesReply = resp
                    .json()
                    .await
                    .map_err(|e| LlmError::RequestFailed(e.to_string()))?;
                Ok(parsed
                    .content
                    .into_iter()
                    .filter_map(|b| match b {
                        ReplyBlock::Text { text } => Some(text),
                        ReplyBlock::Other => None,
                    })
                    .collect())
            }
        }
    }
}

impl LlmProvider for HttpProvider {
    fn name(&self) -> &str {
        match self.api {
            Api::OpenAiChat => "openai-chat",
            Api::AnthropicMessages => "anthropic-messages",
        }
    }

    fn generate(
        &self,
        request: GenerateRequest,
    ) -> Pin<Box<dyn Future<Output = Result<String, LlmError>> + Send + '_>> {
        Box::pin(self.call(request))
    }
}

/// Build a provider from `REVERIE_LLM_MODEL`, `REVERIE_LLM_API_KEY` and
/// optionally `REVERIE_LLM_BASE_URL`. `None` when model or key is unset.
pub fn from_env() -> Option<HttpProvider> {
    let model = std::env::var("REVERIE_LLM_MODEL").ok()?;
    let api_key = std::env::var("REVERIE_LLM_API_KEY").ok()?;
    let base_url = std::env::var("REVERIE_LLM_BASE_URL").ok();
    Some(HttpProvider::new(model, api_key, base_url))
}
