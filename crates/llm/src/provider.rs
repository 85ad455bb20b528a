use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

/// A single text-generation request.
///
/// The engine treats the model as a black box: one system prompt, one user
/// prompt, raw text back. Structured output is requested via prompt
/// instructions and validated downstream, never trusted here.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub system: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl GenerateRequest {
    pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
            max_tokens: 1024,
            temperature: 0.7,
        }
    }
}

/// Error type for model calls. A timeout is just another call failure;
/// callers must not treat it differently from any other upstream error.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    #[error("rate limited")]
    RateLimited,
    #[error("request timed out")]
    Timeout,
    #[error("request failed: {0}")]
    RequestFailed(String),
}

/// Trait for model providers (OpenAI-compatible, Anthropic, mocks).
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    fn generate(
        &self,
        request: GenerateRequest,
    ) -> Pin<Box<dyn Future<Output = Result<String, LlmError>> + Send + '_>>;
}

/// Mock provider for testing. Returns the same fixed response every call.
#[derive(Debug, Clone)]
pub struct MockProvider {
    pub response: String,
}

impl MockProvider {
    pub fn new(response: impl Into<String>) -> Self {
        Self { response: response.into() }
    }
}

impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn generate(
        &self,
        _request: GenerateRequest,
    ) -> Pin<Box<dyn Future<Output = Result<String, LlmError>> + Send + '_>> {
        let response = self.response.clone();
        Box::pin(async move { Ok(response) })
    }
}

/// Scripted mock that plays queued responses in order and counts calls.
/// Used to test bounded-retry protocols, where the call count is the
/// assertion that matters.
pub struct ScriptedProvider {
    responses: Mutex<Vec<Result<String, String>>>,
    calls: Mutex<u32>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<Result<String, String>>) -> Self {
        let mut queue = responses;
        queue.reverse();
        Self {
            responses: Mutex::new(queue),
            calls: Mutex::new(0),
        }
    }

    /// Convenience: every entry is a success.
    pub fn ok(responses: Vec<&str>) -> Self {
        Self::new(responses.into_iter().map(|r| Ok(r.to_string())).collect())
    }

    /// Number of generate() calls made so far.
    pub fn call_count(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn generate(
        &self,
        _request: GenerateRequest,
    ) -> Pin<Box<dyn Future<Output = Result<String, LlmError>> + Send + '_>> {
        *self.calls.lock().unwrap() += 1;
        let next = self.responses.lock().unwrap().pop();
        Box::pin(async move {
            match next {
                Some(Ok(text)) => Ok(text),
                Some(Err(msg)) => Err(LlmError::RequestFailed(msg)),
                None => Err(LlmError::Unavailable("script exhausted".into())),
            }
        })
    }
}
