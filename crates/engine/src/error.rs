use reverie_llm::provider::LlmError;

/// Engine-level failures. Safety and stop conditions are NOT errors; they
/// produce well-formed closure cards and never reach this type.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("direction metadata could not be resolved")]
    InvalidDirection,
    #[error("model call failed: {0}")]
    Model(#[from] LlmError),
    /// Model responded but the content failed schema/format rules after the
    /// bounded salvage/retry protocol.
    #[error("model output unusable: {0}")]
    InvalidModelOutput(&'static str),
}

impl EngineError {
    /// True for bad input the caller can fix (4xx-equivalent); false for
    /// upstream/validation failures (5xx-equivalent).
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::MissingField(_) | Self::InvalidDirection)
    }
}
