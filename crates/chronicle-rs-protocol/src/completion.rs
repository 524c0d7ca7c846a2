use crate::ChatTurn;
use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by a completion service.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// No provider is registered for the requested model.
    #[error("unknown model: {0}")]
    UnknownModel(String),
    /// The provider rejected or failed the request.
    #[error("provider error: {0}")]
    Provider(String),
    /// The provider answered without any text.
    #[error("empty completion")]
    Empty,
}

/// Generates text from an ordered chat history.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Complete `turns` with the given model, returning the reply text.
    async fn complete(&self, turns: &[ChatTurn], model: &str) -> Result<String, CompletionError>;
}
