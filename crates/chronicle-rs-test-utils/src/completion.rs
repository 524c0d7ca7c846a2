use async_trait::async_trait;
use chronicle_rs_protocol::{ChatTurn, CompletionError, CompletionService};
use parking_lot::Mutex;
use std::sync::Arc;

/// Always answers with the same text.
#[derive(Debug, Clone)]
pub struct FixedCompletion {
    reply: String,
}

impl FixedCompletion {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
        }
    }
}

#[async_trait]
impl CompletionService for FixedCompletion {
    async fn complete(&self, _turns: &[ChatTurn], _model: &str) -> Result<String, CompletionError> {
        Ok(self.reply.clone())
    }
}

/// Always fails with a provider error.
#[derive(Debug, Clone)]
pub struct FailingCompletion {
    message: String,
}

impl FailingCompletion {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl CompletionService for FailingCompletion {
    async fn complete(&self, _turns: &[ChatTurn], _model: &str) -> Result<String, CompletionError> {
        Err(CompletionError::Provider(self.message.clone()))
    }
}

/// One call observed by [`RecordingCompletion`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub model: String,
    pub turns: Vec<ChatTurn>,
}

impl RecordedCall {
    /// Content of the final turn.
    pub fn last_content(&self) -> &str {
        self.turns.last().map_or("", |turn| turn.content.as_str())
    }
}

type Responder = dyn Fn(&[ChatTurn], &str) -> Result<String, CompletionError> + Send + Sync;

/// Completion service driven by a closure that records every call.
#[derive(Clone)]
pub struct RecordingCompletion {
    responder: Arc<Responder>,
    pub calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl RecordingCompletion {
    pub fn new(
        responder: impl Fn(&[ChatTurn], &str) -> Result<String, CompletionError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Arc::new(responder),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Screening calls answer YES when the prompt contains any marker;
    /// every other model receives `answer`.
    pub fn screening(
        screening_model: impl Into<String>,
        relevant_markers: Vec<String>,
        answer: impl Into<String>,
    ) -> Self {
        let screening_model = screening_model.into();
        let answer = answer.into();
        Self::new(move |turns, model| {
            if model != screening_model {
                return Ok(answer.clone());
            }
            let prompt = turns.last().map_or("", |turn| turn.content.as_str());
            if relevant_markers.iter().any(|marker| prompt.contains(marker)) {
                Ok("YES".to_string())
            } else {
                Ok("NO".to_string())
            }
        })
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn calls_for(&self, model: &str) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.model == model)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl CompletionService for RecordingCompletion {
    async fn complete(&self, turns: &[ChatTurn], model: &str) -> Result<String, CompletionError> {
        self.calls.lock().push(RecordedCall {
            model: model.to_string(),
            turns: turns.to_vec(),
        });
        (self.responder)(turns, model)
    }
}
