//! One live chat turn, end to end.

use crate::assembler::MessageAssembler;
use crate::catalog::{SessionCatalog, now_seconds};
use crate::error::ChronicleCoreError;
use crate::retrieval::{GateExit, RetrievalGate};
use chronicle_rs_config::RetrievalConfig;
use chronicle_rs_memory::{MemoryStore, MessageRecord, SourceKind};
use chronicle_rs_protocol::{ChatTurn, CompletionService, Role};
use log::{info, warn};
use std::sync::Arc;

/// Prefix of the reply returned when the completion service fails.
pub const COMPLETION_FAILURE_PREFIX: &str = "Sorry, I encountered an error with the AI model: ";

/// Assistant reply to a turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatReply {
    pub text: String,
    /// Model the turn was sent to.
    pub model: String,
    /// Where the retrieval gate stopped; `None` for ephemeral turns.
    pub gate: Option<GateExit>,
    /// True when both sides of the turn were stored.
    pub persisted: bool,
}

pub struct ChatService {
    catalog: Arc<dyn SessionCatalog>,
    store: MemoryStore,
    assembler: MessageAssembler,
    gate: RetrievalGate,
    completion: Arc<dyn CompletionService>,
    history_window: usize,
}

impl ChatService {
    pub fn new(
        catalog: Arc<dyn SessionCatalog>,
        store: MemoryStore,
        completion: Arc<dyn CompletionService>,
        config: &RetrievalConfig,
    ) -> Self {
        Self {
            gate: RetrievalGate::new(store.clone(), completion.clone(), config),
            assembler: MessageAssembler::new(store.clone()),
            catalog,
            store,
            completion,
            history_window: config.history_window,
        }
    }

    /// Answer `text` inside a stored chat.
    ///
    /// The session's model override wins over `model`. A failed completion
    /// comes back as an apology reply and nothing is stored.
    pub async fn send(
        &self,
        chat_id: &str,
        text: &str,
        model: &str,
        source_ids: Option<&[String]>,
    ) -> Result<ChatReply, ChronicleCoreError> {
        let session = self
            .catalog
            .get(chat_id)?
            .ok_or_else(|| ChronicleCoreError::ChatNotFound(chat_id.to_string()))?;

        let outcome = self.gate.gate(text, source_ids).await;
        let history = self.assembler.recent(chat_id, self.history_window).await?;
        let first_turn = history.is_empty();
        let model = session.model.clone().unwrap_or_else(|| model.to_string());

        let mut turns: Vec<ChatTurn> = history
            .iter()
            .map(|unit| ChatTurn::new(unit.role, unit.plain_text()))
            .collect();
        turns.push(ChatTurn::user(outcome.prompt));

        let reply = match self.completion.complete(&turns, &model).await {
            Ok(reply) => reply,
            Err(err) => {
                warn!(
                    "completion failed, turn not stored (chat_id={}, model={}, error={})",
                    chat_id, model, err
                );
                return Ok(ChatReply {
                    text: format!("{COMPLETION_FAILURE_PREFIX}{err}"),
                    model,
                    gate: Some(outcome.exit),
                    persisted: false,
                });
            }
        };

        let persisted = self.persist_turn(chat_id, text, &reply, &model).await?;
        if persisted && first_turn {
            self.catalog.set_model(chat_id, &model)?;
        }
        info!(
            "chat turn answered (chat_id={}, model={}, gate={:?}, history={}, persisted={})",
            chat_id,
            model,
            outcome.exit,
            history.len(),
            persisted
        );
        Ok(ChatReply {
            text: reply,
            model,
            gate: Some(outcome.exit),
            persisted,
        })
    }

    /// Single-shot turn with no retrieval, history or storage.
    pub async fn send_ephemeral(&self, text: &str, model: &str) -> ChatReply {
        let turns = [ChatTurn::user(text)];
        let text = match self.completion.complete(&turns, model).await {
            Ok(reply) => reply,
            Err(err) => {
                warn!("ephemeral completion failed (model={}, error={})", model, err);
                format!("{COMPLETION_FAILURE_PREFIX}{err}")
            }
        };
        ChatReply {
            text,
            model: model.to_string(),
            gate: None,
            persisted: false,
        }
    }

    async fn persist_turn(
        &self,
        chat_id: &str,
        user_text: &str,
        reply: &str,
        model: &str,
    ) -> Result<bool, ChronicleCoreError> {
        let mut user = MessageRecord::new(chat_id, SourceKind::LiveChat, Role::User, user_text);
        user.created_at = now_seconds();
        let mut assistant = MessageRecord::new(chat_id, SourceKind::LiveChat, Role::Assistant, reply);
        assistant.created_at = now_seconds();
        assistant.model = Some(model.to_string());

        let stored_user = self.store.append(user).await?;
        let stored_assistant = self.store.append(assistant).await?;
        Ok(stored_user.is_some() && stored_assistant.is_some())
    }
}
