//! Chat session management over the catalog and the memory store.

use crate::assembler::{MessageAssembler, MessagePage};
use crate::catalog::{ConversationSession, SessionCatalog, SourceEntry, SourceType, now_seconds};
use crate::error::ChronicleCoreError;
use chrono::{Local, TimeZone};
use chronicle_rs_memory::MemoryStore;
use log::info;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// Stable chat id derived from a title and a creation time.
pub fn stable_chat_id(title: &str, timestamp: f64) -> String {
    let seed = format!("{title}-{timestamp}");
    Uuid::new_v5(&Uuid::NAMESPACE_OID, seed.as_bytes())
        .simple()
        .to_string()
}

/// A session with one page of its messages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatView {
    pub session: ConversationSession,
    pub messages_page: MessagePage,
}

pub struct SessionManager {
    catalog: Arc<dyn SessionCatalog>,
    store: MemoryStore,
    assembler: MessageAssembler,
}

impl SessionManager {
    pub fn new(catalog: Arc<dyn SessionCatalog>, store: MemoryStore) -> Self {
        Self {
            assembler: MessageAssembler::new(store.clone()),
            catalog,
            store,
        }
    }

    /// Create an empty chat titled after the current local time.
    pub fn create_chat(&self) -> Result<ConversationSession, ChronicleCoreError> {
        let timestamp = now_seconds();
        let title = match Local.timestamp_millis_opt((timestamp * 1000.0) as i64).single() {
            Some(local) => format!("New Chat - {}", local.format("%Y-%m-%d %H:%M")),
            None => "New Chat".to_string(),
        };
        let chat_id = stable_chat_id(&title, timestamp);
        let session = self.catalog.create(&chat_id, &title, timestamp)?;
        info!("created chat (id={}, title={})", session.id, session.title);
        Ok(session)
    }

    pub fn get(&self, chat_id: &str) -> Result<Option<ConversationSession>, ChronicleCoreError> {
        Ok(self.catalog.get(chat_id)?)
    }

    /// Session metadata plus one page of display units.
    pub async fn view(
        &self,
        chat_id: &str,
        page: usize,
        page_size: usize,
    ) -> Result<ChatView, ChronicleCoreError> {
        let session = self
            .catalog
            .get(chat_id)?
            .ok_or_else(|| ChronicleCoreError::ChatNotFound(chat_id.to_string()))?;
        let messages_page = self.assembler.page(chat_id, page, page_size).await?;
        Ok(ChatView {
            session,
            messages_page,
        })
    }

    pub fn rename(&self, chat_id: &str, title: &str) -> Result<(), ChronicleCoreError> {
        self.require(chat_id, self.catalog.rename(chat_id, title)?)
    }

    pub fn archive(&self, chat_id: &str) -> Result<(), ChronicleCoreError> {
        self.require(chat_id, self.catalog.archive(chat_id)?)
    }

    pub fn unarchive(&self, chat_id: &str) -> Result<(), ChronicleCoreError> {
        self.require(chat_id, self.catalog.unarchive(chat_id)?)
    }

    pub fn set_model(&self, chat_id: &str, model: &str) -> Result<(), ChronicleCoreError> {
        self.require(chat_id, self.catalog.set_model(chat_id, model)?)
    }

    /// Remove the chat, its source entry and every stored record.
    pub async fn delete(&self, chat_id: &str) -> Result<(), ChronicleCoreError> {
        self.require(chat_id, self.catalog.delete(chat_id)?)?;
        self.store.delete_source(chat_id).await?;
        Ok(())
    }

    pub fn list_chats(&self) -> Result<Vec<ConversationSession>, ChronicleCoreError> {
        Ok(self.catalog.list(false)?)
    }

    pub fn list_archived(&self) -> Result<Vec<ConversationSession>, ChronicleCoreError> {
        Ok(self.catalog.list(true)?)
    }

    pub fn list_sources(&self) -> Result<Vec<SourceEntry>, ChronicleCoreError> {
        Ok(self.catalog.list_sources()?)
    }

    /// Remove a knowledge file source and its chunks.
    ///
    /// Chat sources are removed with [`SessionManager::delete`] instead.
    pub async fn delete_source(&self, source_id: &str) -> Result<usize, ChronicleCoreError> {
        let is_file = self
            .catalog
            .list_sources()?
            .iter()
            .any(|source| source.id == source_id && source.kind == SourceType::File);
        if !is_file {
            return Err(ChronicleCoreError::SourceNotFound(source_id.to_string()));
        }
        self.catalog.remove_source(source_id)?;
        Ok(self.store.delete_source(source_id).await?)
    }

    fn require(&self, chat_id: &str, found: bool) -> Result<(), ChronicleCoreError> {
        if found {
            Ok(())
        } else {
            Err(ChronicleCoreError::ChatNotFound(chat_id.to_string()))
        }
    }
}
