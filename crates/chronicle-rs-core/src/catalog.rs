//! Session and knowledge-source metadata persisted as JSON files.

use crate::error::CatalogError;
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const CHAT_STATE_FILE: &str = "chat_state.json";
pub const SOURCES_META_FILE: &str = "sources_meta.json";

/// Catalog entry for one chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSession {
    pub id: String,
    pub title: String,
    /// Creation time, epoch seconds.
    pub timestamp: f64,
    /// Epoch seconds of the latest change.
    pub last_updated: f64,
    #[serde(default)]
    pub archived: bool,
    /// Model override used for every turn of this chat.
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    ChatNew,
    ChatImport,
    File,
}

/// A knowledge source that retrieval can be restricted to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceEntry {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: SourceType,
    pub added_on: f64,
}

/// What an import upsert did to the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOutcome {
    Created,
    /// Existing chat replaced by newer data; its old records must go.
    Updated,
    /// Existing chat is at least as new as the import.
    Skipped,
}

impl ImportOutcome {
    pub fn is_written(&self) -> bool {
        !matches!(self, ImportOutcome::Skipped)
    }
}

/// Persistent metadata for chats and sources.
///
/// Methods returning `bool` report whether the id existed.
pub trait SessionCatalog: Send + Sync {
    fn get(&self, chat_id: &str) -> Result<Option<ConversationSession>, CatalogError>;
    fn create(
        &self,
        chat_id: &str,
        title: &str,
        timestamp: f64,
    ) -> Result<ConversationSession, CatalogError>;
    /// Insert an imported chat, or replace it when `update_time` is newer.
    fn import_upsert(
        &self,
        chat_id: &str,
        title: &str,
        create_time: f64,
        update_time: f64,
    ) -> Result<ImportOutcome, CatalogError>;
    /// Rename a chat and its source entry.
    fn rename(&self, chat_id: &str, title: &str) -> Result<bool, CatalogError>;
    fn set_archived(&self, chat_id: &str, archived: bool) -> Result<bool, CatalogError>;
    fn set_model(&self, chat_id: &str, model: &str) -> Result<bool, CatalogError>;
    /// Remove a chat and its source entry.
    fn delete(&self, chat_id: &str) -> Result<bool, CatalogError>;
    /// Chats with the given archived flag, most recently updated first.
    fn list(&self, archived: bool) -> Result<Vec<ConversationSession>, CatalogError>;
    fn add_source(
        &self,
        source_id: &str,
        name: &str,
        kind: SourceType,
    ) -> Result<SourceEntry, CatalogError>;
    fn remove_source(&self, source_id: &str) -> Result<bool, CatalogError>;
    /// All sources, most recently added first.
    fn list_sources(&self) -> Result<Vec<SourceEntry>, CatalogError>;

    fn archive(&self, chat_id: &str) -> Result<bool, CatalogError> {
        self.set_archived(chat_id, true)
    }

    fn unarchive(&self, chat_id: &str) -> Result<bool, CatalogError> {
        self.set_archived(chat_id, false)
    }
}

type ChatState = BTreeMap<String, ConversationSession>;
type SourcesMeta = BTreeMap<String, SourceEntry>;

/// Catalog stored as `chat_state.json` and `sources_meta.json` in one
/// directory.
///
/// Missing, unreadable or corrupt files read as empty. Every
/// read-modify-write cycle runs under one lock.
pub struct JsonSessionCatalog {
    chats_path: PathBuf,
    sources_path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonSessionCatalog {
    pub fn new(root: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let root = root.as_ref();
        fs::create_dir_all(root)?;
        info!("initialized session catalog (root={})", root.display());
        Ok(Self {
            chats_path: root.join(CHAT_STATE_FILE),
            sources_path: root.join(SOURCES_META_FILE),
            write_lock: Mutex::new(()),
        })
    }

    fn load_chats(&self) -> ChatState {
        load_json(&self.chats_path)
    }

    fn load_sources(&self) -> SourcesMeta {
        load_json(&self.sources_path)
    }

    fn modify_chat(
        &self,
        chat_id: &str,
        change: impl FnOnce(&mut ConversationSession),
    ) -> Result<bool, CatalogError> {
        let _guard = self.write_lock.lock();
        let mut chats = self.load_chats();
        let Some(chat) = chats.get_mut(chat_id) else {
            return Ok(false);
        };
        change(chat);
        chat.last_updated = now_seconds();
        save_json(&self.chats_path, &chats)?;
        Ok(true)
    }

    fn put_source(
        &self,
        source_id: &str,
        name: &str,
        kind: SourceType,
    ) -> Result<SourceEntry, CatalogError> {
        let mut sources = self.load_sources();
        let entry = SourceEntry {
            id: source_id.to_string(),
            name: name.to_string(),
            kind,
            added_on: now_seconds(),
        };
        sources.insert(source_id.to_string(), entry.clone());
        save_json(&self.sources_path, &sources)?;
        Ok(entry)
    }
}

impl SessionCatalog for JsonSessionCatalog {
    fn get(&self, chat_id: &str) -> Result<Option<ConversationSession>, CatalogError> {
        Ok(self.load_chats().remove(chat_id))
    }

    fn create(
        &self,
        chat_id: &str,
        title: &str,
        timestamp: f64,
    ) -> Result<ConversationSession, CatalogError> {
        let _guard = self.write_lock.lock();
        let mut chats = self.load_chats();
        let session = ConversationSession {
            id: chat_id.to_string(),
            title: title.to_string(),
            timestamp,
            last_updated: now_seconds(),
            archived: false,
            model: None,
        };
        chats.insert(chat_id.to_string(), session.clone());
        save_json(&self.chats_path, &chats)?;
        self.put_source(chat_id, title, SourceType::ChatNew)?;
        debug!("created chat session (id={})", chat_id);
        Ok(session)
    }

    fn import_upsert(
        &self,
        chat_id: &str,
        title: &str,
        create_time: f64,
        update_time: f64,
    ) -> Result<ImportOutcome, CatalogError> {
        let _guard = self.write_lock.lock();
        let mut chats = self.load_chats();
        let outcome = match chats.get_mut(chat_id) {
            Some(existing) if update_time > existing.last_updated => {
                existing.title = title.to_string();
                existing.timestamp = create_time;
                existing.last_updated = update_time;
                existing.archived = false;
                ImportOutcome::Updated
            }
            Some(_) => {
                debug!("skipping imported chat with no newer data (id={})", chat_id);
                return Ok(ImportOutcome::Skipped);
            }
            None => {
                chats.insert(
                    chat_id.to_string(),
                    ConversationSession {
                        id: chat_id.to_string(),
                        title: title.to_string(),
                        timestamp: create_time,
                        last_updated: update_time,
                        archived: false,
                        model: None,
                    },
                );
                ImportOutcome::Created
            }
        };
        save_json(&self.chats_path, &chats)?;
        self.put_source(chat_id, title, SourceType::ChatImport)?;
        debug!("imported chat session (id={}, outcome={:?})", chat_id, outcome);
        Ok(outcome)
    }

    fn rename(&self, chat_id: &str, title: &str) -> Result<bool, CatalogError> {
        if !self.modify_chat(chat_id, |chat| chat.title = title.to_string())? {
            return Ok(false);
        }
        let _guard = self.write_lock.lock();
        let mut sources = self.load_sources();
        if let Some(source) = sources.get_mut(chat_id) {
            source.name = title.to_string();
            save_json(&self.sources_path, &sources)?;
        }
        Ok(true)
    }

    fn set_archived(&self, chat_id: &str, archived: bool) -> Result<bool, CatalogError> {
        self.modify_chat(chat_id, |chat| chat.archived = archived)
    }

    fn set_model(&self, chat_id: &str, model: &str) -> Result<bool, CatalogError> {
        self.modify_chat(chat_id, |chat| chat.model = Some(model.to_string()))
    }

    fn delete(&self, chat_id: &str) -> Result<bool, CatalogError> {
        let _guard = self.write_lock.lock();
        let mut chats = self.load_chats();
        if chats.remove(chat_id).is_none() {
            return Ok(false);
        }
        save_json(&self.chats_path, &chats)?;
        let mut sources = self.load_sources();
        if sources.remove(chat_id).is_some() {
            save_json(&self.sources_path, &sources)?;
        }
        info!("deleted chat session (id={})", chat_id);
        Ok(true)
    }

    fn list(&self, archived: bool) -> Result<Vec<ConversationSession>, CatalogError> {
        let mut chats: Vec<ConversationSession> = self
            .load_chats()
            .into_values()
            .filter(|chat| chat.archived == archived)
            .collect();
        chats.sort_by(|a, b| {
            b.last_updated
                .total_cmp(&a.last_updated)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(chats)
    }

    fn add_source(
        &self,
        source_id: &str,
        name: &str,
        kind: SourceType,
    ) -> Result<SourceEntry, CatalogError> {
        let _guard = self.write_lock.lock();
        self.put_source(source_id, name, kind)
    }

    fn remove_source(&self, source_id: &str) -> Result<bool, CatalogError> {
        let _guard = self.write_lock.lock();
        let mut sources = self.load_sources();
        if sources.remove(source_id).is_none() {
            return Ok(false);
        }
        save_json(&self.sources_path, &sources)?;
        Ok(true)
    }

    fn list_sources(&self) -> Result<Vec<SourceEntry>, CatalogError> {
        let mut sources: Vec<SourceEntry> = self.load_sources().into_values().collect();
        sources.sort_by(|a, b| {
            b.added_on
                .total_cmp(&a.added_on)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(sources)
    }
}

fn load_json<T: DeserializeOwned + Default>(path: &Path) -> T {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return T::default(),
        Err(err) => {
            warn!(
                "unreadable catalog file, treating as empty (path={}, error={})",
                path.display(),
                err
            );
            return T::default();
        }
    };
    match serde_json::from_str::<Option<T>>(&contents) {
        Ok(value) => value.unwrap_or_default(),
        Err(err) => {
            warn!(
                "corrupt catalog file, treating as empty (path={}, error={})",
                path.display(),
                err
            );
            T::default()
        }
    }
}

fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<(), CatalogError> {
    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, serde_json::to_string_pretty(value)?)?;
    fs::rename(temp_path, path)?;
    Ok(())
}

pub(crate) fn now_seconds() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::{CHAT_STATE_FILE, ImportOutcome, JsonSessionCatalog, SessionCatalog, SourceType};
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn create_rename_archive_round_trip_through_disk() {
        let temp = tempdir().expect("tempdir");
        let catalog = JsonSessionCatalog::new(temp.path()).expect("catalog");
        let created = catalog.create("c1", "New Chat", 10.0).expect("create");
        assert_eq!(created.model, None);

        assert!(catalog.rename("c1", "Renamed").expect("rename"));
        assert!(catalog.archive("c1").expect("archive"));
        assert!(catalog.set_model("c1", "llama3-70b-8192").expect("model"));
        assert!(!catalog.rename("missing", "x").expect("rename"));

        let reopened = JsonSessionCatalog::new(temp.path()).expect("reopen");
        let chat = reopened.get("c1").expect("get").expect("chat");
        assert_eq!(chat.title, "Renamed");
        assert!(chat.archived);
        assert_eq!(chat.model.as_deref(), Some("llama3-70b-8192"));
        assert!(chat.last_updated >= created.last_updated);
        assert!(reopened.list(false).expect("active").is_empty());
        assert_eq!(reopened.list(true).expect("archived").len(), 1);

        let sources = reopened.list_sources().expect("sources");
        assert_eq!(sources[0].name, "Renamed");
        assert_eq!(sources[0].kind, SourceType::ChatNew);

        assert!(reopened.unarchive("c1").expect("unarchive"));
        assert_eq!(reopened.list(false).expect("active").len(), 1);
    }

    #[test]
    fn import_upsert_respects_update_time() {
        let temp = tempdir().expect("tempdir");
        let catalog = JsonSessionCatalog::new(temp.path()).expect("catalog");
        assert_eq!(
            catalog.import_upsert("c", "Old", 1.0, 100.0).expect("upsert"),
            ImportOutcome::Created
        );
        catalog.archive("c").expect("archive");
        let bumped = catalog.get("c").expect("get").expect("chat").last_updated;
        assert_eq!(
            catalog.import_upsert("c", "Same", 1.0, bumped).expect("upsert"),
            ImportOutcome::Skipped
        );
        assert_eq!(
            catalog.import_upsert("c", "New", 1.0, bumped + 10.0).expect("upsert"),
            ImportOutcome::Updated
        );
        let chat = catalog.get("c").expect("get").expect("chat");
        assert_eq!(chat.title, "New");
        assert!(!chat.archived);
        assert_eq!(catalog.list_sources().expect("sources")[0].kind, SourceType::ChatImport);
    }

    #[test]
    fn listing_orders_by_last_updated() {
        let temp = tempdir().expect("tempdir");
        let catalog = JsonSessionCatalog::new(temp.path()).expect("catalog");
        catalog.import_upsert("a", "A", 1.0, 10.0).expect("upsert");
        catalog.import_upsert("b", "B", 1.0, 30.0).expect("upsert");
        catalog.import_upsert("c", "C", 1.0, 20.0).expect("upsert");
        let ids: Vec<String> = catalog
            .list(false)
            .expect("list")
            .into_iter()
            .map(|chat| chat.id)
            .collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[test]
    fn delete_removes_chat_and_source() {
        let temp = tempdir().expect("tempdir");
        let catalog = JsonSessionCatalog::new(temp.path()).expect("catalog");
        catalog.create("c1", "Chat", 1.0).expect("create");
        catalog.add_source("file_1", "notes.md", SourceType::File).expect("source");
        assert!(catalog.delete("c1").expect("delete"));
        assert!(!catalog.delete("c1").expect("delete again"));
        let sources = catalog.list_sources().expect("sources");
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].id, "file_1");
        assert!(catalog.remove_source("file_1").expect("remove"));
    }

    #[test]
    fn corrupt_files_load_as_empty() {
        let temp = tempdir().expect("tempdir");
        std::fs::write(temp.path().join(CHAT_STATE_FILE), "{not json").expect("write");
        let catalog = JsonSessionCatalog::new(temp.path()).expect("catalog");
        assert!(catalog.list(false).expect("list").is_empty());
        catalog.create("c1", "Chat", 1.0).expect("create");
        assert_eq!(catalog.list(false).expect("list").len(), 1);
    }
}
