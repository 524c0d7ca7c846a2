//! Core services for Chronicle.
//!
//! This crate owns export parsing, message assembly, the retrieval gate,
//! live chat turns, session and source catalogs, background import tasks and
//! the LLM provider adapter used by the CLI.

pub mod assembler;
pub mod catalog;
pub mod chat;
pub mod error;
pub mod export;
pub mod import;
pub mod llm;
pub mod retrieval;
pub mod sessions;
pub mod tasks;

/// Display units and the assembler pipeline.
pub use assembler::{
    ContentPart, DETAILS_LABEL, DisplayContent, DisplayUnit, MessageAssembler, MessagePage,
    assemble_records, merge_hidden_steps, order_records, paginate, rewrite_citations,
};
/// Chat and source metadata persistence.
pub use catalog::{
    ConversationSession, ImportOutcome, JsonSessionCatalog, SessionCatalog, SourceEntry,
    SourceType,
};
pub use chat::{COMPLETION_FAILURE_PREFIX, ChatReply, ChatService};
pub use error::{CatalogError, ChronicleCoreError};
/// Export archive parsing.
pub use export::{ConversationExport, ParsedExport, UNTITLED_CHAT, parse_conversation, parse_export};
pub use import::{ImportSummary, Importer, split_text_into_chunks};
/// Provider selection and adapters.
pub use llm::{LlmEmbedder, LlmRegistry, ProviderKind, context_length};
pub use retrieval::{GateExit, GateOutcome, RetrievalGate};
pub use sessions::{ChatView, SessionManager, stable_chat_id};
pub use tasks::{TaskHandle, TaskRegistry, TaskState, TaskStatus};
