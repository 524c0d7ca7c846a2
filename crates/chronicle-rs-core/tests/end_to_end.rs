//! Import, view and continue a conversation through the public services.

use chronicle_rs_config::{ImportConfig, RetrievalConfig, TasksConfig};
use chronicle_rs_core::{
    ChatService, DisplayContent, Importer, JsonSessionCatalog, MessageAssembler, SessionCatalog,
    SessionManager, TaskRegistry, stable_chat_id,
};
use chronicle_rs_memory::{LocalVectorBackend, MemoryStore};
use chronicle_rs_protocol::Role;
use chronicle_rs_test_utils::{ExportBuilder, NodeSpec, RecordingCompletion, WordHashEmbedder};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use tempfile::tempdir;

fn cited_chat() -> ExportBuilder {
    ExportBuilder::new("Citations")
        .times(1_700_000_000.0, 1_700_000_500.0)
        .node(NodeSpec::editable_context("Answer briefly."))
        .node(NodeSpec::user("Where is the tower?").created(1_700_000_010.0))
        .branch(NodeSpec::assistant("an abandoned draft"))
        .node(
            NodeSpec::assistant("It is in Paris【3†source】【3†source】.\n\n**Sources:**\n- a site")
                .created(1_700_000_020.0)
                .model("gpt-4o")
                .citations(vec![json!({"url": "https://example.com"})]),
        )
}

/// Imported chats render cleaned text and accept new live turns after them.
#[tokio::test]
async fn imported_chat_continues_live() {
    let temp = tempdir().expect("tempdir");
    let catalog = Arc::new(JsonSessionCatalog::new(temp.path()).expect("catalog"));
    let store = MemoryStore::new(
        Arc::new(LocalVectorBackend::open(temp.path().join("memory.jsonl")).expect("index")),
        Arc::new(WordHashEmbedder::new()),
    );
    let importer = Importer::new(
        catalog.clone(),
        store.clone(),
        TaskRegistry::from_config(&TasksConfig::default()),
        &ImportConfig::default(),
    );
    importer
        .import_export(&ExportBuilder::archive(&[cited_chat()]), None)
        .await
        .expect("import");
    let chat_id = stable_chat_id("Citations", 1_700_000_000.0);

    let sessions = SessionManager::new(catalog.clone(), store.clone());
    let view = sessions.view(&chat_id, 1, 40).await.expect("view");
    let units = &view.messages_page.messages;
    assert_eq!(units.len(), 2);
    assert_eq!(units[0].custom_instructions.as_deref(), Some("Answer briefly."));
    assert_eq!(units[1].content, DisplayContent::text("It is in Paris[CITATION:3]."));
    assert_eq!(units[1].model.as_deref(), Some("gpt-4o"));
    assert_eq!(units[1].citations.len(), 1);

    let completion = RecordingCompletion::screening("llama3-8b-8192", Vec::new(), "Near the river.");
    let chat = ChatService::new(
        catalog.clone(),
        store.clone(),
        Arc::new(completion.clone()),
        &RetrievalConfig::default(),
    );
    let reply = chat
        .send(&chat_id, "Which river flows past it?", "gpt-test", None)
        .await
        .expect("send");
    assert!(reply.persisted);

    let calls = completion.calls_for("gpt-test");
    let history = &calls[0].turns;
    assert_eq!(history.len(), 3);
    assert_eq!(history[1].content, "It is in Paris[CITATION:3].");

    let view = sessions.view(&chat_id, 1, 40).await.expect("view");
    let tail: Vec<(Role, Option<u64>)> = view
        .messages_page
        .messages
        .iter()
        .map(|unit| (unit.role, unit.sequence_index))
        .collect();
    assert_eq!(
        tail,
        vec![
            (Role::User, Some(0)),
            (Role::Assistant, Some(1)),
            (Role::User, Some(2)),
            (Role::Assistant, Some(3)),
        ]
    );
    let session = catalog.get(&chat_id).expect("get").expect("session");
    assert_eq!(session.model, None);
}

/// Assembling the same stored chat twice yields identical output.
#[tokio::test]
async fn assembly_is_repeatable() {
    let temp = tempdir().expect("tempdir");
    let catalog = Arc::new(JsonSessionCatalog::new(temp.path()).expect("catalog"));
    let store = MemoryStore::new(
        Arc::new(LocalVectorBackend::in_memory()),
        Arc::new(WordHashEmbedder::new()),
    );
    let importer = Importer::new(
        catalog,
        store.clone(),
        TaskRegistry::from_config(&TasksConfig::default()),
        &ImportConfig::default(),
    );
    importer
        .import_export(&ExportBuilder::archive(&[cited_chat()]), None)
        .await
        .expect("import");
    let chat_id = stable_chat_id("Citations", 1_700_000_000.0);

    let assembler = MessageAssembler::new(store);
    let first = assembler.assemble(&chat_id).await.expect("first");
    let second = assembler.assemble(&chat_id).await.expect("second");
    assert_eq!(
        serde_json::to_string(&first).expect("json"),
        serde_json::to_string(&second).expect("json")
    );
}
