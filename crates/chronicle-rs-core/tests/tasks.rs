//! Background import and ingest tasks observed through the task registry.

use chronicle_rs_config::{ImportConfig, TasksConfig};
use chronicle_rs_core::{
    Importer, JsonSessionCatalog, SessionCatalog, SessionManager, SourceType, TaskHandle,
    TaskRegistry, TaskState, TaskStatus,
};
use chronicle_rs_memory::{LocalVectorBackend, MemoryStore};
use chronicle_rs_test_utils::{ExportBuilder, FailingEmbedder, NodeSpec, WordHashEmbedder};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

async fn wait_for(handle: &TaskHandle) -> TaskStatus {
    for _ in 0..200 {
        if let Some(status) = handle.status().filter(TaskStatus::is_finished) {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("task {} did not finish", handle.id());
}

fn importer(catalog: Arc<JsonSessionCatalog>, store: MemoryStore, chunk_size: usize) -> Importer {
    Importer::new(
        catalog,
        store,
        TaskRegistry::from_config(&TasksConfig::default()),
        &ImportConfig {
            chunk_size,
            chunk_overlap: 4,
        },
    )
}

fn memory() -> MemoryStore {
    MemoryStore::new(
        Arc::new(LocalVectorBackend::in_memory()),
        Arc::new(WordHashEmbedder::new()),
    )
}

/// A spawned import completes with the summary message.
#[tokio::test]
async fn spawned_import_reports_summary() {
    let temp = tempdir().expect("tempdir");
    let catalog = Arc::new(JsonSessionCatalog::new(temp.path()).expect("catalog"));
    let importer = importer(catalog.clone(), memory(), 1000);
    let export = ExportBuilder::archive(&[
        ExportBuilder::new("One").node(NodeSpec::user("alpha")),
        ExportBuilder::new("Two").node(NodeSpec::user("beta")),
    ]);

    let handle = importer.spawn_import(export);
    let status = wait_for(&handle).await;
    assert_eq!(status.state, TaskState::Completed);
    assert_eq!(status.progress, 100);
    assert_eq!(
        status.message,
        "Import complete. Added 2 new/updated chats. Skipped 0 duplicates."
    );
    assert_eq!(catalog.list(false).expect("list").len(), 2);
    assert_eq!(
        importer.task_status(handle.id()).expect("status").state,
        TaskState::Completed
    );
}

/// Embedding failures surface as a failed task.
#[tokio::test]
async fn spawned_import_failure_marks_task_failed() {
    let temp = tempdir().expect("tempdir");
    let catalog = Arc::new(JsonSessionCatalog::new(temp.path()).expect("catalog"));
    let store = MemoryStore::new(
        Arc::new(LocalVectorBackend::in_memory()),
        Arc::new(FailingEmbedder::new("embedding service down")),
    );
    let importer = importer(catalog, store, 1000);
    let export = ExportBuilder::archive(&[ExportBuilder::new("One").node(NodeSpec::user("alpha"))]);

    let handle = importer.spawn_import(export);
    let status = wait_for(&handle).await;
    assert_eq!(status.state, TaskState::Failed);
    assert!(status.message.starts_with("An error occurred: "));
    assert!(status.message.contains("embedding service down"));
}

/// Ingested files are chunked and listed as file sources.
#[tokio::test]
async fn spawned_ingest_stores_chunks() {
    let temp = tempdir().expect("tempdir");
    let catalog = Arc::new(JsonSessionCatalog::new(temp.path()).expect("catalog"));
    let store = memory();
    let importer = importer(catalog.clone(), store.clone(), 10);

    let handle = importer
        .spawn_ingest("notes.txt".to_string(), "abcdefghijklmnopqrstuvwxyz".to_string())
        .expect("spawn");
    let status = wait_for(&handle).await;
    assert_eq!(status.state, TaskState::Completed);

    let sources = catalog.list_sources().expect("sources");
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].kind, SourceType::File);
    assert_eq!(sources[0].name, "notes.txt");
    assert!(status.message.contains(&sources[0].id));

    let mut chunks = store.records_for_source(&sources[0].id).await.expect("chunks");
    chunks.sort_by_key(|record| record.sequence_index);
    let ids: Vec<String> = chunks.iter().map(|record| record.id.clone()).collect();
    let expected: Vec<String> = (0..4).map(|i| format!("{}chunk{i}", sources[0].id)).collect();
    assert_eq!(ids, expected);
    assert_eq!(chunks[0].source_name.as_deref(), Some("notes.txt"));

    let sessions = SessionManager::new(catalog.clone(), store.clone());
    let removed = sessions.delete_source(&sources[0].id).await.expect("delete");
    assert_eq!(removed, 4);
    assert!(catalog.list_sources().expect("sources").is_empty());
}

/// Unsupported document types are rejected before a task exists.
#[tokio::test]
async fn unsupported_documents_create_no_task() {
    let temp = tempdir().expect("tempdir");
    let catalog = Arc::new(JsonSessionCatalog::new(temp.path()).expect("catalog"));
    let importer = importer(catalog, memory(), 1000);
    let result = importer.spawn_ingest("deck.pdf".to_string(), "binary".to_string());
    assert!(result.is_err());
    assert!(importer.tasks().is_empty());
}
