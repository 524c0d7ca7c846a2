//! Configuration schema for Chronicle.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root config for a Chronicle installation.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChronicleConfig {
    #[serde(default, rename = "$schema")]
    pub schema: Option<String>,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub assembler: AssemblerConfig,
    #[serde(default)]
    pub import: ImportConfig,
    #[serde(default)]
    pub tasks: TasksConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

impl ChronicleConfig {
    /// Start building a config programmatically with defaults applied.
    pub fn builder() -> ChronicleConfigBuilder {
        ChronicleConfigBuilder::new()
    }

    /// Path of the memory collection file, resolved against the data dir.
    pub fn memory_path(&self) -> PathBuf {
        let collection = Path::new(&self.memory.collection);
        if collection.is_absolute() {
            collection.to_path_buf()
        } else {
            self.storage.data_dir().join(collection)
        }
    }
}

/// Builder for assembling a `ChronicleConfig` in code.
#[derive(Debug, Default, Clone)]
pub struct ChronicleConfigBuilder {
    config: ChronicleConfig,
}

impl ChronicleConfigBuilder {
    /// Create a new builder seeded with default config values.
    pub fn new() -> Self {
        Self {
            config: ChronicleConfig::default(),
        }
    }

    /// Replace the storage configuration.
    pub fn storage(mut self, storage: StorageConfig) -> Self {
        self.config.storage = storage;
        self
    }

    /// Replace the memory store configuration.
    pub fn memory(mut self, memory: MemoryConfig) -> Self {
        self.config.memory = memory;
        self
    }

    /// Replace the retrieval gate configuration.
    pub fn retrieval(mut self, retrieval: RetrievalConfig) -> Self {
        self.config.retrieval = retrieval;
        self
    }

    /// Replace the assembler configuration.
    pub fn assembler(mut self, assembler: AssemblerConfig) -> Self {
        self.config.assembler = assembler;
        self
    }

    /// Replace the import configuration.
    pub fn import(mut self, import: ImportConfig) -> Self {
        self.config.import = import;
        self
    }

    /// Replace the task registry configuration.
    pub fn tasks(mut self, tasks: TasksConfig) -> Self {
        self.config.tasks = tasks;
        self
    }

    /// Replace the LLM configuration.
    pub fn llm(mut self, llm: LlmConfig) -> Self {
        self.config.llm = llm;
        self
    }

    /// Finalize and return the built `ChronicleConfig`.
    pub fn build(self) -> ChronicleConfig {
        self.config
    }
}

/// Where catalog files and the memory collection live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl StorageConfig {
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> String {
    ".chronicle/storage".to_string()
}

/// Memory store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// When false the store runs in unavailable mode.
    #[serde(default = "default_memory_enabled")]
    pub enabled: bool,
    /// Collection file name, relative to the data dir unless absolute.
    #[serde(default = "default_collection")]
    pub collection: String,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: default_memory_enabled(),
            collection: default_collection(),
        }
    }
}

fn default_memory_enabled() -> bool {
    true
}

fn default_collection() -> String {
    "unified_memory.jsonl".to_string()
}

/// Retrieval gate and live chat settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Number of nearest candidates fetched before screening.
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    /// Model used for the yes/no relevance judgment.
    #[serde(default = "default_screening_model")]
    pub screening_model: String,
    /// Tokens treated as stopwords on top of the built-in set.
    #[serde(default)]
    pub extra_stopwords: Vec<String>,
    /// Display units replayed as history on each live turn.
    #[serde(default = "default_history_window")]
    pub history_window: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
            screening_model: default_screening_model(),
            extra_stopwords: Vec::new(),
            history_window: default_history_window(),
        }
    }
}

fn default_top_n() -> usize {
    5
}

fn default_screening_model() -> String {
    "llama3-8b-8192".to_string()
}

fn default_history_window() -> usize {
    10
}

/// Message assembler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblerConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

fn default_page_size() -> usize {
    40
}

/// Knowledge file chunking settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Chunk length in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

/// Background task registry bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TasksConfig {
    #[serde(default = "default_task_capacity")]
    pub capacity: usize,
    /// Seconds a finished task stays queryable.
    #[serde(default = "default_task_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            capacity: default_task_capacity(),
            ttl_secs: default_task_ttl_secs(),
        }
    }
}

fn default_task_capacity() -> usize {
    256
}

fn default_task_ttl_secs() -> u64 {
    3600
}

/// Completion and embedding provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Model used when a chat has no override.
    #[serde(default = "default_model")]
    pub default_model: String,
    /// Model used for embeddings; the default model when unset.
    #[serde(default)]
    pub embedding_model: Option<String>,
    /// Additional model ids registered with the provider.
    #[serde(default)]
    pub models: Vec<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            embedding_model: None,
            models: Vec::new(),
        }
    }
}

fn default_model() -> String {
    "llama3-70b-8192".to_string()
}
