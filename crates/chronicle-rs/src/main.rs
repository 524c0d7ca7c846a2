//! Command-line client for a local Chronicle archive.

use anyhow::{Context, bail};
use async_trait::async_trait;
use chronicle_rs::init_logging;
use chronicle_rs_config::ChronicleConfig;
use chronicle_rs_core::{
    ChatService, Importer, JsonSessionCatalog, LlmEmbedder, LlmRegistry, SessionManager,
    TaskHandle, TaskRegistry, TaskState, context_length,
};
use chronicle_rs_memory::{Embedder, MemoryError, MemoryStore};
use clap::{Parser, Subcommand};
use log::{debug, info, warn};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const API_KEY_VARS: &[&str] = &["CHRONICLE_API_KEY", "OPENAI_API_KEY"];

/// Command-line options for the Chronicle client.
#[derive(Parser)]
#[command(name = "chronicle", version)]
struct Cli {
    /// Optional path to a chronicle.json5 config file
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Import a conversations.json export
    Import { file: PathBuf },
    /// Store a .txt or .md file as a knowledge source
    Ingest { file: PathBuf },
    /// List chats, most recently updated first
    Chats {
        #[arg(long)]
        archived: bool,
    },
    /// Print one page of a chat
    Show {
        chat_id: String,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long)]
        page_size: Option<usize>,
    },
    /// Start an empty chat
    New,
    /// Send a message to a chat
    Ask {
        chat_id: String,
        text: String,
        /// Model to use when the chat has none pinned
        #[arg(long)]
        model: Option<String>,
        /// Limit retrieval to these source ids
        #[arg(long = "source")]
        sources: Vec<String>,
    },
    /// Ask once without history, retrieval or storage
    Ephemeral {
        text: String,
        #[arg(long)]
        model: Option<String>,
    },
    Rename {
        chat_id: String,
        title: String,
    },
    Archive {
        chat_id: String,
    },
    Unarchive {
        chat_id: String,
    },
    /// Pin the model a chat uses
    SetModel {
        chat_id: String,
        model: String,
    },
    /// Delete a chat and its messages
    Delete {
        chat_id: String,
    },
    /// List chat and file sources
    Sources,
    /// Delete a knowledge file and its chunks
    DeleteSource {
        source_id: String,
    },
    /// List configured models, largest context first
    Models,
}

/// Embedder used when no API key is configured.
struct UnconfiguredEmbedder {
    reason: String,
}

#[async_trait]
impl Embedder for UnconfiguredEmbedder {
    async fn embed(&self, _texts: Vec<String>) -> Result<Vec<Vec<f32>>, MemoryError> {
        Err(MemoryError::Embedding(self.reason.clone()))
    }
}

struct Services {
    config: ChronicleConfig,
    registry: Arc<LlmRegistry>,
    sessions: SessionManager,
    chat: ChatService,
    importer: Importer,
}

impl Services {
    fn build(config: ChronicleConfig) -> anyhow::Result<Self> {
        let registry = Arc::new(match api_key() {
            Some(key) => LlmRegistry::openai_compatible(key),
            None => {
                warn!("no api key set (vars={})", API_KEY_VARS.join(","));
                LlmRegistry::new()
            }
        });

        let embedding_model = config
            .llm
            .embedding_model
            .clone()
            .unwrap_or_else(|| config.llm.default_model.clone());
        let embedder: Arc<dyn Embedder> = match registry.provider(&embedding_model) {
            Ok(provider) => Arc::new(LlmEmbedder::new(provider)),
            Err(err) => Arc::new(UnconfiguredEmbedder {
                reason: format!("embedding model unavailable: {err}"),
            }),
        };

        let store = if config.memory.enabled {
            MemoryStore::open_local(config.memory_path(), embedder)
        } else {
            info!("memory disabled by config");
            MemoryStore::unavailable(embedder)
        };
        let catalog = Arc::new(
            JsonSessionCatalog::new(config.storage.data_dir())
                .context("failed to open session catalog")?,
        );

        let sessions = SessionManager::new(catalog.clone(), store.clone());
        let chat = ChatService::new(
            catalog.clone(),
            store.clone(),
            registry.clone(),
            &config.retrieval,
        );
        let importer = Importer::new(
            catalog,
            store,
            TaskRegistry::from_config(&config.tasks),
            &config.import,
        );
        Ok(Self {
            config,
            registry,
            sessions,
            chat,
            importer,
        })
    }

    fn model_or_default(&self, model: Option<String>) -> String {
        model.unwrap_or_else(|| self.config.llm.default_model.clone())
    }
}

fn api_key() -> Option<String> {
    API_KEY_VARS
        .iter()
        .find_map(|var| std::env::var(var).ok())
        .filter(|key| !key.trim().is_empty())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ChronicleConfig> {
    if let Some(path) = path {
        info!("loading config from path: {}", path.display());
        return ChronicleConfig::load_from_path(path).context("failed to load config");
    }
    let cwd = std::env::current_dir().context("cwd")?;
    info!("loading layered config from cwd: {}", cwd.display());
    let layered = ChronicleConfig::load_layered(&cwd).context("failed to load layered config")?;
    debug!("layered config loaded (layers={})", layered.layers.len());
    Ok(layered.config)
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Poll a background task until it finishes, echoing progress changes.
async fn follow_task(importer: &Importer, handle: &TaskHandle) -> anyhow::Result<()> {
    let mut last_message = String::new();
    loop {
        let status = importer.task_status(handle.id())?;
        if status.message != last_message {
            println!("[{:>3}%] {}", status.progress, status.message);
            last_message = status.message.clone();
        }
        match status.state {
            TaskState::Processing => tokio::time::sleep(Duration::from_millis(100)).await,
            TaskState::Completed => return Ok(()),
            TaskState::Failed => bail!("task {} failed", handle.id()),
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let services = Services::build(config)?;

    match cli.command {
        Command::Import { file } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let document: Value =
                serde_json::from_str(&raw).context("export is not valid JSON")?;
            let handle = services.importer.spawn_import(document);
            follow_task(&services.importer, &handle).await?;
        }
        Command::Ingest { file } => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let filename = file
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_else(|| file.display().to_string());
            let handle = services.importer.spawn_ingest(filename, content)?;
            follow_task(&services.importer, &handle).await?;
        }
        Command::Chats { archived } => {
            let chats = if archived {
                services.sessions.list_archived()?
            } else {
                services.sessions.list_chats()?
            };
            print_json(&chats)?;
        }
        Command::Show {
            chat_id,
            page,
            page_size,
        } => {
            let page_size = page_size.unwrap_or(services.config.assembler.page_size);
            let view = services.sessions.view(&chat_id, page, page_size).await?;
            print_json(&view)?;
        }
        Command::New => print_json(&services.sessions.create_chat()?)?,
        Command::Ask {
            chat_id,
            text,
            model,
            sources,
        } => {
            let model = services.model_or_default(model);
            let sources = (!sources.is_empty()).then_some(sources);
            let reply = services
                .chat
                .send(&chat_id, &text, &model, sources.as_deref())
                .await?;
            debug!(
                "reply received (model={}, gate={:?}, persisted={})",
                reply.model, reply.gate, reply.persisted
            );
            println!("{}", reply.text);
        }
        Command::Ephemeral { text, model } => {
            let model = services.model_or_default(model);
            let reply = services.chat.send_ephemeral(&text, &model).await;
            println!("{}", reply.text);
        }
        Command::Rename { chat_id, title } => services.sessions.rename(&chat_id, &title)?,
        Command::Archive { chat_id } => services.sessions.archive(&chat_id)?,
        Command::Unarchive { chat_id } => services.sessions.unarchive(&chat_id)?,
        Command::SetModel { chat_id, model } => services.sessions.set_model(&chat_id, &model)?,
        Command::Delete { chat_id } => services.sessions.delete(&chat_id).await?,
        Command::Sources => print_json(&services.sessions.list_sources()?)?,
        Command::DeleteSource { source_id } => {
            let removed = services.sessions.delete_source(&source_id).await?;
            println!("removed {removed} chunks");
        }
        Command::Models => {
            let mut models = services.config.llm.models.clone();
            if !models.contains(&services.config.llm.default_model) {
                models.push(services.config.llm.default_model.clone());
            }
            models.sort_by(|a, b| context_length(b).cmp(&context_length(a)).then_with(|| a.cmp(b)));
            for model in models {
                let built = services.registry.provider(&model).is_ok();
                println!("{model}\tcontext={}\tavailable={built}", context_length(&model));
            }
        }
    }
    Ok(())
}

/// Entry point for the Chronicle CLI.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();
    run(cli).await
}

#[cfg(test)]
mod tests {
    use super::{Cli, Command};
    use clap::Parser;
    use pretty_assertions::assert_eq;

    #[test]
    fn ask_collects_repeated_sources() {
        let cli = Cli::try_parse_from([
            "chronicle",
            "ask",
            "chat-1",
            "what did we decide?",
            "--source",
            "file_a",
            "--source",
            "file_b",
        ])
        .expect("parse");
        match cli.command {
            Command::Ask {
                chat_id,
                sources,
                model,
                ..
            } => {
                assert_eq!(chat_id, "chat-1");
                assert_eq!(sources, vec!["file_a".to_string(), "file_b".to_string()]);
                assert_eq!(model, None);
            }
            _ => panic!("expected ask"),
        }
    }

    #[test]
    fn show_defaults_to_first_page() {
        let cli = Cli::try_parse_from(["chronicle", "show", "chat-1"]).expect("parse");
        match cli.command {
            Command::Show {
                page, page_size, ..
            } => {
                assert_eq!(page, 1);
                assert_eq!(page_size, None);
            }
            _ => panic!("expected show"),
        }
    }
}
