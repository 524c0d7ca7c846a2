//! Adapters from `autoagents-llm` providers to the completion and embedding
//! contracts.

use async_trait::async_trait;
use autoagents_llm::LLMProvider;
use autoagents_llm::backends::openai::OpenAI;
use autoagents_llm::builder::LLMBuilder;
use autoagents_llm::chat::{ChatMessage, ChatRole, MessageType};
use chronicle_rs_memory::{Embedder, MemoryError};
use chronicle_rs_protocol::{ChatTurn, CompletionError, CompletionService, Role};
use log::{debug, info};
use parking_lot::Mutex;
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

/// OpenAI-compatible service an API key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Groq,
    OpenRouter,
    OpenAi,
}

impl ProviderKind {
    /// Detect the service from the key prefix.
    pub fn detect(api_key: &str) -> Self {
        if api_key.starts_with("gsk_") {
            ProviderKind::Groq
        } else if api_key.starts_with("sk-or-") {
            ProviderKind::OpenRouter
        } else {
            ProviderKind::OpenAi
        }
    }

    /// Base URL override; `None` keeps the backend default.
    pub fn base_url(&self) -> Option<&'static str> {
        match self {
            ProviderKind::Groq => Some("https://api.groq.com/openai/v1"),
            ProviderKind::OpenRouter => Some("https://openrouter.ai/api/v1"),
            ProviderKind::OpenAi => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ProviderKind::Groq => "groq",
            ProviderKind::OpenRouter => "openrouter",
            ProviderKind::OpenAi => "openai",
        }
    }
}

struct ContextPatterns {
    kilo: Regex,
    number: Regex,
}

static CONTEXT_PATTERNS: LazyLock<Option<ContextPatterns>> = LazyLock::new(|| {
    Some(ContextPatterns {
        kilo: Regex::new(r"(?i)(\d+)k").ok()?,
        number: Regex::new(r"\d+").ok()?,
    })
});

/// Context window guessed from a model id: the first `32k` style number
/// times 1024, otherwise the largest number in the id, otherwise 0.
pub fn context_length(model_id: &str) -> u64 {
    let Some(patterns) = CONTEXT_PATTERNS.as_ref() else {
        return 0;
    };
    if let Some(kilo) = patterns
        .kilo
        .captures(model_id)
        .and_then(|captures| captures.get(1))
    {
        return kilo
            .as_str()
            .parse::<u64>()
            .map_or(0, |value| value.saturating_mul(1024));
    }
    patterns
        .number
        .find_iter(model_id)
        .filter_map(|found| found.as_str().parse::<u64>().ok())
        .max()
        .unwrap_or(0)
}

type ProviderFactory = dyn Fn(&str) -> Result<Arc<dyn LLMProvider>, CompletionError> + Send + Sync;

/// Completion service routing each model id to a provider.
///
/// Providers are built on first use by the factory and cached per model.
pub struct LlmRegistry {
    factory: Option<Box<ProviderFactory>>,
    providers: Mutex<HashMap<String, Arc<dyn LLMProvider>>>,
}

impl LlmRegistry {
    /// Registry that only serves explicitly registered models.
    pub fn new() -> Self {
        Self {
            factory: None,
            providers: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_factory(
        factory: impl Fn(&str) -> Result<Arc<dyn LLMProvider>, CompletionError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            factory: Some(Box::new(factory)),
            providers: Mutex::new(HashMap::new()),
        }
    }

    /// OpenAI-compatible registry for an API key, routed by its prefix.
    pub fn openai_compatible(api_key: impl Into<String>) -> Self {
        let api_key = api_key.into();
        let kind = ProviderKind::detect(&api_key);
        info!("configured llm provider (provider={})", kind.name());
        Self::with_factory(move |model| {
            let mut builder = LLMBuilder::<OpenAI>::new()
                .api_key(api_key.clone())
                .model(model.to_string());
            if let Some(base_url) = kind.base_url() {
                builder = builder.base_url(base_url.to_string());
            }
            let provider: Arc<dyn LLMProvider> = builder
                .build()
                .map_err(|err| CompletionError::Provider(err.to_string()))?;
            Ok(provider)
        })
    }

    pub fn register(&self, model: impl Into<String>, provider: Arc<dyn LLMProvider>) {
        self.providers.lock().insert(model.into(), provider);
    }

    pub fn provider(&self, model: &str) -> Result<Arc<dyn LLMProvider>, CompletionError> {
        if let Some(provider) = self.providers.lock().get(model) {
            return Ok(provider.clone());
        }
        let Some(factory) = self.factory.as_ref() else {
            return Err(CompletionError::UnknownModel(model.to_string()));
        };
        let provider = factory(model)?;
        debug!("built llm provider (model={})", model);
        self.providers
            .lock()
            .insert(model.to_string(), provider.clone());
        Ok(provider)
    }
}

impl Default for LlmRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn chat_role(role: Role) -> ChatRole {
    match role {
        Role::System => ChatRole::System,
        Role::User | Role::Tool => ChatRole::User,
        Role::Assistant => ChatRole::Assistant,
    }
}

pub fn to_chat_messages(turns: &[ChatTurn]) -> Vec<ChatMessage> {
    turns
        .iter()
        .map(|turn| ChatMessage {
            role: chat_role(turn.role),
            message_type: MessageType::Text,
            content: turn.content.clone(),
        })
        .collect()
}

#[async_trait]
impl CompletionService for LlmRegistry {
    async fn complete(&self, turns: &[ChatTurn], model: &str) -> Result<String, CompletionError> {
        let provider = self.provider(model)?;
        let messages = to_chat_messages(turns);
        let response = provider
            .chat_with_tools(&messages, None, None)
            .await
            .map_err(|err| CompletionError::Provider(err.to_string()))?;
        match response.text() {
            Some(text) if !text.is_empty() => Ok(text),
            _ => Err(CompletionError::Empty),
        }
    }
}

/// Embedding function backed by a provider's embedding endpoint.
pub struct LlmEmbedder {
    provider: Arc<dyn LLMProvider>,
}

impl LlmEmbedder {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Embedder for LlmEmbedder {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, MemoryError> {
        debug!("embedding texts (count={})", texts.len());
        self.provider
            .embed(texts)
            .await
            .map_err(|err| MemoryError::Embedding(err.to_string()))
    }
}
