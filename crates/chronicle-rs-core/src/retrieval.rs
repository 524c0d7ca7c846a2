//! Retrieval gate for live chat turns.
//!
//! A query passes four stages in order: a cheap worthiness check, a vector
//! search, one relevance judgment per candidate from a screening model,
//! and prompt assembly from the surviving candidates.

use chronicle_rs_config::RetrievalConfig;
use chronicle_rs_memory::{MemoryStore, MessageRecord};
use chronicle_rs_protocol::{ChatTurn, CompletionService};
use log::{debug, info, warn};
use std::collections::HashSet;
use std::sync::Arc;

/// Tokens that never make a query worth a memory search.
pub const DEFAULT_STOPWORDS: &[&str] = &[
    "hi", "hello", "hey", "there", "thanks", "thank", "you", "ok", "okay", "cool", "got", "it",
    "bye", "goodbye", "a", "an", "the", "is", "are", "was", "were",
];

const CONTEXT_SEPARATOR: &str = "\n---\n";

/// Why the gate stopped where it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateExit {
    /// Only stopwords or greetings; no search was made.
    SkippedUnworthy,
    /// The search returned nothing or failed.
    NoCandidates,
    /// Every candidate was rejected by the screening model.
    NoneRelevant,
    /// At least one candidate survived and the prompt carries context.
    Augmented,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GateOutcome {
    /// Text to send as the final user turn.
    pub prompt: String,
    pub exit: GateExit,
    /// Candidates that survived screening, nearest first.
    pub context: Vec<MessageRecord>,
}

impl GateOutcome {
    fn plain(query: &str, exit: GateExit) -> Self {
        Self {
            prompt: query.to_string(),
            exit,
            context: Vec::new(),
        }
    }
}

pub struct RetrievalGate {
    store: MemoryStore,
    completion: Arc<dyn CompletionService>,
    top_n: usize,
    screening_model: String,
    stopwords: HashSet<String>,
}

impl RetrievalGate {
    pub fn new(
        store: MemoryStore,
        completion: Arc<dyn CompletionService>,
        config: &RetrievalConfig,
    ) -> Self {
        let stopwords = DEFAULT_STOPWORDS
            .iter()
            .map(|word| word.to_string())
            .chain(config.extra_stopwords.iter().map(|word| word.to_lowercase()))
            .collect();
        Self {
            store,
            completion,
            top_n: config.top_n,
            screening_model: config.screening_model.clone(),
            stopwords,
        }
    }

    /// True when the query has at least one token outside the stopword set.
    pub fn is_search_worthy(&self, text: &str) -> bool {
        text.to_lowercase()
            .split_whitespace()
            .map(|token| token.trim_matches(|ch: char| ch.is_ascii_punctuation()))
            .filter(|token| !token.is_empty())
            .any(|token| !self.stopwords.contains(token))
    }

    /// Run all stages for one query.
    pub async fn gate(&self, query: &str, source_ids: Option<&[String]>) -> GateOutcome {
        if !self.is_search_worthy(query) {
            debug!("query not search-worthy, skipping retrieval");
            return GateOutcome::plain(query, GateExit::SkippedUnworthy);
        }

        let candidates = match self.store.query(query, self.top_n, source_ids).await {
            Ok(hits) => hits,
            Err(err) => {
                warn!("memory query failed, continuing without context (error={})", err);
                return GateOutcome::plain(query, GateExit::NoCandidates);
            }
        };
        if candidates.is_empty() {
            debug!("memory query returned no candidates");
            return GateOutcome::plain(query, GateExit::NoCandidates);
        }

        let candidate_count = candidates.len();
        let mut relevant = Vec::new();
        for candidate in candidates {
            if self.screen(query, &candidate.record).await {
                relevant.push(candidate.record);
            }
        }
        info!(
            "screened retrieval candidates (candidates={}, relevant={})",
            candidate_count,
            relevant.len()
        );
        if relevant.is_empty() {
            return GateOutcome::plain(query, GateExit::NoneRelevant);
        }

        let context = relevant
            .iter()
            .map(|record| record.text.as_str())
            .collect::<Vec<_>>()
            .join(CONTEXT_SEPARATOR);
        GateOutcome {
            prompt: augmented_prompt(&context, query),
            exit: GateExit::Augmented,
            context: relevant,
        }
    }

    async fn screen(&self, query: &str, candidate: &MessageRecord) -> bool {
        let turns = [ChatTurn::user(screening_prompt(query, &candidate.text))];
        let label = candidate.source_name.as_deref().unwrap_or(&candidate.source_id);
        match self.completion.complete(&turns, &self.screening_model).await {
            Ok(reply) => {
                let keep = reply.to_lowercase().contains("yes");
                debug!("screened candidate (source={}, relevant={})", label, keep);
                keep
            }
            Err(err) => {
                warn!(
                    "relevance screening failed, discarding candidate (source={}, error={})",
                    label, err
                );
                false
            }
        }
    }
}

pub fn screening_prompt(query: &str, snippet: &str) -> String {
    format!(
        "The user wants to know about: '{query}'.\n\n\
         Is the following text snippet relevant to answering that question? \
         Answer with a single word: YES or NO.\n\n\
         SNIPPET:\n---\n{snippet}\n---"
    )
}

pub fn augmented_prompt(context: &str, query: &str) -> String {
    format!(
        "You are a helpful AI assistant. Your task is to answer the user's question using the provided context. \
         This context has been pre-screened by another AI and is considered highly relevant to the user's question. \
         Base your answer primarily on this context. If, for some reason, you still find the context unhelpful, \
         you may rely on your general knowledge but you should first state that the provided information was not sufficient.\n\n\
         RELEVANT CONTEXT:\n---\n{context}\n---\n\n\
         USER'S QUESTION: {query}"
    )
}

#[cfg(test)]
mod tests {
    use super::{GateExit, RetrievalGate, screening_prompt};
    use chronicle_rs_config::RetrievalConfig;
    use chronicle_rs_memory::{LocalVectorBackend, MemoryStore, MessageRecord, SourceKind};
    use chronicle_rs_protocol::{CompletionService, Role};
    use chronicle_rs_test_utils::{
        FailingCompletion, FailingEmbedder, RecordingCompletion, WordHashEmbedder,
    };
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn store() -> MemoryStore {
        MemoryStore::new(
            Arc::new(LocalVectorBackend::in_memory()),
            Arc::new(WordHashEmbedder::new()),
        )
    }

    fn gate(store: MemoryStore, completion: Arc<dyn CompletionService>) -> RetrievalGate {
        RetrievalGate::new(store, completion, &RetrievalConfig::default())
    }

    async fn seed(store: &MemoryStore, source: &str, texts: &[&str]) {
        let records = texts
            .iter()
            .map(|text| MessageRecord::new(source, SourceKind::FileChunk, Role::System, *text))
            .collect();
        store.add(records).await.expect("add");
    }

    #[test]
    fn greetings_are_not_search_worthy() {
        let gate = gate(store(), Arc::new(FailingCompletion::new("unused")));
        assert!(!gate.is_search_worthy("hi there"));
        assert!(!gate.is_search_worthy("Thanks!"));
        assert!(!gate.is_search_worthy("   "));
        assert!(gate.is_search_worthy("hi, explain quantum tunneling"));
    }

    #[test]
    fn extra_stopwords_extend_the_set() {
        let config = RetrievalConfig {
            extra_stopwords: vec!["Yo".to_string()],
            ..RetrievalConfig::default()
        };
        let gate = RetrievalGate::new(store(), Arc::new(FailingCompletion::new("x")), &config);
        assert!(!gate.is_search_worthy("yo"));
    }

    #[tokio::test]
    async fn unworthy_query_skips_every_stage() {
        let completion = RecordingCompletion::new(|_, _| Ok("YES".to_string()));
        let gate = gate(store(), Arc::new(completion.clone()));
        let outcome = gate.gate("hello", None).await;
        assert_eq!(outcome.exit, GateExit::SkippedUnworthy);
        assert_eq!(outcome.prompt, "hello");
        assert!(completion.calls().is_empty());
    }

    #[tokio::test]
    async fn empty_store_has_no_candidates() {
        let gate = gate(store(), Arc::new(FailingCompletion::new("unused")));
        let outcome = gate.gate("explain quantum tunneling", None).await;
        assert_eq!(outcome.exit, GateExit::NoCandidates);
    }

    #[tokio::test]
    async fn store_errors_mean_no_context() {
        let broken = MemoryStore::new(
            Arc::new(LocalVectorBackend::in_memory()),
            Arc::new(FailingEmbedder::new("model missing")),
        );
        let gate = gate(broken, Arc::new(FailingCompletion::new("unused")));
        let outcome = gate.gate("explain quantum tunneling", None).await;
        assert_eq!(outcome.exit, GateExit::NoCandidates);
        assert_eq!(outcome.prompt, "explain quantum tunneling");
    }

    #[tokio::test]
    async fn screening_keeps_only_relevant_candidates() {
        let store = store();
        seed(
            &store,
            "file_a",
            &["quantum tunneling lets particles cross barriers", "bread recipes need yeast"],
        )
        .await;
        let completion = RecordingCompletion::screening(
            RetrievalConfig::default().screening_model,
            vec!["particles".to_string()],
            "unused",
        );
        let gate = gate(store, Arc::new(completion.clone()));
        let outcome = gate.gate("explain quantum tunneling", None).await;

        assert_eq!(outcome.exit, GateExit::Augmented);
        assert_eq!(outcome.context.len(), 1);
        assert!(outcome.prompt.contains(
            "RELEVANT CONTEXT:\n---\nquantum tunneling lets particles cross barriers\n---"
        ));
        assert!(outcome.prompt.ends_with("USER'S QUESTION: explain quantum tunneling"));
        let screening_calls = completion.calls_for("llama3-8b-8192");
        assert_eq!(screening_calls.len(), 2);
        assert!(
            screening_calls[0]
                .last_content()
                .starts_with("The user wants to know about: 'explain quantum tunneling'.")
        );
    }

    #[tokio::test]
    async fn rejected_or_failed_screening_leaves_raw_query() {
        let store = store();
        seed(&store, "file_a", &["quantum notes"]).await;
        let gate_no = gate(
            store.clone(),
            Arc::new(RecordingCompletion::new(|_, _| Ok("No.".to_string()))),
        );
        let outcome = gate_no.gate("quantum question", None).await;
        assert_eq!(outcome.exit, GateExit::NoneRelevant);
        assert_eq!(outcome.prompt, "quantum question");

        let gate_err = gate(store, Arc::new(FailingCompletion::new("rate limited")));
        let outcome = gate_err.gate("quantum question", None).await;
        assert_eq!(outcome.exit, GateExit::NoneRelevant);
    }

    #[tokio::test]
    async fn source_allowlist_restricts_candidates() {
        let store = store();
        seed(&store, "file_a", &["quantum notes from a"]).await;
        seed(&store, "file_b", &["quantum notes from b"]).await;
        let gate = gate(
            store,
            Arc::new(RecordingCompletion::new(|_, _| Ok("yes".to_string()))),
        );
        let allow = vec!["file_b".to_string()];
        let outcome = gate.gate("quantum notes", Some(&allow)).await;
        assert_eq!(outcome.context.len(), 1);
        assert_eq!(outcome.context[0].source_id, "file_b");
    }

    #[test]
    fn screening_prompt_embeds_query_and_snippet() {
        let prompt = screening_prompt("q", "s");
        assert!(prompt.contains("'q'"));
        assert!(prompt.ends_with("SNIPPET:\n---\ns\n---"));
    }
}
