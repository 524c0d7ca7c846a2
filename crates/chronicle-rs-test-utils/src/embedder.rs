use async_trait::async_trait;
use chronicle_rs_memory::{Embedder, MemoryError};
use std::sync::atomic::{AtomicUsize, Ordering};

const DIMENSIONS: usize = 64;

/// Bag-of-words embedder: each lowercase word increments one hashed bucket.
///
/// Texts that share words end up close under cosine distance.
#[derive(Debug, Default)]
pub struct WordHashEmbedder {
    calls: AtomicUsize,
}

impl WordHashEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `embed` batches served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn vector(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; DIMENSIONS];
        for word in text.split_whitespace() {
            let word = word
                .trim_matches(|ch: char| !ch.is_alphanumeric())
                .to_lowercase();
            if word.is_empty() {
                continue;
            }
            vector[fnv1a(&word) % DIMENSIONS] += 1.0;
        }
        vector
    }
}

fn fnv1a(word: &str) -> usize {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in word.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash as usize
}

#[async_trait]
impl Embedder for WordHashEmbedder {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, MemoryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|text| Self::vector(text)).collect())
    }
}

/// Embedder that always fails, like a model that cannot be loaded.
#[derive(Debug, Clone)]
pub struct FailingEmbedder {
    message: String,
}

impl FailingEmbedder {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed(&self, _texts: Vec<String>) -> Result<Vec<Vec<f32>>, MemoryError> {
        Err(MemoryError::Embedding(self.message.clone()))
    }
}

/// Fails the first `failures` batches, then embeds like [`WordHashEmbedder`].
#[derive(Debug)]
pub struct FlakyEmbedder {
    remaining_failures: AtomicUsize,
    inner: WordHashEmbedder,
}

impl FlakyEmbedder {
    pub fn new(failures: usize) -> Self {
        Self {
            remaining_failures: AtomicUsize::new(failures),
            inner: WordHashEmbedder::new(),
        }
    }
}

#[async_trait]
impl Embedder for FlakyEmbedder {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, MemoryError> {
        let failing = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(MemoryError::Embedding("embedding service timed out".to_string()));
        }
        self.inner.embed(texts).await
    }
}
