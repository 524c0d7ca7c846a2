//! Test helpers shared across Chronicle crates.

pub mod completion;
pub mod embedder;
pub mod export;
pub mod llm;

pub use completion::{FailingCompletion, FixedCompletion, RecordedCall, RecordingCompletion};
pub use embedder::{FailingEmbedder, FlakyEmbedder, WordHashEmbedder};
pub use export::{ExportBuilder, NodeSpec};
pub use llm::{FailingLLM, FixedChatResponse, FixedLLM, RecordingChatLLM};
