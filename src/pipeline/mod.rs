//! Repository Content Synthesis Pipeline
//!
//! ## Stages
//!
//! - `tree`: resolve the ref and list the commit's tree
//! - `selector`: pure path/size policy over tree entries
//! - `loader`: bounded-parallel content reads plus the binary heuristic
//! - `chunker`: lossless token-bounded slicing
//! - `summarizer`: per-chunk extracts (map)
//! - `assembler`: single document assembly call (reduce)
//! - `publisher`: compare-and-swap write with bounded retry
//! - `orchestrator`: sequencing, deadline, cancellation and the outcome

pub mod assembler;
pub mod chunker;
pub mod loader;
pub mod orchestrator;
pub mod publisher;
pub mod selector;
pub mod summarizer;
pub mod tree;

pub use assembler::{AssemblyBudget, AssemblyPlan, DocumentAssembler};
pub use chunker::TokenChunker;
pub use loader::{FileContentLoader, LoadReport, decode_text, is_probably_binary};
pub use orchestrator::{Orchestrator, PipelineOutcome, RunReport};
pub use publisher::{OptimisticPublisher, PublishRequest};
pub use selector::FileSelector;
pub use summarizer::{ChunkSummarizer, ExtractBudget};
pub use tree::TreeFetcher;
