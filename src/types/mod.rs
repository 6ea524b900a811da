pub mod document;
pub mod error;
pub mod repository;

pub use document::{
    ChunkSummary, DocumentKind, PublishFailure, PublishResult, SelectionMode, SynthesizedDocument,
    TokenChunk,
};
pub use error::{
    ErrorCategory, ErrorClassifier, ErrorKind, LlmError, RepodocError, Result, ResultExt,
};
pub use repository::{
    CommitReceipt, Credential, EntryKind, FileCandidate, FileContent, PutFileRequest,
    RemoteFileState, RepositoryRef, RepositoryTree, TreeEntry,
};
