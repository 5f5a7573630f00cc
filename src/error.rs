use std::io;

/// The crate's single error type. Fatal variants are returned to callers;
/// `CorruptCache` and `PerFileIoError` are recovered internally and never
/// escape the crate boundary (see `cache` and `engine`).
#[derive(Debug, thiserror::Error)]
pub enum FxxhError {
    #[error("range error: {0}")]
    Range(&'static str),

    #[error("hasher backend not initialized: call {0} first")]
    Uninitialized(&'static str),

    #[error("out of memory: {0}")]
    OutOfMemory(&'static str),

    #[error("precondition violated: {0}")]
    PrecondViolation(&'static str),

    #[error("corrupt cache: {0}")]
    CorruptCache(&'static str),

    #[error("value is not serializable to JSON: {0}")]
    NotSerializable(String),

    #[error("per-file I/O error on {path}: {source}")]
    PerFileIoError { path: String, source: io::Error },

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, FxxhError>;
