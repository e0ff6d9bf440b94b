use thiserror::Error;

#[derive(Error, Debug)]
pub enum QuarryError {
    #[error("index not initialized: build or load an index first")]
    IndexNotInitialized,

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("parse failure: {0}")]
    ParseFailure(String),

    #[error("import resolution failure: {0}")]
    ResolutionFailure(String),

    #[error("reranker failure: {0}")]
    RerankerFailure(String),

    #[error("embedder failure: {0}")]
    EmbedderFailure(String),

    #[error("store I/O failure: {0}")]
    StoreIo(#[from] std::io::Error),

    #[error("snapshot codec failure: {0}")]
    Snapshot(#[from] serde_json::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl QuarryError {
    /// Stable tag for surfacing errors across process boundaries.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::IndexNotInitialized => "index_not_initialized",
            Self::DimensionMismatch { .. } => "dimension_mismatch",
            Self::UnsupportedLanguage(_) => "unsupported_language",
            Self::ParseFailure(_) => "parse_failure",
            Self::ResolutionFailure(_) => "resolution_failure",
            Self::RerankerFailure(_) => "reranker_failure",
            Self::EmbedderFailure(_) => "embedder_failure",
            Self::StoreIo(_) | Self::Snapshot(_) => "store_io_failure",
            Self::InvalidInput(_) => "invalid_input",
        }
    }
}

pub type Result<T> = std::result::Result<T, QuarryError>;
