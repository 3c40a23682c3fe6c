use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("pdf has no pages")]
    NoPages,

    #[error("no text content extracted from PDF (file might be scanned or image-based)")]
    EmptyContent,

    #[error("resulted in 0 chunks (text might be too short)")]
    NoChunks,

    #[error("chunk {chunk}/{total} failed: {reason}")]
    ChunkFailed {
        chunk: usize,
        total: usize,
        reason: String,
    },

    #[error("background task failed: {0}")]
    Task(String),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("{backend} returned status {status}: {body}")]
    Status {
        backend: String,
        status: u16,
        body: String,
    },

    #[error("invalid response from {backend}: {details}")]
    InvalidResponse { backend: String, details: String },

    #[error("received empty collection id from {0}")]
    EmptyCollectionId(String),

    #[error("query is empty")]
    EmptyQuery,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("http error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BackendError {
    /// True for errors caused by the caller's input rather than a backend.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::EmptyQuery | Self::InvalidArgument(_))
    }
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
