/// Core error type.
///
/// Adapter crates map their specific errors into this type so the service
/// layer can decide what is fatal, what becomes per-restaurant data and what
/// is only logged.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Network or HTTP failure talking to an upstream menu site.
    #[error("source fetch error: {0}")]
    SourceFetch(String),

    /// Upstream payload had an unexpected shape.
    #[error("source parse error: {0}")]
    SourceParse(String),

    #[error("vote ledger not found for message {0}")]
    LedgerNotFound(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    /// The chat message is already gone (deleted by a user or expired).
    #[error("message not found: {0}")]
    MessageNotFound(String),

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    /// Whether the error is one the caller should treat as "nothing to do".
    pub fn is_message_not_found(&self) -> bool {
        matches!(self, Error::MessageNotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
