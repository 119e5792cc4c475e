use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(String),

    #[error("Event conflict: message {message_id} already has seq {seq}")]
    Conflict { message_id: String, seq: u64 },

    #[error("Duplicate event id: {0}")]
    DuplicateId(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("{0}")]
    Other(String),
}

impl RelayError {
    /// Whether a retry could plausibly succeed. Conflicts and duplicate ids
    /// are permanent: the same (message_id, seq) can never be inserted twice.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Conflict { .. } | Self::DuplicateId(_))
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialize(e.to_string())
    }
}
