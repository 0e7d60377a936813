use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    #[error("Unknown event operation '{0}'")]
    UnknownOperation(String),

    #[error("Transport failure: {message}")]
    Transport {
        status: Option<u16>,
        message: String,
    },

    #[error("Push channel closed")]
    ChannelClosed,

    #[error("Reconnect abandoned after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("Storage failure: {0}")]
    Storage(String),

    #[error("A submit is already in flight for this draft")]
    SubmitInFlight,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl SyncError {
    /// Transport failure from an HTTP-like status code.
    pub fn transport(status: impl Into<Option<u16>>, message: impl Into<String>) -> Self {
        Self::Transport {
            status: status.into(),
            message: message.into(),
        }
    }

    /// True for failures that invalidate the caller's credentials.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Transport { status: Some(401), .. })
    }
}
