use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Engine error: {0}")]
    Engine(#[from] webrtc::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Signaling channel error: {0}")]
    Signaling(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("No sender carries track {0}")]
    SenderNotFound(String),
}

impl Error {
    /// Errors caused by the remote peer misbehaving rather than by transport loss
    #[must_use]
    pub const fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol(_) | Self::Serialization(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
