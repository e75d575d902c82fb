use thiserror::Error;

/// Errors raised by the session engine and its collaborators.
///
/// Protocol/audio-decode errors are non-fatal and surfaced to the client as
/// `error` wire events (see `AsrError::is_fatal`); transport and config
/// errors end the session or the process.
#[derive(Debug, Error)]
pub enum AsrError {
    #[error("config error: {0}")]
    Config(String),

    #[error("invalid request: {0}")]
    Protocol(String),

    #[error("audio decode error: {0}")]
    AudioDecode(String),

    #[error("audio format error: {0}")]
    AudioFormat(String),

    #[error("transcriber backend error: {0}")]
    Backend(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AsrError {
    /// Whether this error should end the session (vs. being reported and
    /// continuing) — transport failures are the only fatal case here, all
    /// others are surfaced on the wire as `error` events.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AsrError::Transport(_))
    }
}

pub type Result<T> = std::result::Result<T, AsrError>;
