/// Result alias that carries the custom [`CeremonyError`] type.
pub type Result<T> = std::result::Result<T, CeremonyError>;

/// Common error type for the core crate.
///
/// Only a handful of these ever reach the orchestrator's caller. Playback
/// rejection, graph construction failure and content fetch failure are
/// folded back into state and logged, see [`crate::CeremonyOrchestrator`].
#[derive(Debug, thiserror::Error)]
pub enum CeremonyError {
    /// Free-form message for conditions without a dedicated variant.
    #[error("{0}")]
    Message(String),
    /// Input that violates a documented precondition.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// The host refused to start audio output (usually a missing user gesture).
    #[error("playback rejected: {0}")]
    PlaybackRejected(String),
    /// The source → analyser → destination graph could not be built.
    #[error("audio graph unavailable: {0}")]
    GraphUnavailable(String),
    /// The content provider could not deliver the segment list.
    #[error("content unavailable: {0}")]
    ContentUnavailable(String),
    /// A timing table that is unsorted, negative or otherwise malformed.
    #[error("invalid timing table: {0}")]
    InvalidTimings(String),
    #[error("fft failure: {0}")]
    Fft(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Wav(#[from] hound::Error),
}

impl CeremonyError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for CeremonyError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for CeremonyError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
