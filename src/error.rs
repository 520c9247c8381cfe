//! Error types for the voice navigation engine.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum NavError {
    /// The platform has no speech recognition capability.
    #[error("speech recognition is not supported on this platform")]
    Unsupported,

    /// Microphone access was denied.
    #[error("microphone permission denied")]
    PermissionDenied,

    /// Recognizer backend failure.
    #[error("recognizer error: {0}")]
    Recognizer(String),

    /// Speech synthesis backend failure.
    #[error("synthesizer error: {0}")]
    Synthesizer(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Page content could not be loaded or parsed.
    #[error("page error: {0}")]
    Page(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, NavError>;
