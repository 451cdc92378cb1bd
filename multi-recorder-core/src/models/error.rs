use thiserror::Error;

/// Errors surfaced by the recorder.
///
/// Every failure ends up as the session's single "last error", so the enum is
/// cheap to clone and comparable.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecorderError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("hardware error: {0}")]
    Hardware(String),

    #[error("audio engine error: {0}")]
    Engine(String),

    #[error("audio engine was interrupted")]
    Interrupted,
}

/// Coarse classification of a [`RecorderError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Configuration,
    Hardware,
    Engine,
    Interruption,
}

impl RecorderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Hardware(_) => ErrorKind::Hardware,
            Self::Engine(_) => ErrorKind::Engine,
            Self::Interrupted => ErrorKind::Interruption,
        }
    }
}
