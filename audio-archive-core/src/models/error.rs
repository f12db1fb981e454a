use thiserror::Error;

/// Errors that can occur while archiving audio.
///
/// The drain loop distinguishes three severities: transient conditions
/// (overflow, xrun) never surface as errors at all, `FileOpen` skips the
/// affected slot and is retried, everything else is fatal for the run.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ArchiveError {
    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("unknown output format: {0}")]
    UnknownFormat(String),

    #[error("failed to open archive file: {0}")]
    FileOpen(String),

    #[error("encoding failed: {0}")]
    Encoding(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("ring buffer protocol violation: {0}")]
    BufferProtocol(String),

    #[error("audio input error: {0}")]
    Input(String),
}

impl ArchiveError {
    /// Whether the drain loop may keep running after this error.
    ///
    /// Only a failed file open is recoverable: the slot keeps buffering and
    /// the open is retried on the next drain iteration.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::FileOpen(_))
    }
}
