use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// The running flag was cleared while a read was pending.
    /// The whole pipeline is tearing down and no further reads should be attempted.
    #[error("Sample reader was stopped")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
}

impl SyncError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SyncError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
