use thiserror::Error;

use crate::install::Stage;

#[derive(Debug, Error)]
pub enum ProviError {
    #[error("no such file: {1}")]
    NoSuchFile(#[source] std::io::Error, String),

    #[error("no such device: {0}")]
    NoSuchDevice(String),

    #[error("bad config: {0}")]
    BadConfig(String),

    #[error("bad cli arguments: {0}")]
    BadArgs(String),

    #[error("command failed: {context}")]
    CmdFailed {
        error: Option<std::io::Error>,
        context: String,
    },

    #[error("disk unsuitable: {0}")]
    DiskUnsuitable(String),

    /// The user declined a blocking confirmation prompt. Callers must
    /// not show another error dialog for this - the user already chose.
    #[error("aborted by user")]
    Aborted,

    #[error("installation failed during stage '{stage}'")]
    InstallFailed {
        error: Box<ProviError>,
        stage: Stage,
        warnings: Vec<String>,
    },

    #[error("provi-rs bug: {0}")]
    Bug(String),
}

impl ProviError {
    /// True for the clean-abort sentinel, including one wrapped by the
    /// installer's stage error.
    pub fn is_user_abort(&self) -> bool {
        match self {
            ProviError::Aborted => true,
            ProviError::InstallFailed { error, .. } => error.is_user_abort(),
            _ => false,
        }
    }
}
