use thiserror::Error;

pub type ChonkyResult<T> = Result<T, ChonkyError>;

#[derive(Debug, Error)]
pub enum ChonkyError {
    #[error("config error: {0}")]
    Config(String),

    #[error("conflicts must be resolved first: {0:?}")]
    Conflict(Vec<String>),

    #[error("pending remote changes are available that must first be resolved — run sync first")]
    PendingRemote,

    #[error("{0} was modified while chonky was running")]
    ModifiedDuringRun(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("remote error: {0}")]
    Remote(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
