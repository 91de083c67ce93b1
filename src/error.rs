use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by training, persistence, and search.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error")]
    Io(#[from] io::Error),

    #[error("word not found in vocabulary: {0:?}")]
    UnknownWord(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("training was cancelled")]
    Interrupted,

    #[error("invalid model: {0}")]
    Model(String),
}

impl Error {
    pub(crate) fn invalid_config(msg: impl Into<String>) -> Self {
        Error::InvalidConfig(msg.into())
    }
}
