use std::error::Error as StdError;
use std::io::Error as IoError;

use figment::Error as ConfigError;
use reqwest::StatusCode;
use serde_json::{Error as JsonError, Value};
use thiserror::Error;

use crate::lifecycle::EditLock;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The request never produced a response.
    #[error("Network error: {0}")]
    Network(#[source] Box<dyn StdError + Send + Sync>),
    /// The backend answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    Http {
        status: StatusCode,
        message: String,
        data: Value,
    },
    #[error(transparent)]
    Json(#[from] JsonError),
    #[error("Session storage error: {0}")]
    Store(#[from] IoError),
    #[error(transparent)]
    Config(#[from] Box<ConfigError>),
    #[error("Election is locked for editing ({0})")]
    Locked(EditLock),
    #[error("Voting has closed for this election")]
    VotingClosed,
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl Error {
    /// Wrap any transport-level failure.
    pub fn network(err: impl StdError + Send + Sync + 'static) -> Self {
        Self::Network(Box::new(err))
    }

    /// The HTTP status, if this error came from a well-formed error response.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Is this the backend telling us our credentials are no longer accepted?
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(StatusCode::UNAUTHORIZED)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Self::Config(Box::new(err))
    }
}
