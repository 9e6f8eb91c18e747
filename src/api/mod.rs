//! Typed access to the election backend.
//!
//! Every call goes through the [`SessionManager`], so owner endpoints get the
//! access token attached and transparently survive its expiry.

use serde::de::DeserializeOwned;

use crate::config::Config;
use crate::error::Result;
use crate::session::{FileStore, MemoryStore, SessionManager};
use crate::transport::{ApiRequest, HttpTransport};

mod auth;
mod election;
mod voting;

pub use election::{EditReport, UpdateOutcome};

/// Client for the election backend.
///
/// Cheap to clone; clones share one session.
#[derive(Debug, Clone)]
pub struct Client {
    session: SessionManager,
}

impl Client {
    /// Build a client talking HTTP to the configured backend.
    ///
    /// Session state is kept in the configured session file if there is one, and
    /// in memory otherwise. A stored session has its renewal re-armed, so this must
    /// be called from within a tokio runtime.
    pub fn new(config: &Config) -> Result<Self> {
        let transport = HttpTransport::new(config)?;
        let session = match config.session_file() {
            Some(path) => SessionManager::new(transport, FileStore::open(path)?),
            None => SessionManager::new(transport, MemoryStore::default()),
        };
        session.init();
        Ok(Self::from_session(session))
    }

    pub fn from_session(session: SessionManager) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    async fn call<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        self.session.request(request).await
    }
}
