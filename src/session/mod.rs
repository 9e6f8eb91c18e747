//! Client-side session: stored credentials, proactive renewal before the
//! access token expires, and reactive refresh when the backend answers 401.

mod manager;
mod store;
mod token;

pub use manager::{renewal_time, SessionManager, MIN_RENEWAL_DELAY_SECS, RENEWAL_LEAD_SECS};
pub use store::{FileStore, MemoryStore, SessionStore, StoreKey};
pub use token::{decode_expiry, expiry_of, TokenError};
