#[macro_use]
extern crate log;

#[cfg(test)]
#[macro_use]
extern crate session_test;

pub mod api;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod model;
pub mod scheduled_task;
pub mod session;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;

pub use api::Client;
pub use config::Config;
pub use error::{Error, Result};
pub use session::SessionManager;
