use std::fmt::{Display, Formatter};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::LevelFilter;
use log4rs_dynamic_filters::DynamicLevelFilter;
use reqwest::{Method, StatusCode};

/// Name of the dynamic filter guarding per-request log lines in `log4rs.yaml`.
pub const HTTP_FILTER: &str = "http";

/// Log target for per-request lines, routed to its own appender in `log4rs.yaml`.
pub const HTTP_TARGET: &str = "election_client::http";

/// A unique identifier for a particular request.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub struct RequestId(pub usize);

impl Display for RequestId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl RequestId {
    /// Atomically get the next ID. This wraps around back to zero if you somehow exceed a usize.
    pub fn next() -> RequestId {
        static REQUEST_ID_COUNTER: AtomicUsize = AtomicUsize::new(0);
        RequestId(REQUEST_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Initialise log4rs from the given file, with dynamic filter support.
pub fn init(config: &Path) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    log4rs::init_file(config, log4rs_dynamic_filters::default_deserializers())?;
    info!("Initialised logging from {}", config.display());
    Ok(())
}

/// Silence or restore per-request logging at runtime.
pub fn set_http_logging(level: LevelFilter) {
    DynamicLevelFilter::set(HTTP_FILTER, level);
}

/// Log an outgoing request.
pub fn log_request(id: RequestId, method: &Method, url: &str) {
    info!(target: HTTP_TARGET, "->req{id} {method} {url}");
}

/// Log an incoming response, at a level matching its status class.
pub fn log_response(id: RequestId, status: StatusCode, path: &str) {
    let log_msg = format!("<-rsp{id} {status} {path}");
    if status.is_server_error() {
        error!(target: HTTP_TARGET, "{log_msg}");
    } else if status.is_client_error() {
        warn!(target: HTTP_TARGET, "{log_msg}");
    } else {
        info!(target: HTTP_TARGET, "{log_msg}");
    }
}

/// Log a request that never got a response.
pub fn log_failure(id: RequestId, path: &str, err: &dyn std::error::Error) {
    error!(target: HTTP_TARGET, "<-rsp{id} FAILED {path}: {err}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_ids_increase() {
        let first = RequestId::next();
        let second = RequestId::next();
        assert!(second > first);
        assert_eq!(first.to_string(), first.0.to_string());
    }
}
