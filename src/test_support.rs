//! Test doubles shared by the unit tests.

use std::collections::{HashMap, HashSet};
use std::io::{Error as IoError, ErrorKind};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{EncodingKey, Header};
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::model::auth::AuthResponse;
use crate::transport::{is_refresh_endpoint, ApiRequest, ApiResponse, Transport};

pub const FAKE_REFRESH_TOKEN: &str = "fake-refresh-token";
pub const FAKE_USER_EMAIL: &str = "owner@example.org";

/// How long tokens minted by the fake backend live.
pub const TOKEN_LIFETIME: i64 = 3600;

pub fn init_test_logging() {
    log4rs_test_utils::test_logging::init_logging_once_for(["election_client"], None, None);
}

/// What the fake backend does with the next refresh-token exchange.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RefreshBehaviour {
    /// Mint a new access token.
    Accept,
    /// Answer 401.
    Reject,
    /// Fail at the transport level.
    Unreachable,
}

/// An in-process stand-in for the election backend.
///
/// Authenticated paths require the most recently minted access token and answer
/// 401 otherwise. Responses can be scripted per method and path; everything else
/// answers `{}`.
#[derive(Clone)]
pub struct FakeBackend {
    state: Arc<Mutex<BackendState>>,
}

struct BackendState {
    requests: Vec<ApiRequest>,
    refresh_calls: usize,
    access_token: Option<String>,
    refresh_behaviour: RefreshBehaviour,
    refresh_delay: StdDuration,
    stubs: HashMap<(Method, String), ApiResponse>,
    unreachable: HashSet<String>,
    minted: u64,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(BackendState {
                requests: Vec::new(),
                refresh_calls: 0,
                access_token: None,
                refresh_behaviour: RefreshBehaviour::Accept,
                refresh_delay: StdDuration::ZERO,
                stubs: HashMap::new(),
                unreachable: HashSet::new(),
                minted: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BackendState> {
        self.state.lock().unwrap()
    }

    /// Mint a token valid for `lifetime` and make it the only accepted one.
    fn mint(&self, lifetime: Duration) -> String {
        let mut state = self.lock();
        state.minted += 1;
        let claims = json!({
            "sub": FAKE_USER_EMAIL,
            "jti": state.minted,
            "exp": (Utc::now() + lifetime).timestamp(),
        });
        let token = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"fake backend secret"),
        )
        .unwrap();
        state.access_token = Some(token.clone());
        token
    }

    /// A successful login with a token living [`TOKEN_LIFETIME`] seconds.
    pub fn login_response(&self) -> AuthResponse {
        self.auth_response_expiring_in(Duration::seconds(TOKEN_LIFETIME))
    }

    pub fn auth_response_expiring_in(&self, lifetime: Duration) -> AuthResponse {
        AuthResponse {
            jwt: Some(self.mint(lifetime)),
            refresh_token: Some(FAKE_REFRESH_TOKEN.to_string()),
            user_info: Some(json!({ "email": FAKE_USER_EMAIL, "firstName": "Olive" })),
        }
    }

    /// Stop accepting the current access token.
    pub fn expire_access_token(&self) {
        self.lock().access_token = None;
    }

    pub fn current_access_token(&self) -> Option<String> {
        self.lock().access_token.clone()
    }

    pub fn set_refresh_behaviour(&self, behaviour: RefreshBehaviour) {
        self.lock().refresh_behaviour = behaviour;
    }

    /// Hold every refresh exchange for this long before answering.
    pub fn set_refresh_delay(&self, delay: StdDuration) {
        self.lock().refresh_delay = delay;
    }

    pub fn refresh_calls(&self) -> usize {
        self.lock().refresh_calls
    }

    /// Answer `method path` with this response from now on.
    pub fn stub(&self, method: Method, path: &str, status: StatusCode, body: Value) {
        self.lock()
            .stubs
            .insert((method, path.to_string()), ApiResponse::json(status, &body));
    }

    /// Fail every request to `path` at the transport level.
    pub fn make_unreachable(&self, path: &str) {
        self.lock().unreachable.insert(path.to_string());
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.lock().requests.clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<ApiRequest> {
        self.lock()
            .requests
            .iter()
            .filter(|request| request.path() == path)
            .cloned()
            .collect()
    }

    async fn exchange(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let delay = {
            let mut state = self.lock();
            state.refresh_calls += 1;
            state.refresh_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let behaviour = self.lock().refresh_behaviour;
        let presented = request
            .body()
            .and_then(|body| body.get("refreshToken"))
            .and_then(Value::as_str);
        match behaviour {
            RefreshBehaviour::Accept if presented == Some(FAKE_REFRESH_TOKEN) => {
                let jwt = self.mint(Duration::seconds(TOKEN_LIFETIME));
                Ok(ApiResponse::json(StatusCode::OK, &json!({ "jwt": jwt })))
            }
            RefreshBehaviour::Accept | RefreshBehaviour::Reject => Ok(ApiResponse::json(
                StatusCode::UNAUTHORIZED,
                &json!({ "message": "Invalid refresh token" }),
            )),
            RefreshBehaviour::Unreachable => Err(Error::network(IoError::new(
                ErrorKind::ConnectionRefused,
                "fake backend unreachable",
            ))),
        }
    }
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn is_public(path: &str) -> bool {
    ["/api/v1/public/", "/api/v1/auth/", "/api/v1/election/"]
        .iter()
        .any(|prefix| path.starts_with(prefix))
}

#[async_trait]
impl Transport for FakeBackend {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse> {
        self.lock().requests.push(request.clone());
        if is_refresh_endpoint(request.path()) {
            return self.exchange(request).await;
        }

        let path = request.path().to_string();
        let state = self.lock();
        if state.unreachable.contains(&path) {
            return Err(Error::network(IoError::new(
                ErrorKind::ConnectionRefused,
                "fake backend unreachable",
            )));
        }
        if !is_public(&path)
            && (state.access_token.is_none() || request.bearer() != state.access_token.as_deref())
        {
            return Ok(ApiResponse::json(
                StatusCode::UNAUTHORIZED,
                &json!({ "message": "Token expired" }),
            ));
        }
        if let Some(response) = state.stubs.get(&(request.method().clone(), path.clone())) {
            return Ok(response.clone());
        }
        drop(state);

        let body = match (request.method(), path.as_str()) {
            (&Method::GET, "/api/v1/user") => {
                json!({ "userInfo": { "email": FAKE_USER_EMAIL, "firstName": "Olive" } })
            }
            (&Method::POST, "/api/v1/auth/login" | "/api/v1/auth/signup") => {
                serde_json::to_value(self.login_response())?
            }
            _ => json!({}),
        };
        Ok(ApiResponse::json(StatusCode::OK, &body))
    }
}
