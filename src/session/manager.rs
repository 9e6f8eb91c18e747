use std::fmt::{Debug, Formatter};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use chrono::{DateTime, Duration, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::Result;
use crate::model::auth::{AuthResponse, RefreshRequest, RefreshResponse};
use crate::scheduled_task::ScheduledTask;
use crate::transport::{ApiRequest, ApiResponse, Transport, REFRESH_PATH};

use super::store::{SessionStore, StoreKey};
use super::token::expiry_of;

/// How long before expiry the access token is renewed.
pub const RENEWAL_LEAD_SECS: i64 = 30;

/// Renewal never fires sooner than this after being armed.
pub const MIN_RENEWAL_DELAY_SECS: i64 = 5;

/// When to renew a token expiring at `expiry`, given the current time.
pub fn renewal_time(expiry: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    let target = expiry - Duration::seconds(RENEWAL_LEAD_SECS);
    let earliest = now + Duration::seconds(MIN_RENEWAL_DELAY_SECS);
    target.max(earliest)
}

/// One refresh-token exchange, shared by everyone who asks for a refresh while it runs.
type RefreshFuture = Shared<BoxFuture<'static, bool>>;

/// Owns the access/refresh token lifecycle for one authenticated client.
///
/// Cloning is cheap and yields a handle to the same session.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

struct Inner {
    transport: Arc<dyn Transport>,
    state: Mutex<State>,
}

struct State {
    store: Box<dyn SessionStore>,
    /// Bumped whenever a session begins or ends. Work started under an older
    /// generation must not touch the session.
    generation: u64,
    /// Source of identifiers for refreshes and renewal timers.
    next_id: u64,
    refresh: Option<(u64, RefreshFuture)>,
    renewal: Option<(u64, ScheduledTask)>,
}

impl State {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn cancel_renewal(&mut self) {
        if let Some((_, task)) = self.renewal.take() {
            task.abort();
        }
    }

    /// Remove the credentials and cached profile, attempting every key even if one fails.
    fn clear_credentials(&mut self) -> io::Result<()> {
        let access = self.store.remove(StoreKey::AccessToken);
        let refresh = self.store.remove(StoreKey::RefreshToken);
        let user = self.store.remove(StoreKey::User);
        access.and(refresh).and(user)
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        // Nothing panics while holding the lock.
        self.state.lock().expect("session state lock poisoned")
    }

    /// Arm the renewal timer for `token`, replacing any pending one.
    fn arm_renewal(self: &Arc<Self>, state: &mut State, token: &str) {
        state.cancel_renewal();
        let expiry = match expiry_of(token) {
            Some(expiry) => expiry,
            // Renewal then relies on the reactive 401 path alone.
            None => return,
        };

        let run_at = renewal_time(expiry, Utc::now());
        let id = state.next_id();
        let generation = state.generation;
        let weak = Arc::downgrade(self);
        let task = ScheduledTask::new(
            async move {
                if let Some(inner) = weak.upgrade() {
                    Inner::renew(inner, id, generation).await;
                }
            },
            run_at,
        );
        info!("Access token renewal armed for {run_at} (expires {expiry})");
        state.renewal = Some((id, task));
    }

    /// Body of the renewal timer.
    async fn renew(self: Arc<Self>, id: u64, generation: u64) {
        {
            let mut state = self.lock();
            let current = state.renewal.as_ref().map(|(current, _)| *current);
            if current != Some(id) || state.generation != generation {
                return;
            }
            // Detach so that re-arming after the refresh does not abort this task.
            state.renewal = None;
        }

        info!("Renewing access token ahead of expiry");
        let session = SessionManager { inner: self };
        if !session.refresh().await {
            warn!("Scheduled renewal failed, ending session");
            session.end_session(generation);
        }
    }

    /// Exchange the refresh token for a new access token.
    async fn exchange(self: Arc<Self>, id: u64, generation: u64) -> bool {
        let refresh_token = self.lock().store.get(StoreKey::RefreshToken);
        let jwt = match refresh_token {
            Some(refresh_token) => self.request_access_token(refresh_token).await,
            None => {
                debug!("No refresh token stored, cannot refresh");
                None
            }
        };

        let mut state = self.lock();
        if matches!(&state.refresh, Some((current, _)) if *current == id) {
            state.refresh = None;
        }
        let jwt = match jwt {
            Some(jwt) => jwt,
            None => return false,
        };
        if state.generation != generation {
            info!("Discarding refreshed access token: session ended during refresh");
            return false;
        }
        if let Err(e) = state.store.set(StoreKey::AccessToken, jwt.clone()) {
            error!("Failed to store refreshed access token: {e}");
            return false;
        }
        info!("Access token refreshed");
        self.arm_renewal(&mut state, &jwt);
        true
    }

    async fn request_access_token(&self, refresh_token: String) -> Option<String> {
        info!("Refreshing access token");
        let request = match ApiRequest::post(REFRESH_PATH)
            .public()
            .json(&RefreshRequest { refresh_token })
        {
            Ok(request) => request,
            Err(e) => {
                error!("Failed to build refresh request: {e}");
                return None;
            }
        };
        let response = self
            .transport
            .send(&request)
            .await
            .and_then(ApiResponse::into_result::<RefreshResponse>);
        match response {
            Ok(RefreshResponse { jwt: Some(jwt) }) => Some(jwt),
            Ok(_) => {
                warn!("Refresh response carried no access token");
                None
            }
            Err(e) => {
                warn!("Refresh failed: {e}");
                None
            }
        }
    }
}

impl SessionManager {
    /// Create a manager with no timers armed. Call [`SessionManager::init`] to resume
    /// renewal for a session found in `store`.
    pub fn new(transport: impl Transport, store: impl SessionStore) -> Self {
        Self::from_parts(Arc::new(transport), Box::new(store))
    }

    pub fn from_parts(transport: Arc<dyn Transport>, store: Box<dyn SessionStore>) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                state: Mutex::new(State {
                    store,
                    generation: 0,
                    next_id: 0,
                    refresh: None,
                    renewal: None,
                }),
            }),
        }
    }

    /// Resume proactive renewal for a stored session, if any.
    /// Must be called from within a tokio runtime.
    pub fn init(&self) {
        let mut state = self.inner.lock();
        if let Some(token) = state.store.get(StoreKey::AccessToken) {
            self.inner.arm_renewal(&mut state, &token);
        }
    }

    /// Stop the renewal timer, leaving stored state alone.
    pub fn dispose(&self) {
        self.inner.lock().cancel_renewal();
    }

    /// Install the session returned by login or signup, replacing any previous one.
    /// Must be called from within a tokio runtime.
    pub fn begin(&self, auth: &AuthResponse) -> Result<()> {
        let mut state = self.inner.lock();
        state.generation += 1;
        state.refresh = None;
        state.cancel_renewal();
        state.clear_credentials()?;

        if let Some(jwt) = &auth.jwt {
            state.store.set(StoreKey::AccessToken, jwt.clone())?;
        }
        if let Some(refresh_token) = &auth.refresh_token {
            state.store.set(StoreKey::RefreshToken, refresh_token.clone())?;
        }
        if let Some(user) = &auth.user_info {
            state.store.set(StoreKey::User, user.to_string())?;
        }
        info!("Session started");

        if let Some(jwt) = &auth.jwt {
            self.inner.arm_renewal(&mut state, jwt);
        }
        Ok(())
    }

    /// End the session. Any refresh still in flight completes as a no-op.
    pub fn logout(&self) -> Result<()> {
        let mut state = self.inner.lock();
        state.generation += 1;
        state.refresh = None;
        state.cancel_renewal();
        state.clear_credentials()?;
        info!("Session ended by logout");
        Ok(())
    }

    /// End the session only if it is still the one that started at `generation`.
    fn end_session(&self, generation: u64) {
        let mut state = self.inner.lock();
        if state.generation != generation {
            return;
        }
        state.generation += 1;
        state.refresh = None;
        state.cancel_renewal();
        if let Err(e) = state.clear_credentials() {
            error!("Failed to clear session state: {e}");
        }
        warn!("Session expired and was cleared");
    }

    pub fn access_token(&self) -> Option<String> {
        self.get(StoreKey::AccessToken)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.get(StoreKey::RefreshToken)
    }

    pub fn is_authenticated(&self) -> bool {
        self.access_token().is_some()
    }

    /// The cached profile of the logged-in user.
    pub fn user(&self) -> Option<Value> {
        self.get(StoreKey::User)
            .and_then(|text| serde_json::from_str(&text).ok())
    }

    /// When the pending renewal timer will fire, if one is armed.
    pub fn renewal_due(&self) -> Option<DateTime<Utc>> {
        self.inner
            .lock()
            .renewal
            .as_ref()
            .map(|(_, task)| task.run_at())
    }

    pub(crate) fn get(&self, key: StoreKey) -> Option<String> {
        self.inner.lock().store.get(key)
    }

    pub(crate) fn set(&self, key: StoreKey, value: String) -> Result<()> {
        self.inner.lock().store.set(key, value)?;
        Ok(())
    }

    /// Replace the access token using the refresh token.
    ///
    /// Concurrent callers share a single exchange and its outcome. On success the
    /// renewal timer is re-armed for the new token. On failure the session is left
    /// as it was; deciding to end it is up to the caller.
    pub async fn refresh(&self) -> bool {
        let refresh = {
            let mut state = self.inner.lock();
            let pending = state.refresh.as_ref().map(|(_, refresh)| refresh.clone());
            match pending {
                Some(refresh) => refresh,
                None => {
                    let id = state.next_id();
                    let generation = state.generation;
                    let weak: Weak<Inner> = Arc::downgrade(&self.inner);
                    let refresh = async move {
                        match weak.upgrade() {
                            Some(inner) => inner.exchange(id, generation).await,
                            None => false,
                        }
                    }
                    .boxed()
                    .shared();
                    state.refresh = Some((id, refresh.clone()));
                    refresh
                }
            }
        };
        refresh.await
    }

    /// Send a request with the current access token attached.
    ///
    /// A 401 on an authenticated request triggers one shared refresh and, if that
    /// succeeds, exactly one retry with the new token. If the refresh fails, the
    /// session is cleared and the original 401 response is returned.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let (token, generation) = {
            let state = self.inner.lock();
            let token = if request.requires_auth() {
                state.store.get(StoreKey::AccessToken)
            } else {
                None
            };
            (token, state.generation)
        };

        let response = self.inner.transport.send(&request.with_bearer(token)).await?;
        if response.status != StatusCode::UNAUTHORIZED || !request.retries_on_401() {
            return Ok(response);
        }

        debug!(
            "{} {} was unauthorized, attempting refresh",
            request.method(),
            request.path()
        );
        if self.refresh().await {
            let retry = request.with_bearer(self.access_token());
            return self.inner.transport.send(&retry).await;
        }

        self.end_session(generation);
        Ok(response)
    }

    /// [`SessionManager::send`], then decode the body or turn an error status into
    /// [`crate::Error::Http`].
    pub async fn request<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        self.send(request).await?.into_result()
    }
}

impl Debug for SessionManager {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("SessionManager")
            .field("generation", &state.generation)
            .field("authenticated", &state.store.get(StoreKey::AccessToken).is_some())
            .field("refreshing", &state.refresh.is_some())
            .field(
                "renewal_due",
                &state.renewal.as_ref().map(|(_, task)| task.run_at()),
            )
            .finish()
    }
}
