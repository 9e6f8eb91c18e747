use async_trait::async_trait;
use reqwest::{header::AUTHORIZATION, Client as HttpClient, Method, StatusCode, Url};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::logging::{log_failure, log_request, log_response, RequestId};

/// Path of the refresh-token exchange. Requests to it never trigger a refresh themselves.
pub const REFRESH_PATH: &str = "/api/v1/auth/refresh";

/// A request to the backend, relative to the API base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<Value>,
    bearer: Option<String>,
    auth: bool,
    retry_on_401: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            bearer: None,
            auth: true,
            retry_on_401: true,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Append a query parameter. Values are encoded when the request is sent.
    pub fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    /// Attach a JSON body.
    pub fn json(mut self, body: &impl Serialize) -> Result<Self> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    /// Send without credentials, e.g. public voting endpoints.
    pub fn public(mut self) -> Self {
        self.auth = false;
        self
    }

    /// Surface a 401 directly instead of refreshing and retrying.
    pub fn no_retry(mut self) -> Self {
        self.retry_on_401 = false;
        self
    }

    /// The same request carrying the given access token.
    pub fn with_bearer(&self, token: Option<String>) -> Self {
        Self {
            bearer: token,
            ..self.clone()
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query_pairs(&self) -> &[(String, String)] {
        &self.query
    }

    /// The value of query parameter `key`, if present.
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    pub fn bearer(&self) -> Option<&str> {
        self.bearer.as_deref()
    }

    pub fn requires_auth(&self) -> bool {
        self.auth
    }

    /// May a 401 response to this request trigger a refresh and one retry?
    pub fn retries_on_401(&self) -> bool {
        self.auth && self.retry_on_401 && !is_refresh_endpoint(&self.path)
    }
}

/// Is this path the refresh-token exchange itself?
pub fn is_refresh_endpoint(path: &str) -> bool {
    path.contains(REFRESH_PATH)
}

/// A response from the backend: its status and raw body text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// A response with a JSON body.
    pub fn json(status: StatusCode, body: &Value) -> Self {
        Self::new(status, body.to_string())
    }

    /// The body as JSON. An empty body counts as an empty object.
    pub fn value(&self) -> Result<Value> {
        if self.body.trim().is_empty() {
            return Ok(Value::Object(Default::default()));
        }
        Ok(serde_json::from_str(&self.body)?)
    }

    /// Turn an error status into [`Error::Http`], otherwise decode the body.
    pub fn into_result<T: DeserializeOwned>(self) -> Result<T> {
        let data = self.value();
        if !self.status.is_success() {
            let data = data.unwrap_or(Value::Null);
            let message = data
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("HTTP {}", self.status.as_u16()));
            return Err(Error::Http {
                status: self.status,
                message,
                data,
            });
        }
        Ok(serde_json::from_value(data?)?)
    }
}

/// Something that can deliver requests to the backend.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Deliver the request. `Err` means no response was obtained at all;
    /// error statuses are returned as ordinary responses.
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse>;
}

/// [`Transport`] over real HTTP.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: HttpClient,
    base_url: Url,
}

impl HttpTransport {
    pub fn new(config: &Config) -> Result<Self> {
        let client = HttpClient::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(Error::network)?;
        Ok(Self {
            client,
            base_url: config.base_url()?,
        })
    }

    fn url_for(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| Error::BadRequest(format!("Invalid request path {path:?}: {e}")))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let id = RequestId::next();
        let url = self.url_for(request.path())?;
        log_request(id, request.method(), url.as_str());

        let mut builder = self.client.request(request.method().clone(), url);
        if !request.query_pairs().is_empty() {
            builder = builder.query(request.query_pairs());
        }
        if let Some(body) = request.body() {
            builder = builder.json(body);
        }
        if let Some(token) = request.bearer() {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                log_failure(id, request.path(), &e);
                return Err(Error::network(e));
            }
        };
        let status = response.status();
        log_response(id, status, request.path());
        let body = response.text().await.map_err(Error::network)?;
        Ok(ApiResponse::new(status, body))
    }
}
