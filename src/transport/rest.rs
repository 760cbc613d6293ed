//! Request/response transport over HTTP.
//!
//! DESIGN
//! ======
//! A thin layer over `reqwest::Client` that owns what the client itself
//! cannot change after construction: a mutable set of default headers and a
//! mutable timeout. Both are applied per request, so updating them affects
//! every later call without rebuilding the client.
//!
//! ERROR HANDLING
//! ==============
//! - No response (connect, DNS, reset): [`TransportError::Network`].
//! - Deadline exceeded: [`TransportError::Timeout`].
//! - Non-2xx status: [`TransportError::Http`] with the parsed body.
//! - 2xx with an unparsable body: [`TransportError::Decode`].

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use reqwest::Method;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Serialize;
use serde_json::Value;

use crate::error::{HttpError, TransportError};
use crate::logger::{Logger, default_logger};
use crate::transport::header_pair;

/// Query parameters as `(name, value)` pairs.
pub type QueryParams<'a> = &'a [(&'a str, &'a str)];

pub struct RestTransport {
    http: reqwest::Client,
    base_url: String,
    default_headers: RwLock<HeaderMap>,
    timeout: RwLock<Duration>,
    logger: Arc<dyn Logger>,
}

impl RestTransport {
    /// Build a transport rooted at `base_url` (e.g. `"https://stack.example.com"`).
    ///
    /// `timeout` bounds connect, read and write for every call until changed
    /// with [`RestTransport::set_timeout`].
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let mut defaults = HeaderMap::new();
        defaults.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let http = reqwest::Client::builder()
            .default_headers(defaults)
            .connect_timeout(timeout)
            .pool_idle_timeout(timeout)
            .build()
            .map_err(|e| TransportError::HttpClientBuild(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            default_headers: RwLock::new(HeaderMap::new()),
            timeout: RwLock::new(timeout),
            logger: default_logger(),
        })
    }

    #[must_use]
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full URL for `path` with optional query, as used in error context.
    #[must_use]
    pub fn url_for(&self, path: &str, query: Option<QueryParams<'_>>) -> String {
        let mut url = format!("{}{}", self.base_url, path);
        if let Some(params) = query.filter(|params| !params.is_empty()) {
            let joined = params
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("&");
            url.push('?');
            url.push_str(&joined);
        }
        url
    }

    /// Attach a header to every later request.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidHeader`] if the name or value is not valid HTTP.
    pub fn set_default_header(&self, name: &str, value: &str) -> Result<(), TransportError> {
        let (name, value) = header_pair(name, value)?;
        self.default_headers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, value);
        Ok(())
    }

    pub fn remove_default_header(&self, name: &str) {
        self.default_headers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
    }

    #[must_use]
    pub fn default_headers(&self) -> HeaderMap {
        self.default_headers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_timeout(&self, timeout: Duration) {
        *self.timeout.write().unwrap_or_else(PoisonError::into_inner) = timeout;
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        *self.timeout.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// `GET path`.
    ///
    /// # Errors
    ///
    /// See [`RestTransport::request`].
    pub async fn get(
        &self,
        path: &str,
        headers: &HeaderMap,
        query: Option<QueryParams<'_>>,
    ) -> Result<Value, TransportError> {
        self.request::<Value>(Method::GET, path, headers, None, query).await
    }

    /// `POST path` with a JSON body.
    ///
    /// # Errors
    ///
    /// See [`RestTransport::request`].
    pub async fn post<B: Serialize + ?Sized + Sync>(
        &self,
        path: &str,
        body: &B,
        headers: &HeaderMap,
        query: Option<QueryParams<'_>>,
    ) -> Result<Value, TransportError> {
        self.request(Method::POST, path, headers, Some(body), query).await
    }

    /// `PUT path` with a JSON body.
    ///
    /// # Errors
    ///
    /// See [`RestTransport::request`].
    pub async fn put<B: Serialize + ?Sized + Sync>(
        &self,
        path: &str,
        body: &B,
        headers: &HeaderMap,
        query: Option<QueryParams<'_>>,
    ) -> Result<Value, TransportError> {
        self.request(Method::PUT, path, headers, Some(body), query).await
    }

    /// `DELETE path`.
    ///
    /// # Errors
    ///
    /// See [`RestTransport::request`].
    pub async fn delete(
        &self,
        path: &str,
        headers: &HeaderMap,
        query: Option<QueryParams<'_>>,
    ) -> Result<Value, TransportError> {
        self.request::<Value>(Method::DELETE, path, headers, None, query).await
    }

    /// Send one request and return the parsed JSON body.
    ///
    /// `headers` are applied on top of the default headers and win on
    /// conflict. An empty success body is returned as `null`.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] as described in the module docs.
    pub async fn request<B: Serialize + ?Sized + Sync>(
        &self,
        method: Method,
        path: &str,
        headers: &HeaderMap,
        body: Option<&B>,
        query: Option<QueryParams<'_>>,
    ) -> Result<Value, TransportError> {
        let url = format!("{}{}", self.base_url, path);
        let timeout = self.timeout();

        let mut merged = self.default_headers();
        for (name, value) in headers {
            merged.insert(name.clone(), value.clone());
        }

        let mut request = self
            .http
            .request(method.clone(), &url)
            .headers(merged)
            .timeout(timeout);
        if let Some(params) = query {
            request = request.query(params);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        self.logger.debug(&format!("{method} {url}"));
        let response = request.send().await.map_err(|e| self.classify(&method, &url, e, timeout))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.classify(&method, &url, e, timeout))?;

        if !status.is_success() {
            let error = HttpError::new(status.as_u16(), parse_error_body(&bytes));
            self.logger.error(&format!("{method} {url} failed: {error}"));
            return Err(error.into());
        }

        parse_success_body(&bytes)
    }

    fn classify(&self, method: &Method, url: &str, error: reqwest::Error, timeout: Duration) -> TransportError {
        let error = if error.is_timeout() {
            TransportError::Timeout(timeout)
        } else {
            TransportError::from(error)
        };
        self.logger.error(&format!("{method} {url} failed: {error}"));
        error
    }
}

fn parse_success_body(bytes: &[u8]) -> Result<Value, TransportError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(bytes).map_err(|e| TransportError::Decode(e.to_string()))
}

fn parse_error_body(bytes: &[u8]) -> Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    serde_json::from_slice(bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

#[cfg(test)]
#[path = "rest_test.rs"]
mod tests;
