//! Authorized request dispatch.
//!
//! Every API call goes through [`Dispatcher::send`]. It attaches the held
//! credential, and when the registry answers 401 it logs the session out
//! before handing [`ApiError::AuthRequired`] back to the caller, so no call
//! site ever sees a half-authenticated result.

use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ApiError;
use crate::session::Session;

/// Media type for JSON bodies.
pub const APPLICATION_JSON: &str = "application/json";

/// Media type for raw bytes.
pub const APPLICATION_OCTET_STREAM: &str = "application/octet-stream";

/// An API call to be dispatched.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    accept: Option<String>,
    body: Option<serde_json::Value>,
}

impl ApiRequest {
    /// Creates a request for `path` (relative to the registry URL).
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            accept: None,
            body: None,
        }
    }

    /// Creates a GET request.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// Creates a HEAD request.
    #[must_use]
    pub fn head(path: impl Into<String>) -> Self {
        Self::new(Method::HEAD, path)
    }

    /// Creates a DELETE request.
    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Declares the media type the caller expects back. Sent as `Accept`
    /// and used to decode responses with a generic content type.
    #[must_use]
    pub fn accept(mut self, media_type: impl Into<String>) -> Self {
        self.accept = Some(media_type.into());
        self
    }

    /// Adds a query parameter.
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Sets a JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if `body` cannot be serialized.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body).map_err(|e| ApiError::InvalidResponse {
            message: format!("Cannot encode request body: {e}"),
        })?;
        self.body = Some(value);
        Ok(self)
    }

    /// Returns the request method.
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Decoded body of a successful response.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// No content.
    Empty,

    /// Structured (JSON) content, with the bytes it was parsed from.
    Structured {
        /// Parsed value.
        value: serde_json::Value,
        /// Raw bytes as received.
        raw: Vec<u8>,
    },

    /// Raw bytes.
    Raw(Vec<u8>),
}

/// A successful response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// HTTP status.
    pub status: StatusCode,

    /// Response headers.
    pub headers: HeaderMap,

    /// `Content-Type`, if any.
    pub content_type: Option<String>,

    /// Decoded body.
    pub body: ResponseBody,
}

impl ApiResponse {
    /// Returns the raw body bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        match &self.body {
            ResponseBody::Empty => &[],
            ResponseBody::Structured { raw, .. } | ResponseBody::Raw(raw) => raw,
        }
    }

    /// Consumes the response, returning the raw body bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        match self.body {
            ResponseBody::Empty => Vec::new(),
            ResponseBody::Structured { raw, .. } | ResponseBody::Raw(raw) => raw,
        }
    }

    /// Deserializes a structured body.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not structured or does not match `T`.
    pub fn json<T: DeserializeOwned>(self) -> Result<T, ApiError> {
        match self.body {
            ResponseBody::Structured { value, .. } => {
                serde_json::from_value(value).map_err(|e| ApiError::InvalidResponse {
                    message: e.to_string(),
                })
            }
            ResponseBody::Empty => Err(ApiError::InvalidResponse {
                message: "expected JSON, got an empty body".to_string(),
            }),
            ResponseBody::Raw(_) => Err(ApiError::InvalidResponse {
                message: format!(
                    "expected JSON, got {}",
                    self.content_type.as_deref().unwrap_or("untyped content")
                ),
            }),
        }
    }

    /// Returns a header value as a string.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Wraps every outbound API call with the session's credential.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    session: Arc<Session>,
}

impl Dispatcher {
    /// Creates a dispatcher bound to `session`.
    #[must_use]
    pub const fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    /// Returns the session.
    #[must_use]
    pub const fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Sends a request.
    ///
    /// # Errors
    ///
    /// - [`ApiError::AuthRequired`] on 401; the session is logged out first.
    /// - [`ApiError::Http`] on any other non-success status.
    /// - [`ApiError::Transport`] / [`ApiError::Timeout`] if no response arrives.
    /// - [`ApiError::InvalidResponse`] if a JSON body cannot be parsed.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let config = self.session.config();
        let url = config.endpoint(&request.path)?;

        let mut builder = self
            .session
            .http()
            .request(request.method.clone(), url.clone())
            .timeout(config.timeout)
            .headers(self.auth_headers()?);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(ref accept) = request.accept {
            builder = builder.header(ACCEPT, accept);
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        tracing::debug!(method = %request.method, path = %request.path, "Dispatching request");

        let response = builder
            .send()
            .await
            .map_err(|e| ApiError::from_reqwest(url.as_str(), e))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            tracing::warn!(method = %request.method, path = %request.path, "Registry rejected credential, logging out");
            self.session.logout();
            return Err(ApiError::AuthRequired);
        }

        if !status.is_success() {
            return Err(ApiError::Http {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let headers = response.headers().clone();
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let raw = response
            .bytes()
            .await
            .map_err(|e| ApiError::from_reqwest(url.as_str(), e))?
            .to_vec();

        let body = decode_body(
            raw,
            content_type.as_deref(),
            request.accept.as_deref(),
            &request.method,
        )?;

        Ok(ApiResponse {
            status,
            headers,
            content_type,
            body,
        })
    }

    /// GETs `path` and deserializes the JSON response.
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::send`].
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send(ApiRequest::get(path).accept(APPLICATION_JSON))
            .await?
            .json()
    }

    /// GETs `path` as raw bytes.
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::send`].
    pub async fn get_bytes(&self, path: &str) -> Result<Vec<u8>, ApiError> {
        Ok(self
            .send(ApiRequest::get(path).accept(APPLICATION_OCTET_STREAM))
            .await?
            .into_bytes())
    }

    /// Checks whether `path` exists with a HEAD request.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::AuthRequired`] and transport errors; a 404 is
    /// reported as `Ok(false)`.
    pub async fn head(&self, path: &str) -> Result<bool, ApiError> {
        match self.send(ApiRequest::head(path)).await {
            Ok(_) => Ok(true),
            Err(ApiError::Http { status: 404, .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Sends a DELETE request.
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::send`].
    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.send(ApiRequest::delete(path)).await.map(|_| ())
    }

    /// POSTs a JSON body and returns the response.
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::send`].
    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<ApiResponse, ApiError> {
        let request = ApiRequest::new(Method::POST, path)
            .accept(APPLICATION_JSON)
            .json(body)?;
        self.send(request).await
    }

    /// PUTs a JSON body and returns the response.
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::send`].
    pub async fn put_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<ApiResponse, ApiError> {
        let request = ApiRequest::new(Method::PUT, path)
            .accept(APPLICATION_JSON)
            .json(body)?;
        self.send(request).await
    }

    /// Creates authentication headers for the held credential.
    fn auth_headers(&self) -> Result<HeaderMap, ApiError> {
        let mut headers = HeaderMap::new();
        if let Some(value) = self.session.authorization_header() {
            let mut value = HeaderValue::from_str(&value).map_err(|_| ApiError::InvalidHeader)?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }
}

/// Returns true for content types that say nothing about the payload.
fn is_generic(media_type: &str) -> bool {
    matches!(
        media_type,
        "" | APPLICATION_OCTET_STREAM | "text/plain" | "*/*" | "binary/octet-stream"
    )
}

/// Returns true for JSON media types, including `+json` suffixes.
fn is_json(media_type: &str) -> bool {
    media_type == APPLICATION_JSON || media_type.ends_with("+json")
}

/// Strips parameters and normalizes case.
fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Picks the media type used to decode a body: the response's own, unless it
/// is absent or generic, in which case the caller's declared one.
fn effective_media_type(content_type: Option<&str>, declared: Option<&str>) -> Option<String> {
    let received = content_type.map(essence).filter(|t| !is_generic(t));
    received.or_else(|| declared.map(essence))
}

fn decode_body(
    raw: Vec<u8>,
    content_type: Option<&str>,
    declared: Option<&str>,
    method: &Method,
) -> Result<ResponseBody, ApiError> {
    if raw.is_empty() || *method == Method::HEAD {
        return Ok(ResponseBody::Empty);
    }

    match effective_media_type(content_type, declared) {
        Some(ref media_type) if is_json(media_type) => {
            let value = serde_json::from_slice(&raw).map_err(|e| ApiError::InvalidResponse {
                message: format!("Malformed JSON ({media_type}): {e}"),
            })?;
            Ok(ResponseBody::Structured { value, raw })
        }
        _ => Ok(ResponseBody::Raw(raw)),
    }
}
