//! # Backend API Client
//!
//! Thin JSON client over the custom commerce backend.
//!
//! ## Responses
//! - Non-2xx: `ApiError` carrying the backend's `message` (and field `errors`) when it sent JSON
//! - 204 or an empty body: JSON `null`
//! - `{ "data": ... }` envelopes are unwrapped, bare payloads are taken as-is
//! - Non-JSON bodies come back as a JSON string
use reqwest::{
    Client, Method, RequestBuilder, Response, StatusCode,
    header::{CONTENT_LENGTH, CONTENT_TYPE},
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::error::{ApiError, Result};

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:3001/api";

/// Upstream answer handed back untouched, for proxying.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    http: Client,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    pub fn with_client(base_url: impl Into<String>, http: Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{endpoint}", self.base_url)
    }

    fn build(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
        token: Option<&str>,
    ) -> RequestBuilder {
        let mut request = self
            .http
            .request(method, self.url(endpoint))
            .header(CONTENT_TYPE, "application/json");

        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        if let Some(body) = body {
            request = request.json(body);
        }

        request
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request.send().await?;
        let data = read_response(response).await?;

        Ok(serde_json::from_value(data)?)
    }

    /// `None` parameters are left out of the query string.
    pub async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, Option<String>)],
        token: Option<&str>,
    ) -> Result<T> {
        let query: Vec<(&str, &str)> = params
            .iter()
            .filter_map(|(key, value)| value.as_deref().map(|value| (*key, value)))
            .collect();

        debug!("GET {endpoint}");
        let request = self.build(Method::GET, endpoint, None, token).query(&query);

        self.send(request).await
    }

    pub async fn post<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: Option<&Value>,
        token: Option<&str>,
    ) -> Result<T> {
        debug!("POST {endpoint}");
        self.send(self.build(Method::POST, endpoint, body, token))
            .await
    }

    pub async fn put<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: Option<&Value>,
        token: Option<&str>,
    ) -> Result<T> {
        debug!("PUT {endpoint}");
        self.send(self.build(Method::PUT, endpoint, body, token))
            .await
    }

    pub async fn patch<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: Option<&Value>,
        token: Option<&str>,
    ) -> Result<T> {
        debug!("PATCH {endpoint}");
        self.send(self.build(Method::PATCH, endpoint, body, token))
            .await
    }

    pub async fn delete<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: Option<&Value>,
        token: Option<&str>,
    ) -> Result<T> {
        debug!("DELETE {endpoint}");
        self.send(self.build(Method::DELETE, endpoint, body, token))
            .await
    }

    /// Forwards a request and returns status and body without interpreting either.
    pub async fn forward(
        &self,
        method: Method,
        endpoint: &str,
        raw_query: Option<&str>,
        body: Option<&Value>,
        token: Option<&str>,
    ) -> Result<RawResponse> {
        let endpoint = match raw_query.filter(|query| !query.is_empty()) {
            Some(query) => format!("{endpoint}?{query}"),
            None => endpoint.to_string(),
        };

        debug!("Forwarding {method} {endpoint}");
        read_raw(self.build(method, &endpoint, body, token)).await
    }

    /// Like [`forward`](Self::forward), with `params` encoded into the query.
    pub async fn forward_with(
        &self,
        method: Method,
        endpoint: &str,
        params: &[(&str, String)],
        body: Option<&Value>,
        token: Option<&str>,
    ) -> Result<RawResponse> {
        debug!("Forwarding {method} {endpoint} with {} params", params.len());
        read_raw(self.build(method, endpoint, body, token).query(params)).await
    }
}

async fn read_raw(request: RequestBuilder) -> Result<RawResponse> {
    let response = request.send().await?;
    let status = response.status();

    if is_empty(&response) {
        return Ok(RawResponse {
            status: status.as_u16(),
            body: None,
        });
    }

    let text = response.text().await?;
    let body = if text.is_empty() {
        None
    } else {
        Some(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    };

    Ok(RawResponse {
        status: status.as_u16(),
        body,
    })
}

fn is_json(response: &Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.contains("application/json"))
}

fn is_empty(response: &Response) -> bool {
    response.status() == StatusCode::NO_CONTENT
        || response
            .headers()
            .get(CONTENT_LENGTH)
            .is_some_and(|value| value.as_bytes() == b"0")
}

async fn read_response(response: Response) -> Result<Value> {
    let status = response.status();
    let json = is_json(&response);

    if !status.is_success() {
        let mut message = format!(
            "API Error: {}",
            status.canonical_reason().unwrap_or("Unknown")
        );
        let mut errors = None;

        if json {
            if let Ok(body) = response.json::<Value>().await {
                if let Some(text) = body.get("message").and_then(Value::as_str) {
                    message = text.to_string();
                }
                errors = body
                    .get("errors")
                    .cloned()
                    .and_then(|errors| serde_json::from_value(errors).ok());
            }
        }

        return Err(ApiError {
            status: status.as_u16(),
            message,
            errors,
        }
        .into());
    }

    if is_empty(&response) {
        return Ok(Value::Null);
    }

    let data = if json {
        response.json::<Value>().await?
    } else {
        Value::String(response.text().await?)
    };

    Ok(unwrap_envelope(data))
}

pub fn unwrap_envelope(data: Value) -> Value {
    match data {
        Value::Object(mut map) if map.contains_key("data") => {
            map.remove("data").unwrap_or_default()
        }
        other => other,
    }
}
