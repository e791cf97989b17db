//! HTTP transport to the platform API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, Url};
use serde_json::Value;
use tracing::debug;

use crate::error::RequestError;

/// Raw response: status code and body text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parse the body as JSON. An empty body reads as `null`.
    pub fn json(&self) -> Result<Value, RequestError> {
        if self.body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&self.body)?)
    }

    /// Server-provided message for a failed response, falling back to the raw body.
    pub fn error_message(&self) -> String {
        let parsed: Option<Value> = serde_json::from_str(&self.body).ok();
        parsed
            .as_ref()
            .and_then(|value| value.get("message").or_else(|| value.get("error")))
            .and_then(Value::as_str)
            .map_or_else(|| self.body.trim().to_string(), str::to_string)
    }

    /// Turn a non-2xx response into `RequestError::Http`, otherwise parse the body.
    pub fn into_result(self) -> Result<Value, RequestError> {
        if self.is_success() {
            self.json()
        } else {
            Err(RequestError::http(self.status, self.error_message()))
        }
    }
}

/// Sends one request. Implementations report only network-level failures as
/// errors; HTTP status handling is left to the caller.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<TransportResponse, RequestError>;

    async fn get(&self, path: &str) -> Result<Value, RequestError> {
        self.request(Method::GET, path, None).await?.into_result()
    }
}

#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: Client,
    base: Url,
}

impl ReqwestTransport {
    pub fn new(
        base: &Url,
        timeout: Duration,
        user_agent: Option<&str>,
    ) -> Result<Self, RequestError> {
        let base = with_trailing_slash(base);
        let client = Client::builder()
            .user_agent(user_agent.unwrap_or(Self::user_agent()))
            .timeout(timeout)
            .build()
            .map_err(|err| RequestError::network(err.to_string()))?;
        Ok(Self { client, base })
    }

    pub fn user_agent() -> &'static str {
        concat!("atelier-cli/", env!("CARGO_PKG_VERSION"))
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn url(&self, path: &str) -> Result<Url, RequestError> {
        self.base
            .join(path.trim_start_matches('/'))
            .map_err(|err| RequestError::network(format!("invalid request path {path}: {err}")))
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<TransportResponse, RequestError> {
        let url = self.url(path)?;
        debug!(%method, %url, "Sending request");

        let mut req = self.client.request(method, url);
        if let Some(body) = body {
            req = req.json(&body);
        }

        let resp = req
            .send()
            .await
            .map_err(|err| RequestError::network(err.to_string()))?;
        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .map_err(|err| RequestError::network(err.to_string()))?;
        Ok(TransportResponse { status, body })
    }
}

fn with_trailing_slash(url: &Url) -> Url {
    if url.path().ends_with('/') {
        return url.clone();
    }
    let mut url = url.clone();
    let path = format!("{}/", url.path());
    url.set_path(&path);
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_is_null() {
        let resp = TransportResponse::new(204, "");
        assert_eq!(resp.json().expect("json"), Value::Null);
    }

    #[test]
    fn error_message_prefers_json_field() {
        let resp = TransportResponse::new(422, r#"{"message":"title is required"}"#);
        assert_eq!(resp.error_message(), "title is required");

        let resp = TransportResponse::new(500, r#"{"error":"database unavailable"}"#);
        assert_eq!(resp.error_message(), "database unavailable");

        let resp = TransportResponse::new(502, "bad gateway\n");
        assert_eq!(resp.error_message(), "bad gateway");
    }

    #[test]
    fn into_result_maps_status() {
        let err = TransportResponse::new(404, r#"{"message":"not found"}"#)
            .into_result()
            .expect_err("404 should fail");
        assert_eq!(err, RequestError::http(404, "not found"));
    }

    #[test]
    fn url_keeps_base_path() {
        let base = Url::parse("http://example.test/platform").expect("url");
        let transport =
            ReqwestTransport::new(&base, Duration::from_secs(5), None).expect("transport");
        let url = transport.url("/api/journals?page=2").expect("join");
        assert_eq!(url.as_str(), "http://example.test/platform/api/journals?page=2");
    }
}
