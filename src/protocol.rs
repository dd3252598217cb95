//! Request plumbing shared by every facade
//!
//! [`Protocol`] owns the transport, applies the headers the Amber API expects,
//! bounds every call with the configured timeout and turns raw responses into
//! JSON or a classified [`AmberError`].

use crate::config::ApiConfig;
use crate::error::{AmberError, Result};
use crate::logging::{StructuredLogger, get_logger};
use crate::session::Session;
use std::sync::Arc;
use std::time::Duration;

pub mod transport;

pub use transport::{ApiRequest, ApiResponse, HttpMethod, ReqwestTransport, Transport};

/// Request body the account API expects on its POST endpoints
pub(crate) fn empty_headers_body() -> serde_json::Value {
    serde_json::json!({
        "headers": { "normalizedNames": {}, "lazyUpdate": null, "headers": {} }
    })
}

/// Which upstream a request goes to; decides how 401/403 are classified
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// Account API: a 401/403 means the credentials or session were refused
    Account,
    /// Public market list and geocoder: a 401/403 is an ordinary fetch failure
    Public,
}

/// Shared request layer over a [`Transport`]
pub struct Protocol {
    transport: Arc<dyn Transport>,
    api: ApiConfig,
    timeout: Duration,
    logger: StructuredLogger,
}

impl Protocol {
    pub fn new(api: ApiConfig, transport: Arc<dyn Transport>) -> Self {
        let timeout = Duration::from_millis(api.request_timeout_ms);
        Self {
            transport,
            api,
            timeout,
            logger: get_logger("protocol"),
        }
    }

    pub fn api_config(&self) -> &ApiConfig {
        &self.api
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Absolute URL for a path below the account API base
    pub fn api_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// POST to the account API, attaching session tokens when given
    pub async fn api_post(
        &self,
        path: &str,
        body: serde_json::Value,
        session: Option<&Session>,
    ) -> Result<serde_json::Value> {
        let mut request = self.account_request(ApiRequest::post(self.api_url(path)).with_json(body));
        if let Some(session) = session {
            request = request.with_header("Authorization", session.id_token());
            if let Some(refresh) = session.refresh_token() {
                request = request.with_header("RefreshToken", refresh);
            }
        }
        self.send_json(request, Endpoint::Account).await
    }

    /// Unauthenticated POST to an absolute URL (the public market endpoint)
    pub async fn raw_post(&self, url: &str, body: serde_json::Value) -> Result<serde_json::Value> {
        let request = self.account_request(ApiRequest::post(url).with_json(body));
        self.send_json(request, Endpoint::Public).await
    }

    /// GET with query parameters; used for third-party lookups
    pub async fn get_json(
        &self,
        url: &str,
        query: Vec<(String, String)>,
    ) -> Result<serde_json::Value> {
        let mut request = ApiRequest::get(url).with_header("Referer", self.api.referer.clone());
        request.query = query;
        self.send_json(request, Endpoint::Public).await
    }

    fn account_request(&self, request: ApiRequest) -> ApiRequest {
        request
            .with_header("Referer", self.api.referer.clone())
            .with_header("Origin", self.api.origin.clone())
            .with_header("Content-Type", "application/json")
    }

    /// Execute a request within the timeout and classify the status
    pub async fn send(&self, request: ApiRequest, endpoint: Endpoint) -> Result<ApiResponse> {
        let method = request.method;
        let url = request.url.clone();
        self.logger
            .trace(&format!("{:?} {} ({} query params)", method, url, request.query.len()));

        let response = tokio::time::timeout(self.timeout, self.transport.execute(request))
            .await
            .map_err(|_| {
                AmberError::timeout(format!(
                    "{:?} {} exceeded {} ms",
                    method,
                    url,
                    self.timeout.as_millis()
                ))
            })??;

        match response.status {
            401 | 403 if endpoint == Endpoint::Account => Err(AmberError::auth(format!(
                "Access denied by {} (status {})",
                url, response.status
            ))),
            _ if !response.is_success() => Err(AmberError::fetch_status(
                response.status,
                format!("{} returned status {}", url, response.status),
            )),
            _ => Ok(response),
        }
    }

    async fn send_json(
        &self,
        request: ApiRequest,
        endpoint: Endpoint,
    ) -> Result<serde_json::Value> {
        let url = request.url.clone();
        let response = self.send(request, endpoint).await?;
        if response.body.trim().is_empty() {
            return Err(AmberError::protocol(format!("Empty response body from {}", url)));
        }
        serde_json::from_str(&response.body)
            .map_err(|e| AmberError::protocol(format!("Undecodable response from {}: {}", url, e)))
    }
}

/// Pull the `data` member out of an account/market API envelope
pub(crate) fn data_member(body: serde_json::Value, what: &str) -> Result<serde_json::Value> {
    match body {
        serde_json::Value::Object(mut map) => map
            .remove("data")
            .filter(|v| !v.is_null())
            .ok_or_else(|| AmberError::protocol(format!("{} response has no data member", what))),
        _ => Err(AmberError::protocol(format!(
            "{} response is not a JSON object",
            what
        ))),
    }
}
