//! HTTP Client Implementation using Reqwest

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, HttpStreamResponse, RetryPolicy},
};
use futures_util::TryStreamExt;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::io::StreamReader;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("media-backup-core/", env!("CARGO_PKG_VERSION"));

/// Reqwest-based HTTP client implementation
///
/// Server errors (5xx) and transport failures are retried with backoff.
/// Every other status, 429 included, is handed back to the caller as-is.
pub struct ReqwestHttpClient {
    client: Client,
}

impl ReqwestHttpClient {
    /// Create a new HTTP client with default configuration
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(30))
    }

    /// Create a new HTTP client with custom timeout
    ///
    /// The timeout covers a whole request including the body, so large media
    /// downloads should use a generous value or a per-request override.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| {
                BridgeError::NotAvailable(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self { client })
    }

    /// Wrap an already configured reqwest client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn convert_method(method: HttpMethod) -> reqwest::Method {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Head => reqwest::Method::HEAD,
        }
    }

    fn build_request(&self, request: &HttpRequest) -> reqwest::RequestBuilder {
        let method = Self::convert_method(request.method);
        let mut req = self.client.request(method, &request.url);

        for (key, value) in &request.headers {
            req = req.header(key, value);
        }

        if let Some(body) = &request.body {
            req = req.body(body.clone());
        }

        if let Some(timeout) = request.timeout {
            req = req.timeout(timeout);
        }

        req
    }

    fn collect_headers(response: &reqwest::Response) -> HashMap<String, String> {
        response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|s| (k.to_string(), s.to_string())))
            .collect()
    }

    fn transport_error(e: reqwest::Error) -> BridgeError {
        if e.is_timeout() {
            BridgeError::OperationFailed("Request timed out".to_string())
        } else if e.is_connect() {
            BridgeError::OperationFailed(format!("Connection failed: {}", e))
        } else {
            BridgeError::OperationFailed(e.to_string())
        }
    }

    /// Send the request until it gets a non-5xx answer or attempts run out.
    ///
    /// When every attempt ends in a server error the last response is
    /// returned, so the caller still sees the real status.
    async fn send_with_retry(
        &self,
        request: &HttpRequest,
        policy: &RetryPolicy,
    ) -> Result<reqwest::Response> {
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!(
                attempt = attempt,
                max_attempts = max_attempts,
                method = ?request.method,
                "Executing HTTP request"
            );

            let outcome = self.build_request(request).send().await;
            let exhausted = attempt >= max_attempts;

            match outcome {
                Ok(response) if response.status().is_server_error() && !exhausted => {
                    warn!(
                        status = response.status().as_u16(),
                        attempt = attempt,
                        "HTTP request failed with server error, retrying"
                    );
                }
                Ok(response) => return Ok(response),
                Err(e) if !exhausted => {
                    warn!(error = %e, attempt = attempt, "HTTP request failed, retrying");
                }
                Err(e) => return Err(Self::transport_error(e)),
            }

            let delay = policy.delay_for(attempt);
            debug!(delay_ms = delay.as_millis() as u64, "Retrying after delay");
            sleep(delay).await;
        }
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.execute_with_retry(request, RetryPolicy::default())
            .await
    }

    async fn execute_with_retry(
        &self,
        request: HttpRequest,
        policy: RetryPolicy,
    ) -> Result<HttpResponse> {
        let response = self.send_with_retry(&request, &policy).await?;
        let status = response.status().as_u16();
        let headers = Self::collect_headers(&response);
        let body = response.bytes().await.map_err(Self::transport_error)?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    async fn execute_stream(&self, request: HttpRequest) -> Result<HttpStreamResponse> {
        let response = self
            .send_with_retry(&request, &RetryPolicy::default())
            .await?;
        let status = response.status().as_u16();
        let headers = Self::collect_headers(&response);

        let stream = response.bytes_stream().map_err(std::io::Error::other);
        let reader = StreamReader::new(stream);

        Ok(HttpStreamResponse {
            status,
            headers,
            body: Box::new(reader),
        })
    }
}
