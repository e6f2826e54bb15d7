use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::{Client, Method, Response};
use tracing::warn;

use crate::{prelude::*, Error, HttpErrorKind};

/// HTTP status codes that indicate transient server errors (retryable)
const RETRYABLE_STATUS_CODES: &[u16] = &[502, 503, 504];

/// Maximum number of retry attempts for transient errors
const MAX_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds (doubles with each retry)
const INITIAL_BACKOFF_MS: u64 = 100;

/// Thin wrapper around [`reqwest::Client`] shared by all gateway services.
///
/// Adds retry with exponential backoff for transient server errors and a
/// uniform status-code-to-error mapping.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    request_timeout: Duration,
}

async fn parse_response(response: Response) -> Result<String> {
    let status = response.status().as_u16();
    let text = response
        .text()
        .await
        .map_err(|e| Error::GenericRequest(e.to_string()))?;

    if status < 400 {
        return Ok(text);
    }
    let kind = if (400..500).contains(&status) {
        HttpErrorKind::Client {
            status: Some(status),
            message: text,
        }
    } else {
        HttpErrorKind::Server { message: text }
    };
    Err(Error::Http { status, kind })
}

impl HttpClient {
    /// Build a client with the given connect and per-request timeouts.
    /// `verify_ssl = false` accepts self-signed gateway certificates.
    pub fn new(
        connect_timeout: Duration,
        request_timeout: Duration,
        verify_ssl: bool,
    ) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .danger_accept_invalid_certs(!verify_ssl)
            .build()
            .map_err(|e| Error::GenericRequest(e.to_string()))?;
        Ok(Self {
            client,
            request_timeout,
        })
    }

    /// Send a GET request. Query parameters are appended as-is.
    pub async fn get(
        &self,
        url: &str,
        parameters: &[(&str, String)],
        headers: HeaderMap,
    ) -> Result<String> {
        self.execute(Method::GET, url, parameters, headers, None, None)
            .await
    }

    /// Send a POST request with a JSON body. `timeout` overrides the default
    /// request timeout (wifi scans run much longer than config pushes).
    pub async fn post(
        &self,
        url: &str,
        body: serde_json::Value,
        headers: HeaderMap,
        timeout: Option<Duration>,
    ) -> Result<String> {
        self.execute(Method::POST, url, &[], headers, Some(body), timeout)
            .await
    }

    /// Send the request with automatic retry for transient server errors
    /// (502, 503, 504), backing off 100ms, 200ms, 400ms between attempts.
    async fn execute(
        &self,
        method: Method,
        url: &str,
        parameters: &[(&str, String)],
        headers: HeaderMap,
        body: Option<serde_json::Value>,
        timeout: Option<Duration>,
    ) -> Result<String> {
        for attempt in 0..=MAX_RETRIES {
            let mut request = self
                .client
                .request(method.clone(), url)
                .timeout(timeout.unwrap_or(self.request_timeout))
                .headers(headers.clone());
            if !parameters.is_empty() {
                request = request.query(parameters);
            }
            if let Some(body) = &body {
                request = request.json(body);
            }

            let result = request.send().await.map_err(|e| {
                Error::GenericRequest(e.to_string())
            })?;

            let status = result.status().as_u16();
            if RETRYABLE_STATUS_CODES.contains(&status) && attempt < MAX_RETRIES {
                let backoff = Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt));
                warn!(
                    status = status,
                    attempt = attempt + 1,
                    max_attempts = MAX_RETRIES + 1,
                    backoff_ms = backoff.as_millis(),
                    url = %url,
                    "Retryable HTTP error, backing off"
                );
                tokio::time::sleep(backoff).await;
                continue;
            }

            return parse_response(result).await;
        }
        unreachable!("retry loop always returns on the final attempt")
    }
}
