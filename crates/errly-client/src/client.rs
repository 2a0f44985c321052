use std::time::Duration;

use async_trait::async_trait;
use errly_core::scope::CaptureGuard;
use errly_core::wire;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, StatusCode};
use tracing::{debug, error, warn};

use crate::error::ClientError;
use crate::model::{IngestErrorBody, IngestRequest, IngestResponse};

/// Path of the ingest endpoint, relative to the base URL
pub const INGEST_PATH: &str = "api/v1/ingest";

/// `User-Agent` sent with every request
pub const CLIENT_USER_AGENT: &str = concat!("errly-rust/", env!("CARGO_PKG_VERSION"));

const RATE_LIMIT_RESET_HEADER: &str = "X-RateLimit-Reset";

/// Sends ingest requests to the Errly service.
///
/// `deliver` is the entry point used from capture paths: it blocks until the
/// attempt finishes and never reports failure to the caller.
#[async_trait]
pub trait DeliveryClient: Send + Sync {
    async fn send(&self, request: &IngestRequest) -> Result<IngestResponse, ClientError>;

    /// Send `request` from synchronous code, logging any failure.
    ///
    /// The attempt runs on a short-lived thread with its own runtime so it
    /// works from plain threads, panic hooks and async tasks alike.
    fn deliver(&self, request: IngestRequest) {
        let outcome = std::thread::scope(|scope| {
            scope
                .spawn(|| {
                    let _capturing = CaptureGuard::enter();
                    let runtime = tokio::runtime::Builder::new_current_thread()
                        .enable_all()
                        .build()
                        .map_err(|e| ClientError::Runtime(e.to_string()))?;
                    runtime.block_on(self.send(&request))
                })
                .join()
        });

        match outcome {
            Ok(Ok(response)) => debug!(
                "Delivered {} events ({} processed)",
                request.len(),
                response.processed_count
            ),
            Ok(Err(e)) if e.is_transport() => warn!("Unable to post to Errly: {}", e),
            Ok(Err(e)) => error!("Errly rejected {} events: {}", request.len(), e),
            Err(_) => error!("Errly delivery thread panicked"),
        }
    }
}

/// reqwest-backed [`DeliveryClient`]
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        // Each deliver() runs on a throwaway runtime, so pooled connections
        // would outlive the runtime that drives them.
        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(0)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn ingest_url(&self) -> String {
        format!("{}/{}", self.base_url, INGEST_PATH)
    }

    async fn rejection(response: reqwest::Response) -> ClientError {
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            return ClientError::Unauthorized;
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let reset = response
                .headers()
                .get(RATE_LIMIT_RESET_HEADER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse().ok());
            return ClientError::RateLimited { reset };
        }

        let raw = response.text().await.unwrap_or_default();
        let body = match serde_json::from_str::<IngestErrorBody>(&raw) {
            Ok(parsed) => parsed.message,
            Err(_) => raw,
        };

        ClientError::Http {
            status: status.as_u16(),
            body,
        }
    }
}

#[async_trait]
impl DeliveryClient for HttpClient {
    async fn send(&self, request: &IngestRequest) -> Result<IngestResponse, ClientError> {
        let url = self.ingest_url();
        let body = wire::encode_to_vec(request)?;

        debug!("Sending {} events to {} ({} bytes)", request.len(), url, body.len());

        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .header(USER_AGENT, CLIENT_USER_AGENT)
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }

        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_slash_is_removed() {
        let client = HttpClient::new("https://errly.test/", "key", Duration::from_secs(5)).unwrap();
        assert_eq!(client.base_url(), "https://errly.test");
        assert_eq!(client.ingest_url(), "https://errly.test/api/v1/ingest");
    }

    #[test]
    fn test_user_agent_carries_version() {
        assert!(CLIENT_USER_AGENT.starts_with("errly-rust/"));
        assert!(CLIENT_USER_AGENT.len() > "errly-rust/".len());
    }
}
