//! Base HTTP client for the data provider.
//!
//! GET returns JSON; submission POSTs raw transaction bytes. Requests carry
//! the provider project key, use a configurable timeout, and retry
//! transient failures with exponential backoff.

use crate::error::LedgerError;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use std::time::Duration;

/// Header carrying the provider project key.
const PROJECT_KEY_HEADER: &str = "project_id";

/// Configuration for the provider client.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Base URL (e.g. `https://provider.example/api/v0`).
    pub url: String,
    /// Project key sent with every request.
    pub project_key: Option<String>,
    /// Request timeout.
    pub timeout: Duration,
    /// Retry attempts on transient failure.
    pub retries: u32,
    /// Initial delay between retries (doubles each attempt).
    pub retry_delay: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:3100".to_string(),
            project_key: None,
            timeout: Duration::from_secs(30),
            retries: 2,
            retry_delay: Duration::from_millis(500),
        }
    }
}

pub(crate) struct ProviderHttp {
    client: reqwest::Client,
    config: ProviderConfig,
}

impl ProviderHttp {
    pub fn new(config: ProviderConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(4)
            .build()
            .expect("failed to create HTTP client");
        ProviderHttp { client, config }
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }

    fn headers(&self, content_type: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        if let Some(key) = &self.config.project_key {
            if let Ok(value) = HeaderValue::from_str(key) {
                headers.insert(PROJECT_KEY_HEADER, value);
            }
        }
        headers
    }

    /// GET a JSON document, retrying transient failures.
    pub async fn get_json(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<serde_json::Value, LedgerError> {
        let attempts = self.config.retries + 1;
        let mut last_err = None;
        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = self.config.retry_delay * 2u32.saturating_pow(attempt - 1);
                tokio::time::sleep(delay).await;
            }
            match self.do_get(path, query).await {
                Ok(val) => return Ok(val),
                Err(e) => {
                    if !e.is_transient() || attempt + 1 == attempts {
                        return Err(e);
                    }
                    log::debug!("transient provider error on {path}, retrying: {e}");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or(LedgerError::Payload("retry loop exhausted".into())))
    }

    async fn do_get(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<serde_json::Value, LedgerError> {
        let url = format!("{}{}", self.config.url.trim_end_matches('/'), path);
        let resp = self
            .client
            .get(&url)
            .headers(self.headers("application/json"))
            .query(query)
            .send()
            .await
            .map_err(|e| LedgerError::Http {
                path: path.to_string(),
                source: e,
            })?;
        self.decode_json(path, resp).await
    }

    /// POST raw bytes (transaction submission). No client-side retry: a
    /// submission may have been accepted even when the response is lost, so
    /// retry policy belongs to the state machine above.
    pub async fn post_bytes(
        &self,
        path: &str,
        body: Vec<u8>,
    ) -> Result<(u16, String), LedgerError> {
        let url = format!("{}{}", self.config.url.trim_end_matches('/'), path);
        let resp = self
            .client
            .post(&url)
            .headers(self.headers("application/cbor"))
            .body(body)
            .send()
            .await
            .map_err(|e| LedgerError::Http {
                path: path.to_string(),
                source: e,
            })?;
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        Ok((status, body))
    }

    async fn decode_json(
        &self,
        path: &str,
        resp: reqwest::Response,
    ) -> Result<serde_json::Value, LedgerError> {
        let status = resp.status().as_u16();

        // Missing resources (fresh addresses) read as empty, not as errors.
        if status == 404 {
            return Ok(serde_json::Value::Array(Vec::new()));
        }
        if status == 401 || status == 403 || status == 429 {
            return Err(LedgerError::Auth {
                path: path.to_string(),
                status,
            });
        }
        if status >= 400 {
            let body = resp.text().await.unwrap_or_default();
            return Err(LedgerError::Status {
                path: path.to_string(),
                status,
                body: body.chars().take(500).collect(),
            });
        }

        let text = resp.text().await.map_err(|e| LedgerError::Http {
            path: path.to_string(),
            source: e,
        })?;
        serde_json::from_str(&text).map_err(|e| LedgerError::Json {
            path: path.to_string(),
            source: e,
        })
    }
}
