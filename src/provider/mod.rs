// Provider module
// Shared HTTP plumbing for the hosted chat and embedding API


use anyhow::{Context, Result};
use std::io::Read;
use std::time::Duration;
use tracing::{debug, error, warn};
use url::Url;

use crate::config::ProviderConfig;

const EXPONENTIAL_BACKOFF_BASE: u64 = 2;
const DEFAULT_BACKOFF_MS: u64 = 500;

/// Authenticated JSON client for an OpenAI-compatible API
#[derive(Debug, Clone)]
pub struct ProviderClient {
    base_url: Url,
    api_key: String,
    agent: ureq::Agent,
    retry_attempts: u32,
    backoff_ms: u64,
}

impl ProviderClient {
    /// Build a client from provider settings, resolving the API key
    #[inline]
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let api_key = config
            .resolve_api_key()
            .context("Failed to resolve provider API key")?;
        Self::with_api_key(config, api_key)
    }

    #[inline]
    pub fn with_api_key(config: &ProviderConfig, api_key: String) -> Result<Self> {
        let base_url = config
            .base_url()
            .context("Failed to parse provider base URL from config")?;

        Ok(Self {
            base_url,
            api_key,
            agent: build_agent(Duration::from_secs(config.timeout_seconds)),
            retry_attempts: config.retry_attempts.max(1),
            backoff_ms: DEFAULT_BACKOFF_MS,
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = build_agent(timeout);
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    /// Base delay between retries, doubled on each attempt
    #[inline]
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Delay after the given failed attempt (1-based), saturating on overflow
    fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = EXPONENTIAL_BACKOFF_BASE.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(factor.saturating_mul(self.backoff_ms))
    }

    #[inline]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[inline]
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("Failed to build {} URL", path))
    }

    /// POST a JSON body and return the response text, retrying transient failures
    #[inline]
    pub fn post_json(&self, path: &str, body: &str) -> Result<String> {
        let url = self.endpoint(path)?;
        let authorization = format!("Bearer {}", self.api_key);

        self.make_request_with_retry(|| {
            self.agent
                .post(url.as_str())
                .header("Content-Type", "application/json")
                .header("Authorization", &authorization)
                .send(body)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
        .with_context(|| format!("Request to {} failed", url))
    }

    /// POST a JSON body and hand back the unread response body.
    ///
    /// Only establishing the response is retried; once the body is returned
    /// the caller owns it and read errors surface from the reader.
    #[inline]
    pub fn post_streaming(&self, path: &str, body: &str) -> Result<Box<dyn Read>> {
        let url = self.endpoint(path)?;
        let authorization = format!("Bearer {}", self.api_key);

        let response = self
            .make_request_with_retry(|| {
                self.agent
                    .post(url.as_str())
                    .header("Content-Type", "application/json")
                    .header("Accept", "text/event-stream")
                    .header("Authorization", &authorization)
                    .send(body)
            })
            .with_context(|| format!("Streaming request to {} failed", url))?;

        Ok(Box::new(response.into_body().into_reader()))
    }

    fn make_request_with_retry<T, F>(&self, mut request_fn: F) -> Result<T>
    where
        F: FnMut() -> Result<T, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!("HTTP request attempt {}/{}", attempt, self.retry_attempts);

            match request_fn() {
                Ok(response) => {
                    debug!("Request succeeded on attempt {}", attempt);
                    return Ok(response);
                }
                Err(error) => {
                    let should_retry = match &error {
                        ureq::Error::StatusCode(status) => {
                            if *status >= 500 || *status == 429 {
                                warn!(
                                    "Server error (status {}), attempt {}/{}",
                                    status, attempt, self.retry_attempts
                                );
                                true
                            } else {
                                warn!("Client error (status {}), not retrying", status);
                                return Err(anyhow::anyhow!("Client error: HTTP {}", status));
                            }
                        }
                        ureq::Error::ConnectionFailed
                        | ureq::Error::HostNotFound
                        | ureq::Error::Timeout(_)
                        | ureq::Error::Io(_) => {
                            warn!(
                                "Transport error: {}, attempt {}/{}",
                                error, attempt, self.retry_attempts
                            );
                            true
                        }
                        _ => {
                            warn!("Non-retryable error: {}", error);
                            false
                        }
                    };

                    if !should_retry {
                        return Err(anyhow::anyhow!("Non-retryable error: {}", error));
                    }

                    last_error = Some(anyhow::anyhow!("Request error: {}", error));

                    if attempt < self.retry_attempts {
                        let delay = self.retry_delay(attempt);
                        debug!("Waiting {:?} before retry", delay);
                        std::thread::sleep(delay);
                    }
                }
            }
        }

        error!("All retry attempts failed for request to {}", self.base_url);

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Request failed after retries")))
    }
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .into()
}
