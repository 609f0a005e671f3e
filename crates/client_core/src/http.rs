use std::{future::Future, time::Duration};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use shared::{
    domain::{CorrectionSubmission, District, DistrictQuote, PriceQuote},
    error::ApiError,
    protocol::{CurrentPriceResponse, DistrictsResponse, VerifyRequest, VerifyResponse},
};
use tracing::{debug, warn};
use url::Url;

use crate::{PriceSource, SubmissionSink};

/// Latency and failure policy for calls to the review backend.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    /// Extra attempts after the first one fails with a transport error or a
    /// 5xx response.
    pub retries: u32,
    pub retry_delay: Duration,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            retries: 2,
            retry_delay: Duration::from_millis(500),
        }
    }
}

enum AttemptError {
    Retryable(anyhow::Error),
    Fatal(anyhow::Error),
}

#[derive(Clone)]
struct BackendClient {
    http: Client,
    base: Url,
    config: HttpClientConfig,
}

impl BackendClient {
    fn new(base_url: &str, config: HttpClientConfig) -> Result<Self> {
        let mut base = Url::parse(base_url)
            .with_context(|| format!("invalid backend url '{base_url}'"))?;
        // Endpoints are joined relative to the base, which must read as a directory.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("failed to create HTTP client")?;
        Ok(Self { http, base, config })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .with_context(|| format!("failed to build url for '{path}'"))
    }

    async fn send_json<T, F>(&self, label: &str, build: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: Fn(&Client) -> RequestBuilder,
    {
        let http = &self.http;
        let build = &build;
        self.with_retries(label, move || async move {
            let response = build(http)
                .send()
                .await
                .map_err(|err| AttemptError::Retryable(err.into()))?;
            let status = response.status();
            if status.is_success() {
                return response
                    .json::<T>()
                    .await
                    .map_err(|err| AttemptError::Fatal(err.into()));
            }

            let message = response
                .json::<ApiError>()
                .await
                .map(|body| body.message)
                .unwrap_or_else(|_| "no error body".to_string());
            let err = anyhow!("{label} failed with {status}: {message}");
            if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                Err(AttemptError::Retryable(err))
            } else {
                Err(AttemptError::Fatal(err))
            }
        })
        .await
    }

    async fn with_retries<T, F, Fut>(&self, label: &str, attempt: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = std::result::Result<T, AttemptError>>,
    {
        let mut remaining = self.config.retries;
        loop {
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(AttemptError::Fatal(err)) => return Err(err),
                Err(AttemptError::Retryable(err)) if remaining == 0 => {
                    return Err(err.context(format!("{label}: retries exhausted")))
                }
                Err(AttemptError::Retryable(err)) => {
                    remaining -= 1;
                    warn!(%label, error = %err, remaining, "http: attempt failed; retrying");
                    tokio::time::sleep(self.config.retry_delay).await;
                }
            }
        }
    }
}

/// Reads quotes from the review backend's price endpoints.
pub struct HttpPriceSource {
    client: BackendClient,
}

impl HttpPriceSource {
    pub fn new(base_url: &str, config: HttpClientConfig) -> Result<Self> {
        Ok(Self {
            client: BackendClient::new(base_url, config)?,
        })
    }
}

#[async_trait]
impl PriceSource for HttpPriceSource {
    async fn current_price(&self) -> Result<PriceQuote> {
        let url = self.client.endpoint("api/price")?;
        let body: CurrentPriceResponse = self
            .client
            .send_json("fetch current price", |http| http.get(url.clone()))
            .await?;
        Ok(PriceQuote {
            value: body.current_price,
            captured_at: body.last_updated,
        })
    }

    async fn district_prices(&self) -> Result<Vec<DistrictQuote>> {
        let url = self.client.endpoint("api/districts")?;
        let body: DistrictsResponse = self
            .client
            .send_json("fetch district prices", |http| http.get(url.clone()))
            .await?;
        debug!(count = body.districts.len(), "http: district prices fetched");
        Ok(body
            .districts
            .into_iter()
            .map(|row| DistrictQuote {
                district: District::known(&row.district)
                    .unwrap_or_else(|| District::unchecked(row.district)),
                quote: PriceQuote {
                    value: row.price,
                    captured_at: body.last_updated,
                },
                min: row.min,
                max: row.max,
                trend: row.trend,
            })
            .collect())
    }
}

/// Forwards accepted corrections to the backend's review queue.
pub struct HttpSubmissionSink {
    client: BackendClient,
}

impl HttpSubmissionSink {
    pub fn new(base_url: &str, config: HttpClientConfig) -> Result<Self> {
        Ok(Self {
            client: BackendClient::new(base_url, config)?,
        })
    }
}

#[async_trait]
impl SubmissionSink for HttpSubmissionSink {
    async fn submit(&self, submission: &CorrectionSubmission) -> Result<()> {
        let url = self.client.endpoint("api/verify")?;
        let request = VerifyRequest {
            is_correct: false,
            price: Some(submission.proposed_price),
            district: Some(submission.district.to_string()),
            market: Some(submission.location_label.clone()),
        };
        let response: VerifyResponse = self
            .client
            .send_json("submit correction", |http| {
                http.post(url.clone()).json(&request)
            })
            .await?;

        match response {
            VerifyResponse::CorrectionQueued { submission } => {
                debug!(id = %submission.id, "http: correction queued for review");
                Ok(())
            }
            VerifyResponse::Confirmed { .. } => {
                Err(anyhow!("backend treated the correction as a confirmation"))
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/http_tests.rs"]
mod tests;
