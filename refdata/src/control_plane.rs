const BASE_DELAY: u64 = 500;
const MAX_RETRIES: u32 = 3;

use crate::source::{ReferenceSource, SourceError};
use crate::types::{Campaign, IpRange, Operator, PrefixEntry};
use async_trait::async_trait;
use ipnet::Ipv4Net;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::time::{Duration, sleep};

#[derive(Deserialize)]
struct ControlPlaneData<T> {
    data: Vec<T>,
}

/// Fetches full table snapshots from the control plane over HTTP.
///
/// Each table lives at `{base_url}/{table}/` and answers with
/// `{"data": [...rows]}`.
pub struct ControlPlaneSource {
    client: reqwest::Client,
    base_url: String,
    base_delay: Duration,
}

impl ControlPlaneSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(ControlPlaneSource {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            base_delay: Duration::from_millis(BASE_DELAY),
        })
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    async fn fetch<T: DeserializeOwned>(&self, table: &str) -> Result<Option<Vec<T>>, SourceError> {
        const RETRIABLE_STATUS_CODES: &[StatusCode] = &[
            StatusCode::TOO_MANY_REQUESTS,     // 429
            StatusCode::INTERNAL_SERVER_ERROR, // 500
            StatusCode::BAD_GATEWAY,           // 502
            StatusCode::SERVICE_UNAVAILABLE,   // 503
            StatusCode::GATEWAY_TIMEOUT,       // 504
        ];

        let url = Url::parse(&format!("{}/{}/", self.base_url, table))
            .map_err(|e| SourceError::InvalidUrl(e.to_string()))?;

        let mut retries = 0;
        loop {
            let response = self.client.get(url.clone()).send().await?;
            let status = response.status();

            if status == StatusCode::NOT_FOUND {
                return Ok(None);
            }

            if !status.is_success() {
                if RETRIABLE_STATUS_CODES.contains(&status) && retries < MAX_RETRIES {
                    // Backoff between retries
                    let delay = self.base_delay * 2_u32.pow(retries);
                    tracing::warn!(table, %status, ?delay, "Retrying control plane fetch");
                    sleep(delay).await;
                    retries += 1;
                    continue;
                }
                return Err(SourceError::RetriesExceeded);
            }

            let body = response.json::<ControlPlaneData<T>>().await?;
            tracing::debug!(table, rows = body.data.len(), "Fetched table from control plane");
            return Ok(Some(body.data));
        }
    }

    async fn fetch_required<T: DeserializeOwned>(&self, table: &str) -> Result<Vec<T>, SourceError> {
        self.fetch(table).await?.ok_or(SourceError::RetriesExceeded)
    }
}

#[async_trait]
impl ReferenceSource for ControlPlaneSource {
    async fn ip_ranges(&self) -> Result<Vec<IpRange>, SourceError> {
        self.fetch_required("ip-ranges").await
    }

    async fn prefixes(&self) -> Result<Vec<PrefixEntry>, SourceError> {
        self.fetch_required("prefixes").await
    }

    async fn operators(&self) -> Result<Vec<Operator>, SourceError> {
        self.fetch_required("operators").await
    }

    async fn campaigns(&self) -> Result<Vec<Campaign>, SourceError> {
        self.fetch_required("campaigns").await
    }

    /// The control plane may not publish private networks; a 404 keeps the
    /// configured list.
    async fn private_networks(&self) -> Result<Option<Vec<Ipv4Net>>, SourceError> {
        self.fetch("private-networks").await
    }
}
