//! New Relic REST API (v2) client.
//!
//! Only the read endpoints consumed by the exporter are implemented. Every
//! failure, be it transport, status or decoding, surfaces as a single [`Error`]
//! and no retry happens at this layer.

mod model;

use std::future::Future;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, InvalidHeaderValue};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

pub use self::model::{
    ApdexMetric, ApdexValue, Application, ApplicationInstance, ApplicationSummary,
    KeyTransaction, MetricName, TimeSlice,
};
use self::model::{
    ApplicationEnvelope, InstancesEnvelope, KeyTransactionsEnvelope, MetricDataEnvelope,
    MetricNamesEnvelope,
};
use crate::batch::MetricBatch;

pub const DEFAULT_BASE_URL: &str = "https://api.newrelic.com/";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const API_KEY_HEADER: &str = "X-Api-Key";
const USER_AGENT: &str = "newrelic_exporter;rust";

/// Possible failure of a single upstream call.
#[derive(Debug, Error)]
pub enum Error {
    /// The API key cannot be carried in a header.
    #[error("Invalid API key; err={0}")]
    ApiKey(#[from] InvalidHeaderValue),
    /// Connection, timeout or body transfer failure.
    #[error("Request failed; err={0}")]
    Request(#[from] reqwest::Error),
    /// Upstream answered with a non-2xx status.
    #[error("Unexpected status; status={0}")]
    Status(StatusCode),
    /// Body is not the expected JSON envelope.
    #[error("Decode response; err={0}")]
    Decode(#[from] serde_json::Error),
}

/// The upstream reads the collection pass depends on.
///
/// [`Client`] is the production implementation.
pub trait Upstream: Send + Sync {
    /// Single application with a summary over the last 3-4 minutes.
    fn fetch_application(&self, id: i64) -> impl Future<Output = Result<Application, Error>> + Send;

    /// Instances of an application with per-host summaries.
    fn list_instances(
        &self,
        id: i64,
    ) -> impl Future<Output = Result<Vec<ApplicationInstance>, Error>> + Send;

    /// Account-wide key transactions with summaries over the last 10 minutes.
    fn list_key_transactions(
        &self,
    ) -> impl Future<Output = Result<Vec<KeyTransaction>, Error>> + Send;

    /// Metric names of an application containing `filter`.
    fn list_metric_names(
        &self,
        id: i64,
        filter: &str,
    ) -> impl Future<Output = Result<Vec<MetricName>, Error>> + Send;

    /// Summarized data for one batch of metric names.
    fn fetch_metric_data(
        &self,
        id: i64,
        batch: &MetricBatch,
    ) -> impl Future<Output = Result<Vec<ApdexMetric>, Error>> + Send;
}

/// Authenticated HTTP client for the New Relic API.
///
/// Cheap to clone and safe to share between concurrent scrapes.
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: String,
}

impl Client {
    /// Builds a client issuing requests under `base_url`.
    ///
    /// # Errors
    ///
    /// Errors if the API key is not a valid header value or the TLS backend
    /// fails to initialize.
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, Error> {
        let mut api_key = HeaderValue::from_str(api_key)?;
        api_key.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, api_key);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;

        let base_url = match base_url.ends_with('/') {
            true => base_url.to_string(),
            false => format!("{base_url}/"),
        };

        Ok(Client { http, base_url })
    }

    async fn get<T>(&self, path: &str, query: &[(&str, String)]) -> Result<T, Error>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{path}", self.base_url);
        debug!(%url, "GET");

        let response = self.http.get(&url).query(query).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status(status));
        }

        let body = response.bytes().await?;

        serde_json::from_slice(&body).map_err(Into::into)
    }
}

impl Upstream for Client {
    async fn fetch_application(&self, id: i64) -> Result<Application, Error> {
        self.get::<ApplicationEnvelope>(&format!("v2/applications/{id}.json"), &[])
            .await
            .map(|envelope| envelope.application)
    }

    async fn list_instances(&self, id: i64) -> Result<Vec<ApplicationInstance>, Error> {
        self.get::<InstancesEnvelope>(&format!("v2/applications/{id}/instances.json"), &[])
            .await
            .map(|envelope| envelope.application_instances)
    }

    async fn list_key_transactions(&self) -> Result<Vec<KeyTransaction>, Error> {
        self.get::<KeyTransactionsEnvelope>("v2/key_transactions.json", &[])
            .await
            .map(|envelope| envelope.key_transactions)
    }

    async fn list_metric_names(&self, id: i64, filter: &str) -> Result<Vec<MetricName>, Error> {
        self.get::<MetricNamesEnvelope>(
            &format!("v2/applications/{id}/metrics.json"),
            &[("name", filter.to_string())],
        )
        .await
        .map(|envelope| envelope.metrics)
    }

    async fn fetch_metric_data(
        &self,
        id: i64,
        batch: &MetricBatch,
    ) -> Result<Vec<ApdexMetric>, Error> {
        self.get::<MetricDataEnvelope>(
            &format!("v2/applications/{id}/metrics/data.json"),
            &batch.query(),
        )
        .await
        .map(|envelope| envelope.metric_data.metrics)
    }
}
