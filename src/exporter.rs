use std::future::Future;

use futures::future::join_all;
use quanta::Clock;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::batch::{self, MetricBatch, Window};
use crate::config::{Config, Target, UpPolicy};
use crate::metric::{
    AppSummary, ApdexRecord, Collection, Descriptors, InstanceSummary, Scrape,
};
use crate::newrelic::{
    self, ApdexMetric, ApplicationInstance, ApplicationSummary, KeyTransaction, Upstream,
};
use crate::recorder::ScrapeRecorder;
use crate::retry::retry_once;

/// Metric names listed for the apdex tier must contain this.
const APDEX_FILTER: &str = "Apdex";

/// Possible failure of the apdex tier for one application.
#[derive(Debug, Error)]
pub enum ApdexError {
    #[error("List metric names; err={0}")]
    Names(#[source] newrelic::Error),
    #[error("All metric batches failed; batches={batches}")]
    AllBatchesFailed { batches: usize },
}

/// Collection orchestrator.
///
/// Each [`Exporter::scrape`] runs one full pass over the configured targets.
/// Passes never overlap: the whole collect-and-render sequence is a single
/// critical section.
pub struct Exporter<U> {
    upstream: U,
    config: Config,
    descriptors: Descriptors,
    clock: Clock,
    scrape_lock: Mutex<()>,
}

/// Everything collected for one target.
#[derive(Debug, Default)]
struct TargetCollection {
    application: Option<AppSummary>,
    instances: Vec<InstanceSummary>,
    apdex_metrics: Vec<ApdexRecord>,
}

impl<U> Exporter<U>
where
    U: Upstream,
{
    pub fn new(upstream: U, config: Config) -> Self {
        Self::with_clock(upstream, config, Clock::new())
    }

    pub fn with_clock(upstream: U, config: Config, clock: Clock) -> Self {
        Exporter {
            upstream,
            config,
            descriptors: Descriptors::new(),
            clock,
            scrape_lock: Mutex::new(()),
        }
    }

    pub const fn descriptors(&self) -> &Descriptors {
        &self.descriptors
    }

    /// Runs one collection pass and renders it in the text exposition format.
    pub async fn scrape(&self) -> String {
        let _guard = self.scrape_lock.lock().await;

        let scrape = self.collect().await;
        let recorder = ScrapeRecorder::new(&self.descriptors);
        recorder.record(&self.descriptors.expose(&scrape));

        recorder.render()
    }

    /// Fetches every tier and aggregates the surviving records.
    ///
    /// Per-target failures are logged and leave that target out; only a failed
    /// liveness probe turns `up` to 0. Callers must hold `scrape_lock`.
    async fn collect(&self) -> Scrape {
        let start = self.clock.now();

        let probed = match self.config.up_policy {
            UpPolicy::Probe => {
                match self.fetch("key transactions", || self.upstream.list_key_transactions()).await
                {
                    Ok(transactions) => Some(transactions),
                    Err(err) => {
                        error!(%err, "Liveness probe failed");

                        return Scrape {
                            up: false,
                            duration: None,
                            collection: Collection::default(),
                        };
                    }
                }
            }
            UpPolicy::BestEffort => None,
        };

        let (key_transactions, targets) = tokio::join!(
            self.collect_key_transactions(probed),
            join_all(self.config.applications.iter().map(|target| self.collect_target(target))),
        );

        let mut collection = Collection { key_transactions, ..Collection::default() };
        for target in targets {
            collection.applications.extend(target.application);
            collection.instances.extend(target.instances);
            collection.apdex_metrics.extend(target.apdex_metrics);
        }

        Scrape {
            up: true,
            duration: Some(self.clock.now().duration_since(start)),
            collection,
        }
    }

    async fn collect_key_transactions(
        &self,
        probed: Option<Vec<KeyTransaction>>,
    ) -> Vec<KeyTransaction> {
        if !self.config.key_transactions {
            return Vec::new();
        }

        info!("Collecting metrics from key transactions");
        let transactions = match probed {
            Some(transactions) => transactions,
            None => {
                match self.fetch("key transactions", || self.upstream.list_key_transactions()).await
                {
                    Ok(transactions) => transactions,
                    Err(err) => {
                        error!(%err, "Failed to get key transactions");

                        return Vec::new();
                    }
                }
            }
        };

        reporting_transactions(transactions)
    }

    async fn collect_target(&self, target: &Target) -> TargetCollection {
        info!(app = %target.name, "Collecting metrics from application");

        let application =
            match self.fetch("application", || self.upstream.fetch_application(target.id)).await {
                Ok(application) => application,
                Err(err) => {
                    error!(app = %target.name, %err, "Failed to get application");

                    return TargetCollection::default();
                }
            };

        let application = reporting_application(&target.name, application.application_summary);

        let (instances, apdex_metrics) =
            tokio::join!(self.collect_instances(target), self.collect_apdex_metrics(target));

        TargetCollection { application, instances, apdex_metrics }
    }

    async fn collect_instances(&self, target: &Target) -> Vec<InstanceSummary> {
        match self.fetch("instances", || self.upstream.list_instances(target.id)).await {
            Ok(instances) => reporting_instances(&target.name, instances),
            Err(err) => {
                error!(app = %target.name, %err, "Failed to get application instances");

                Vec::new()
            }
        }
    }

    async fn collect_apdex_metrics(&self, target: &Target) -> Vec<ApdexRecord> {
        if !self.config.apdex_metrics {
            return Vec::new();
        }

        match self.fetch_apdex_metrics(target.id).await {
            Ok(metrics) => metrics
                .into_iter()
                .filter_map(|metric| {
                    let Some(&value) = metric.latest() else {
                        debug!(
                            app = %target.name,
                            metric = %metric.name,
                            "Ignoring apdex metric without timeslices"
                        );

                        return None;
                    };

                    Some(ApdexRecord { app: target.name.clone(), metric: metric.name, value })
                })
                .collect(),
            Err(err) => {
                error!(app = %target.name, %err, "Failed to get apdex metrics");

                Vec::new()
            }
        }
    }

    /// Fetches the apdex metric data of one application in concurrent batches.
    ///
    /// A batch failing twice is dropped with a warning, so the result may be
    /// short. Only when every batch failed is the whole call an error.
    async fn fetch_apdex_metrics(&self, id: i64) -> Result<Vec<ApdexMetric>, ApdexError> {
        let names = self
            .fetch("metric names", || self.upstream.list_metric_names(id, APDEX_FILTER))
            .await
            .map_err(ApdexError::Names)?
            .into_iter()
            .map(|name| name.name)
            .collect::<Vec<_>>();

        let window = Window::ending_now(self.config.time_span_minutes());
        let batches = batch::partition(&names, self.config.batch_size, window);
        if batches.is_empty() {
            return Ok(Vec::new());
        }

        let results = join_all(
            batches.iter().enumerate().map(|(index, batch)| self.fetch_batch(id, index, batch)),
        )
        .await;

        let failed = results.iter().filter(|result| result.is_err()).count();
        if failed == batches.len() {
            return Err(ApdexError::AllBatchesFailed { batches: failed });
        }

        let metrics: Vec<_> = results.into_iter().flatten().flatten().collect();
        debug!(
            app_id = id,
            requested = names.len(),
            received = metrics.len(),
            "Retrieved apdex metrics"
        );

        Ok(metrics)
    }

    async fn fetch_batch(
        &self,
        id: i64,
        index: usize,
        batch: &MetricBatch,
    ) -> Result<Vec<ApdexMetric>, newrelic::Error> {
        let result =
            retry_once("metric data", || self.upstream.fetch_metric_data(id, batch)).await;
        if let Err(err) = &result {
            warn!(
                app_id = id,
                batch = index,
                names = batch.len(),
                %err,
                "Dropping metric batch after retry"
            );
        }

        result
    }

    /// Applies the per-target retry policy to a single upstream call.
    async fn fetch<T, F, Fut>(&self, what: &str, mut fetch: F) -> Result<T, newrelic::Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, newrelic::Error>>,
    {
        match self.config.retry_target_fetches {
            true => retry_once(what, fetch).await,
            false => fetch().await,
        }
    }
}

fn reporting_application(app: &str, summary: ApplicationSummary) -> Option<AppSummary> {
    match summary.is_reporting() {
        true => Some(AppSummary { app: app.to_string(), summary }),
        false => {
            warn!(app, "Ignoring application because its instance count is 0");

            None
        }
    }
}

/// Drops instances whose summary averages over zero instances.
fn reporting_instances(app: &str, instances: Vec<ApplicationInstance>) -> Vec<InstanceSummary> {
    instances
        .into_iter()
        .filter_map(|instance| match instance.application_summary.is_reporting() {
            true => Some(InstanceSummary {
                app: app.to_string(),
                host: instance.host,
                summary: instance.application_summary,
            }),
            false => {
                warn!(
                    app,
                    instance = %instance.host,
                    "Ignoring application instance because its instance count is 0"
                );

                None
            }
        })
        .collect()
}

fn reporting_transactions(transactions: Vec<KeyTransaction>) -> Vec<KeyTransaction> {
    transactions
        .into_iter()
        .filter(|transaction| {
            if !transaction.reporting {
                warn!(
                    transaction = %transaction.transaction_name,
                    "Ignoring key transaction because it is not reporting"
                );
            }

            transaction.reporting
        })
        .collect()
}
