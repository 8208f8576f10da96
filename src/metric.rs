use std::time::Duration;

use itertools::Itertools;

use crate::newrelic::{ApdexValue, ApplicationSummary, KeyTransaction};

pub const NAMESPACE: &str = "newrelic";

/// Exposed series definition.
///
/// Created once at startup and shared read-only across scrapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub name: String,
    pub help: String,
    pub labels: &'static [&'static str],
}

impl Descriptor {
    fn new(subsystem: &str, name: &str, help: String, labels: &'static [&'static str]) -> Self {
        let name = match subsystem.is_empty() {
            true => format!("{NAMESPACE}_{name}"),
            false => format!("{NAMESPACE}_{subsystem}_{name}"),
        };

        Descriptor { name, help, labels }
    }
}

#[derive(Debug, Clone)]
pub struct SummaryDescriptors {
    pub apdex_score: Descriptor,
    pub error_rate: Descriptor,
    pub response_time: Descriptor,
    pub throughput: Descriptor,
}

impl SummaryDescriptors {
    fn new(subsystem: &str, subject: &str, labels: &'static [&'static str]) -> Self {
        let describe = |name: &str| {
            Descriptor::new(
                subsystem,
                name,
                format!("{subject} rolling three-to-four-minute average for {}", spaced(name)),
                labels,
            )
        };

        SummaryDescriptors {
            apdex_score: describe("apdex_score"),
            error_rate: describe("error_rate"),
            response_time: describe("response_time"),
            throughput: describe("throughput"),
        }
    }

    fn iter(&self) -> impl Iterator<Item = &Descriptor> {
        [&self.apdex_score, &self.error_rate, &self.response_time, &self.throughput].into_iter()
    }
}

#[derive(Debug, Clone)]
pub struct KeyTransactionDescriptors {
    pub apdex_score: Descriptor,
    pub apdex_target: Descriptor,
    pub error_rate: Descriptor,
    pub response_time: Descriptor,
    pub throughput: Descriptor,
}

impl KeyTransactionDescriptors {
    fn new() -> Self {
        let describe = |name: &str| {
            Descriptor::new(
                "key_transaction",
                name,
                format!("Key transaction last 10 minutes average for {}", spaced(name)),
                &["transaction"],
            )
        };

        KeyTransactionDescriptors {
            apdex_score: describe("apdex_score"),
            apdex_target: describe("apdex_target"),
            error_rate: describe("error_rate"),
            response_time: describe("response_time"),
            throughput: describe("throughput"),
        }
    }

    fn iter(&self) -> impl Iterator<Item = &Descriptor> {
        [
            &self.apdex_score,
            &self.apdex_target,
            &self.error_rate,
            &self.response_time,
            &self.throughput,
        ]
        .into_iter()
    }
}

#[derive(Debug, Clone)]
pub struct ApdexDescriptors {
    pub score: Descriptor,
    pub satisfied: Descriptor,
    pub tolerating: Descriptor,
    pub frustrating: Descriptor,
    pub count: Descriptor,
}

impl ApdexDescriptors {
    fn new() -> Self {
        let describe = |name: &str| {
            Descriptor::new(
                "apdex_metric",
                name,
                format!("Apdex metric {} over the configured time span", spaced(name)),
                &["app", "metric"],
            )
        };

        ApdexDescriptors {
            score: describe("score"),
            satisfied: describe("satisfied"),
            tolerating: describe("tolerating"),
            frustrating: describe("frustrating"),
            count: describe("count"),
        }
    }

    fn iter(&self) -> impl Iterator<Item = &Descriptor> {
        [&self.score, &self.satisfied, &self.tolerating, &self.frustrating, &self.count]
            .into_iter()
    }
}

/// The complete, fixed set of exposed series.
#[derive(Debug, Clone)]
pub struct Descriptors {
    pub up: Descriptor,
    pub scrape_duration: Descriptor,
    pub app_summary: SummaryDescriptors,
    pub instance_summary: SummaryDescriptors,
    pub key_transaction: KeyTransactionDescriptors,
    pub apdex_metric: ApdexDescriptors,
}

impl Default for Descriptors {
    fn default() -> Self {
        Self::new()
    }
}

impl Descriptors {
    #[must_use]
    pub fn new() -> Self {
        Descriptors {
            up: Descriptor::new(
                "",
                "up",
                "NewRelic API is up and accepting requests".to_string(),
                &[],
            ),
            scrape_duration: Descriptor::new(
                "",
                "scrape_duration_seconds",
                "Time NewRelic scrape took in seconds".to_string(),
                &[],
            ),
            app_summary: SummaryDescriptors::new("app_summary", "Application", &["app"]),
            instance_summary: SummaryDescriptors::new(
                "instance_summary",
                "Application instance",
                &["app", "instance"],
            ),
            key_transaction: KeyTransactionDescriptors::new(),
            apdex_metric: ApdexDescriptors::new(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Descriptor> {
        [&self.up, &self.scrape_duration]
            .into_iter()
            .chain(self.app_summary.iter())
            .chain(self.instance_summary.iter())
            .chain(self.key_transaction.iter())
            .chain(self.apdex_metric.iter())
    }

    /// Maps a scrape result onto gauge samples.
    ///
    /// Records are exposed as given; filtering already happened during
    /// collection.
    #[must_use]
    pub fn expose(&self, scrape: &Scrape) -> Vec<Sample<'_>> {
        let mut samples = vec![Sample::new(&self.up, [], if scrape.up { 1.0 } else { 0.0 })];

        for AppSummary { app, summary } in &scrape.collection.applications {
            samples.extend(summary_samples(&self.app_summary, [app.clone()], summary));
        }

        for InstanceSummary { app, host, summary } in &scrape.collection.instances {
            samples.extend(summary_samples(
                &self.instance_summary,
                [app.clone(), host.clone()],
                summary,
            ));
        }

        for transaction in &scrape.collection.key_transactions {
            let descriptors = &self.key_transaction;
            let summary = &transaction.application_summary;
            let label = || [transaction.transaction_name.clone()];

            samples.extend([
                Sample::new(&descriptors.apdex_score, label(), summary.apdex_score),
                Sample::new(&descriptors.apdex_target, label(), summary.apdex_target),
                Sample::new(&descriptors.error_rate, label(), summary.error_rate),
                Sample::new(&descriptors.response_time, label(), summary.response_time),
                Sample::new(&descriptors.throughput, label(), summary.throughput),
            ]);
        }

        for ApdexRecord { app, metric, value } in &scrape.collection.apdex_metrics {
            let descriptors = &self.apdex_metric;
            let label = || [app.clone(), metric.clone()];

            samples.extend([
                Sample::new(&descriptors.score, label(), value.score),
                Sample::new(&descriptors.satisfied, label(), value.satisfied),
                Sample::new(&descriptors.tolerating, label(), value.tolerating),
                Sample::new(&descriptors.frustrating, label(), value.frustrating),
                Sample::new(&descriptors.count, label(), value.count),
            ]);
        }

        if let Some(duration) = scrape.duration {
            samples.push(Sample::new(&self.scrape_duration, [], duration.as_secs_f64()));
        }

        samples
    }
}

fn summary_samples<'a, const N: usize>(
    descriptors: &'a SummaryDescriptors,
    labels: [String; N],
    summary: &ApplicationSummary,
) -> [Sample<'a>; 4] {
    [
        Sample::new(&descriptors.apdex_score, labels.clone(), summary.apdex_score),
        Sample::new(&descriptors.error_rate, labels.clone(), summary.error_rate),
        Sample::new(&descriptors.response_time, labels.clone(), summary.response_time),
        Sample::new(&descriptors.throughput, labels, summary.throughput),
    ]
}

fn spaced(name: &str) -> String {
    name.split('_').join(" ")
}

/// One gauge value with its label values bound to the descriptor's label
/// names.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample<'a> {
    pub descriptor: &'a Descriptor,
    pub labels: Vec<(&'static str, String)>,
    pub value: f64,
}

impl<'a> Sample<'a> {
    fn new<const N: usize>(descriptor: &'a Descriptor, values: [String; N], value: f64) -> Self {
        debug_assert_eq!(descriptor.labels.len(), N, "{}", descriptor.name);

        Sample {
            descriptor,
            labels: descriptor.labels.iter().copied().zip(values).collect(),
            value,
        }
    }
}

/// Result of one collection pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Scrape {
    pub up: bool,
    /// Absent when the liveness probe failed; `up` is then the only sample.
    pub duration: Option<Duration>,
    pub collection: Collection,
}

/// Records that survived filtering, in configuration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Collection {
    pub applications: Vec<AppSummary>,
    pub instances: Vec<InstanceSummary>,
    pub key_transactions: Vec<KeyTransaction>,
    pub apdex_metrics: Vec<ApdexRecord>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppSummary {
    pub app: String,
    pub summary: ApplicationSummary,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InstanceSummary {
    pub app: String,
    pub host: String,
    pub summary: ApplicationSummary,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApdexRecord {
    pub app: String,
    pub metric: String,
    pub value: ApdexValue,
}
