use serde::Deserialize;

/// Rolling average of an application's key values.
///
/// The upstream averaging window is three-to-four minutes for applications and
/// instances and ten minutes for key transactions.
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ApplicationSummary {
    pub instance_count: u32,
    pub response_time: f64,
    pub throughput: f64,
    pub error_rate: f64,
    pub apdex_target: f64,
    pub apdex_score: f64,
}

impl ApplicationSummary {
    /// An average over zero instances carries no information and must not be
    /// exposed.
    #[must_use]
    pub const fn is_reporting(&self) -> bool {
        self.instance_count > 0
    }
}

/// A monitored application.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Application {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub health_status: String,
    #[serde(default)]
    pub application_summary: ApplicationSummary,
}

/// A single host running an application.
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ApplicationInstance {
    pub id: i64,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub health_status: String,
    #[serde(default)]
    pub application_summary: ApplicationSummary,
}

/// An account-wide transaction singled out for focused monitoring.
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct KeyTransaction {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub transaction_name: String,
    #[serde(default)]
    pub reporting: bool,
    #[serde(default)]
    pub application_summary: ApplicationSummary,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MetricName {
    pub name: String,
    #[serde(default)]
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ApdexMetric {
    pub name: String,
    #[serde(default)]
    pub timeslices: Vec<TimeSlice>,
}

impl ApdexMetric {
    /// Values of the most recent timeslice.
    ///
    /// Requests are summarized so there is normally exactly one.
    #[must_use]
    pub fn latest(&self) -> Option<&ApdexValue> {
        self.timeslices.last().map(|slice| &slice.values)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TimeSlice {
    pub values: ApdexValue,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ApdexValue {
    pub score: f64,
    #[serde(rename = "s")]
    pub satisfied: f64,
    #[serde(rename = "t")]
    pub tolerating: f64,
    #[serde(rename = "f")]
    pub frustrating: f64,
    pub count: f64,
    pub threshold: f64,
    pub threshold_min: f64,
}

// Response envelopes.

#[derive(Debug, Deserialize)]
pub(crate) struct ApplicationEnvelope {
    pub(crate) application: Application,
}

#[derive(Debug, Deserialize)]
pub(crate) struct InstancesEnvelope {
    #[serde(default)]
    pub(crate) application_instances: Vec<ApplicationInstance>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct KeyTransactionsEnvelope {
    #[serde(default)]
    pub(crate) key_transactions: Vec<KeyTransaction>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MetricNamesEnvelope {
    #[serde(default)]
    pub(crate) metrics: Vec<MetricName>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MetricDataEnvelope {
    pub(crate) metric_data: MetricData,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MetricData {
    #[serde(default)]
    pub(crate) metrics: Vec<ApdexMetric>,
}
