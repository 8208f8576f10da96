//! Partitioning of metric names into query-string sized batches.
//!
//! Each batch becomes one `metrics/data.json` request. Names travel as repeated
//! `names[]` parameters so the batch size bounds the URL length; nine typical
//! apdex metric names stay under the ~1024 character ceiling observed upstream.

use std::num::NonZeroUsize;

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};

pub const DEFAULT_BATCH_SIZE: NonZeroUsize = NonZeroUsize::new(9).unwrap();
pub const DEFAULT_TIME_SPAN_MINUTES: u32 = 1;

/// Time range a metric data request summarizes over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl Window {
    /// The `span_minutes` leading up to `to`.
    #[must_use]
    #[allow(clippy::arithmetic_side_effects)]
    pub fn ending_at(to: DateTime<Utc>, span_minutes: u32) -> Self {
        Window { from: to - TimeDelta::minutes(i64::from(span_minutes)), to }
    }

    #[must_use]
    pub fn ending_now(span_minutes: u32) -> Self {
        Self::ending_at(Utc::now(), span_minutes)
    }
}

/// A group of metric names requested together over one [`Window`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricBatch {
    names: Vec<String>,
    window: Window,
}

impl MetricBatch {
    #[must_use]
    pub const fn new(names: Vec<String>, window: Window) -> Self {
        MetricBatch { names, window }
    }

    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Query parameters for this batch; encoding is left to the HTTP client.
    #[must_use]
    pub fn query(&self) -> Vec<(&'static str, String)> {
        self.names
            .iter()
            .map(|name| ("names[]", name.clone()))
            .chain([
                ("from", self.window.from.to_rfc3339_opts(SecondsFormat::Secs, true)),
                ("to", self.window.to.to_rfc3339_opts(SecondsFormat::Secs, true)),
                ("summarize", "true".to_string()),
            ])
            .collect()
    }
}

/// Splits `names` into `ceil(len / size)` batches sharing one window.
///
/// Input order is preserved; only the final batch may be short.
#[must_use]
pub fn partition(names: &[String], size: NonZeroUsize, window: Window) -> Vec<MetricBatch> {
    names
        .chunks(size.get())
        .map(|chunk| MetricBatch::new(chunk.to_vec(), window))
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use expect_test::expect;
    use proptest::prelude::*;

    use super::*;

    fn window() -> Window {
        Window::ending_at(Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap(), 1)
    }

    fn names(count: usize) -> Vec<String> {
        (0..count).map(|i| format!("Apdex/Controller/{i}")).collect()
    }

    #[test]
    fn twenty_two_names_in_batches_of_nine() {
        let batches = partition(&names(22), DEFAULT_BATCH_SIZE, window());

        assert_eq!(batches.iter().map(MetricBatch::len).collect::<Vec<_>>(), [9, 9, 4]);
        assert_eq!(batches[2].names()[0], "Apdex/Controller/18");
    }

    #[test]
    fn no_names_no_batches() {
        assert!(partition(&[], DEFAULT_BATCH_SIZE, window()).is_empty());
    }

    #[test]
    fn window_spans_configured_minutes() {
        let window = Window::ending_at(Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap(), 15);

        assert_eq!(window.from, Utc.with_ymd_and_hms(2024, 3, 1, 12, 15, 0).unwrap());
    }

    #[test]
    fn query_parameters() {
        let batch = MetricBatch::new(
            vec!["Apdex".to_string(), "Apdex/Controller/users (show)".to_string()],
            window(),
        );

        expect![[r#"
            [
                (
                    "names[]",
                    "Apdex",
                ),
                (
                    "names[]",
                    "Apdex/Controller/users (show)",
                ),
                (
                    "from",
                    "2024-03-01T12:29:00Z",
                ),
                (
                    "to",
                    "2024-03-01T12:30:00Z",
                ),
                (
                    "summarize",
                    "true",
                ),
            ]
        "#]]
        .assert_debug_eq(&batch.query());
    }

    proptest! {
        #[test]
        fn partition_preserves_names(count in 0usize..200, size in 1usize..20) {
            let input = names(count);
            let size = NonZeroUsize::new(size).unwrap();

            let batches = partition(&input, size, window());

            prop_assert_eq!(batches.len(), count.div_ceil(size.get()));
            prop_assert!(batches.iter().all(|batch| !batch.is_empty() && batch.len() <= size.get()));
            prop_assert!(batches.iter().rev().skip(1).all(|batch| batch.len() == size.get()));
            prop_assert_eq!(
                batches.iter().flat_map(|batch| batch.names().iter().cloned()).collect::<Vec<_>>(),
                input
            );
        }
    }
}
