use metrics::{describe_gauge, gauge, with_local_recorder};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusRecorder};

use crate::metric::{Descriptors, Sample};

/// Recorder holding the samples of exactly one scrape.
///
/// A fresh recorder per scrape means series from a target that failed this time
/// never linger from an earlier scrape.
pub(crate) struct ScrapeRecorder {
    inner: PrometheusRecorder,
}

impl ScrapeRecorder {
    pub(crate) fn new(descriptors: &Descriptors) -> Self {
        let inner = PrometheusBuilder::new().build_recorder();
        with_local_recorder(&inner, || describe(descriptors));

        ScrapeRecorder { inner }
    }

    pub(crate) fn record(&self, samples: &[Sample<'_>]) {
        with_local_recorder(&self.inner, || emit(samples));
    }

    /// Text exposition of everything recorded so far.
    pub(crate) fn render(&self) -> String {
        self.inner.handle().render()
    }
}

fn describe(descriptors: &Descriptors) {
    for descriptor in descriptors.iter() {
        describe_gauge!(descriptor.name.clone(), descriptor.help.clone());
    }
}

fn emit(samples: &[Sample<'_>]) {
    for sample in samples {
        gauge!(sample.descriptor.name.clone(), &sample.labels).set(sample.value);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    use super::*;
    use crate::metric::{AppSummary, Collection, InstanceSummary, Scrape};
    use crate::newrelic::ApplicationSummary;

    fn scrape() -> Scrape {
        let summary = ApplicationSummary {
            instance_count: 1,
            response_time: 31.5,
            throughput: 1200.0,
            error_rate: 0.25,
            apdex_target: 0.5,
            apdex_score: 0.75,
        };

        Scrape {
            up: true,
            duration: Some(Duration::from_millis(250)),
            collection: Collection {
                applications: vec![AppSummary { app: "checkout".to_string(), summary }],
                instances: vec![InstanceSummary {
                    app: "checkout".to_string(),
                    host: "web-1".to_string(),
                    summary,
                }],
                ..Collection::default()
            },
        }
    }

    /// Series and value of every sample line.
    fn parse(rendered: &str) -> Vec<(String, f64)> {
        let mut series: Vec<_> = rendered
            .lines()
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(|line| {
                let (series, value) = line.rsplit_once(' ').unwrap();

                (series.to_string(), value.parse().unwrap())
            })
            .collect();
        series.sort_by(|a, b| a.0.cmp(&b.0));

        series
    }

    #[test]
    fn emitted_samples_reach_the_recorder() {
        let descriptors = Descriptors::new();
        let samples = descriptors.expose(&scrape());
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        with_local_recorder(&recorder, || emit(&samples));

        let snapshot = snapshotter.snapshot().into_vec();
        assert_eq!(snapshot.len(), samples.len());

        let throughput = snapshot
            .iter()
            .find(|(key, ..)| {
                key.key().name() == "newrelic_instance_summary_throughput"
                    && key
                        .key()
                        .labels()
                        .any(|label| label.key() == "instance" && label.value() == "web-1")
            })
            .unwrap();
        assert_eq!(throughput.3, DebugValue::Gauge(1200.0.into()));
    }

    #[test]
    fn render_text_exposition() {
        let descriptors = Descriptors::new();
        let recorder = ScrapeRecorder::new(&descriptors);
        recorder.record(&descriptors.expose(&scrape()));

        let rendered = recorder.render();

        assert!(rendered.contains("# HELP newrelic_up NewRelic API is up and accepting requests"));
        assert!(rendered.contains("# TYPE newrelic_app_summary_apdex_score gauge"));
        assert_eq!(
            parse(&rendered),
            [
                ("newrelic_app_summary_apdex_score{app=\"checkout\"}".to_string(), 0.75),
                ("newrelic_app_summary_error_rate{app=\"checkout\"}".to_string(), 0.25),
                ("newrelic_app_summary_response_time{app=\"checkout\"}".to_string(), 31.5),
                ("newrelic_app_summary_throughput{app=\"checkout\"}".to_string(), 1200.0),
                (
                    "newrelic_instance_summary_apdex_score{app=\"checkout\",instance=\"web-1\"}"
                        .to_string(),
                    0.75
                ),
                (
                    "newrelic_instance_summary_error_rate{app=\"checkout\",instance=\"web-1\"}"
                        .to_string(),
                    0.25
                ),
                (
                    "newrelic_instance_summary_response_time{app=\"checkout\",instance=\"web-1\"}"
                        .to_string(),
                    31.5
                ),
                (
                    "newrelic_instance_summary_throughput{app=\"checkout\",instance=\"web-1\"}"
                        .to_string(),
                    1200.0
                ),
                ("newrelic_scrape_duration_seconds".to_string(), 0.25),
                ("newrelic_up".to_string(), 1.0),
            ]
        );
    }

    #[test]
    fn recorders_do_not_share_series() {
        let descriptors = Descriptors::new();
        let first = ScrapeRecorder::new(&descriptors);
        first.record(&descriptors.expose(&scrape()));

        let second = ScrapeRecorder::new(&descriptors);
        second.record(&descriptors.expose(&Scrape {
            up: false,
            duration: None,
            collection: Collection::default(),
        }));

        assert_eq!(
            parse(&second.render()),
            [("newrelic_up".to_string(), 0.0)]
        );
    }
}
