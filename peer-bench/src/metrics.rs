//! In-memory aggregation of round-trip and epoch durations.

use std::time::Duration;

use serde::{Serialize, Serializer};

/// Ordered duration samples for one run.
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector {
    samples: Vec<Duration>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
        }
    }

    pub fn record(&mut self, elapsed: Duration) {
        self.samples.push(elapsed);
    }

    /// Samples in the order they were recorded.
    pub fn samples(&self) -> &[Duration] {
        &self.samples
    }

    pub fn summary(&self) -> Summary {
        let count = self.samples.len();
        let total: Duration = self.samples.iter().sum();
        if count == 0 {
            return Summary::default();
        }

        let mut sorted = self.samples.clone();
        sorted.sort_unstable();
        let median = if count % 2 == 1 {
            sorted[count / 2]
        } else {
            (sorted[count / 2 - 1] + sorted[count / 2]) / 2
        };

        Summary {
            count,
            total,
            mean: total / count as u32,
            min: sorted[0],
            max: sorted[count - 1],
            median,
        }
    }

    /// Samples as comma-separated seconds, e.g. `0.000120,0.000098`.
    pub fn to_csv(&self) -> String {
        self.samples
            .iter()
            .map(|sample| format!("{:.6}", sample.as_secs_f64()))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Read-only view over a collector. Durations serialize as seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub count: usize,
    #[serde(serialize_with = "as_secs")]
    pub total: Duration,
    #[serde(serialize_with = "as_secs")]
    pub mean: Duration,
    #[serde(serialize_with = "as_secs")]
    pub min: Duration,
    #[serde(serialize_with = "as_secs")]
    pub max: Duration,
    #[serde(serialize_with = "as_secs")]
    pub median: Duration,
}

pub(crate) fn as_secs<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(value.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn empty_summary_is_zeroed() {
        let summary = MetricsCollector::new().summary();
        assert_eq!(summary, Summary::default());
    }

    #[test]
    fn summary_reports_count_total_mean() {
        let mut metrics = MetricsCollector::new();
        for sample in [ms(30), ms(10), ms(20)] {
            metrics.record(sample);
        }
        let summary = metrics.summary();
        assert_eq!(summary.count, 3);
        assert_eq!(summary.total, ms(60));
        assert_eq!(summary.mean, ms(20));
        assert_eq!(summary.min, ms(10));
        assert_eq!(summary.max, ms(30));
        assert_eq!(summary.median, ms(20));
        assert_eq!(metrics.samples(), &[ms(30), ms(10), ms(20)]);
    }

    #[test]
    fn median_of_even_count_averages_middle_pair() {
        let mut metrics = MetricsCollector::new();
        for sample in [ms(40), ms(10), ms(20), ms(30)] {
            metrics.record(sample);
        }
        assert_eq!(metrics.summary().median, ms(25));
    }

    #[test]
    fn csv_lists_samples_in_order() {
        let mut metrics = MetricsCollector::new();
        metrics.record(ms(1500));
        metrics.record(Duration::from_micros(250));
        assert_eq!(metrics.to_csv(), "1.500000,0.000250");
    }

    #[test]
    fn summary_serializes_seconds() {
        let mut metrics = MetricsCollector::new();
        metrics.record(ms(500));
        let json = serde_json::to_value(metrics.summary()).expect("serialize");
        assert_eq!(json["count"], 1);
        assert_eq!(json["mean"], 0.5);
    }
}
