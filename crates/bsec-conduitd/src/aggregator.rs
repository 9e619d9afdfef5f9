//! Windowed averaging of fusion samples into published readings.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use bsec_conduit_config::IaqDisplay;
use serde::Serialize;

use crate::decoder::{RawSample, round_to};

/// Upper bound of the IAQ index scale.
const IAQ_SCALE_MAX: f64 = 500.0;

/// Bounded, arrival-ordered ring buffer of samples.
#[derive(Debug, Clone)]
pub struct SampleWindow {
    capacity: usize,
    samples: VecDeque<RawSample>,
}

impl SampleWindow {
    /// Creates an empty window; a capacity of zero is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: VecDeque::new(),
        }
    }

    /// Appends a sample, returning the evicted oldest one when full.
    pub fn push(&mut self, sample: RawSample) -> Option<RawSample> {
        let evicted = if self.samples.len() == self.capacity {
            self.samples.pop_front()
        } else {
            None
        };
        self.samples.push_back(sample);
        evicted
    }

    /// Fixed capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of buffered samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether no samples are buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &RawSample> {
        self.samples.iter()
    }

    /// Most recently pushed sample.
    #[must_use]
    pub fn latest(&self) -> Option<&RawSample> {
        self.samples.back()
    }
}

/// One averaged reading as handed to the publisher.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublishedReading {
    /// Mean IAQ, as raw index or percentage.
    #[serde(rename = "IAQ")]
    pub iaq: f64,
    /// Accuracy label of the newest sample.
    #[serde(rename = "IAQ_Accuracy")]
    pub accuracy: &'static str,
    /// Mean temperature in °C.
    #[serde(rename = "Temperature")]
    pub temperature: f64,
    /// Mean relative humidity in %.
    #[serde(rename = "Humidity")]
    pub humidity: f64,
    /// Mean pressure in hPa.
    #[serde(rename = "Pressure")]
    pub pressure: f64,
    /// Mean gas resistance in ohms.
    #[serde(rename = "Gas")]
    pub gas: f64,
    /// Number of samples averaged.
    #[serde(rename = "Samples")]
    pub samples: usize,
}

/// Thread-safe aggregator shared by the reader and controller threads.
#[derive(Debug)]
pub struct SampleAggregator {
    window: Mutex<SampleWindow>,
    display: IaqDisplay,
    ingested: AtomicU64,
}

impl SampleAggregator {
    /// Builds an aggregator with the given window capacity.
    #[must_use]
    pub fn new(capacity: usize, display: IaqDisplay) -> Self {
        Self {
            window: Mutex::new(SampleWindow::new(capacity)),
            display,
            ingested: AtomicU64::new(0),
        }
    }

    /// Adds a sample, evicting the oldest once the window is full.
    pub fn ingest(&self, sample: RawSample) {
        self.lock().push(sample);
        self.ingested.fetch_add(1, Ordering::SeqCst);
    }

    /// Averages the current window; `None` while empty.
    ///
    /// Does not modify the window.
    #[must_use]
    pub fn emit(&self) -> Option<PublishedReading> {
        let window = self.lock();
        let latest = window.latest()?;
        let accuracy = latest.accuracy;
        let count = window.len();
        let divisor = count as f64;
        let mean = |select: fn(&RawSample) -> f64| window.iter().map(select).sum::<f64>() / divisor;

        let iaq = mean(|sample| sample.iaq);
        Some(PublishedReading {
            iaq: present_iaq(iaq, self.display),
            accuracy: accuracy.label(),
            temperature: round_to(mean(|sample| sample.temperature), 1),
            humidity: round_to(mean(|sample| sample.humidity), 1),
            pressure: round_to(mean(|sample| sample.pressure), 1),
            gas: round_to(mean(|sample| sample.gas), 0),
            samples: count,
        })
    }

    /// Total samples ingested since construction.
    #[must_use]
    pub fn ingested_total(&self) -> u64 {
        self.ingested.load(Ordering::SeqCst)
    }

    /// Copy of the buffered samples, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<RawSample> {
        self.lock().iter().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SampleWindow> {
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn present_iaq(mean: f64, display: IaqDisplay) -> f64 {
    match display {
        IaqDisplay::Raw => round_to(mean, 1),
        IaqDisplay::Percent => round_to(mean.clamp(0.0, IAQ_SCALE_MAX) / 5.0, 0),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::decoder::IaqAccuracy;

    fn sample(iaq: f64, accuracy: IaqAccuracy) -> RawSample {
        RawSample {
            timestamp_ns: 0,
            iaq,
            accuracy,
            temperature: 21.0,
            humidity: 40.0,
            pressure: 1013.0,
            gas: 100_000.0,
            status: 0,
        }
    }

    #[rstest]
    #[case(1, 5)]
    #[case(3, 3)]
    #[case(4, 10)]
    fn window_keeps_most_recent_in_arrival_order(#[case] capacity: usize, #[case] inserted: usize) {
        let mut window = SampleWindow::new(capacity);
        for index in 0..inserted {
            window.push(sample(index as f64, IaqAccuracy::Low));
            assert!(window.len() <= capacity);
        }

        let kept: Vec<f64> = window.iter().map(|sample| sample.iaq).collect();
        let expected: Vec<f64> = (inserted.saturating_sub(capacity)..inserted)
            .map(|index| index as f64)
            .collect();
        assert_eq!(kept, expected);
    }

    #[test]
    fn large_capacity_allocates_lazily() {
        let mut window = SampleWindow::new(usize::MAX);
        assert_eq!(window.push(sample(50.0, IaqAccuracy::High)), None);
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        assert_eq!(SampleWindow::new(0).capacity(), 1);
    }

    #[test]
    fn push_reports_eviction() {
        let mut window = SampleWindow::new(1);
        assert!(window.push(sample(1.0, IaqAccuracy::Low)).is_none());
        let evicted = window.push(sample(2.0, IaqAccuracy::Low));
        assert_eq!(evicted.map(|sample| sample.iaq), Some(1.0));
    }

    #[test]
    fn averages_iaq_and_labels_from_newest_sample() {
        let aggregator = SampleAggregator::new(10, IaqDisplay::Raw);
        let values = [50.0, 52.0, 48.0, 51.0, 49.0, 50.0, 53.0, 47.0, 52.0, 48.0];
        for (index, iaq) in values.iter().enumerate() {
            let accuracy = if index == values.len() - 1 {
                IaqAccuracy::High
            } else {
                IaqAccuracy::Medium
            };
            aggregator.ingest(sample(*iaq, accuracy));
        }

        let reading = aggregator.emit().expect("window is populated");

        assert_eq!(reading.iaq, 50.0);
        assert_eq!(reading.accuracy, "High");
        assert_eq!(reading.samples, 10);
    }

    #[test]
    fn emit_is_a_pure_read() {
        let aggregator = SampleAggregator::new(4, IaqDisplay::Raw);
        aggregator.ingest(sample(10.0, IaqAccuracy::Low));
        aggregator.ingest(sample(20.0, IaqAccuracy::Medium));

        let first = aggregator.emit();
        let second = aggregator.emit();

        assert_eq!(first, second);
        assert_eq!(aggregator.snapshot().len(), 2);
    }

    #[test]
    fn empty_window_emits_nothing() {
        assert!(SampleAggregator::new(3, IaqDisplay::Raw).emit().is_none());
    }

    #[rstest]
    #[case(IaqDisplay::Raw, 123.44, 123.4)]
    #[case(IaqDisplay::Percent, 250.0, 50.0)]
    #[case(IaqDisplay::Percent, 123.0, 25.0)]
    #[case(IaqDisplay::Percent, 500.0, 100.0)]
    fn iaq_presentation_follows_display_mode(
        #[case] display: IaqDisplay,
        #[case] iaq: f64,
        #[case] expected: f64,
    ) {
        let aggregator = SampleAggregator::new(1, display);
        aggregator.ingest(sample(iaq, IaqAccuracy::Low));
        assert_eq!(aggregator.emit().expect("reading").iaq, expected);
    }

    #[test]
    fn environmental_means_are_rounded() {
        let aggregator = SampleAggregator::new(3, IaqDisplay::Raw);
        for temperature in [21.04, 21.05, 21.07] {
            let mut raw = sample(25.0, IaqAccuracy::Low);
            raw.temperature = temperature;
            raw.gas = 100_000.4;
            aggregator.ingest(raw);
        }
        let reading = aggregator.emit().expect("reading");
        assert_eq!(reading.temperature, 21.1);
        assert_eq!(reading.gas, 100_000.0);
    }

    #[test]
    fn reading_serialises_with_published_names() {
        let aggregator = SampleAggregator::new(1, IaqDisplay::Raw);
        aggregator.ingest(sample(42.0, IaqAccuracy::Stabilizing));
        let json = serde_json::to_value(aggregator.emit().expect("reading")).expect("serialise");
        assert_eq!(json["IAQ"], 42.0);
        assert_eq!(json["IAQ_Accuracy"], "Stabilizing");
        assert_eq!(json["Pressure"], 1013.0);
        assert_eq!(json["Samples"], 1);
    }

    #[test]
    fn ingest_counts_every_sample() {
        let aggregator = SampleAggregator::new(2, IaqDisplay::Raw);
        for _ in 0..5 {
            aggregator.ingest(sample(1.0, IaqAccuracy::Low));
        }
        assert_eq!(aggregator.ingested_total(), 5);
        assert_eq!(aggregator.snapshot().len(), 2);
    }
}
