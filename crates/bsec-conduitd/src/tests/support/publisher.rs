//! Publisher double capturing readings in memory.

use std::sync::{Arc, Mutex};

use crate::aggregator::PublishedReading;
use crate::publisher::{PublishError, ReadingPublisher};

/// Clonable publisher; every clone sees the same readings.
#[derive(Debug, Clone, Default)]
pub struct RecordingPublisher {
    readings: Arc<Mutex<Vec<PublishedReading>>>,
}

impl RecordingPublisher {
    /// Readings published so far.
    #[must_use]
    pub fn readings(&self) -> Vec<PublishedReading> {
        self.readings
            .lock()
            .expect("publisher mutex poisoned")
            .clone()
    }
}

impl ReadingPublisher for RecordingPublisher {
    fn publish(&mut self, reading: &PublishedReading) -> Result<(), PublishError> {
        self.readings
            .lock()
            .expect("publisher mutex poisoned")
            .push(reading.clone());
        Ok(())
    }
}
