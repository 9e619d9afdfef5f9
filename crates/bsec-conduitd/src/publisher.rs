//! Hand-off of averaged readings to the outside world.

use std::io::{self, Write};

use thiserror::Error;

use crate::aggregator::PublishedReading;

/// Errors raised while publishing a reading.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The reading could not be serialised.
    #[error("failed to serialise reading: {source}")]
    Serialise {
        /// Underlying serialisation error.
        #[from]
        source: serde_json::Error,
    },
    /// The sink rejected the write.
    #[error("failed to write reading: {source}")]
    Write {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Sink for averaged readings, e.g. a message-bus client.
pub trait ReadingPublisher: Send {
    /// Publishes one reading.
    fn publish(&mut self, reading: &PublishedReading) -> Result<(), PublishError>;
}

/// Publisher writing one JSON object per line.
#[derive(Debug)]
pub struct JsonLinePublisher<W> {
    writer: W,
}

impl JsonLinePublisher<io::Stdout> {
    /// Publishes to the process's stdout.
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> JsonLinePublisher<W> {
    /// Publishes to an arbitrary writer.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> ReadingPublisher for JsonLinePublisher<W> {
    fn publish(&mut self, reading: &PublishedReading) -> Result<(), PublishError> {
        let mut line = serde_json::to_vec(reading)?;
        line.push(b'\n');
        self.writer
            .write_all(&line)
            .and_then(|()| self.writer.flush())
            .map_err(|source| PublishError::Write { source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading() -> PublishedReading {
        PublishedReading {
            iaq: 48.2,
            accuracy: "Medium",
            temperature: 21.4,
            humidity: 44.0,
            pressure: 1009.8,
            gas: 154_321.0,
            samples: 40,
        }
    }

    #[test]
    fn writes_one_object_per_line() {
        let mut publisher = JsonLinePublisher::new(Vec::new());
        publisher.publish(&reading()).expect("publish");
        publisher.publish(&reading()).expect("publish");

        let output = String::from_utf8(publisher.into_inner()).expect("utf-8");
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        let value: serde_json::Value = serde_json::from_str(lines[0]).expect("json");
        assert_eq!(value["IAQ_Accuracy"], "Medium");
        assert_eq!(value["Temperature"], 21.4);
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn write_failures_surface_as_errors() {
        let mut publisher = JsonLinePublisher::new(BrokenPipe);
        assert!(matches!(
            publisher.publish(&reading()),
            Err(PublishError::Write { .. })
        ));
    }
}
