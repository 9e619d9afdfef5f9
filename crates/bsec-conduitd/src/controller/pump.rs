use std::io::{self, BufReader};
use std::process::ChildStdout;
use std::sync::Arc;
use std::sync::mpsc::SyncSender;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::{CONTROLLER_TARGET, ConduitEvent};
use crate::aggregator::SampleAggregator;
use crate::decoder::SampleDecoder;

/// Starts the reader thread draining the child's stdout.
///
/// Healthy samples are ingested here so the window stays current even while
/// the controller is busy publishing. Every sample is also forwarded so the
/// controller can react to status changes. The thread ends when the stream
/// closes or the controller stops listening.
pub(super) fn spawn(
    stdout: ChildStdout,
    aggregator: Arc<SampleAggregator>,
    events: SyncSender<ConduitEvent>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("bsec-reader".to_owned())
        .spawn(move || {
            let mut decoder = SampleDecoder::new(BufReader::new(stdout));
            for sample in decoder.by_ref() {
                if sample.status == 0 {
                    aggregator.ingest(sample.clone());
                }
                if events.send(ConduitEvent::Sample(sample)).is_err() {
                    debug!(target: CONTROLLER_TARGET, "controller stopped listening");
                    return;
                }
            }
            debug!(
                target: CONTROLLER_TARGET,
                discarded = decoder.discarded(),
                "fusion output stream ended"
            );
            let _ = events.send(ConduitEvent::StreamClosed);
        })
}

/// Joins the reader, giving up after `timeout`.
///
/// A grandchild that inherited the pipe can keep it open after the fusion
/// process dies; the reader is then left to finish on its own.
pub(super) fn join_within(reader: JoinHandle<()>, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    while !reader.is_finished() {
        if Instant::now() >= deadline {
            warn!(
                target: CONTROLLER_TARGET,
                timeout_ms = timeout.as_millis(),
                "reader thread still blocked; detaching"
            );
            return;
        }
        thread::sleep(Duration::from_millis(10));
    }
    if reader.join().is_err() {
        warn!(target: CONTROLLER_TARGET, "reader thread panicked");
    }
}
