use std::sync::mpsc::SyncSender;
use std::thread::{self, JoinHandle};

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::{Handle, Signals};
use tracing::{info, warn};

use super::PROCESS_TARGET;
use super::errors::LaunchError;
use crate::controller::ConduitEvent;

/// Turns termination signals into [`ConduitEvent::Terminate`].
///
/// Handlers stay installed until the forwarder is dropped.
#[derive(Debug)]
pub(super) struct SignalForwarder {
    handle: Handle,
    thread: Option<JoinHandle<()>>,
}

impl SignalForwarder {
    pub(super) fn install(events: SyncSender<ConduitEvent>) -> Result<Self, LaunchError> {
        let mut signals = Signals::new([SIGTERM, SIGINT, SIGQUIT, SIGHUP])
            .map_err(|source| LaunchError::Signals { source })?;
        let handle = signals.handle();
        let thread = thread::Builder::new()
            .name("bsec-signals".to_owned())
            .spawn(move || {
                for signal in signals.forever() {
                    info!(
                        target: PROCESS_TARGET,
                        signal,
                        "shutdown signal received"
                    );
                    if events.send(ConduitEvent::Terminate { signal }).is_err() {
                        break;
                    }
                }
            })
            .map_err(|source| LaunchError::Signals { source })?;
        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }
}

impl Drop for SignalForwarder {
    fn drop(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            warn!(target: PROCESS_TARGET, "signal thread panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::time::Duration;

    use signal_hook::low_level::raise;

    use super::*;

    #[test]
    fn sigterm_is_forwarded_as_a_termination_request() {
        let (sender, receiver) = mpsc::sync_channel(4);
        let forwarder = SignalForwarder::install(sender).expect("install handlers");

        raise(SIGTERM).expect("raise SIGTERM");

        let event = receiver
            .recv_timeout(Duration::from_secs(5))
            .expect("termination event");
        assert_eq!(event, ConduitEvent::Terminate { signal: SIGTERM });
        drop(forwarder);
    }
}
