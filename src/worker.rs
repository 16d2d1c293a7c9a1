//! The background thread which does all reading and decoding.
//!
//! It runs a pass over the registry, then sleeps until either the poll interval elapses or somebody wakes it because a
//! new handle was requested.  Dropping the wake sender stops it.
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};

use crate::manager::Registry;

pub(crate) struct Worker {
    wake: Sender<()>,
    thread: JoinHandle<()>,
}

fn run(registry: Arc<Registry>, wake: Receiver<()>, poll_interval: Duration) {
    log::debug!("Resource worker started");
    loop {
        let loaded = registry.update_pass();
        if loaded > 0 {
            log::trace!("Resource worker loaded {} handles", loaded);
        }

        match wake.recv_timeout(poll_interval) {
            Ok(()) | Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    log::debug!("Resource worker stopped");
}

impl Worker {
    pub(crate) fn spawn(
        name: &str,
        registry: Arc<Registry>,
        poll_interval: Duration,
    ) -> std::io::Result<Worker> {
        // One slot is enough: a pending wake-up already covers every request made before the next pass.
        let (wake, rx) = crossbeam_channel::bounded(1);
        let thread = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run(registry, rx, poll_interval))?;
        Ok(Worker { wake, thread })
    }

    pub(crate) fn wake(&self) {
        match self.wake.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Disconnected(())) => {
                log::warn!("Tried to wake a resource worker which has exited")
            }
        }
    }

    /// Stop the worker and wait for the pass it is in to finish.
    pub(crate) fn stop(self) {
        let Worker { wake, thread } = self;
        std::mem::drop(wake);
        if thread.join().is_err() {
            log::error!("Resource worker panicked");
        }
    }
}
