//! A background task which runs on a fixed period until cancelled.

use std::{
    io,
    sync::mpsc::{self, RecvTimeoutError, Sender},
    thread::{self, JoinHandle},
    time::Duration,
};

use tracing::debug;

/// Runs a closure every `period` on its own thread.
///
/// Cancelling (or dropping) the task stops the schedule and waits for a tick which is
/// already running to finish, so no tick can start after [`PeriodicTask::cancel`] returns.
pub struct PeriodicTask {
    name: String,
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    /// Start the task. The first tick happens one period after spawning.
    pub fn spawn<F>(name: &str, period: Duration, mut tick: F) -> io::Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let (stop, stopped) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                loop {
                    match stopped.recv_timeout(period) {
                        Err(RecvTimeoutError::Timeout) => tick(),
                        // Either an explicit stop or the sender was dropped.
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })?;

        debug!(task = name, ?period, "periodic task started");
        Ok(Self {
            name: name.to_string(),
            stop: Some(stop),
            handle: Some(handle),
        })
    }

    /// True until the task has been cancelled.
    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Stop the schedule and join the thread. Safe to call more than once.
    pub fn cancel(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                debug!(task = %self.name, "periodic task panicked");
            }
            debug!(task = %self.name, "periodic task stopped");
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.cancel();
    }
}
