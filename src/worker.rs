//! Named worker threads with cooperative cancellation and bounded joins

use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::JoinHandle;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::Result;

/// One long-lived blocking loop on its own thread
///
/// The loop receives a [`CancellationToken`] and must return soon after it
/// fires. [`Worker::stop`] never waits longer than its timeout.
pub struct Worker {
    name: String,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
    done: mpsc::Receiver<()>,
}

impl Worker {
    /// Spawn `body` on a thread named `name`
    ///
    /// # Errors
    ///
    /// Returns error if the OS refuses to create the thread
    pub fn spawn<F>(name: &str, cancel: CancellationToken, body: F) -> Result<Self>
    where
        F: FnOnce(CancellationToken) + Send + 'static,
    {
        let (done_tx, done) = mpsc::channel::<()>();
        let token = cancel.clone();

        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                // Dropped on return or unwind, which disconnects the channel
                let _done = done_tx;
                body(token);
            })?;

        tracing::debug!(worker = name, "worker started");

        Ok(Self {
            name: name.to_string(),
            cancel,
            handle: Some(handle),
            done,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Token observed by the worker loop
    #[must_use]
    pub const fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Whether the loop has returned (or was already stopped)
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Cancel the loop and join it, waiting at most `timeout`
    ///
    /// Returns `true` if the thread was joined. On timeout the thread is
    /// detached and `false` is returned. Calling this again is a no-op.
    pub fn stop(&mut self, timeout: Duration) -> bool {
        let Some(handle) = self.handle.take() else {
            return true;
        };

        self.cancel.cancel();

        match self.done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if handle.join().is_err() {
                    tracing::error!(worker = %self.name, "worker panicked");
                }
                tracing::debug!(worker = %self.name, "worker stopped");
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    worker = %self.name,
                    timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    "worker did not stop in time, detaching"
                );
                false
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.cancel.cancel();
        }
    }
}
