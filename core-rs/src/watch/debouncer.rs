//! Quiescence filter between raw change signals and restarts
//!
//! Idle until the first signal, then armed: every further signal pushes the
//! deadline back by `delay`. When the deadline passes one pulse goes out,
//! anything that queued up meanwhile is discarded, and the loop is idle
//! again. A burst of any length therefore yields one pulse, no sooner than
//! `delay` after its last signal.
//!
//! The pulse is sent with a blocking `send`, never dropped. Size the output
//! queue generously.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;

/// Something changed; carries no payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartSignal;

/// Capacity used for both debouncer queues by the binary
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy)]
pub struct Debouncer {
    delay: Duration,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run until `input` is closed and drained, or `output` has no receiver.
    ///
    /// A burst still armed when `input` closes is flushed before returning.
    pub async fn run(
        self,
        mut input: mpsc::Receiver<RestartSignal>,
        output: mpsc::Sender<RestartSignal>,
    ) {
        loop {
            // Idle
            if input.recv().await.is_none() {
                return;
            }

            // Armed
            let mut open = true;
            let timer = tokio::time::sleep(self.delay);
            tokio::pin!(timer);

            loop {
                tokio::select! {
                    () = &mut timer => break,
                    signal = input.recv(), if open => match signal {
                        Some(_) => timer.as_mut().reset(Instant::now() + self.delay),
                        None => open = false,
                    },
                }
            }

            debug!("[Debouncer] Quiet for {:?}, emitting restart", self.delay);
            if output.send(RestartSignal).await.is_err() {
                return;
            }

            // Draining
            let mut discarded = 0usize;
            while input.try_recv().is_ok() {
                discarded += 1;
            }
            if discarded > 0 {
                debug!("[Debouncer] Discarded {} queued signal(s)", discarded);
            }
        }
    }
}
