//! Trailing-edge debounce as an explicit timer handle.
//!
//! The owner calls [`Debouncer::arm`] on every trigger and awaits
//! [`Debouncer::fired`] in its event loop. Each `arm` pushes the deadline back
//! by a full window; `fired` completes once the window elapses without a new
//! `arm`, then disarms itself. There is no leading-edge invocation.

use std::future::pending;
use std::time::Duration;

use tokio::time::{sleep_until, Instant};

#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// (Re)start the window from now, discarding any previous deadline.
    pub fn arm(&mut self) {
        self.deadline = Some(Instant::now() + self.window);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Completes when the armed window elapses; pending forever while disarmed.
    ///
    /// Cancel-safe: dropping the future before it completes leaves the
    /// deadline untouched, so it can be polled from `tokio::select!`.
    pub async fn fired(&mut self) {
        let Some(deadline) = self.deadline else {
            return pending().await;
        };
        sleep_until(deadline).await;
        // A re-arm can only happen through `&mut self`, which this future holds.
        self.deadline = None;
    }
}
