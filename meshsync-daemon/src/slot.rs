//! Single-slot task handle: at most one task in flight.

use std::future::{pending, Future};

use tokio::task::{JoinError, JoinHandle};

#[derive(Debug)]
pub struct TaskSlot<T> {
    handle: Option<JoinHandle<T>>,
}

impl<T: Send + 'static> TaskSlot<T> {
    pub fn new() -> Self {
        Self { handle: None }
    }

    pub fn is_busy(&self) -> bool {
        self.handle.is_some()
    }

    /// Spawn `task` if the slot is free. Returns `false` (and drops `task`
    /// unstarted) when a task is already in flight.
    pub fn start<F>(&mut self, task: F) -> bool
    where
        F: Future<Output = T> + Send + 'static,
    {
        if self.handle.is_some() {
            return false;
        }
        self.handle = Some(tokio::spawn(task));
        true
    }

    /// Completes with the in-flight task's result and frees the slot;
    /// pending forever while the slot is empty. Cancel-safe.
    pub async fn finished(&mut self) -> Result<T, JoinError> {
        let Some(handle) = self.handle.as_mut() else {
            return pending().await;
        };
        let result = handle.await;
        self.handle = None;
        result
    }
}

impl<T: Send + 'static> Default for TaskSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}
