#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use meshsync_core::ChangeSet;
use meshsync_sync::{ExitCategory, SyncError, SyncOutcome, SyncRequest, SyncTool};
use tokio::time::Instant;

/// One scripted run of the sync tool.
#[derive(Debug, Clone)]
pub struct Step {
    pub code: Option<i32>,
    pub changeset: ChangeSet,
    pub changed: bool,
    pub delay: Duration,
}

impl Step {
    pub fn clean() -> Self {
        Self::exit(0)
    }

    pub fn exit(code: i32) -> Self {
        Self {
            code: Some(code),
            changeset: ChangeSet::new(),
            changed: false,
            delay: Duration::ZERO,
        }
    }

    pub fn with_changes(mut self, changeset: ChangeSet) -> Self {
        self.changed = !changeset.is_empty();
        self.changeset = changeset;
        self
    }

    pub fn taking(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// What the coordinator asked for, and what the folder looked like then.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub at: Instant,
    pub resync: bool,
    pub baseline_present: bool,
}

/// Sync tool driven by a script. Runs beyond the script end are clean with
/// no changes. `*.tmp` paths are reported as excluded.
#[derive(Default)]
pub struct ScriptedTool {
    script: Mutex<VecDeque<Step>>,
    invocations: Mutex<Vec<Invocation>>,
    running: AtomicBool,
    overlaps: AtomicUsize,
    finished: AtomicUsize,
}

impl ScriptedTool {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            script: Mutex::new(steps.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.invocations.lock().unwrap().len()
    }

    pub fn overlaps(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }

    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SyncTool for ScriptedTool {
    async fn run(&self, request: &SyncRequest) -> Result<SyncOutcome, SyncError> {
        if self.running.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(Step::clean);
        self.invocations.lock().unwrap().push(Invocation {
            at: Instant::now(),
            resync: request.resync,
            baseline_present: request.local.join(".gitkeep").exists(),
        });

        if !step.delay.is_zero() {
            tokio::time::sleep(step.delay).await;
        }

        self.running.store(false, Ordering::SeqCst);
        self.finished.fetch_add(1, Ordering::SeqCst);
        let category = ExitCategory::from_code(step.code);
        Ok(SyncOutcome {
            succeeded: category == ExitCategory::Clean,
            category,
            exit_code: step.code,
            changed: step.changed,
            changeset: step.changeset,
            log_path: request.log_dir.join("scripted.log"),
        })
    }

    async fn excludes(&self, path: &Path, _filter_file: &Path) -> bool {
        path.extension().and_then(|e| e.to_str()) == Some("tmp")
    }
}

/// Poll `condition` every 10ms of (possibly paused) time, panicking after
/// `limit` worth of polls.
pub async fn wait_until(limit: Duration, what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + limit;
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
