//! # Job Runner
//!
//! Runs each registered [`Job`] forever on its own task: run, pause for the
//! job's current delay, repeat. A failing job is logged and reported on the
//! event bus, then scheduled again like any other iteration.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let mut runner = JobRunner::new(events.clone())
//!     .with_job(Arc::new(ScannerJob::new(scanner, settings.clone())))
//!     .with_job(Arc::new(DownloaderJob::new(downloader, settings)));
//!
//! runner.start();
//! // ...
//! runner.shutdown().await;
//! ```
//!
//! Shutdown wakes jobs that are pausing immediately. A job in the middle of a
//! run sees the cancelled token at its next check and finishes on its own.

use crate::job::Job;
use crate::BackupError;
use core_runtime::events::{BackupEvent, EventBus};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub struct JobRunner {
    jobs: Vec<Arc<dyn Job>>,
    events: EventBus,
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl JobRunner {
    pub fn new(events: EventBus) -> Self {
        Self {
            jobs: Vec::new(),
            events,
            cancel: CancellationToken::new(),
            handles: Vec::new(),
        }
    }

    pub fn with_job(mut self, job: Arc<dyn Job>) -> Self {
        self.jobs.push(job);
        self
    }

    pub fn is_running(&self) -> bool {
        !self.handles.is_empty()
    }

    /// Token cancelled by [`shutdown`](Self::shutdown).
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Spawn one loop per job. Calling it again while running does nothing.
    pub fn start(&mut self) {
        if self.is_running() {
            warn!("Job runner already started");
            return;
        }

        if self.cancel.is_cancelled() {
            self.cancel = CancellationToken::new();
        }

        for job in &self.jobs {
            let job = Arc::clone(job);
            let cancel = self.cancel.clone();
            let events = self.events.clone();
            self.handles
                .push(tokio::spawn(run_job_loop(job, cancel, events)));
        }

        info!(jobs = self.jobs.len(), "Job runner started");
    }

    /// Cancel every loop and wait for them to finish.
    pub async fn shutdown(&mut self) {
        self.cancel.cancel();

        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                warn!(error = %e, "Job loop ended abnormally");
            }
        }

        info!("Job runner stopped");
    }
}

async fn run_job_loop(job: Arc<dyn Job>, cancel: CancellationToken, events: EventBus) {
    let name = job.name().to_string();
    debug!(job = %name, "Job loop started");

    while !cancel.is_cancelled() {
        let delay = job.delay().await;

        match job.run(&cancel).await {
            Ok(()) => debug!(job = %name, "Job run finished"),
            Err(BackupError::Cancelled) => debug!(job = %name, "Job run cancelled"),
            Err(e) => {
                error!(job = %name, error = %e, "Job run failed");
                events.emit_backup(BackupEvent::JobFailed {
                    job: name.clone(),
                    message: e.to_string(),
                });
            }
        }

        let pause = sleep(delay);
        tokio::pin!(pause);
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = pause.as_mut() => {}
        }
    }

    debug!(job = %name, "Job loop stopped");
}
