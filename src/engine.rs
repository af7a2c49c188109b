//! Statistics engine
//!
//! Runs statistics requests on a single background worker. Requests are
//! queued in submission order and at most one computes at a time. A request
//! that has newer requests queued behind it is dropped, both before it starts
//! and again before its result would be delivered, so only the latest request
//! is guaranteed to report. Work that has started is never interrupted.
//!
//! Results are posted to the delivery receiver returned by
//! [`StatisticsEngine::spawn`]; the caller drains it on its UI context.

use crate::error::AnalysisError;
use crate::source::ReadingSource;
use crate::statistics::{compute_statistics, StatisticsRequest};
use crate::types::StatisticsResult;
use log::{debug, trace};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Shared handle to a reading source usable from the worker
pub type SharedSource = Arc<dyn ReadingSource + Send + Sync>;

/// Result of one delivered request
#[derive(Debug)]
pub struct StatisticsReport {
    pub request_id: Uuid,
    pub request: StatisticsRequest,
    /// `Err(NoData)` when the range holds no usable readings
    pub outcome: Result<StatisticsResult, AnalysisError>,
}

struct Job {
    id: Uuid,
    request: StatisticsRequest,
}

/// Serial, latest-request-wins statistics worker
pub struct StatisticsEngine {
    jobs: mpsc::UnboundedSender<Job>,
    pending: Arc<AtomicUsize>,
}

impl StatisticsEngine {
    /// Start the worker on `runtime`.
    ///
    /// Returns the engine and the receiver on which reports are delivered.
    pub fn spawn(
        runtime: &Handle,
        source: SharedSource,
    ) -> (Self, mpsc::UnboundedReceiver<StatisticsReport>) {
        let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();
        let (reports_tx, reports_rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));

        runtime.spawn(run_worker(jobs_rx, source, Arc::clone(&pending), reports_tx));

        (
            Self {
                jobs: jobs_tx,
                pending,
            },
            reports_rx,
        )
    }

    /// Queue a request. Earlier requests still waiting will not report.
    pub fn submit(&self, request: StatisticsRequest) -> Result<Uuid, AnalysisError> {
        let id = Uuid::new_v4();
        self.pending.fetch_add(1, Ordering::SeqCst);

        if self.jobs.send(Job { id, request }).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(AnalysisError::EngineClosed);
        }

        trace!("statistics request {id} queued");
        Ok(id)
    }

    /// Requests submitted and not yet finished or dropped
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}

/// A job is stale when anything else is queued behind it
fn superseded(pending: &AtomicUsize) -> bool {
    pending.load(Ordering::SeqCst) > 1
}

async fn run_worker(
    mut jobs: mpsc::UnboundedReceiver<Job>,
    source: SharedSource,
    pending: Arc<AtomicUsize>,
    reports: mpsc::UnboundedSender<StatisticsReport>,
) {
    while let Some(Job { id, request }) = jobs.recv().await {
        if superseded(&pending) {
            debug!("statistics request {id} superseded before start, dropped");
            pending.fetch_sub(1, Ordering::SeqCst);
            continue;
        }

        let task_source = Arc::clone(&source);
        let outcome = tokio::task::spawn_blocking(move || {
            let history = task_source.fetch(request.from, request.to)?;
            compute_statistics(&history, &request)
        })
        .await
        .unwrap_or_else(|e| Err(AnalysisError::SourceError(format!("statistics task failed: {e}"))));

        if superseded(&pending) {
            debug!("statistics request {id} superseded after compute, result discarded");
            pending.fetch_sub(1, Ordering::SeqCst);
            continue;
        }

        let delivered = reports
            .send(StatisticsReport {
                request_id: id,
                request,
                outcome,
            })
            .is_ok();
        pending.fetch_sub(1, Ordering::SeqCst);

        if !delivered {
            debug!("statistics delivery receiver closed, stopping worker");
            break;
        }
        trace!("statistics request {id} delivered");
    }
}
