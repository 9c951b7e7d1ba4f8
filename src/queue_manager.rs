//! Queue Manager for the subtitle service
//!
//! This module implements the admission queue for transcription requests. It runs one job at a
//! time so the speech-recognition tool can use every CPU core for each transcription, and it
//! starts waiting jobs in strict FIFO order once the previous one has finished, whether that
//! job succeeded or failed.
//!
//! The queue does not own a worker task. Each caller of [`QueueManager::submit`] drives its own
//! job: it either starts right away or parks on a start signal that the previous job hands over
//! when it completes. The outcome therefore goes back to the submitter directly.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::oneshot;

/// Queue manager error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// The waiting list reached its configured bound
    #[error("Queue is full: {0} jobs already waiting")]
    QueueFull(usize),
    /// The start signal was lost before the job could run
    #[error("Job was dropped from the queue before it started")]
    Abandoned,
}

/// Description of the job currently executing
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CurrentJob {
    /// Human readable label, usually the uploaded file name
    pub label: String,
    /// When the job left the waiting list
    pub start_time: DateTime<Utc>,
    /// Last progress value (0-100) reported by the job, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
}

/// Point-in-time view of the queue
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    /// Whether a job is executing
    pub running: bool,
    /// The executing job, absent when idle
    pub current: Option<CurrentJob>,
    /// Number of jobs submitted but not yet started
    pub waiting_count: usize,
}

/// A submitter parked until the running job hands over the slot
struct WaitingJob {
    ticket: u64,
    label: String,
    start: oneshot::Sender<()>,
}

/// Internal state of the queue manager
///
/// `running`, `current` and `waiting` only ever change together under the mutex, which keeps
/// the "start now or wait" decision atomic.
struct QueueState {
    running: bool,
    current: Option<(u64, CurrentJob)>,
    waiting: VecDeque<WaitingJob>,
    next_ticket: u64,
}

impl QueueState {
    fn new() -> Self {
        Self {
            running: false,
            current: None,
            waiting: VecDeque::new(),
            next_ticket: 0,
        }
    }

    fn start(&mut self, ticket: u64, label: String) {
        self.running = true;
        self.current = Some((
            ticket,
            CurrentJob {
                label,
                start_time: Utc::now(),
                progress: None,
            },
        ));
    }

    /// Release the slot held by `ticket` and promote the next live submitter.
    fn finish(&mut self, ticket: u64) {
        match &self.current {
            Some((running, _)) if *running == ticket => {}
            _ => return,
        }
        self.running = false;
        self.current = None;

        while let Some(next) = self.waiting.pop_front() {
            self.start(next.ticket, next.label.clone());
            if next.start.send(()).is_ok() {
                info!(
                    "Starting job '{}' ({} still waiting)",
                    next.label,
                    self.waiting.len()
                );
                return;
            }
            // Receiver already gone, the submitter was dropped mid-handover
            debug!("Skipping job '{}': submitter went away", next.label);
            self.running = false;
            self.current = None;
        }
    }

    fn withdraw(&mut self, ticket: u64) -> bool {
        match self.waiting.iter().position(|job| job.ticket == ticket) {
            Some(index) => {
                if let Some(job) = self.waiting.remove(index) {
                    info!("Job '{}' withdrawn from the queue", job.label);
                }
                true
            }
            None => false,
        }
    }
}

fn lock_state(state: &Mutex<QueueState>) -> MutexGuard<'_, QueueState> {
    // The state is consistent after every critical section, so a poisoned lock is still usable
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle given to a running job
///
/// It lets the job publish progress that shows up in [`QueueManager::status`].
#[derive(Clone)]
pub struct JobContext {
    state: Arc<Mutex<QueueState>>,
    ticket: u64,
}

impl JobContext {
    /// Record the job's progress, clamped to 100
    pub fn report_progress(&self, percent: u8) {
        let mut state = lock_state(&self.state);
        if let Some((ticket, job)) = state.current.as_mut() {
            if *ticket == self.ticket {
                job.progress = Some(percent.min(100));
            }
        }
    }
}

/// Keeps a submitted job's place in the queue for as long as its submitter is alive.
///
/// Dropping it withdraws a waiting job or releases the slot of the running one, so the queue
/// advances even when the submitting future is cancelled.
struct Ticket<'a> {
    state: &'a Mutex<QueueState>,
    ticket: u64,
}

impl Drop for Ticket<'_> {
    fn drop(&mut self) {
        let mut state = lock_state(self.state);
        if !state.withdraw(self.ticket) {
            state.finish(self.ticket);
        }
    }
}

/// Queue Manager serializing transcription jobs
///
/// Cloning is cheap and every clone shares the same queue.
#[derive(Clone)]
pub struct QueueManager {
    state: Arc<Mutex<QueueState>>,
    /// Maximum length of the waiting list, `None` for unbounded
    max_waiting: Option<usize>,
}

impl QueueManager {
    /// Create an empty queue manager
    pub fn new(max_waiting: Option<usize>) -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState::new())),
            max_waiting,
        }
    }

    /// Configured bound on the waiting list
    pub fn max_waiting(&self) -> Option<usize> {
        self.max_waiting
    }

    /// Submit a job and wait for its outcome
    ///
    /// The action runs as soon as every job submitted before it has completed. Its result, or
    /// its error, is returned to this caller only. A full waiting list is reported through
    /// `E::from(QueueError::QueueFull)` without the job ever entering the queue.
    pub async fn submit<T, E, F, Fut>(&self, label: impl Into<String>, action: F) -> Result<T, E>
    where
        F: FnOnce(JobContext) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<QueueError>,
    {
        let label = label.into();
        let (ticket, start_signal) = self.admit(&label)?;
        let _ticket = Ticket {
            state: &self.state,
            ticket,
        };

        if let Some(start_signal) = start_signal {
            start_signal.await.map_err(|_| QueueError::Abandoned)?;
        }

        let context = JobContext {
            state: Arc::clone(&self.state),
            ticket,
        };
        let outcome = action(context).await;

        if outcome.is_ok() {
            info!("Job '{}' completed", label);
        } else {
            warn!("Job '{}' failed", label);
        }
        outcome
    }

    /// Start the job now if idle, otherwise append it to the waiting list
    fn admit(&self, label: &str) -> Result<(u64, Option<oneshot::Receiver<()>>), QueueError> {
        let mut state = lock_state(&self.state);
        let ticket = state.next_ticket;

        if !state.running {
            state.next_ticket += 1;
            state.start(ticket, label.to_string());
            info!("Job '{}' admitted, starting immediately", label);
            return Ok((ticket, None));
        }

        if let Some(max) = self.max_waiting {
            if state.waiting.len() >= max {
                warn!("Rejecting job '{}': {} jobs already waiting", label, max);
                return Err(QueueError::QueueFull(max));
            }
        }

        state.next_ticket += 1;
        let (start, start_signal) = oneshot::channel();
        state.waiting.push_back(WaitingJob {
            ticket,
            label: label.to_string(),
            start,
        });
        info!(
            "Job '{}' queued at position {}",
            label,
            state.waiting.len()
        );
        Ok((ticket, Some(start_signal)))
    }

    /// Snapshot of the queue, safe to poll at any rate
    pub fn status(&self) -> QueueStatus {
        let state = lock_state(&self.state);
        QueueStatus {
            running: state.running,
            current: state.current.as_ref().map(|(_, job)| job.clone()),
            waiting_count: state.waiting.len(),
        }
    }
}
