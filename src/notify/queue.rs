//! Background notification pipeline
//!
//! Case mutations commit first and then hand a `NotificationJob` to the
//! queue. The worker resolves the audience and dispatches each job on its own
//! task, up to `max_in_flight` at a time, so a slow push endpoint for one job
//! does not hold back the inbox records of the next. A failing inbox never
//! reaches the caller.
//!
//! Jobs are lost in two cases, each logged and counted in the dispatch
//! metrics: the queue stays full for longer than `enqueue_timeout`, or a job
//! is enqueued after `drain` has closed intake.

use crate::cases::types::{Case, EmployeeId};
use crate::notify::dispatcher::NotificationDispatcher;
use crate::notify::recipients::RecipientResolver;
use crate::notify::types::{CaseRef, NotificationMessage};
use crate::observability::dispatch_metrics;
use crate::telemetry::{create_case_span, generate_correlation_id};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, info, warn, Instrument};

pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;
pub const DEFAULT_MAX_IN_FLIGHT: usize = 64;
pub const DEFAULT_ENQUEUE_TIMEOUT: Duration = Duration::from_secs(2);

/// Sizing of the queue and its worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSettings {
    /// Jobs buffered before `enqueue` has to wait
    pub capacity: usize,
    /// Jobs dispatched concurrently
    pub max_in_flight: usize,
    /// How long `enqueue` waits for room before dropping the job
    pub enqueue_timeout: Duration,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_QUEUE_CAPACITY,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            enqueue_timeout: DEFAULT_ENQUEUE_TIMEOUT,
        }
    }
}

/// One committed case change that people need to hear about
#[derive(Debug, Clone)]
pub struct NotificationJob {
    pub case: Case,
    pub actor_id: EmployeeId,
    pub message: NotificationMessage,
    pub correlation_id: String,
}

impl NotificationJob {
    pub fn new(case: Case, actor_id: impl Into<EmployeeId>, message: NotificationMessage) -> Self {
        Self {
            case,
            actor_id: actor_id.into(),
            message,
            correlation_id: generate_correlation_id(),
        }
    }

    pub fn case_ref(&self) -> CaseRef {
        CaseRef {
            case_id: self.case.id,
            organization_id: self.case.organization_id.clone(),
            case_number: self.case.case_number,
        }
    }
}

/// Sending side, cheap to clone
#[derive(Debug, Clone)]
pub struct NotificationQueue {
    sender: mpsc::Sender<NotificationJob>,
    enqueue_timeout: Duration,
}

impl NotificationQueue {
    /// Spawns the worker on the current runtime.
    pub fn start(
        resolver: RecipientResolver,
        dispatcher: NotificationDispatcher,
        settings: QueueSettings,
    ) -> (Self, NotificationWorker) {
        let (sender, receiver) = mpsc::channel(settings.capacity.max(1));
        let (close_tx, close_rx) = oneshot::channel();
        let handle = tokio::spawn(run_worker(
            Arc::new(resolver),
            Arc::new(dispatcher),
            receiver,
            close_rx,
            settings.max_in_flight.max(1),
        ));
        (
            Self {
                sender,
                enqueue_timeout: settings.enqueue_timeout,
            },
            NotificationWorker {
                close: Some(close_tx),
                handle,
            },
        )
    }

    /// Hands the job to the worker, waiting up to `enqueue_timeout` while the
    /// queue is full. Returns false if the job was dropped.
    pub async fn enqueue(&self, job: NotificationJob) -> bool {
        match self.sender.send_timeout(job, self.enqueue_timeout).await {
            Ok(()) => true,
            Err(SendTimeoutError::Timeout(job)) => {
                warn!(
                    case_number = job.case.case_number,
                    timeout_ms = self.enqueue_timeout.as_millis() as u64,
                    "Notification queue full, dropping job"
                );
                dispatch_metrics().record_job_dropped();
                false
            }
            Err(SendTimeoutError::Closed(job)) => {
                warn!(
                    case_number = job.case.case_number,
                    "Notification queue closed, dropping job"
                );
                dispatch_metrics().record_job_dropped();
                false
            }
        }
    }
}

/// Owner of the worker task
#[derive(Debug)]
pub struct NotificationWorker {
    close: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl NotificationWorker {
    /// Stops intake, processes what is already queued or in flight, and waits up to `timeout`.
    ///
    /// Returns false if the worker did not finish in time.
    pub async fn drain(mut self, timeout: Duration) -> bool {
        if let Some(close) = self.close.take() {
            let _ = close.send(());
        }
        match tokio::time::timeout(timeout, &mut self.handle).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!("Notification worker ended abnormally: {}", e);
                true
            }
            Err(_) => {
                warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "Notification worker did not drain in time"
                );
                self.handle.abort();
                false
            }
        }
    }
}

async fn run_worker(
    resolver: Arc<RecipientResolver>,
    dispatcher: Arc<NotificationDispatcher>,
    mut receiver: mpsc::Receiver<NotificationJob>,
    mut close: oneshot::Receiver<()>,
    max_in_flight: usize,
) {
    info!(max_in_flight, "Notification worker started");
    let mut in_flight = JoinSet::new();
    loop {
        tokio::select! {
            job = receiver.recv() => match job {
                Some(job) => {
                    admit(&mut in_flight, max_in_flight, &resolver, &dispatcher, job).await
                }
                None => break,
            },
            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => reap(joined),
            _ = &mut close => {
                receiver.close();
                break;
            }
        }
    }

    // Intake is closed; finish whatever was already accepted.
    while let Some(job) = receiver.recv().await {
        admit(&mut in_flight, max_in_flight, &resolver, &dispatcher, job).await;
    }
    while let Some(joined) = in_flight.join_next().await {
        reap(joined);
    }
    info!("Notification worker stopped");
}

/// Spawns the job once fewer than `max_in_flight` are running.
async fn admit(
    in_flight: &mut JoinSet<()>,
    max_in_flight: usize,
    resolver: &Arc<RecipientResolver>,
    dispatcher: &Arc<NotificationDispatcher>,
    job: NotificationJob,
) {
    while in_flight.len() >= max_in_flight {
        match in_flight.join_next().await {
            Some(joined) => reap(joined),
            None => break,
        }
    }
    in_flight.spawn(process(Arc::clone(resolver), Arc::clone(dispatcher), job));
}

fn reap(joined: Result<(), JoinError>) {
    if let Err(e) = joined {
        warn!("Notification job ended abnormally: {}", e);
    }
}

async fn process(
    resolver: Arc<RecipientResolver>,
    dispatcher: Arc<NotificationDispatcher>,
    job: NotificationJob,
) {
    let span = create_case_span(
        "notify",
        &job.case.organization_id,
        job.case.case_number,
        &job.correlation_id,
    );
    async {
        let recipients = resolver.resolve_audience(&job.case, &job.actor_id).await;
        let report = dispatcher
            .dispatch(&recipients, &job.message, &job.case_ref())
            .await;
        debug!(
            recipients = recipients.len(),
            records = report.records_created,
            "Notification job dispatched"
        );
        dispatch_metrics().record_job_processed();
    }
    .instrument(span)
    .await
}
