//! Background ingestion worker.
//!
//! Documents are submitted over a bounded queue and processed concurrently up
//! to `max_concurrent`. Between documents the worker runs an optional periodic
//! maintenance task (the memory expiry sweep in production).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use ragmem_core::defaults::{
    EVENT_BUS_CAPACITY, INGEST_MAX_CONCURRENT, INGEST_QUEUE_CAPACITY, MEMORY_CLEANUP_INTERVAL_SECS,
};
use ragmem_core::{env, Document, Error, Result};

use crate::maintenance::PeriodicTask;
use crate::pipeline::IngestionPipeline;

/// Configuration for the ingestion worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Documents processed at the same time.
    pub max_concurrent: usize,
    /// Submissions buffered before `submit` waits.
    pub queue_capacity: usize,
    /// Seconds between maintenance runs; 0 disables them.
    pub cleanup_interval_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: INGEST_MAX_CONCURRENT,
            queue_capacity: INGEST_QUEUE_CAPACITY,
            cleanup_interval_secs: MEMORY_CLEANUP_INTERVAL_SECS,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `INGEST_MAX_CONCURRENT` | `4` | Documents ingested concurrently |
    /// | `INGEST_QUEUE_CAPACITY` | `256` | Pending submissions buffered |
    /// | `MEMORY_CLEANUP_INTERVAL_SECS` | `3600` | Expiry sweep interval, 0 disables |
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            max_concurrent: env::parse_or("INGEST_MAX_CONCURRENT", INGEST_MAX_CONCURRENT)?.max(1),
            queue_capacity: env::parse_or("INGEST_QUEUE_CAPACITY", INGEST_QUEUE_CAPACITY)?.max(1),
            cleanup_interval_secs: env::parse_or(
                "MEMORY_CLEANUP_INTERVAL_SECS",
                MEMORY_CLEANUP_INTERVAL_SECS,
            )?,
        })
    }

    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max.max(1);
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    pub fn with_cleanup_interval_secs(mut self, secs: u64) -> Self {
        self.cleanup_interval_secs = secs;
        self
    }

    /// Maintenance interval, `None` when disabled.
    pub fn cleanup_interval(&self) -> Option<Duration> {
        (self.cleanup_interval_secs > 0).then(|| Duration::from_secs(self.cleanup_interval_secs))
    }
}

/// Event emitted by the ingestion worker.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestEvent {
    /// A document was picked up.
    Started { document_id: Uuid },
    /// A document was indexed.
    Completed { document_id: Uuid, chunk_count: usize },
    /// A document failed; its status is now `failed`.
    Failed { document_id: Uuid, error: String },
    /// A maintenance run finished.
    MaintenanceCompleted { task: &'static str, affected: u64 },
    /// Worker started.
    WorkerStarted,
    /// Worker stopped after draining.
    WorkerStopped,
}

impl IngestEvent {
    /// The document this event concerns, if any.
    pub fn document_id(&self) -> Option<Uuid> {
        match self {
            Self::Started { document_id }
            | Self::Completed { document_id, .. }
            | Self::Failed { document_id, .. } => Some(*document_id),
            _ => None,
        }
    }

    /// True for `Completed` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }
}

/// Handle for submitting to and controlling a running worker.
pub struct WorkerHandle {
    submit_tx: mpsc::Sender<Document>,
    shutdown_tx: mpsc::Sender<()>,
    event_tx: broadcast::Sender<IngestEvent>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerHandle {
    /// Queue a document for ingestion. Waits while the queue is full.
    pub async fn submit(&self, document: Document) -> Result<()> {
        self.submit_tx
            .send(document)
            .await
            .map_err(|_| Error::Internal("ingestion worker is not running".into()))
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<IngestEvent> {
        self.event_tx.subscribe()
    }

    /// Signal the worker to stop and wait until queued and in-flight
    /// documents have finished. Later calls return immediately.
    pub async fn shutdown(&self) -> Result<()> {
        let Some(task) = self.task.lock().await.take() else {
            return Ok(());
        };
        // The worker may already have exited; only the join matters then.
        let _ = self.shutdown_tx.send(()).await;
        task.await
            .map_err(|e| Error::Internal(format!("ingestion worker panicked: {}", e)))
    }
}

/// Worker that drives documents through an [`IngestionPipeline`].
pub struct IngestionWorker {
    pipeline: Arc<IngestionPipeline>,
    config: WorkerConfig,
    maintenance: Option<Arc<dyn PeriodicTask>>,
    event_tx: broadcast::Sender<IngestEvent>,
}

impl IngestionWorker {
    pub fn new(pipeline: Arc<IngestionPipeline>, config: WorkerConfig) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self {
            pipeline,
            config,
            maintenance: None,
            event_tx,
        }
    }

    /// Run `task` every `cleanup_interval_secs`.
    pub fn with_maintenance(mut self, task: Arc<dyn PeriodicTask>) -> Self {
        self.maintenance = Some(task);
        self
    }

    /// Get a receiver for worker events, including `WorkerStarted`.
    pub fn events(&self) -> broadcast::Receiver<IngestEvent> {
        self.event_tx.subscribe()
    }

    /// Start the worker and return a handle for control.
    pub fn start(self) -> WorkerHandle {
        let (submit_tx, submit_rx) = mpsc::channel(self.config.queue_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let event_tx = self.event_tx.clone();

        let task = tokio::spawn(self.run(submit_rx, shutdown_rx));

        WorkerHandle {
            submit_tx,
            shutdown_tx,
            event_tx,
            task: Mutex::new(Some(task)),
        }
    }

    async fn run(self, mut queue: mpsc::Receiver<Document>, mut shutdown_rx: mpsc::Receiver<()>) {
        let max_concurrent = self.config.max_concurrent.max(1);
        let mut tasks = JoinSet::new();
        let mut timer = self.maintenance_timer();

        info!(
            subsystem = "jobs",
            component = "ingestion_worker",
            max_concurrent,
            cleanup_interval_secs = self.config.cleanup_interval_secs,
            maintenance = self.maintenance.as_ref().map(|t| t.name()),
            "Ingestion worker started"
        );
        let _ = self.event_tx.send(IngestEvent::WorkerStarted);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!(subsystem = "jobs", component = "ingestion_worker", "Ingestion worker received shutdown signal");
                    break;
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => log_join(joined),
                received = queue.recv(), if tasks.len() < max_concurrent => match received {
                    Some(document) => self.spawn(&mut tasks, document),
                    None => break,
                },
                _ = next_tick(&mut timer) => self.run_maintenance().await,
            }
        }

        // Refuse new submissions, then finish what was already accepted.
        queue.close();
        while let Some(document) = queue.recv().await {
            while tasks.len() >= max_concurrent {
                match tasks.join_next().await {
                    Some(joined) => log_join(joined),
                    None => break,
                }
            }
            self.spawn(&mut tasks, document);
        }
        while let Some(joined) = tasks.join_next().await {
            log_join(joined);
        }

        let _ = self.event_tx.send(IngestEvent::WorkerStopped);
        info!(subsystem = "jobs", component = "ingestion_worker", "Ingestion worker stopped");
    }

    fn spawn(&self, tasks: &mut JoinSet<()>, document: Document) {
        let pipeline = self.pipeline.clone();
        let event_tx = self.event_tx.clone();
        debug!(
            subsystem = "jobs",
            component = "ingestion_worker",
            document_id = %document.id,
            in_flight = tasks.len() + 1,
            "Dispatching document"
        );
        tasks.spawn(async move {
            let document_id = document.id;
            let _ = event_tx.send(IngestEvent::Started { document_id });
            let event = match pipeline.process(&document).await {
                Ok(outcome) => IngestEvent::Completed {
                    document_id,
                    chunk_count: outcome.chunk_count,
                },
                Err(e) => IngestEvent::Failed {
                    document_id,
                    error: e.to_string(),
                },
            };
            let _ = event_tx.send(event);
        });
    }

    fn maintenance_timer(&self) -> Option<Interval> {
        self.maintenance.as_ref()?;
        let period = self.config.cleanup_interval()?;
        let mut timer = tokio::time::interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Some(timer)
    }

    async fn run_maintenance(&self) {
        let Some(task) = &self.maintenance else {
            return;
        };
        match task.run().await {
            Ok(affected) => {
                info!(
                    subsystem = "jobs",
                    component = "ingestion_worker",
                    op = task.name(),
                    affected,
                    "Maintenance run complete"
                );
                let _ = self.event_tx.send(IngestEvent::MaintenanceCompleted {
                    task: task.name(),
                    affected,
                });
            }
            Err(e) => warn!(
                subsystem = "jobs",
                component = "ingestion_worker",
                op = task.name(),
                error = %e,
                "Maintenance run failed"
            ),
        }
    }
}

/// Wait for the next tick, or forever when there is no timer.
async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

fn log_join(joined: std::result::Result<(), JoinError>) {
    if let Err(e) = joined {
        error!(subsystem = "jobs", component = "ingestion_worker", error = ?e, "Ingestion task panicked");
    }
}
