//! Bounded job dispatch over a fixed pool of engine workers.
//!
//! Requests submit jobs into a bounded queue and wait for the reply. Each
//! worker owns its own engine session, takes one job at a time, runs it
//! under the configured [`RegionPolicy`] and a per-job deadline, and always
//! leaves the workspace clean before taking the next one. Jobs are never
//! retried.

use geojson::FeatureCollection;
use interviz_core::config::RegionPolicy;
use interviz_core::error::{InterVizError, Result};
use interviz_core::models::{Job, JobState};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;

use crate::executor::JobExecutor;
use crate::policy::RegionCoordinator;
use crate::ports::EngineSpace;

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub pool_size: usize,
    pub queue_capacity: usize,
    pub job_timeout: Duration,
    pub region_policy: RegionPolicy,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            pool_size: 4,
            queue_capacity: 64,
            job_timeout: Duration::from_secs(300),
            region_policy: RegionPolicy::Isolated,
        }
    }
}

/// Snapshot of the dispatcher counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatcherStats {
    pub pool_size: usize,
    pub submitted: u64,
    pub queued: u64,
    pub running: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub timed_out: u64,
}

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    started: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
}

struct Envelope {
    job: Job,
    reply: oneshot::Sender<Result<FeatureCollection>>,
    submitted_at: Instant,
}

pub struct Dispatcher {
    sender: std::sync::Mutex<Option<mpsc::Sender<Envelope>>>,
    workers: std::sync::Mutex<Vec<JoinHandle<()>>>,
    counters: Arc<Counters>,
    pool_size: usize,
}

impl Dispatcher {
    /// Open one engine session per worker and start the pool
    pub fn start(config: DispatcherConfig, executor: Arc<JobExecutor>) -> Result<Self> {
        if config.pool_size == 0 || config.queue_capacity == 0 {
            return Err(InterVizError::ConfigInvalid {
                key: "pool_size".to_string(),
                reason: "pool size and queue capacity must be positive".to_string(),
            });
        }

        let (sender, receiver) = mpsc::channel(config.queue_capacity);
        let receiver = Arc::new(Mutex::new(receiver));
        let counters = Arc::new(Counters::default());
        let coordinator = Arc::new(RegionCoordinator::new(
            config.region_policy,
            Arc::clone(executor.workspace()),
        ));

        let mut workers = Vec::with_capacity(config.pool_size);
        for index in 0..config.pool_size {
            let worker = Worker {
                index,
                session: executor.workspace().session(&format!("worker_{}", index))?,
                receiver: Arc::clone(&receiver),
                executor: Arc::clone(&executor),
                coordinator: Arc::clone(&coordinator),
                counters: Arc::clone(&counters),
                job_timeout: config.job_timeout,
            };
            workers.push(tokio::spawn(worker.run()));
        }

        tracing::info!(
            pool_size = config.pool_size,
            queue_capacity = config.queue_capacity,
            policy = %config.region_policy,
            job_timeout_secs = config.job_timeout.as_secs(),
            "Dispatcher started"
        );

        Ok(Self {
            sender: std::sync::Mutex::new(Some(sender)),
            workers: std::sync::Mutex::new(workers),
            counters,
            pool_size: config.pool_size,
        })
    }

    /// Queue `job` and wait for its result.
    ///
    /// Waits for queue space when the queue is full.
    pub async fn submit(&self, job: Job) -> Result<FeatureCollection> {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(unavailable)?;

        let (reply, response) = oneshot::channel();
        let job_id = job.id.clone();
        let kind = job.kind();

        self.counters.submitted.fetch_add(1, Ordering::SeqCst);
        tracing::info!(job_id = %job_id, kind = %kind, state = %JobState::Queued, "Job submitted");

        sender
            .send(Envelope {
                job,
                reply,
                submitted_at: Instant::now(),
            })
            .await
            .map_err(|_| unavailable())?;

        response.await.map_err(|_| unavailable())?
    }

    pub fn stats(&self) -> DispatcherStats {
        let load = |counter: &AtomicU64| counter.load(Ordering::SeqCst);
        let submitted = load(&self.counters.submitted);
        let started = load(&self.counters.started);
        let finished = load(&self.counters.succeeded) + load(&self.counters.failed);

        DispatcherStats {
            pool_size: self.pool_size,
            submitted,
            queued: submitted.saturating_sub(started),
            running: started.saturating_sub(finished),
            succeeded: load(&self.counters.succeeded),
            failed: load(&self.counters.failed),
            timed_out: load(&self.counters.timed_out),
        }
    }

    /// Stop accepting jobs, let queued and running jobs finish and wait for
    /// every worker to exit
    pub async fn shutdown(&self) {
        self.sender.lock().unwrap_or_else(|e| e.into_inner()).take();

        let workers: Vec<JoinHandle<()>> =
            self.workers.lock().unwrap_or_else(|e| e.into_inner()).drain(..).collect();
        for handle in workers {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Worker terminated abnormally");
            }
        }
        tracing::info!("Dispatcher stopped");
    }
}

fn unavailable() -> InterVizError {
    InterVizError::computation("dispatch", "worker pool unavailable")
}

struct Worker {
    index: usize,
    session: EngineSpace,
    receiver: Arc<Mutex<mpsc::Receiver<Envelope>>>,
    executor: Arc<JobExecutor>,
    coordinator: Arc<RegionCoordinator>,
    counters: Arc<Counters>,
    job_timeout: Duration,
}

impl Worker {
    async fn run(self) {
        loop {
            let envelope = { self.receiver.lock().await.recv().await };
            let Some(envelope) = envelope else {
                break;
            };
            self.process(envelope).await;
        }

        let workspace = Arc::clone(self.executor.workspace());
        let session = self.session.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || workspace.release(&session)).await {
            tracing::warn!(worker = self.index, error = %e, "Session release failed");
        }
        tracing::debug!(worker = self.index, "Worker exiting");
    }

    async fn process(&self, envelope: Envelope) {
        let Envelope {
            job,
            reply,
            submitted_at,
        } = envelope;
        self.counters.started.fetch_add(1, Ordering::SeqCst);
        tracing::info!(
            job_id = %job.id,
            kind = %job.kind(),
            state = %JobState::Running,
            worker = self.index,
            queued_ms = submitted_at.elapsed().as_millis() as u64,
            "Job started"
        );

        let started_at = Instant::now();
        let result = self.execute(&job).await;

        match &result {
            Ok(features) => {
                self.counters.succeeded.fetch_add(1, Ordering::SeqCst);
                tracing::info!(
                    job_id = %job.id,
                    state = %JobState::Succeeded,
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    features = features.features.len(),
                    "Job finished"
                );
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::SeqCst);
                if e.is_timeout() {
                    self.counters.timed_out.fetch_add(1, Ordering::SeqCst);
                }
                tracing::warn!(
                    job_id = %job.id,
                    state = %JobState::Failed,
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    error = %e,
                    "Job failed"
                );
            }
        }

        if reply.send(result).is_err() {
            tracing::debug!(job_id = %job.id, "Requester went away before the result");
        }
    }

    async fn execute(&self, job: &Job) -> Result<FeatureCollection> {
        let lease = self.coordinator.acquire(job, &self.session).await?;
        tracing::debug!(
            job_id = %job.id,
            mapset = %lease.space().mapset,
            exclusive = lease.is_exclusive(),
            "Region lease acquired"
        );

        let run = self.executor.run(job, lease.space());
        let result = match tokio::time::timeout(self.job_timeout, run).await {
            Ok(result) => result,
            Err(_) => {
                // The run future is gone and its engine processes killed
                self.executor.recover(job, lease.space()).await;
                Err(InterVizError::Timeout {
                    job_id: job.id.to_string(),
                    seconds: self.job_timeout.as_secs(),
                })
            }
        };

        lease.release().await;
        result
    }
}
