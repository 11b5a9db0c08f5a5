// src/jobs.rs
// In-process job queue with a single worker (concurrency = 1), queue-level
// retry with exponential backoff, and a recurring scheduler. One canonical
// enqueue path serves both the steady schedule and manual triggers. When
// background jobs are disabled at startup the queue degrades to a no-op that
// still acknowledges enqueues, so the read side keeps functioning.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

pub const FETCH_NEWS_JOB: &str = "fetch-news";

/// Queue-level retry: attempts 0..max_attempts, delay = base * 2^attempt.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: u64,
    pub name: &'static str,
    pub enqueued_at: DateTime<Utc>,
    pub attempt: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Started,
    Completed,
    Retrying,
    Failed,
}

/// Completion/failure notification, observable via `JobQueue::subscribe`.
#[derive(Debug, Clone)]
pub struct JobEvent {
    pub job_id: u64,
    pub attempt: u32,
    pub state: JobState,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct JobAck {
    pub job_id: u64,
    pub accepted: bool,
}

pub type JobHandler =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>> + Send + Sync>;

#[derive(Clone)]
enum Mode {
    Real(mpsc::UnboundedSender<Job>),
    Noop,
}

#[derive(Clone)]
pub struct JobQueue {
    mode: Mode,
    events: broadcast::Sender<JobEvent>,
    next_id: Arc<AtomicU64>,
}

impl JobQueue {
    /// Start the queue and its worker task. The handler runs one job at a
    /// time; a failed run is re-enqueued after backoff until the policy is
    /// exhausted, then logged and discarded.
    pub fn start(policy: RetryPolicy, handler: JobHandler) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let (events, _) = broadcast::channel(64);

        let retry_tx = tx.clone();
        let worker_events = events.clone();
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let _ = worker_events.send(JobEvent {
                    job_id: job.id,
                    attempt: job.attempt,
                    state: JobState::Started,
                });
                tracing::info!(job_id = job.id, name = job.name, attempt = job.attempt, progress = 10, "job started");

                match handler().await {
                    Ok(()) => {
                        tracing::info!(job_id = job.id, name = job.name, progress = 100, "job completed");
                        let _ = worker_events.send(JobEvent {
                            job_id: job.id,
                            attempt: job.attempt,
                            state: JobState::Completed,
                        });
                    }
                    Err(e) if job.attempt + 1 < policy.max_attempts => {
                        let delay = policy.backoff_base * 2u32.pow(job.attempt);
                        tracing::warn!(
                            error = ?e,
                            job_id = job.id,
                            attempt = job.attempt,
                            delay_ms = delay.as_millis() as u64,
                            "job failed, retrying after backoff"
                        );
                        let _ = worker_events.send(JobEvent {
                            job_id: job.id,
                            attempt: job.attempt,
                            state: JobState::Retrying,
                        });
                        // Backoff off the worker task so the queue keeps
                        // draining while the retry waits.
                        let tx2 = retry_tx.clone();
                        let retry = Job {
                            attempt: job.attempt + 1,
                            ..job
                        };
                        tokio::spawn(async move {
                            tokio::time::sleep(delay).await;
                            let _ = tx2.send(retry);
                        });
                    }
                    Err(e) => {
                        tracing::error!(
                            error = ?e,
                            job_id = job.id,
                            attempt = job.attempt,
                            "job failed terminally, discarding"
                        );
                        let _ = worker_events.send(JobEvent {
                            job_id: job.id,
                            attempt: job.attempt,
                            state: JobState::Failed,
                        });
                    }
                }
            }
        });

        Self {
            mode: Mode::Real(tx),
            events,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Degraded mode for broker-less startups: enqueues are acknowledged
    /// synthetically and no work happens.
    pub fn noop() -> Self {
        let (events, _) = broadcast::channel(1);
        Self {
            mode: Mode::Noop,
            events,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn enqueue(&self, name: &'static str) -> JobAck {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        match &self.mode {
            Mode::Real(tx) => {
                let accepted = tx
                    .send(Job {
                        id,
                        name,
                        enqueued_at: Utc::now(),
                        attempt: 0,
                    })
                    .is_ok();
                if !accepted {
                    tracing::warn!(job_id = id, name, "job queue closed, enqueue dropped");
                }
                JobAck {
                    job_id: id,
                    accepted,
                }
            }
            Mode::Noop => {
                tracing::warn!(job_id = id, name, "job queue disabled, synthetic ack");
                JobAck {
                    job_id: id,
                    accepted: true,
                }
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }
}

/// Recurring registration on top of the queue. Registering a name again
/// first removes the existing stream so a schedule never runs twice.
pub struct JobScheduler {
    queue: JobQueue,
    recurring: Mutex<HashMap<&'static str, JoinHandle<()>>>,
}

impl JobScheduler {
    pub fn new(queue: JobQueue) -> Self {
        Self {
            queue,
            recurring: Mutex::new(HashMap::new()),
        }
    }

    /// Enqueue `name` immediately and then on every interval tick.
    pub fn register_recurring(&self, name: &'static str, interval: Duration) {
        let mut recurring = self.recurring.lock().expect("mutex poisoned");
        if let Some(existing) = recurring.remove(name) {
            existing.abort();
        }

        let queue = self.queue.clone();
        let handle = tokio::spawn(async move {
            // The first tick fires at once, covering the immediate run.
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                queue.enqueue(name);
            }
        });
        recurring.insert(name, handle);
        tracing::info!(name, interval_secs = interval.as_secs(), "recurring job registered");
    }

    pub fn remove_recurring(&self, name: &str) {
        let mut recurring = self.recurring.lock().expect("mutex poisoned");
        if let Some(handle) = recurring.remove(name) {
            handle.abort();
        }
    }

    /// Manual trigger outside the schedule, same job type and retry policy.
    pub fn trigger_now(&self, name: &'static str) -> JobAck {
        self.queue.enqueue(name)
    }
}

impl Drop for JobScheduler {
    fn drop(&mut self) {
        let recurring = self.recurring.lock().expect("mutex poisoned");
        for handle in recurring.values() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_queue_acknowledges_without_running() {
        let queue = JobQueue::noop();
        let ack = queue.enqueue(FETCH_NEWS_JOB);
        assert!(ack.accepted);
        assert!(ack.job_id > 0);
    }

    #[tokio::test]
    async fn completed_job_emits_started_then_completed() {
        let handler: JobHandler = Arc::new(|| Box::pin(async { Ok(()) }));
        let queue = JobQueue::start(RetryPolicy::default(), handler);
        let mut events = queue.subscribe();

        let ack = queue.enqueue(FETCH_NEWS_JOB);
        assert!(ack.accepted);

        let first = events.recv().await.unwrap();
        assert_eq!(first.state, JobState::Started);
        let second = events.recv().await.unwrap();
        assert_eq!(second.state, JobState::Completed);
        assert_eq!(second.job_id, ack.job_id);
    }
}
