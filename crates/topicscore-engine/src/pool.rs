//! Worker pool: fans partitions out to session workers and scores records.
//!
//! Each bound worker runs as a long-lived task pulling jobs from a shared
//! queue and executing them through the session's
//! [`WorkerExecutor`](crate::session::WorkerExecutor) on the blocking pool.
//!
//! Failure handling has two tiers:
//!
//! - **Per record.** [`score_record`] is the fail-soft boundary. A scoring
//!   error, panic, or non-finite result becomes a neutral `0.0` and is not
//!   reported anywhere else.
//! - **Per worker.** A worker that faults leaves the pool. The unscored tail
//!   of its job is requeued once for the remaining workers; a second fault on
//!   the same partition, or running out of workers, fails the whole batch.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use topicscore_types::{Partition, Record, ScoredRecord};

use crate::cancel::CancelSignal;
use crate::scoring::{clamp_polarity, ScoringFunction};
use crate::session::{Session, SessionId, WorkerExecutor, WorkerFault};

/// Attempts allowed per partition: the original dispatch plus one resubmission.
pub const MAX_PARTITION_ATTEMPTS: u8 = 2;

/// Batch-fatal compute failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ComputeError {
    #[error("session {0} has no bound workers")]
    Unbound(SessionId),

    #[error("partition {partition} failed after {attempts} attempts: {reason}")]
    PartitionFailed {
        partition: usize,
        attempts: u8,
        reason: String,
    },

    #[error("no healthy workers left with {pending} partition(s) pending")]
    NoHealthyWorkers { pending: usize },

    #[error("scored {scored} records but read {read}")]
    CountMismatch { read: u64, scored: u64 },

    #[error("compute task failed: {0}")]
    Task(String),

    #[error("scoring cancelled")]
    Cancelled,
}

/// Everything the pool produced for one batch.
#[derive(Debug, Clone, Default)]
pub struct PoolOutput {
    /// Scored records in completion order.
    pub scored: Vec<ScoredRecord>,
    pub partitions: usize,
    pub resubmissions: u32,
}

/// Apply `scorer` to one record, absorbing every failure as a neutral score.
///
/// The result is always finite and within `[-1.0, 1.0]`.
pub fn score_record(scorer: &dyn ScoringFunction, record: &Record) -> ScoredRecord {
    let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| scorer.score(&record.text)));
    let score = match outcome {
        Ok(Ok(raw)) => clamp_polarity(raw),
        Ok(Err(error)) => {
            tracing::trace!(line = record.line, %error, "Scoring failed, using neutral score");
            0.0
        }
        Err(_) => {
            tracing::trace!(line = record.line, "Scoring panicked, using neutral score");
            0.0
        }
    };
    ScoredRecord::new(record.clone(), score)
}

struct Job {
    partition: usize,
    records: Arc<Vec<Record>>,
    attempt: u8,
}

enum WorkerEvent {
    Completed {
        scored: Vec<ScoredRecord>,
    },
    Faulted {
        worker: u32,
        job: Job,
        fault: WorkerFault,
    },
}

/// Distributes partitions across the workers bound to a session.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkerPool;

impl WorkerPool {
    /// Score every record received on `partitions` until the channel closes.
    ///
    /// Output order is unspecified. On error, every partial result is
    /// discarded.
    ///
    /// # Errors
    ///
    /// Returns a [`ComputeError`] if the session is unbound, a partition
    /// fails twice, all workers are lost, or `cancel` is raised.
    pub async fn score(
        &self,
        mut partitions: mpsc::Receiver<Partition>,
        scorer: Arc<dyn ScoringFunction>,
        session: &Session,
        cancel: &CancelSignal,
    ) -> Result<PoolOutput, ComputeError> {
        let binding = session
            .binding()
            .ok_or_else(|| ComputeError::Unbound(session.id()))?;

        let (job_tx, job_rx) = mpsc::unbounded_channel::<Job>();
        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<WorkerEvent>();
        let job_rx = Arc::new(Mutex::new(job_rx));

        let mut workers = JoinSet::new();
        for worker in 0..binding.workers {
            workers.spawn(worker_loop(
                worker,
                Arc::clone(&job_rx),
                event_tx.clone(),
                Arc::clone(&binding.executor),
                Arc::clone(&scorer),
            ));
        }
        drop(event_tx);

        let mut live_workers = binding.workers as usize;
        let mut outstanding = 0usize;
        let mut source_open = true;
        let mut output = PoolOutput::default();

        let result = loop {
            if !source_open && outstanding == 0 {
                break Ok(());
            }
            if live_workers == 0 {
                break Err(ComputeError::NoHealthyWorkers {
                    pending: outstanding + usize::from(source_open),
                });
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => break Err(ComputeError::Cancelled),
                Some(event) = event_rx.recv() => match event {
                    WorkerEvent::Completed { scored } => {
                        outstanding -= 1;
                        output.scored.extend(scored);
                    }
                    WorkerEvent::Faulted { worker, job, fault } => {
                        live_workers -= 1;
                        let mut scored = fault.scored;
                        scored.truncate(job.records.len());
                        let done = scored.len();
                        output.scored.extend(scored);
                        if job.attempt >= MAX_PARTITION_ATTEMPTS {
                            tracing::error!(
                                worker,
                                partition = job.partition,
                                attempt = job.attempt,
                                reason = %fault.reason,
                                "Partition failed on resubmission"
                            );
                            break Err(ComputeError::PartitionFailed {
                                partition: job.partition,
                                attempts: job.attempt,
                                reason: fault.reason,
                            });
                        }
                        let remaining = job.records[done..].to_vec();
                        if remaining.is_empty() {
                            outstanding -= 1;
                            continue;
                        }
                        tracing::warn!(
                            worker,
                            partition = job.partition,
                            remaining = remaining.len(),
                            live_workers,
                            reason = %fault.reason,
                            "Worker lost, resubmitting unscored records"
                        );
                        output.resubmissions += 1;
                        let retry = Job {
                            partition: job.partition,
                            records: Arc::new(remaining),
                            attempt: job.attempt + 1,
                        };
                        if job_tx.send(retry).is_err() {
                            break Err(ComputeError::NoHealthyWorkers { pending: outstanding });
                        }
                    }
                },
                maybe = partitions.recv(), if source_open && outstanding < live_workers => {
                    match maybe {
                        Some(partition) if partition.is_empty() => {}
                        Some(partition) => {
                            output.partitions += 1;
                            let job = Job {
                                partition: partition.index,
                                records: Arc::new(partition.records),
                                attempt: 1,
                            };
                            if job_tx.send(job).is_err() {
                                break Err(ComputeError::NoHealthyWorkers { pending: outstanding + 1 });
                            }
                            outstanding += 1;
                        }
                        None => source_open = false,
                    }
                }
                Some(joined) = workers.join_next() => {
                    // Faulted workers exit after reporting; anything else is a crash.
                    if let Err(e) = joined {
                        break Err(ComputeError::Task(format!("worker task failed: {e}")));
                    }
                }
                else => break Err(ComputeError::NoHealthyWorkers {
                    pending: outstanding,
                }),
            }
        };

        drop(job_tx);
        match result {
            Ok(()) => {
                while let Some(joined) = workers.join_next().await {
                    if let Err(e) = joined {
                        tracing::warn!("Worker task ended abnormally: {e}");
                    }
                }
                Ok(output)
            }
            Err(error) => {
                workers.abort_all();
                Err(error)
            }
        }
    }
}

async fn worker_loop(
    worker: u32,
    jobs: Arc<Mutex<mpsc::UnboundedReceiver<Job>>>,
    events: mpsc::UnboundedSender<WorkerEvent>,
    executor: Arc<dyn WorkerExecutor>,
    scorer: Arc<dyn ScoringFunction>,
) {
    loop {
        let next = { jobs.lock().await.recv().await };
        let Some(job) = next else { break };

        let executor = Arc::clone(&executor);
        let scorer = Arc::clone(&scorer);
        let records = Arc::clone(&job.records);
        let outcome = tokio::task::spawn_blocking(move || {
            let score = move |record: &Record| score_record(scorer.as_ref(), record);
            executor.execute(worker, &records, &score)
        })
        .await;

        let event = match outcome {
            Ok(Ok(scored)) if scored.len() == job.records.len() => {
                WorkerEvent::Completed { scored }
            }
            Ok(Ok(mut scored)) => {
                let reason = format!(
                    "executor returned {} of {} records",
                    scored.len(),
                    job.records.len()
                );
                scored.truncate(job.records.len());
                WorkerEvent::Faulted {
                    worker,
                    job,
                    fault: WorkerFault { scored, reason },
                }
            }
            Ok(Err(fault)) => WorkerEvent::Faulted { worker, job, fault },
            Err(join_err) => WorkerEvent::Faulted {
                worker,
                job,
                fault: WorkerFault::new(format!("worker task panicked: {join_err}")),
            },
        };

        let faulted = matches!(event, WorkerEvent::Faulted { .. });
        if events.send(event).is_err() || faulted {
            break;
        }
    }
}
