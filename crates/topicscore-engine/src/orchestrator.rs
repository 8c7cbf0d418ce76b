//! Pipeline orchestrator: validates the topic, acquires a session, streams the
//! corpus through the worker pool, and materializes the result set.
//!
//! Stages follow `Idle -> Validating -> AcquiringSession -> Reading ->
//! Scoring -> Aggregating -> Released`. Once a session exists it is owned by
//! a [`SessionGuard`], so release fires exactly once on every exit path
//! before the outcome is returned.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::mpsc;
use topicscore_types::{Partition, Topic};

use crate::cancel::CancelSignal;
use crate::config::types::EngineConfig;
use crate::config::validator::validate_config;
use crate::errors::PipelineError;
use crate::pool::{ComputeError, WorkerPool};
use crate::result::{ResultSet, RunSummary};
use crate::scoring::ScoringFunction;
use crate::session::{ClusterSession, LocalCluster, Session, SessionError, SessionGuard};
use crate::source::{FsSourceReader, RecordSource, SourceError, SourceReader};

/// Pipeline state machine position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunStage {
    Idle,
    Validating,
    AcquiringSession,
    Reading,
    Scoring,
    Aggregating,
    Released,
}

impl RunStage {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Validating => "validating",
            Self::AcquiringSession => "acquiring_session",
            Self::Reading => "reading",
            Self::Scoring => "scoring",
            Self::Aggregating => "aggregating",
            Self::Released => "released",
        }
    }
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn enter(stage: &mut RunStage, next: RunStage) {
    tracing::debug!(from = %stage, to = %next, "Stage transition");
    *stage = next;
}

/// One configured scoring pipeline. Cheap to share; every [`run`](Self::run)
/// builds its own session, channels and workers.
pub struct Pipeline {
    config: EngineConfig,
    cluster: Arc<dyn ClusterSession>,
    source: Arc<dyn SourceReader>,
    scorer: Arc<dyn ScoringFunction>,
}

impl Pipeline {
    /// Build a pipeline over the local filesystem and an in-process cluster.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` fails validation.
    pub fn new(config: EngineConfig, scorer: Arc<dyn ScoringFunction>) -> anyhow::Result<Self> {
        validate_config(&config)?;
        let source = FsSourceReader::new(&config.storage)?;
        let cluster = LocalCluster::new(config.compute.max_workers);
        Ok(Self::with_components(
            config,
            Arc::new(cluster),
            Arc::new(source),
            scorer,
        ))
    }

    /// Build a pipeline from explicit collaborators.
    #[must_use]
    pub fn with_components(
        config: EngineConfig,
        cluster: Arc<dyn ClusterSession>,
        source: Arc<dyn SourceReader>,
        scorer: Arc<dyn ScoringFunction>,
    ) -> Self {
        Self {
            config,
            cluster,
            source,
            scorer,
        }
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Score every line of the corpus for `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Validation`] for a bad topic (no session is
    /// created), [`PipelineError::Resource`] if the session cannot be
    /// acquired, [`PipelineError::NotFound`] / [`PipelineError::Io`] for
    /// storage failures, [`PipelineError::FatalCompute`] if scoring fails
    /// for the batch, and [`PipelineError::Cancelled`] if `cancel` is raised.
    pub async fn run(&self, topic: &str, cancel: &CancelSignal) -> Result<ResultSet, PipelineError> {
        let mut stage = RunStage::Idle;
        enter(&mut stage, RunStage::Validating);
        let topic = Topic::parse(topic).map_err(|e| {
            tracing::warn!(stage = %stage, error = %e, "Rejected topic");
            PipelineError::Validation(e)
        })?;

        let session = Arc::new(Session::new(self.config.compute.effective_workers()));
        let guard = SessionGuard::new(Arc::clone(&self.cluster), Arc::clone(&session));
        tracing::info!(
            topic = %topic,
            session = %session.id(),
            workers = session.requested_workers(),
            "Starting pipeline run"
        );

        let outcome = self.run_in_session(&topic, &guard, cancel, &mut stage).await;
        let failed_at = stage;
        guard.finish();
        enter(&mut stage, RunStage::Released);

        match &outcome {
            Ok(results) => tracing::info!(
                topic = %topic,
                session = %session.id(),
                records = results.len(),
                partitions = results.summary.partitions,
                resubmissions = results.summary.resubmissions,
                duration_secs = results.summary.duration_secs,
                "Pipeline run completed"
            ),
            Err(e) => tracing::error!(
                topic = %topic,
                session = %session.id(),
                stage = %failed_at,
                kind = e.kind(),
                "Pipeline run failed: {e}"
            ),
        }
        outcome
    }

    async fn run_in_session(
        &self,
        topic: &Topic,
        guard: &SessionGuard,
        cancel: &CancelSignal,
        stage: &mut RunStage,
    ) -> Result<ResultSet, PipelineError> {
        let start = Instant::now();
        let started_at = Utc::now();
        let session = Arc::clone(guard.session());

        enter(stage, RunStage::AcquiringSession);
        ensure_not_cancelled(cancel)?;
        let cluster = Arc::clone(&self.cluster);
        let session_for_acquire = Arc::clone(&session);
        tokio::task::spawn_blocking(move || cluster.acquire(&session_for_acquire))
            .await
            .map_err(|e| SessionError::Negotiation(format!("acquire task panicked: {e}")))??;
        let workers = session.binding().map_or(0, |b| b.workers);

        enter(stage, RunStage::Reading);
        ensure_not_cancelled(cancel)?;
        let reader = Arc::clone(&self.source);
        let topic_for_open = topic.clone();
        let records = tokio::task::spawn_blocking(move || reader.open(&topic_for_open))
            .await
            .map_err(|e| ComputeError::Task(format!("open task panicked: {e}")))??;

        enter(stage, RunStage::Scoring);
        let (tx, rx) = mpsc::channel::<Partition>(self.config.compute.channel_capacity.max(1));
        let producer_cancel = cancel.clone();
        let producer =
            tokio::task::spawn_blocking(move || feed_partitions(records, &tx, &producer_cancel));
        let pooled = WorkerPool
            .score(rx, Arc::clone(&self.scorer), &session, cancel)
            .await;
        let produced = producer
            .await
            .map_err(|e| ComputeError::Task(format!("reader task panicked: {e}")))?;

        let (records_read, output) = match (produced, pooled) {
            (_, Err(ComputeError::Cancelled)) => return Err(PipelineError::Cancelled),
            (Err(source_err), _) => return Err(source_err.into()),
            (Ok(_), Err(compute_err)) => return Err(compute_err.into()),
            (Ok(read), Ok(output)) => (read, output),
        };
        ensure_not_cancelled(cancel)?;

        enter(stage, RunStage::Aggregating);
        let mut scored = output.scored;
        let records_scored = scored.len() as u64;
        if records_scored != records_read {
            return Err(ComputeError::CountMismatch {
                read: records_read,
                scored: records_scored,
            }
            .into());
        }
        scored.sort_by_key(|r| r.line);

        Ok(ResultSet {
            records: scored,
            summary: RunSummary {
                topic: topic.clone(),
                session_id: session.id().to_string(),
                started_at,
                records_read,
                records_scored,
                partitions: output.partitions,
                resubmissions: output.resubmissions,
                workers,
                duration_secs: start.elapsed().as_secs_f64(),
            },
        })
    }
}

fn ensure_not_cancelled(cancel: &CancelSignal) -> Result<(), PipelineError> {
    if cancel.is_cancelled() {
        Err(PipelineError::Cancelled)
    } else {
        Ok(())
    }
}

/// Drain `source` into `tx`, returning the number of records sent.
///
/// Stops early, without error, when `cancel` is raised or the receiver is
/// dropped.
fn feed_partitions(
    source: RecordSource,
    tx: &mpsc::Sender<Partition>,
    cancel: &CancelSignal,
) -> Result<u64, SourceError> {
    let mut sent = 0u64;
    for partition in source {
        if cancel.is_cancelled() {
            break;
        }
        let partition = partition?;
        let len = partition.len() as u64;
        if tx.blocking_send(partition).is_err() {
            break;
        }
        sent += len;
    }
    Ok(sent)
}
