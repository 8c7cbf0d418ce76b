//! Compute sessions: acquisition, scoped release, and the executor boundary.
//!
//! A [`Session`] starts unbound. A [`ClusterSession`] implementation binds
//! worker capacity into it during [`acquire`](ClusterSession::acquire) and
//! unbinds it on [`release`](ClusterSession::release). The pipeline wraps
//! every session in a [`SessionGuard`] *before* acquisition starts, so a
//! half-negotiated session is still released.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use topicscore_types::{Record, ScoredRecord};
use uuid::Uuid;

/// Errors raised while acquiring compute capacity.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The cluster cannot supply the requested worker count.
    #[error("requested {requested} workers, cluster capacity is {available}")]
    Exhausted { requested: u32, available: u32 },

    /// The session already holds a binding.
    #[error("session {0} is already bound")]
    AlreadyBound(SessionId),

    /// The session was released and cannot be reused.
    #[error("session {0} has been released")]
    Released(SessionId),

    /// Backend-specific negotiation failure.
    #[error("session negotiation failed: {0}")]
    Negotiation(String),
}

/// Random per-run session identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Per-record scoring callback handed to executors by the worker pool.
pub type RecordScorer = dyn Fn(&Record) -> ScoredRecord + Send + Sync;

/// A worker was lost part way through a slice of records.
#[derive(Debug, Clone)]
pub struct WorkerFault {
    /// Records the worker finished before failing, in input order.
    pub scored: Vec<ScoredRecord>,
    pub reason: String,
}

impl WorkerFault {
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            scored: Vec::new(),
            reason: reason.into(),
        }
    }
}

/// Runs record slices on behalf of a single worker.
///
/// Implementations must process `records` in order and, on failure, return
/// the already-scored prefix inside [`WorkerFault::scored`]. Called from a
/// blocking thread.
pub trait WorkerExecutor: Send + Sync {
    /// Score `records` on `worker`.
    ///
    /// # Errors
    ///
    /// Returns a [`WorkerFault`] when the worker is lost.
    fn execute(
        &self,
        worker: u32,
        records: &[Record],
        score: &RecordScorer,
    ) -> Result<Vec<ScoredRecord>, WorkerFault>;
}

/// Worker capacity bound into a session by a cluster.
#[derive(Clone)]
pub struct SessionBinding {
    pub workers: u32,
    pub executor: Arc<dyn WorkerExecutor>,
}

impl fmt::Debug for SessionBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionBinding")
            .field("workers", &self.workers)
            .finish_non_exhaustive()
    }
}

/// Handle to the compute resources of one pipeline run.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    requested_workers: u32,
    binding: Mutex<Option<SessionBinding>>,
    released: AtomicBool,
}

impl Session {
    #[must_use]
    pub fn new(requested_workers: u32) -> Self {
        Self {
            id: SessionId::new(),
            requested_workers: requested_workers.max(1),
            binding: Mutex::new(None),
            released: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn requested_workers(&self) -> u32 {
        self.requested_workers
    }

    /// Attach worker capacity. Called by cluster implementations.
    ///
    /// # Errors
    ///
    /// Fails if the session is released or already bound.
    pub fn bind(&self, binding: SessionBinding) -> Result<(), SessionError> {
        let mut slot = self.binding.lock().unwrap_or_else(PoisonError::into_inner);
        if self.is_released() {
            return Err(SessionError::Released(self.id));
        }
        if slot.is_some() {
            return Err(SessionError::AlreadyBound(self.id));
        }
        *slot = Some(binding);
        Ok(())
    }

    /// Current binding, if acquisition completed and release has not.
    #[must_use]
    pub fn binding(&self) -> Option<SessionBinding> {
        self.binding
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Mark released and drop any binding.
    ///
    /// Returns `true` only for the first call.
    pub fn unbind(&self) -> bool {
        let mut slot = self.binding.lock().unwrap_or_else(PoisonError::into_inner);
        slot.take();
        !self.released.swap(true, Ordering::AcqRel)
    }
}

/// Acquires and releases compute capacity for sessions.
pub trait ClusterSession: Send + Sync {
    /// Negotiate capacity for `session` and bind it. May block.
    ///
    /// # Errors
    ///
    /// Returns a [`SessionError`] when capacity cannot be obtained.
    fn acquire(&self, session: &Session) -> Result<(), SessionError>;

    /// Return capacity held by `session`. Idempotent, and safe on a session
    /// whose acquisition failed or never started.
    fn release(&self, session: &Session);
}

/// In-process cluster backed by tokio's blocking thread pool.
#[derive(Debug, Clone)]
pub struct LocalCluster {
    max_workers: u32,
}

impl LocalCluster {
    #[must_use]
    pub fn new(max_workers: u32) -> Self {
        Self { max_workers }
    }
}

impl ClusterSession for LocalCluster {
    fn acquire(&self, session: &Session) -> Result<(), SessionError> {
        let requested = session.requested_workers();
        if requested > self.max_workers {
            return Err(SessionError::Exhausted {
                requested,
                available: self.max_workers,
            });
        }
        session.bind(SessionBinding {
            workers: requested,
            executor: Arc::new(LocalExecutor),
        })?;
        tracing::debug!(session = %session.id(), workers = requested, "Local session bound");
        Ok(())
    }

    fn release(&self, session: &Session) {
        if session.unbind() {
            tracing::debug!(session = %session.id(), "Local session released");
        }
    }
}

/// Scores records inline on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalExecutor;

impl WorkerExecutor for LocalExecutor {
    fn execute(
        &self,
        _worker: u32,
        records: &[Record],
        score: &RecordScorer,
    ) -> Result<Vec<ScoredRecord>, WorkerFault> {
        Ok(records.iter().map(score).collect())
    }
}

/// Releases its session exactly once: on [`finish`](Self::finish) or on drop.
pub struct SessionGuard {
    cluster: Arc<dyn ClusterSession>,
    session: Arc<Session>,
    released: bool,
}

impl SessionGuard {
    #[must_use]
    pub fn new(cluster: Arc<dyn ClusterSession>, session: Arc<Session>) -> Self {
        Self {
            cluster,
            session,
            released: false,
        }
    }

    #[must_use]
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Release now.
    pub fn finish(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if !self.released {
            self.released = true;
            self.cluster.release(&self.session);
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.release_once();
    }
}
