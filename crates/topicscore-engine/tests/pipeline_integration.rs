//! End-to-end pipeline runs against corpora in temporary directories.
//!
//! Cluster and source collaborators are wrapped in spies so every test can
//! assert how often sessions were acquired and released.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use topicscore_engine::config::types::WorkerCount;
use topicscore_engine::session::{RecordScorer, SessionBinding, WorkerExecutor, WorkerFault};
use topicscore_engine::source::RecordSource;
use topicscore_engine::{
    CancelSignal, ClusterSession, EngineConfig, FsSourceReader, LexiconScorer, Pipeline,
    PipelineError, ScoreError, ScoringFunction, Session, SessionError, SourceError, SourceReader,
};
use topicscore_types::{Record, ScoredRecord, Topic};

#[derive(Default)]
struct SpyCluster {
    acquires: AtomicUsize,
    releases: AtomicUsize,
    exhausted: bool,
    executor: Option<Arc<dyn WorkerExecutor>>,
}

impl SpyCluster {
    fn exhausted() -> Self {
        Self {
            exhausted: true,
            ..Self::default()
        }
    }

    fn with_executor(executor: Arc<dyn WorkerExecutor>) -> Self {
        Self {
            executor: Some(executor),
            ..Self::default()
        }
    }

    fn counts(&self) -> (usize, usize) {
        (
            self.acquires.load(Ordering::SeqCst),
            self.releases.load(Ordering::SeqCst),
        )
    }
}

impl ClusterSession for SpyCluster {
    fn acquire(&self, session: &Session) -> Result<(), SessionError> {
        self.acquires.fetch_add(1, Ordering::SeqCst);
        if self.exhausted {
            return Err(SessionError::Exhausted {
                requested: session.requested_workers(),
                available: 0,
            });
        }
        match &self.executor {
            Some(executor) => session.bind(SessionBinding {
                workers: session.requested_workers(),
                executor: Arc::clone(executor),
            }),
            None => topicscore_engine::LocalCluster::new(64).acquire(session),
        }
    }

    fn release(&self, session: &Session) {
        self.releases.fetch_add(1, Ordering::SeqCst);
        session.unbind();
    }
}

struct SpySource {
    inner: FsSourceReader,
    opens: AtomicUsize,
}

impl SourceReader for SpySource {
    fn open(&self, topic: &Topic) -> Result<RecordSource, SourceError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.inner.open(topic)
    }
}

/// Loses the worker on every slice.
struct DeadExecutor;

impl WorkerExecutor for DeadExecutor {
    fn execute(
        &self,
        _worker: u32,
        _records: &[Record],
        _score: &RecordScorer,
    ) -> Result<Vec<ScoredRecord>, WorkerFault> {
        Err(WorkerFault::new("executor unreachable"))
    }
}

struct Harness {
    dir: tempfile::TempDir,
    cluster: Arc<SpyCluster>,
    source: Arc<SpySource>,
    pipeline: Pipeline,
}

fn config(base: &Path) -> EngineConfig {
    EngineConfig::new(base.display().to_string())
        .with_workers(WorkerCount::Manual(3))
        .with_partition_lines(2)
}

fn harness(
    files: &[(&str, &str)],
    cluster: SpyCluster,
    scorer: Arc<dyn ScoringFunction>,
) -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    for (name, body) in files {
        std::fs::write(dir.path().join(name), body).expect("write corpus");
    }
    let config = config(dir.path());
    let cluster = Arc::new(cluster);
    let source = Arc::new(SpySource {
        inner: FsSourceReader::new(&config.storage).expect("reader"),
        opens: AtomicUsize::new(0),
    });
    let pipeline = Pipeline::with_components(config, cluster.clone(), source.clone(), scorer);
    Harness {
        dir,
        cluster,
        source,
        pipeline,
    }
}

fn table_scorer() -> Arc<dyn ScoringFunction> {
    Arc::new(|text: &str| match text {
        "great product" => Ok(0.8),
        "terrible service" => Ok(-0.6),
        "explode" => Err(ScoreError::Failed("internal error".into())),
        _ => Ok(0.0),
    })
}

#[tokio::test]
async fn empty_topic_is_rejected_without_session() {
    let h = harness(&[], SpyCluster::default(), table_scorer());
    let err = h.pipeline.run("", &CancelSignal::new()).await.unwrap_err();

    assert!(matches!(err, PipelineError::Validation(_)));
    assert_eq!(err.status_code(), 400);
    assert_eq!(h.cluster.counts(), (0, 0));
    assert_eq!(h.source.opens.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn traversal_topic_is_rejected_without_session() {
    let h = harness(&[], SpyCluster::default(), table_scorer());
    for topic in ["../etc/passwd", "a/b", ".hidden", "   "] {
        let err = h.pipeline.run(topic, &CancelSignal::new()).await.unwrap_err();
        assert!(err.is_caller_error(), "{topic:?} should be a caller error");
    }
    assert_eq!(h.cluster.counts(), (0, 0));
}

#[tokio::test]
async fn scores_every_line_of_the_topic() {
    let h = harness(
        &[("widgets.txt", "great product\nterrible service\n")],
        SpyCluster::default(),
        table_scorer(),
    );
    let results = h.pipeline.run("widgets", &CancelSignal::new()).await.unwrap();

    let pairs: Vec<(&str, f64)> = results.pairs().collect();
    assert_eq!(
        pairs,
        vec![("great product", 0.8), ("terrible service", -0.6)]
    );
    assert_eq!(results.summary.records_read, 2);
    assert_eq!(results.summary.records_scored, 2);
    assert_eq!(results.summary.topic.as_str(), "widgets");
    assert_eq!(h.cluster.counts(), (1, 1));
}

#[tokio::test]
async fn topic_with_spaces_and_unicode_is_scored() {
    let h = harness(
        &[
            ("new york.txt", "great product\nterrible service\nok\n"),
            ("café.txt", "great product\n"),
        ],
        SpyCluster::default(),
        table_scorer(),
    );
    let results = h.pipeline.run("new york", &CancelSignal::new()).await.unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results.summary.topic.as_str(), "new york");
    let counts = results.breakdown();
    assert_eq!((counts.positive, counts.negative, counts.neutral), (1, 1, 1));

    let results = h.pipeline.run("café", &CancelSignal::new()).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(h.cluster.counts(), (2, 2));
}

#[tokio::test]
async fn auto_workers_fit_local_cluster_capacity() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("widgets.txt"), "great product\nok\n").expect("write corpus");
    let mut config = EngineConfig::new(dir.path().display().to_string());
    config.compute.workers = WorkerCount::Auto;
    config.compute.max_workers = 1;
    let pipeline = Pipeline::new(config, table_scorer()).expect("valid config");

    let results = pipeline.run("widgets", &CancelSignal::new()).await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results.summary.workers, 1);
}

#[tokio::test]
async fn missing_corpus_is_not_found_and_session_released() {
    let h = harness(&[], SpyCluster::default(), table_scorer());
    let err = h.pipeline.run("missing", &CancelSignal::new()).await.unwrap_err();

    assert!(matches!(err, PipelineError::NotFound { .. }));
    assert_eq!(err.status_code(), 500);
    assert!(err.to_string().contains("missing.txt"));
    assert_eq!(h.cluster.counts(), (1, 1));
}

#[tokio::test]
async fn failing_record_scores_neutral() {
    let h = harness(
        &[("mixed.txt", "great product\nexplode\nterrible service\n")],
        SpyCluster::default(),
        table_scorer(),
    );
    let results = h.pipeline.run("mixed", &CancelSignal::new()).await.unwrap();

    assert_eq!(results.len(), 3);
    let exploded = results.iter().find(|r| r.text == "explode").unwrap();
    assert!(exploded.score.abs() < f64::EPSILON);
    assert_eq!(h.cluster.counts(), (1, 1));
}

#[tokio::test]
async fn exhausted_cluster_is_resource_error_and_source_untouched() {
    let h = harness(
        &[("widgets.txt", "great product\n")],
        SpyCluster::exhausted(),
        table_scorer(),
    );
    let err = h.pipeline.run("widgets", &CancelSignal::new()).await.unwrap_err();

    assert!(matches!(err, PipelineError::Resource(_)));
    assert_eq!(err.status_code(), 500);
    assert_eq!(h.source.opens.load(Ordering::SeqCst), 0);
    assert_eq!(h.cluster.counts(), (1, 1));
}

#[tokio::test]
async fn unreadable_corpus_is_io_error_and_session_released() {
    let h = harness(&[], SpyCluster::default(), table_scorer());
    std::fs::write(
        h.dir.path().join("corrupt.txt"),
        b"fine line\n\xff\xfe broken\nmore\n",
    )
    .unwrap();
    let err = h.pipeline.run("corrupt", &CancelSignal::new()).await.unwrap_err();

    assert!(matches!(err, PipelineError::Io { .. }), "got {err:?}");
    assert_eq!(h.cluster.counts(), (1, 1));
}

#[tokio::test]
async fn lost_workers_are_fatal_compute_error() {
    let h = harness(
        &[("widgets.txt", "great product\nterrible service\nmeh\n")],
        SpyCluster::with_executor(Arc::new(DeadExecutor)),
        table_scorer(),
    );
    let err = h.pipeline.run("widgets", &CancelSignal::new()).await.unwrap_err();

    assert!(matches!(err, PipelineError::FatalCompute(_)), "got {err:?}");
    assert_eq!(err.status_code(), 500);
    assert_eq!(h.cluster.counts(), (1, 1));
}

#[tokio::test]
async fn cancelled_run_releases_session() {
    let cancel = CancelSignal::new();
    let trigger = cancel.clone();
    let scorer: Arc<dyn ScoringFunction> = Arc::new(move |text: &str| -> Result<f64, ScoreError> {
        if text == "stop" {
            trigger.cancel();
        }
        Ok(0.1)
    });
    let h = harness(
        &[("long.txt", "a\nb\nstop\nc\nd\ne\nf\ng\n")],
        SpyCluster::default(),
        scorer,
    );
    let err = h.pipeline.run("long", &cancel).await.unwrap_err();

    assert!(matches!(err, PipelineError::Cancelled));
    assert_eq!(err.status_code(), 499);
    assert_eq!(h.cluster.counts(), (1, 1));
}

#[tokio::test]
async fn pre_cancelled_run_never_reads() {
    let cancel = CancelSignal::new();
    cancel.cancel();
    let h = harness(
        &[("widgets.txt", "great product\n")],
        SpyCluster::default(),
        table_scorer(),
    );
    let err = h.pipeline.run("widgets", &cancel).await.unwrap_err();

    assert!(matches!(err, PipelineError::Cancelled));
    assert_eq!(h.source.opens.load(Ordering::SeqCst), 0);
    assert_eq!(h.cluster.counts(), (0, 1));
}

#[tokio::test]
async fn empty_corpus_yields_empty_result() {
    let h = harness(&[("quiet.txt", "")], SpyCluster::default(), table_scorer());
    let results = h.pipeline.run("quiet", &CancelSignal::new()).await.unwrap();
    assert!(results.is_empty());
    assert!(results.mean_score().is_none());
    assert_eq!(h.cluster.counts(), (1, 1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn large_corpus_keeps_every_record_in_source_order() {
    let body: String = (0..500).map(|i| format!("line number {i}\n")).collect();
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("big.txt"), body).unwrap();
    let config = EngineConfig::new(dir.path().display().to_string())
        .with_workers(WorkerCount::Manual(4))
        .with_partition_lines(7);
    let pipeline = Pipeline::new(config, Arc::new(LexiconScorer::default())).unwrap();

    let results = pipeline.run("big", &CancelSignal::new()).await.unwrap();
    assert_eq!(results.len(), 500);
    assert_eq!(results.summary.partitions, 72);
    assert_eq!(results.summary.workers, 4);
    for (i, record) in results.iter().enumerate() {
        assert_eq!(record.line, i as u64);
        assert_eq!(record.text, format!("line number {i}"));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn rerun_yields_same_texts() {
    let h = harness(
        &[("widgets.txt", "great product\nterrible service\nok\nfine\nbad\n")],
        SpyCluster::default(),
        Arc::new(LexiconScorer::default()),
    );
    let first = h.pipeline.run("widgets", &CancelSignal::new()).await.unwrap();
    let second = h.pipeline.run("widgets", &CancelSignal::new()).await.unwrap();

    let texts = |rs: &topicscore_engine::ResultSet| -> Vec<String> {
        rs.iter().map(|r| r.text.clone()).collect()
    };
    assert_eq!(texts(&first), texts(&second));
    assert_ne!(first.summary.session_id, second.summary.session_id);
    assert_eq!(h.cluster.counts(), (2, 2));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_runs_do_not_interfere() {
    let h = harness(
        &[
            ("alpha.txt", "great product\ngreat product\n"),
            ("beta.txt", "terrible service\n"),
        ],
        SpyCluster::default(),
        table_scorer(),
    );
    let cancel = CancelSignal::new();
    let (a, b, missing) = tokio::join!(
        h.pipeline.run("alpha", &cancel),
        h.pipeline.run("beta", &cancel),
        h.pipeline.run("gamma", &cancel),
    );

    let a = a.unwrap();
    let b = b.unwrap();
    assert_eq!(a.len(), 2);
    assert!(a.iter().all(|r| (r.score - 0.8).abs() < f64::EPSILON));
    assert_eq!(b.len(), 1);
    assert!((b.records[0].score + 0.6).abs() < f64::EPSILON);
    assert!(matches!(missing, Err(PipelineError::NotFound { .. })));
    assert_ne!(a.summary.session_id, b.summary.session_id);
    assert_eq!(h.cluster.counts(), (3, 3));
}
