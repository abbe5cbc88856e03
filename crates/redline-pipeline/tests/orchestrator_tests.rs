//! Orchestrator integration tests
//!
//! Runs stage lists against an in-memory store and cache.

use pretty_assertions::assert_eq;
use redline_cache::{MokaTransformationCache, TransformationCache};
use redline_pipeline::{
    AnalysisContext, BatchJob, FnStage, Orchestrator, PersistenceStatus, PipelineError,
    PipelineSettings, PipelineState, Stage, StageFailure, StageList, StageRegistry,
};
use redline_store::{NegotiationId, Provenance, StageErrorKind, StageStatus, Version, VersionStore};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const CONTRACT: &str = "1. Term\nOne year.\n\n2. Liability\nCapped at 1x fees.\n";

struct Counting {
    name: &'static str,
    calls: Arc<AtomicUsize>,
    output: Value,
}

#[async_trait::async_trait]
impl Stage for Counting {
    fn name(&self) -> &str {
        self.name
    }

    async fn run(&self, _ctx: &AnalysisContext, _config: &Value) -> Result<Value, StageFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.output.clone())
    }
}

struct Sleepy(Duration);

#[async_trait::async_trait]
impl Stage for Sleepy {
    fn name(&self) -> &str {
        "sleepy"
    }

    async fn run(&self, _ctx: &AnalysisContext, _config: &Value) -> Result<Value, StageFailure> {
        tokio::time::sleep(self.0).await;
        Ok(json!("woke up"))
    }
}

struct Gauge {
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl Stage for Gauge {
    fn name(&self) -> &str {
        "gauge"
    }

    async fn run(&self, _ctx: &AnalysisContext, _config: &Value) -> Result<Value, StageFailure> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(json!(null))
    }
}

fn arc(stage: impl Stage + 'static) -> Arc<dyn Stage> {
    Arc::new(stage)
}

fn ok_stage(name: &'static str, output: Value) -> Arc<dyn Stage> {
    arc(FnStage::new(name, move |_: &AnalysisContext, _: &Value| Ok(output.clone())))
}

fn failing_stage(name: &'static str) -> Arc<dyn Stage> {
    arc(FnStage::new(name, |_: &AnalysisContext, _: &Value| {
        Err(StageFailure::failed("collaborator unavailable"))
    }))
}

fn panicking_stage(name: &'static str) -> Arc<dyn Stage> {
    arc(FnStage::new(name, |_: &AnalysisContext, _: &Value| -> Result<Value, StageFailure> {
        panic!("index out of bounds")
    }))
}

async fn store_with_version(negotiation: &str, text: &str) -> (Arc<VersionStore>, Version) {
    let store = Arc::new(VersionStore::in_memory());
    let version = add(&store, negotiation, text).await;
    (store, version)
}

async fn add(store: &VersionStore, negotiation: &str, text: &str) -> Version {
    if store
        .get_negotiation(&NegotiationId::parse(negotiation).unwrap())
        .await
        .is_err()
    {
        store.create_negotiation(negotiation, negotiation).await.unwrap();
    }
    store
        .add_version(
            &NegotiationId::parse(negotiation).unwrap(),
            text,
            Provenance::Counterparty,
            None,
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn failing_stage_does_not_stop_the_run() {
    let (store, version) = store_with_version("acme", CONTRACT).await;
    let orchestrator = Orchestrator::uncached(store.clone(), PipelineSettings::default());
    let stages = StageList::new(vec![
        ok_stage("review", json!([{"severity": "critical"}, {"severity": "high"}])),
        failing_stage("rationale"),
        ok_stage("edits", json!([{"suggested_edit": "cap at 1x"}])),
    ])
    .unwrap();

    let ctx = orchestrator.run(&version, &stages, &json!({})).await;

    assert_eq!(ctx.state(), &PipelineState::Complete);
    assert_eq!(ctx.outputs().keys().collect::<Vec<_>>(), vec!["review", "edits"]);
    assert!(ctx.output("rationale").is_none());
    assert_eq!(ctx.errors().len(), 1);
    assert_eq!(ctx.errors()[0].stage, "rationale");
    assert_eq!(ctx.errors()[0].kind, StageErrorKind::Failed);
    assert_eq!(ctx.errors()[0].message, "collaborator unavailable");
    assert_eq!(ctx.persistence(), &PersistenceStatus::Attached);

    let stored = store.get_version(version.negotiation_id(), version.id()).await.unwrap();
    let analysis = stored.analysis().unwrap();
    assert_eq!(analysis.summary.critical, 1);
    assert_eq!(analysis.summary.high, 1);
    assert_eq!(analysis.summary.suggested_edits, 1);
    assert_eq!(analysis.summary.stages_failed, 1);
    assert!(analysis.summary.has_errors);
}

#[tokio::test]
async fn every_stage_failing_still_completes() {
    let (store, version) = store_with_version("acme", CONTRACT).await;
    let orchestrator = Orchestrator::uncached(store, PipelineSettings::default());
    let stages = StageList::new(vec![failing_stage("a"), failing_stage("b")]).unwrap();

    let ctx = orchestrator.run(&version, &stages, &Value::Null).await;

    assert!(ctx.is_complete());
    assert!(ctx.outputs().is_empty());
    assert_eq!(ctx.errors().len(), 2);
    assert_eq!(ctx.persistence(), &PersistenceStatus::Attached);
}

#[tokio::test]
async fn empty_stage_list_completes_immediately() {
    let (store, version) = store_with_version("acme", CONTRACT).await;
    let orchestrator = Orchestrator::uncached(store, PipelineSettings::default());

    let ctx = orchestrator.run(&version, &StageList::default(), &Value::Null).await;

    assert!(ctx.is_complete());
    assert!(ctx.outcomes().is_empty());
    assert_eq!(ctx.summary().stages_succeeded, 0);
}

#[tokio::test]
async fn later_stages_see_earlier_outputs() {
    let (store, version) = store_with_version("acme", CONTRACT).await;
    let orchestrator = Orchestrator::uncached(store, PipelineSettings::default());
    let consumer = arc(FnStage::new("count", |ctx: &AnalysisContext, _: &Value| {
        let clauses = ctx
            .output("split")
            .and_then(Value::as_array)
            .ok_or_else(|| StageFailure::malformed("split output missing"))?;
        Ok(json!(clauses.len()))
    }));
    let stages = StageList::new(vec![ok_stage("split", json!(["a", "b", "c"])), consumer]).unwrap();

    let ctx = orchestrator.run(&version, &stages, &Value::Null).await;
    assert_eq!(ctx.output("count"), Some(&json!(3)));
}

#[tokio::test]
async fn malformed_output_is_classified() {
    let (store, version) = store_with_version("acme", CONTRACT).await;
    let orchestrator = Orchestrator::uncached(store, PipelineSettings::default());
    let stage = arc(FnStage::new("strict", |_: &AnalysisContext, _: &Value| {
        Err(StageFailure::malformed("expected an array"))
    }));

    let ctx = orchestrator
        .run(&version, &StageList::new(vec![stage]).unwrap(), &Value::Null)
        .await;
    assert_eq!(ctx.errors()[0].kind, StageErrorKind::MalformedOutput);
}

#[tokio::test]
async fn panicking_stage_is_isolated() {
    let (store, version) = store_with_version("acme", CONTRACT).await;
    let orchestrator = Orchestrator::uncached(store, PipelineSettings::default());
    let stages =
        StageList::new(vec![panicking_stage("fragile"), ok_stage("after", json!([1]))]).unwrap();

    let ctx = orchestrator.run(&version, &stages, &Value::Null).await;

    assert_eq!(ctx.errors()[0].kind, StageErrorKind::Panicked);
    assert!(ctx.errors()[0].message.contains("index out of bounds"));
    assert_eq!(ctx.output("after"), Some(&json!([1])));
}

#[tokio::test(start_paused = true)]
async fn slow_stage_times_out() {
    let (store, version) = store_with_version("acme", CONTRACT).await;
    let settings = PipelineSettings::default().with_stage_timeout(Duration::from_secs(1));
    let orchestrator = Orchestrator::uncached(store, settings);
    let stages = StageList::new(vec![
        arc(Sleepy(Duration::from_secs(30))),
        arc(Counting {
            name: "after",
            calls: Arc::new(AtomicUsize::new(0)),
            output: json!("ran"),
        }),
    ])
    .unwrap();

    let ctx = orchestrator.run(&version, &stages, &Value::Null).await;

    assert_eq!(ctx.errors().len(), 1);
    assert_eq!(ctx.errors()[0].stage, "sleepy");
    assert_eq!(ctx.errors()[0].kind, StageErrorKind::Timeout);
    assert_eq!(ctx.output("after"), Some(&json!("ran")));
}

#[tokio::test]
async fn blocking_closure_is_bounded_by_timeout() {
    let (store, version) = store_with_version("acme", CONTRACT).await;
    let settings = PipelineSettings::default().with_stage_timeout(Duration::from_millis(50));
    let orchestrator = Orchestrator::uncached(store, settings);
    let blocking = arc(FnStage::new("blocking", |_: &AnalysisContext, _: &Value| {
        std::thread::sleep(Duration::from_millis(500));
        Ok(json!("late"))
    }));
    let stages = StageList::new(vec![blocking, ok_stage("after", json!("ran"))]).unwrap();

    let started = std::time::Instant::now();
    let ctx = orchestrator.run(&version, &stages, &Value::Null).await;

    assert!(started.elapsed() < Duration::from_millis(400));
    assert_eq!(ctx.outcome("blocking").unwrap().status, StageStatus::Failed);
    assert_eq!(ctx.errors()[0].kind, StageErrorKind::Timeout);
    assert_eq!(ctx.output("blocking"), None);
    assert_eq!(ctx.output("after"), Some(&json!("ran")));
}

/// Fails on its first call, succeeds afterwards
struct FailsOnce {
    failed: AtomicBool,
}

#[async_trait::async_trait]
impl Stage for FailsOnce {
    fn name(&self) -> &str {
        "split"
    }

    async fn run(&self, _ctx: &AnalysisContext, _config: &Value) -> Result<Value, StageFailure> {
        if self.failed.swap(true, Ordering::SeqCst) {
            Ok(json!(["1. Term", "2. Liability"]))
        } else {
            Err(StageFailure::failed("splitter unavailable"))
        }
    }
}

#[tokio::test]
async fn outputs_after_a_failure_are_not_cached() {
    let store = Arc::new(VersionStore::in_memory());
    let acme = add(&store, "acme", CONTRACT).await;
    let globex = add(&store, "globex", CONTRACT).await;
    let initech = add(&store, "initech", CONTRACT).await;

    let calls = Arc::new(AtomicUsize::new(0));
    let stages = StageList::new(vec![
        arc(FailsOnce {
            failed: AtomicBool::new(false),
        }),
        arc(Counting {
            name: "flags",
            calls: calls.clone(),
            output: json!([]),
        }),
    ])
    .unwrap();
    let cache = Arc::new(MokaTransformationCache::default());
    let orchestrator = Orchestrator::new(store, cache.clone(), PipelineSettings::default());

    let degraded = orchestrator.run(&acme, &stages, &Value::Null).await;
    assert_eq!(degraded.outcome("split").unwrap().status, StageStatus::Failed);
    assert_eq!(degraded.outcome("flags").unwrap().status, StageStatus::Succeeded);
    assert_eq!(cache.stats().inserts, 0);

    let healthy = orchestrator.run(&globex, &stages, &Value::Null).await;
    assert_eq!(healthy.outcome("split").unwrap().status, StageStatus::Succeeded);
    assert_eq!(healthy.outcome("flags").unwrap().status, StageStatus::Succeeded);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let cached = orchestrator.run(&initech, &stages, &Value::Null).await;
    assert!(cached
        .outcomes()
        .iter()
        .all(|o| o.status == StageStatus::Cached));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn identical_text_is_served_from_cache() {
    let store = Arc::new(VersionStore::in_memory());
    let acme = add(&store, "acme", CONTRACT).await;
    let globex = add(&store, "globex", CONTRACT).await;

    let calls = Arc::new(AtomicUsize::new(0));
    let stages = StageList::new(vec![arc(Counting {
        name: "review",
        calls: calls.clone(),
        output: json!([{"severity": "high"}]),
    })])
    .unwrap();
    let cache = Arc::new(MokaTransformationCache::default());
    let orchestrator = Orchestrator::new(store, cache.clone(), PipelineSettings::default());

    let first = orchestrator.run(&acme, &stages, &json!({"model": "m"})).await;
    let second = orchestrator.run(&globex, &stages, &json!({"model": "m"})).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(first.outcome("review").unwrap().status, StageStatus::Succeeded);
    assert_eq!(second.outcome("review").unwrap().status, StageStatus::Cached);
    assert_eq!(first.output("review"), second.output("review"));
    assert_eq!(cache.stats().hits, 1);
}

#[tokio::test]
async fn changed_config_misses_the_cache() {
    let store = Arc::new(VersionStore::in_memory());
    let acme = add(&store, "acme", CONTRACT).await;
    let globex = add(&store, "globex", CONTRACT).await;

    let calls = Arc::new(AtomicUsize::new(0));
    let stages = StageList::new(vec![arc(Counting {
        name: "review",
        calls: calls.clone(),
        output: json!([]),
    })])
    .unwrap();
    let orchestrator = Orchestrator::new(
        store,
        Arc::new(MokaTransformationCache::default()),
        PipelineSettings::default(),
    );

    orchestrator.run(&acme, &stages, &json!({"model": "a"})).await;
    orchestrator.run(&globex, &stages, &json!({"model": "b"})).await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn failed_stages_are_not_cached() {
    let store = Arc::new(VersionStore::in_memory());
    let acme = add(&store, "acme", CONTRACT).await;
    let globex = add(&store, "globex", CONTRACT).await;

    let cache = Arc::new(MokaTransformationCache::default());
    let orchestrator = Orchestrator::new(store, cache.clone(), PipelineSettings::default());
    let stages = StageList::new(vec![failing_stage("review")]).unwrap();

    orchestrator.run(&acme, &stages, &Value::Null).await;
    let second = orchestrator.run(&globex, &stages, &Value::Null).await;

    assert_eq!(second.outcome("review").unwrap().status, StageStatus::Failed);
    assert_eq!(cache.stats().inserts, 0);
}

#[tokio::test]
async fn second_run_reports_already_analyzed() {
    let (store, version) = store_with_version("acme", CONTRACT).await;
    let orchestrator = Orchestrator::uncached(store.clone(), PipelineSettings::default());
    let stages = StageList::new(vec![ok_stage("review", json!([{"severity": "low"}]))]).unwrap();

    let first = orchestrator.run(&version, &stages, &Value::Null).await;
    let second = orchestrator.run(&version, &stages, &Value::Null).await;

    assert_eq!(first.persistence(), &PersistenceStatus::Attached);
    assert_eq!(second.persistence(), &PersistenceStatus::AlreadyAnalyzed);
    assert!(second.is_complete());
}

#[tokio::test]
async fn analyze_unknown_version_is_a_store_error() {
    let (store, _) = store_with_version("acme", CONTRACT).await;
    let orchestrator = Orchestrator::uncached(store, PipelineSettings::default());

    let err = orchestrator
        .analyze(&NegotiationId::parse("acme").unwrap(), 9, &StageList::default(), &Value::Null)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Store(e) if e.is_not_found()));
}

#[tokio::test]
async fn progress_events_follow_stage_order() {
    let (store, version) = store_with_version("acme", CONTRACT).await;
    let orchestrator = Orchestrator::uncached(store, PipelineSettings::default());
    let stages = StageList::new(vec![
        ok_stage("one", json!(1)),
        failing_stage("two"),
        ok_stage("three", json!(3)),
    ])
    .unwrap();
    let (tx, mut rx) = mpsc::channel(8);

    let ctx = orchestrator
        .run_with_progress(&version, &stages, &Value::Null, tx)
        .await;
    assert!(ctx.is_complete());

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    let seen: Vec<(usize, &str, StageStatus)> = events
        .iter()
        .map(|e| (e.index, e.stage.as_str(), e.status))
        .collect();
    assert_eq!(
        seen,
        vec![
            (0, "one", StageStatus::Succeeded),
            (1, "two", StageStatus::Failed),
            (2, "three", StageStatus::Succeeded),
        ]
    );
    assert!(events.iter().all(|e| e.total == 3));
    assert_eq!(events[1].error.as_deref(), Some("collaborator unavailable"));
}

#[tokio::test]
async fn dropped_progress_receiver_is_harmless() {
    let (store, version) = store_with_version("acme", CONTRACT).await;
    let orchestrator = Orchestrator::uncached(store, PipelineSettings::default());
    let stages = StageList::new(vec![ok_stage("one", json!(1))]).unwrap();
    let (tx, rx) = mpsc::channel(1);
    drop(rx);

    let ctx = orchestrator
        .run_with_progress(&version, &stages, &Value::Null, tx)
        .await;
    assert_eq!(ctx.output("one"), Some(&json!(1)));
}

#[tokio::test]
async fn batch_respects_concurrency_and_order() {
    let store = Arc::new(VersionStore::in_memory());
    let mut versions = Vec::new();
    for i in 0..6 {
        versions.push(add(&store, &format!("deal-{i}"), &format!("contract {i}")).await);
    }

    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let mut registry = StageRegistry::new();
    registry.register(Gauge {
        in_flight: in_flight.clone(),
        peak: peak.clone(),
    });
    let stages = StageList::from_names(&registry, &["gauge"]).unwrap();

    let jobs: Vec<BatchJob> = versions
        .iter()
        .map(|version| BatchJob {
            version: version.clone(),
            stages: stages.clone(),
            config: Value::Null,
        })
        .collect();
    let orchestrator = Orchestrator::uncached(store, PipelineSettings::default());

    let contexts = orchestrator.run_batch(&jobs, 2).await;

    assert_eq!(contexts.len(), 6);
    for (ctx, version) in contexts.iter().zip(&versions) {
        assert_eq!(ctx.version_id(), version.id());
        assert!(ctx.is_complete());
    }
    assert!(peak.load(Ordering::SeqCst) <= 2);
    assert!(peak.load(Ordering::SeqCst) >= 1);
}
