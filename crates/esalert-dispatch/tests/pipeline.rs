//! Query → transform → dispatch → delivery, with fake search and recording outputs.

use async_trait::async_trait;
use esalert_core::{AlertError, AlertMethod, DispatchConfig, Field, OutputConfig, Record, Result};
use esalert_dispatch::{DeliveryId, DispatchEngine, build_method};
use esalert_scheduler::{HITS_DELIMITER, QueryHandler, QueryHandlerConfig, SearchBackend};
use serde_json::{Map, Value, json};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

struct CannedSearch(Value);

#[async_trait]
impl SearchBackend for CannedSearch {
    async fn search(&self, _index: &str, _body: &Map<String, Value>) -> Result<Value> {
        Ok(self.0.clone())
    }
}

/// Records every delivery; fails the first `failures` attempts.
#[derive(Default)]
struct Recorder {
    failures: u32,
    attempts: AtomicU32,
    delivered: Mutex<Vec<(String, Vec<Record>)>>,
}

impl Recorder {
    fn failing_first(failures: u32) -> Arc<Self> {
        Arc::new(Self {
            failures,
            ..Self::default()
        })
    }

    fn delivered(&self) -> Vec<(String, Vec<Record>)> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl AlertMethod for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    async fn write(&self, rule_name: &str, records: &[Record]) -> Result<()> {
        let n = self.attempts.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            return Err(AlertError::delivery("recorder", "temporarily down"));
        }
        self.delivered
            .lock()
            .unwrap()
            .push((rule_name.to_string(), records.to_vec()));
        Ok(())
    }
}

fn handler(
    response: Value,
    schedule: &str,
    methods: Vec<Arc<dyn AlertMethod>>,
    filters: &[&str],
    body_field: Option<&str>,
    conditions: Value,
) -> QueryHandler {
    QueryHandler::new(QueryHandlerConfig {
        name: "pipeline".into(),
        methods,
        backend: Arc::new(CannedSearch(response)),
        index: "logs-*".into(),
        body: json!({"size": 10}).as_object().unwrap().clone(),
        schedule: schedule.into(),
        body_field: body_field.map(str::to_string),
        filters: filters.iter().map(|f| f.to_string()).collect(),
        conditions: serde_json::from_value(conditions).unwrap(),
    })
    .unwrap()
}

fn fast_dispatch() -> DispatchConfig {
    DispatchConfig {
        backoff_unit_ms: 5,
        ..DispatchConfig::default()
    }
}

async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..300 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn bucket_response_is_delivered_as_field_record() {
    let recorder = Recorder::failing_first(0);
    let q = handler(
        json!({"agg": {"buckets": [{"key": "x", "doc_count": 5}]}}),
        "@every 1m",
        vec![recorder.clone()],
        &["agg.buckets"],
        None,
        json!([]),
    );

    let (tx, rx) = mpsc::channel(16);
    let handle = DispatchEngine::new(&fast_dispatch()).spawn(rx, CancellationToken::new());
    tx.send(q.run_once().await.unwrap().unwrap()).await.unwrap();

    eventually(|| !recorder.delivered().is_empty()).await;
    let (rule, records) = recorder.delivered().remove(0);
    assert_eq!(rule, "pipeline");
    assert_eq!(
        records,
        vec![Record::Fields {
            filter: "agg.buckets".into(),
            fields: vec![Field { key: "x".into(), count: 5 }],
        }]
    );

    handle.stop();
    handle.wait().await;
}

#[tokio::test]
async fn two_hits_become_one_body_record() {
    let recorder = Recorder::failing_first(0);
    let q = handler(
        json!({"hits": {"hits": [
            {"_source": {"msg": "first"}},
            {"_source": {"msg": "second"}}
        ]}}),
        "@every 1m",
        vec![recorder.clone()],
        &[],
        Some("hits.hits._source"),
        json!([]),
    );

    let alert = q.run_once().await.unwrap().unwrap();
    assert_eq!(alert.records.len(), 1);
    let Record::Body { text, .. } = &alert.records[0] else {
        panic!("expected body record");
    };
    let parts: Vec<&str> = text.split(HITS_DELIMITER).collect();
    assert_eq!(parts, vec!["{\n    \"msg\": \"first\"\n}", "{\n    \"msg\": \"second\"\n}"]);
}

#[tokio::test]
async fn unmet_conditions_raise_nothing() {
    let recorder = Recorder::failing_first(0);
    let q = handler(
        json!({"hits": {"total": {"value": 0}}, "agg": {"buckets": [{"key": "x", "doc_count": 5}]}}),
        "@every 1m",
        vec![recorder.clone()],
        &["agg.buckets"],
        None,
        json!([{"field": "hits.total.value", "gt": 0}]),
    );
    assert!(q.run_once().await.unwrap().is_none());
}

#[tokio::test]
async fn scheduled_runner_retries_through_transient_failure() {
    let flaky = Recorder::failing_first(1);
    let steady = Recorder::failing_first(0);
    let q = handler(
        json!({"agg": {"buckets": [{"key": "x", "doc_count": 5}]}}),
        "@every 1s",
        vec![flaky.clone(), steady.clone()],
        &["agg.buckets"],
        None,
        json!([{"field": "agg.buckets.doc_count", "ge": 5, "quantifier": "all"}]),
    );

    let root = CancellationToken::new();
    let (tx, rx) = mpsc::channel(16);
    let engine = DispatchEngine::new(&fast_dispatch());
    let inventory = engine.inventory();
    let handle = engine.spawn(rx, root.clone());
    let runner = tokio::spawn(q.run(tx, root.child_token()));

    eventually(|| !flaky.delivered().is_empty() && !steady.delivered().is_empty()).await;
    // the flaky method spent two attempts, the steady one a single attempt
    assert!(flaky.attempts.load(Ordering::SeqCst) >= 2);
    assert!(inventory.len() >= 2);

    root.cancel();
    tokio::time::timeout(Duration::from_secs(2), handle.wait()).await.unwrap();
    tokio::time::timeout(Duration::from_secs(2), runner).await.unwrap().unwrap();
}

#[tokio::test]
async fn dead_output_is_abandoned_after_budget() {
    let dead = Recorder::failing_first(u32::MAX);
    let q = handler(
        json!({"agg": {"buckets": [{"key": "x", "doc_count": 5}]}}),
        "@every 1m",
        vec![dead.clone()],
        &["agg.buckets"],
        None,
        json!([]),
    );

    let (tx, rx) = mpsc::channel(16);
    let handle = DispatchEngine::new(&fast_dispatch()).spawn(rx, CancellationToken::new());
    let alert = q.run_once().await.unwrap().unwrap();
    let id = DeliveryId::new(0, alert.id.clone());
    tx.send(alert).await.unwrap();

    eventually(|| dead.attempts.load(Ordering::SeqCst) == 3).await;
    eventually(|| !handle.inventory().contains(&id)).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(dead.attempts.load(Ordering::SeqCst), 3);

    handle.stop();
    handle.wait().await;
}

#[tokio::test]
async fn file_output_receives_alert() {
    let path = std::env::temp_dir().join(format!("esalert-pipeline-{}.log", std::process::id()));
    let _ = std::fs::remove_file(&path);
    let output = OutputConfig {
        output_type: "file".into(),
        config: json!({"file": path.to_string_lossy()}).as_object().unwrap().clone(),
    };
    let method = build_method(&output).unwrap();
    let q = handler(
        json!({"agg": {"buckets": [{"key": "x", "doc_count": 5}]}}),
        "@every 1m",
        vec![method],
        &["agg.buckets"],
        None,
        json!([]),
    );

    let (tx, rx) = mpsc::channel(16);
    let handle = DispatchEngine::new(&fast_dispatch()).spawn(rx, CancellationToken::new());
    tx.send(q.run_once().await.unwrap().unwrap()).await.unwrap();

    eventually(|| std::fs::read_to_string(&path).map(|c| !c.is_empty()).unwrap_or(false)).await;
    let line: Value = serde_json::from_str(std::fs::read_to_string(&path).unwrap().trim()).unwrap();
    assert_eq!(line["rule_name"], "pipeline");
    assert_eq!(line["records"][0]["fields"][0]["key"], "x");

    handle.stop();
    handle.wait().await;
    std::fs::remove_file(&path).ok();
}
