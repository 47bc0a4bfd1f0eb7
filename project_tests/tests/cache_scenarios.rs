use std::sync::Arc;

use lib_sync::cache::{AnalysisGate, AnalysisSource, DerivedResultCache, FileStorage, OwnerSignature};
use lib_sync::core::fingerprint;
use project_tests::FakeAnalysisApi;
use serde_json::json;

fn program(id: &str, compliance: u32) -> serde_json::Value {
    json!({
        "id": id,
        "name": format!("Program {}", id),
        "standards": {"compliance": compliance, "reviewed": true},
    })
}

#[tokio::test]
async fn changed_inputs_are_never_served_from_a_stale_entry() {
    let dir = tempfile::tempdir().unwrap();
    let api = Arc::new(FakeAnalysisApi::new());

    // Session one: compute at 80% and leave.
    {
        let cache = Arc::new(DerivedResultCache::open(FileStorage::new(dir.path(), "analysis.v1")));
        let gate = AnalysisGate::new(cache, api.clone());
        api.set_text("P", "P is 80% compliant");
        let view = gate.load("P", &fingerprint(&program("P", 80)).unwrap()).await.unwrap();
        assert_eq!(view.source, AnalysisSource::Computed);
    }

    // Session two: the program moved to 95%.
    let cache = Arc::new(DerivedResultCache::open(FileStorage::new(dir.path(), "analysis.v1")));
    let current = fingerprint(&program("P", 95)).unwrap();
    let report = cache.reconcile(&[OwnerSignature::new("P", current.clone())]);
    assert_eq!(report.stale, vec!["P".to_string()]);

    let gate = AnalysisGate::new(cache, api.clone());
    api.set_text("P", "P is 95% compliant");
    let view = gate.load("P", &current).await.unwrap();
    assert_eq!(view.source, AnalysisSource::Computed);
    assert_eq!(view.entry.result.analysis, "P is 95% compliant");
    assert_eq!(api.calls_for("P"), 2);
}

#[tokio::test]
async fn unchanged_inputs_hit_across_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let api = Arc::new(FakeAnalysisApi::new());
    let sig = fingerprint(&program("Q", 70)).unwrap();

    for _ in 0..3 {
        let cache = Arc::new(DerivedResultCache::open(FileStorage::new(dir.path(), "analysis.v1")));
        cache.reconcile(&[OwnerSignature::new("Q", sig.clone())]);
        AnalysisGate::new(cache, api.clone()).load("Q", &sig).await.unwrap();
    }
    assert_eq!(api.calls_for("Q"), 1);
}

#[tokio::test]
async fn key_order_of_the_inputs_does_not_matter() {
    let api = Arc::new(FakeAnalysisApi::new());
    let cache = Arc::new(DerivedResultCache::open(lib_sync::cache::MemoryStorage::new()));
    let gate = AnalysisGate::new(cache, api.clone());

    let a = json!({"compliance": 80, "id": "R"});
    let b = json!({"id": "R", "compliance": 80});
    gate.load("R", &fingerprint(&a).unwrap()).await.unwrap();
    let view = gate.load("R", &fingerprint(&b).unwrap()).await.unwrap();
    assert_eq!(view.source, AnalysisSource::Cache);
    assert_eq!(api.call_count(), 1);
}

#[tokio::test]
async fn failed_analysis_keeps_the_previous_result() {
    let api = Arc::new(FakeAnalysisApi::new());
    let cache = Arc::new(DerivedResultCache::open(lib_sync::cache::MemoryStorage::new()));
    let gate = AnalysisGate::new(cache.clone(), api.clone());
    let sig = fingerprint(&program("S", 60)).unwrap();

    api.set_text("S", "first");
    gate.load("S", &sig).await.unwrap();

    api.set_fail(true);
    let err = gate.recompute("S", &sig).await.unwrap_err();
    assert!(err.to_string().contains("502"));
    assert_eq!(cache.get("S").unwrap().result.analysis, "first");
}

#[tokio::test]
async fn owners_removed_from_the_backing_list_are_evicted() {
    let api = Arc::new(FakeAnalysisApi::new());
    let cache = Arc::new(DerivedResultCache::open(lib_sync::cache::MemoryStorage::new()));
    let gate = AnalysisGate::new(cache.clone(), api.clone());
    let a = fingerprint(&program("A", 1)).unwrap();
    let b = fingerprint(&program("B", 2)).unwrap();
    gate.load("A", &a).await.unwrap();
    gate.load("B", &b).await.unwrap();

    let report = cache.reconcile(&[OwnerSignature::new("B", b)]);
    assert_eq!(report.orphaned, vec!["A".to_string()]);
    assert_eq!(cache.owners(), vec!["B".to_string()]);
}
