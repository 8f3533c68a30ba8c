//! Persistence of the analytics store and the published parameters.

mod common;

use std::sync::Arc;

use common::{config_in, quality_metric, storage_config, temp_dir};
use overseer::domain::models::{PerformanceMetric, QualityParameters, TaskComplexity, UsageMetric};
use overseer::services::analytics_store::{PERFORMANCE_FILE, QUALITY_FILE, USAGE_FILE};
use overseer::services::{AnalyticsStore, MaintenanceDaemon, MaintenanceDaemonConfig};
use overseer::QualitySystem;

#[tokio::test]
async fn test_reload_reproduces_ordered_metrics() {
    let dir = temp_dir();
    let config = storage_config(dir.path());

    let store = AnalyticsStore::open(&config).await.unwrap();
    for (i, score) in [0.5, 0.75, 0.25, 0.875].into_iter().enumerate() {
        store.record_quality(quality_metric("alpha", score, score >= 0.75, 10 - i as i64)).await;
    }
    store.record_quality(quality_metric("beta", 0.625, false, 1)).await;
    store.record_performance(PerformanceMetric::success("assess", 12)).await;
    store
        .record_performance(PerformanceMetric::failure("subagent_invoke", 30, "timeout"))
        .await;
    let before = store.export().await;
    drop(store);

    assert!(dir.path().join(QUALITY_FILE).exists());
    assert!(dir.path().join(PERFORMANCE_FILE).exists());
    assert!(!dir.path().join(USAGE_FILE).exists());

    let reopened = AnalyticsStore::open(&config).await.unwrap();
    let after = reopened.export().await;

    assert_eq!(after.quality, before.quality);
    assert_eq!(after.performance, before.performance);
    assert_eq!(after.usage, before.usage);
    let scores: Vec<f64> = after.quality["alpha"].iter().map(|m| m.quality_score).collect();
    assert_eq!(scores, vec![0.5, 0.75, 0.25, 0.875]);
}

#[tokio::test]
async fn test_ring_capacity_evicts_oldest() {
    let dir = temp_dir();
    let mut config = storage_config(dir.path());
    config.max_records_per_key = 3;

    let store = AnalyticsStore::open(&config).await.unwrap();
    for score in [0.125, 0.25, 0.375, 0.5, 0.625] {
        store.record_quality(quality_metric("alpha", score, true, 0)).await;
    }
    drop(store);

    let reopened = AnalyticsStore::open(&config).await.unwrap();
    let scores: Vec<f64> = reopened
        .quality_history("alpha", None)
        .await
        .iter()
        .map(|m| m.quality_score)
        .collect();
    assert_eq!(scores, vec![0.375, 0.5, 0.625]);
}

#[tokio::test]
async fn test_corrupt_collection_is_set_aside() {
    let dir = temp_dir();
    let config = storage_config(dir.path());
    std::fs::write(dir.path().join(QUALITY_FILE), b"{ not json").unwrap();

    let store = AnalyticsStore::open(&config).await.unwrap();

    assert_eq!(store.record_counts().await.quality, 0);
    let set_aside = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(Result::ok)
        .any(|e| e.file_name().to_string_lossy().contains("corrupt"));
    assert!(set_aside);

    // The store keeps working after recovery.
    store.record_quality(quality_metric("alpha", 0.5, false, 0)).await;
    assert_eq!(store.record_counts().await.quality, 1);
}

#[tokio::test]
async fn test_usage_metrics_persist() {
    let dir = temp_dir();
    let config = storage_config(dir.path());

    let store = AnalyticsStore::open(&config).await.unwrap();
    store
        .record_usage(UsageMetric {
            timestamp: chrono::Utc::now(),
            subagent_id: "alpha".to_string(),
            session_id: "session-1".to_string(),
            operation: "run_task".to_string(),
            success: true,
            task_complexity: Some(TaskComplexity::Moderate),
        })
        .await;
    drop(store);

    let reopened = AnalyticsStore::open(&config).await.unwrap();
    assert_eq!(reopened.usage_history("alpha").await.len(), 1);
}

#[tokio::test]
async fn test_maintenance_prunes_expired_records_on_disk() {
    let dir = temp_dir();
    let config = storage_config(dir.path());
    let store = Arc::new(AnalyticsStore::open(&config).await.unwrap());
    store.record_quality(quality_metric("alpha", 0.5, false, 24 * 90)).await;
    store.record_quality(quality_metric("alpha", 0.75, true, 1)).await;

    let daemon = MaintenanceDaemon::new(store.clone(), MaintenanceDaemonConfig::default());
    let report = daemon.run_once().await.unwrap();
    assert_eq!(report.pruned.quality_removed, 1);
    drop(daemon);
    drop(store);

    let reopened = AnalyticsStore::open(&config).await.unwrap();
    assert_eq!(reopened.quality_history("alpha", None).await.len(), 1);
}

#[tokio::test]
async fn test_published_parameters_survive_restart() {
    let dir = temp_dir();
    let config = config_in(dir.path());

    let system = QualitySystem::open(&config).await.unwrap();
    let next = QualityParameters {
        default_threshold: 0.8,
        ..(*system.parameters()).clone()
    };
    let version = system.publisher().publish(next).await.unwrap();
    assert_eq!(version, 1);
    drop(system);

    let restarted = QualitySystem::open(&config).await.unwrap();
    assert_eq!(restarted.parameters().version, 1);
    assert!((restarted.parameters().default_threshold - 0.8).abs() < f64::EPSILON);
}
