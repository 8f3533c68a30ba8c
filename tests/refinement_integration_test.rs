//! End-to-end tests of the refinement loop through the `QualitySystem` facade.

mod common;

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use common::{config_in, temp_dir, Reply, ScriptedSubagent, GOOD_REQUIREMENTS, GOOD_RESPONSE};
use overseer::domain::errors::DomainError;
use overseer::domain::models::{RefinementConfig, TaskSpec, TaskStatus};
use overseer::services::refinement_controller::{INVOKE_OPERATION, RUN_TASK_OPERATION};
use overseer::QualitySystem;

fn spec(subagent: &str) -> TaskSpec {
    TaskSpec::new(subagent, "Audit the login flow", GOOD_REQUIREMENTS)
}

#[tokio::test]
async fn test_first_draft_accepted_without_refinement() {
    let dir = temp_dir();
    let invoker = Arc::new(ScriptedSubagent::texts(&[GOOD_RESPONSE]));
    let system = QualitySystem::open(&config_in(dir.path()))
        .await
        .unwrap()
        .with_invoker(invoker.clone());

    let result = system.run_task(spec("security"), CancellationToken::new()).await.unwrap();

    assert_eq!(result.status, TaskStatus::Passed);
    assert_eq!(result.attempts, 1);
    assert_eq!(result.result.as_deref(), Some(GOOD_RESPONSE));
    assert_eq!(invoker.calls(), 1);

    let export = system.export_analytics().await;
    assert_eq!(export.quality["security"].len(), 1);
    assert!(export.performance.contains_key(INVOKE_OPERATION));
    assert!(export.performance.contains_key(RUN_TASK_OPERATION));
    assert_eq!(export.usage["security"].len(), 1);
}

#[tokio::test]
async fn test_rejected_draft_is_refined_with_feedback() {
    let dir = temp_dir();
    let invoker = Arc::new(ScriptedSubagent::texts(&["", GOOD_RESPONSE]));
    let system = QualitySystem::open(&config_in(dir.path()))
        .await
        .unwrap()
        .with_invoker(invoker.clone());

    let result = system.run_task(spec("security"), CancellationToken::new()).await.unwrap();

    assert_eq!(result.status, TaskStatus::Passed);
    assert_eq!(result.attempts, 2);
    assert_eq!(result.history.len(), 2);

    let requests = invoker.requests().await;
    assert_eq!(requests.len(), 2);
    assert!(requests[0].feedback.is_none());
    assert_eq!(requests[1].attempt, 2);
    assert!(requests[1].feedback.as_deref().is_some_and(|f| !f.is_empty()));
    assert_eq!(requests[1].previous_response.as_deref(), Some(""));
}

#[tokio::test]
async fn test_attempts_never_exceed_limit() {
    let dir = temp_dir();
    let mut config = config_in(dir.path());
    config.refinement.max_attempts = 3;
    config.refinement.prediction_short_circuit = false;
    let invoker = Arc::new(ScriptedSubagent::texts(&["", "", "", "", ""]));
    let system = QualitySystem::open(&config).await.unwrap().with_invoker(invoker.clone());

    let result = system.run_task(spec("writer"), CancellationToken::new()).await.unwrap();

    assert_eq!(result.status, TaskStatus::Exhausted);
    assert_eq!(result.attempts, 3);
    assert_eq!(invoker.calls(), 3);
    assert!(!result.diagnostic_categories.is_empty());
    assert!(!result.reason.is_empty());
}

#[tokio::test]
async fn test_failed_invocations_end_exhausted() {
    let dir = temp_dir();
    let invoker = Arc::new(ScriptedSubagent::new(vec![Reply::Fail, Reply::Fail, Reply::Fail]));
    let system = QualitySystem::open(&config_in(dir.path()))
        .await
        .unwrap()
        .with_invoker(invoker.clone());

    let result = system.run_task(spec("flaky"), CancellationToken::new()).await.unwrap();

    assert_eq!(result.status, TaskStatus::Exhausted);
    assert!(result.result.is_none());
    assert_eq!(invoker.calls(), 3);
}

#[tokio::test]
async fn test_capacity_rejection_and_cancellation() {
    let dir = temp_dir();
    let config = overseer::Config {
        refinement: RefinementConfig {
            max_concurrent_tasks: 1,
            ..RefinementConfig::default()
        },
        ..config_in(dir.path())
    };
    let invoker = Arc::new(ScriptedSubagent::new(vec![Reply::Hang]));
    let system = Arc::new(QualitySystem::open(&config).await.unwrap().with_invoker(invoker.clone()));

    let cancel = CancellationToken::new();
    let running = {
        let system = system.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { system.run_task(spec("slow"), cancel).await })
    };

    // Wait until the first task holds the only slot.
    for _ in 0..100 {
        if invoker.calls() > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(invoker.calls(), 1);

    let rejected = system.run_task(spec("other"), CancellationToken::new()).await;
    assert!(matches!(rejected, Err(DomainError::AtCapacity { limit: 1, .. })));

    cancel.cancel();
    let result = running.await.unwrap().unwrap();
    assert_eq!(result.status, TaskStatus::Cancelled);

    // The slot was released: a new task is admitted.
    let next = system.run_task(spec("other"), CancellationToken::new()).await;
    assert!(next.is_ok());
}

#[tokio::test]
async fn test_invalid_task_rejected_up_front() {
    let dir = temp_dir();
    let invoker = Arc::new(ScriptedSubagent::texts(&[GOOD_RESPONSE]));
    let system = QualitySystem::open(&config_in(dir.path()))
        .await
        .unwrap()
        .with_invoker(invoker.clone());

    let err = system
        .run_task(TaskSpec::new("", "prompt", "requirements"), CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, DomainError::InvalidInput(_)));
    assert_eq!(invoker.calls(), 0);
}

#[tokio::test]
async fn test_concurrent_tasks_within_limit_all_complete() {
    let dir = temp_dir();
    let config = overseer::Config {
        refinement: RefinementConfig {
            max_concurrent_tasks: 4,
            ..RefinementConfig::default()
        },
        ..config_in(dir.path())
    };
    let invoker = Arc::new(ScriptedSubagent::texts(&[GOOD_RESPONSE; 4]));
    let system = QualitySystem::open(&config).await.unwrap().with_invoker(invoker.clone());

    let runs = ["alpha", "beta", "gamma", "delta"]
        .into_iter()
        .map(|subagent| system.run_task(spec(subagent), CancellationToken::new()));
    let results = futures::future::join_all(runs).await;

    assert_eq!(results.len(), 4);
    for result in results {
        assert_eq!(result.unwrap().status, TaskStatus::Passed);
    }
    assert_eq!(invoker.calls(), 4);

    let export = system.export_analytics().await;
    let quality_records: usize = export.quality.values().map(Vec::len).sum();
    assert_eq!(quality_records, 4);
}
