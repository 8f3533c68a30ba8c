//! Common test utilities for integration tests
//!
//! Provides shared fixtures, helpers, and test utilities used across
//! multiple integration test files.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;
use tokio::sync::Mutex;

use overseer::domain::errors::{DomainError, DomainResult};
use overseer::domain::models::{
    Config, QualityCategory, QualityMetric, StorageConfig, SubagentRequest, SubagentResponse,
};
use overseer::domain::ports::SubagentInvoker;

/// A response every default rule scores well.
#[allow(dead_code)]
pub const GOOD_RESPONSE: &str = "## Login audit\n\n\
    - `session_token` is rotated in src/auth/login.rs after 3 failed attempts.\n\
    - The audit found no injection in the login handler.\n\n\
    In short, the login session handling is sound.";

/// Requirements matching [`GOOD_RESPONSE`].
#[allow(dead_code)]
pub const GOOD_REQUIREMENTS: &str = "Audit login session handling";

/// Create a temporary directory for test isolation
///
/// Returns a TempDir that will be cleaned up when dropped.
pub fn temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Storage rooted in `dir`, persisting on every write.
#[allow(dead_code)]
pub fn storage_config(dir: &Path) -> StorageConfig {
    StorageConfig {
        data_dir: dir.to_string_lossy().into_owned(),
        ..StorageConfig::default()
    }
}

/// Full configuration with storage rooted in `dir`.
#[allow(dead_code)]
pub fn config_in(dir: &Path) -> Config {
    Config {
        storage: storage_config(dir),
        ..Config::default()
    }
}

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
/// Call this at the beginning of tests that need logging.
#[allow(dead_code)]
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Quality metric `age_hours` old with uniform category scores.
#[allow(dead_code)]
pub fn quality_metric(subagent: &str, score: f64, passed: bool, age_hours: i64) -> QualityMetric {
    let category_scores: BTreeMap<QualityCategory, f64> =
        QualityCategory::ALL.iter().map(|c| (*c, score)).collect();
    QualityMetric {
        timestamp: Utc::now() - Duration::hours(age_hours),
        subagent_id: subagent.to_string(),
        session_id: None,
        quality_score: score,
        passed,
        processing_time_ms: 5,
        refinement_attempts: 0,
        category_scores,
        critical_issues: vec![],
        experiment_id: None,
    }
}

/// Scripted reply of a [`ScriptedSubagent`].
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Fail,
    Hang,
}

/// Sub-agent that answers from a script and records every request.
///
/// Once the script is exhausted it keeps returning an empty response.
#[allow(dead_code)]
pub struct ScriptedSubagent {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<SubagentRequest>>,
    calls: AtomicUsize,
}

#[allow(dead_code)]
impl ScriptedSubagent {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn texts(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| Reply::Text((*t).to_string())).collect())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn requests(&self) -> Vec<SubagentRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl SubagentInvoker for ScriptedSubagent {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn invoke(&self, request: SubagentRequest) -> DomainResult<SubagentResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().await.push(request);
        let reply = self
            .replies
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Reply::Text(String::new()));
        match reply {
            Reply::Text(text) => Ok(SubagentResponse::text(text)),
            Reply::Fail => Err(DomainError::SubagentFailure("provider unavailable".to_string())),
            Reply::Hang => std::future::pending::<DomainResult<SubagentResponse>>().await,
        }
    }
}
