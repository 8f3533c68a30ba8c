//! A/B experiments over quality parameter variants.
//!
//! An experiment is registered under a caller-supplied id with two or more
//! variants. Traffic is assigned by weighted random choice over the variant
//! allocations, observations (quality scores) are recorded per variant, and
//! evaluation runs Welch's t-test between the control (first variant) and the
//! best-performing challenger.

use chrono::Utc;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::{BTreeMap, HashSet, VecDeque};
use tokio::sync::{Mutex, RwLock};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    AbRecommendation, AbTestConfig, AbTestResult, ExperimentsConfig, VariantConfig, VariantStats,
};
use crate::services::statistics::{mean, sample_variance, welch_t_test};

struct Experiment {
    config: AbTestConfig,
    sampler: WeightedIndex<f64>,
    observations: BTreeMap<String, VecDeque<f64>>,
}

pub struct ExperimentManager {
    experiments: RwLock<BTreeMap<String, Experiment>>,
    settings: ExperimentsConfig,
    rng: Mutex<StdRng>,
}

impl ExperimentManager {
    pub fn new(settings: ExperimentsConfig) -> Self {
        Self {
            experiments: RwLock::new(BTreeMap::new()),
            settings,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic traffic assignment.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    /// Register an experiment. Returns `false` when the definition is
    /// invalid or the id is already taken.
    pub async fn configure(&self, config: AbTestConfig) -> bool {
        if let Err(e) = validate(&config) {
            tracing::warn!(experiment_id = %config.id, error = %e, "Rejected experiment");
            return false;
        }
        let sampler = match WeightedIndex::new(config.variants.iter().map(|v| v.allocation)) {
            Ok(sampler) => sampler,
            Err(e) => {
                tracing::warn!(experiment_id = %config.id, error = %e, "Rejected experiment allocations");
                return false;
            }
        };

        let mut experiments = self.experiments.write().await;
        if experiments.contains_key(&config.id) {
            tracing::warn!(experiment_id = %config.id, "Experiment already exists");
            return false;
        }
        tracing::info!(
            experiment_id = %config.id,
            variants = config.variants.len(),
            target_sample_size = config.target_sample_size,
            "Experiment configured"
        );
        let observations = config
            .variants
            .iter()
            .map(|v| (v.name.clone(), VecDeque::new()))
            .collect();
        experiments.insert(
            config.id.clone(),
            Experiment {
                config,
                sampler,
                observations,
            },
        );
        true
    }

    pub async fn get(&self, experiment_id: &str) -> Option<AbTestConfig> {
        self.experiments
            .read()
            .await
            .get(experiment_id)
            .map(|e| e.config.clone())
    }

    pub async fn list(&self) -> Vec<AbTestConfig> {
        self.experiments
            .read()
            .await
            .values()
            .map(|e| e.config.clone())
            .collect()
    }

    pub async fn remove(&self, experiment_id: &str) -> bool {
        let removed = self.experiments.write().await.remove(experiment_id).is_some();
        if removed {
            tracing::info!(experiment_id, "Experiment removed");
        }
        removed
    }

    /// Pick a variant for the next unit of traffic.
    pub async fn assign(&self, experiment_id: &str) -> DomainResult<VariantConfig> {
        let experiments = self.experiments.read().await;
        let experiment = experiments
            .get(experiment_id)
            .ok_or_else(|| DomainError::ExperimentNotFound(experiment_id.to_string()))?;
        let index = experiment.sampler.sample(&mut *self.rng.lock().await);
        Ok(experiment.config.variants[index].clone())
    }

    /// Record one observation for a variant.
    pub async fn record(&self, experiment_id: &str, variant: &str, value: f64) -> DomainResult<()> {
        if !value.is_finite() {
            return Err(DomainError::InvalidInput(format!("observation {value} is not finite")));
        }
        let mut experiments = self.experiments.write().await;
        let experiment = experiments
            .get_mut(experiment_id)
            .ok_or_else(|| DomainError::ExperimentNotFound(experiment_id.to_string()))?;
        let log = experiment.observations.get_mut(variant).ok_or_else(|| {
            DomainError::InvalidExperiment(format!("{experiment_id} has no variant {variant}"))
        })?;
        log.push_back(value);
        while log.len() > self.settings.max_observations_per_variant.max(1) {
            log.pop_front();
        }
        Ok(())
    }

    /// Compare the control with the best challenger.
    ///
    /// The test has a fixed horizon: no recommendation other than
    /// `ContinueCollecting` is made until both arms reach the target sample
    /// size. The significance level is divided by the number of challengers.
    pub async fn evaluate(&self, experiment_id: &str) -> DomainResult<AbTestResult> {
        let experiments = self.experiments.read().await;
        let experiment = experiments
            .get(experiment_id)
            .ok_or_else(|| DomainError::ExperimentNotFound(experiment_id.to_string()))?;
        let config = &experiment.config;

        let samples: Vec<(String, Vec<f64>)> = config
            .variants
            .iter()
            .map(|v| {
                let values = experiment
                    .observations
                    .get(&v.name)
                    .map(|log| log.iter().copied().collect())
                    .unwrap_or_default();
                (v.name.clone(), values)
            })
            .collect();
        let variants: Vec<VariantStats> = samples.iter().map(|(name, values)| stats(name, values)).collect();

        let control = &samples[0];
        let challenger = samples[1..]
            .iter()
            .max_by(|a, b| {
                let (ma, mb) = (mean(&a.1).unwrap_or(f64::MIN), mean(&b.1).unwrap_or(f64::MIN));
                // Earlier variant wins ties.
                ma.total_cmp(&mb).then(std::cmp::Ordering::Greater)
            })
            .unwrap_or(&samples[1]);

        let mut result = AbTestResult {
            experiment_id: config.id.clone(),
            variants,
            control: control.0.clone(),
            challenger: challenger.0.clone(),
            p_value: 1.0,
            effect_size: 0.0,
            confidence_interval: (0.0, 0.0),
            winner: None,
            recommendation: AbRecommendation::ContinueCollecting,
            evaluated_at: Utc::now(),
        };

        let under_sampled = samples.iter().any(|(_, values)| values.len() < 2);
        let test = if under_sampled {
            None
        } else {
            welch_t_test(&control.1, &challenger.1)
        };
        let Some(test) = test else {
            tracing::debug!(experiment_id, "Not enough observations to evaluate");
            return Ok(result);
        };

        result.p_value = test.p_value;
        result.effect_size = test.effect_size;
        result.confidence_interval = test.confidence_interval(config.significance_level);

        // Bonferroni: the best challenger was picked out of every non-control arm.
        #[allow(clippy::cast_precision_loss)]
        let alpha = config.significance_level / (config.variants.len() - 1).max(1) as f64;
        let fully_sampled = control.1.len().min(challenger.1.len()) >= config.target_sample_size;
        result.recommendation = if !fully_sampled {
            AbRecommendation::ContinueCollecting
        } else if test.p_value < alpha {
            result.winner = Some(if test.mean_difference > 0.0 {
                challenger.0.clone()
            } else {
                control.0.clone()
            });
            AbRecommendation::AdoptWinner
        } else if test.effect_size.abs() >= self.settings.redesign_effect_size {
            AbRecommendation::RedesignExperiment
        } else {
            AbRecommendation::NoSignificantDifference
        };

        tracing::info!(
            experiment_id,
            control = %result.control,
            challenger = %result.challenger,
            p_value = result.p_value,
            alpha,
            effect_size = result.effect_size,
            recommendation = %result.recommendation,
            "Experiment evaluated"
        );
        Ok(result)
    }
}

#[allow(clippy::cast_precision_loss)]
fn stats(name: &str, values: &[f64]) -> VariantStats {
    VariantStats {
        name: name.to_string(),
        samples: values.len(),
        mean: mean(values).unwrap_or(0.0),
        std_dev: sample_variance(values).map_or(0.0, f64::sqrt),
    }
}

fn validate(config: &AbTestConfig) -> DomainResult<()> {
    if config.id.trim().is_empty() {
        return Err(DomainError::InvalidExperiment("experiment id is empty".to_string()));
    }
    if config.variants.len() < 2 {
        return Err(DomainError::InvalidExperiment(format!(
            "{} needs at least two variants",
            config.id
        )));
    }
    let mut names = HashSet::new();
    for variant in &config.variants {
        if !names.insert(variant.name.as_str()) {
            return Err(DomainError::InvalidExperiment(format!(
                "duplicate variant {}",
                variant.name
            )));
        }
        if !variant.allocation.is_finite() || variant.allocation < 0.0 {
            return Err(DomainError::InvalidExperiment(format!(
                "variant {} has allocation {}",
                variant.name, variant.allocation
            )));
        }
    }
    if config.target_sample_size < 2 {
        return Err(DomainError::InvalidExperiment("target sample size must be at least 2".to_string()));
    }
    if !(config.significance_level > 0.0 && config.significance_level < 1.0) {
        return Err(DomainError::InvalidExperiment(format!(
            "significance level {} outside (0, 1)",
            config.significance_level
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_arm(id: &str, target: usize) -> AbTestConfig {
        AbTestConfig::new(
            id,
            vec![VariantConfig::new("control", 0.5), VariantConfig::new("strict", 0.5)],
            target,
        )
    }

    fn manager() -> ExperimentManager {
        ExperimentManager::new(ExperimentsConfig::default()).with_seed(11)
    }

    #[tokio::test]
    async fn test_configure_validates() {
        let manager = manager();
        assert!(manager.configure(two_arm("exp", 10)).await);
        assert!(!manager.configure(two_arm("exp", 10)).await);

        let single = AbTestConfig::new("one", vec![VariantConfig::new("a", 1.0)], 10);
        assert!(!manager.configure(single).await);

        let dup = AbTestConfig::new(
            "dup",
            vec![VariantConfig::new("a", 1.0), VariantConfig::new("a", 1.0)],
            10,
        );
        assert!(!manager.configure(dup).await);

        let zero = AbTestConfig::new(
            "zero",
            vec![VariantConfig::new("a", 0.0), VariantConfig::new("b", 0.0)],
            10,
        );
        assert!(!manager.configure(zero).await);
        assert_eq!(manager.list().await.len(), 1);
    }

    #[tokio::test]
    async fn test_assignment_follows_allocation() {
        let manager = manager();
        let config = AbTestConfig::new(
            "skewed",
            vec![VariantConfig::new("a", 0.9), VariantConfig::new("b", 0.1)],
            10,
        );
        assert!(manager.configure(config).await);

        let mut a = 0;
        for _ in 0..1000 {
            if manager.assign("skewed").await.unwrap().name == "a" {
                a += 1;
            }
        }
        assert!((850..=950).contains(&a), "a assigned {a} times");
    }

    #[tokio::test]
    async fn test_clear_winner_is_adopted() {
        let manager = manager();
        manager.configure(two_arm("exp", 5)).await;
        for i in 0..10 {
            let jitter = f64::from(i % 3) * 0.01;
            manager.record("exp", "control", 0.70 + jitter).await.unwrap();
            manager.record("exp", "strict", 0.85 + jitter).await.unwrap();
        }

        let result = manager.evaluate("exp").await.unwrap();
        assert_eq!(result.recommendation, AbRecommendation::AdoptWinner);
        assert_eq!(result.winner.as_deref(), Some("strict"));
        assert!(result.p_value < 0.05);
        assert!(result.confidence_interval.0 > 0.0);
    }

    #[tokio::test]
    async fn test_under_sampled_continues_collecting() {
        let manager = manager();
        manager.configure(two_arm("exp", 50)).await;
        manager.record("exp", "control", 0.7).await.unwrap();

        let result = manager.evaluate("exp").await.unwrap();
        assert_eq!(result.recommendation, AbRecommendation::ContinueCollecting);
        assert!(result.winner.is_none());
    }

    #[tokio::test]
    async fn test_significant_result_waits_for_target_sample() {
        let manager = manager();
        manager.configure(two_arm("exp", 30)).await;
        for i in 0..10 {
            let jitter = f64::from(i % 3) * 0.01;
            manager.record("exp", "control", 0.70 + jitter).await.unwrap();
            manager.record("exp", "strict", 0.85 + jitter).await.unwrap();
        }

        let result = manager.evaluate("exp").await.unwrap();
        assert!(result.p_value < 0.001);
        assert_eq!(result.recommendation, AbRecommendation::ContinueCollecting);
        assert!(result.winner.is_none());
    }

    #[tokio::test]
    async fn test_alpha_is_split_across_challengers() {
        let config = AbTestConfig::new(
            "multi",
            vec![
                VariantConfig::new("control", 1.0),
                VariantConfig::new("b", 1.0),
                VariantConfig::new("c", 1.0),
            ],
            8,
        );
        let control = [0.70, 0.74, 0.78, 0.72, 0.76, 0.71, 0.77, 0.73];
        let shift = 0.034;

        let two = manager();
        two.configure(two_arm("pair", 8)).await;
        let multi = manager();
        multi.configure(config).await;
        for value in control {
            two.record("pair", "control", value).await.unwrap();
            two.record("pair", "strict", value + shift).await.unwrap();
            multi.record("multi", "control", value).await.unwrap();
            multi.record("multi", "b", value + shift).await.unwrap();
            multi.record("multi", "c", value).await.unwrap();
        }

        let pair = two.evaluate("pair").await.unwrap();
        let result = multi.evaluate("multi").await.unwrap();
        assert!((pair.p_value - result.p_value).abs() < 1e-12);
        assert!(result.p_value > 0.025 && result.p_value < 0.05, "p = {}", result.p_value);
        assert_eq!(pair.recommendation, AbRecommendation::AdoptWinner);
        assert_eq!(result.challenger, "b");
        assert_ne!(result.recommendation, AbRecommendation::AdoptWinner);
        assert!(result.winner.is_none());
    }

    #[tokio::test]
    async fn test_fully_sampled_without_difference() {
        let manager = manager();
        manager.configure(two_arm("exp", 6)).await;
        for value in [0.70, 0.80, 0.75, 0.72, 0.78, 0.74] {
            manager.record("exp", "control", value).await.unwrap();
            manager.record("exp", "strict", value + 0.001).await.unwrap();
        }

        let result = manager.evaluate("exp").await.unwrap();
        assert_eq!(result.recommendation, AbRecommendation::NoSignificantDifference);
    }

    #[tokio::test]
    async fn test_unknown_experiment_and_variant() {
        let manager = manager();
        assert!(matches!(
            manager.evaluate("missing").await,
            Err(DomainError::ExperimentNotFound(_))
        ));
        manager.configure(two_arm("exp", 5)).await;
        assert!(matches!(
            manager.record("exp", "ghost", 0.5).await,
            Err(DomainError::InvalidExperiment(_))
        ));
        assert!(manager.remove("exp").await);
        assert!(!manager.remove("exp").await);
    }
}
