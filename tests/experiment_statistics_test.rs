//! Statistical behavior of A/B experiment evaluation.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use overseer::domain::models::{AbRecommendation, AbTestConfig, ExperimentsConfig, VariantConfig};
use overseer::services::ExperimentManager;

const SAMPLES: usize = 40;

fn experiment(id: &str) -> AbTestConfig {
    AbTestConfig::new(
        id,
        vec![VariantConfig::new("control", 0.5), VariantConfig::new("challenger", 0.5)],
        SAMPLES,
    )
}

async fn run_trial(manager: &ExperimentManager, id: &str, rng: &mut StdRng, shift: f64) -> AbRecommendation {
    assert!(manager.configure(experiment(id)).await);
    for _ in 0..SAMPLES {
        let control = rng.gen_range(0.6..0.9);
        let challenger = rng.gen_range(0.6..0.9) + shift;
        manager.record(id, "control", control).await.unwrap();
        manager.record(id, "challenger", challenger).await.unwrap();
    }
    manager.evaluate(id).await.unwrap().recommendation
}

#[tokio::test]
async fn test_identical_distributions_rarely_differ() {
    let manager = ExperimentManager::new(ExperimentsConfig::default()).with_seed(11);
    let mut rng = StdRng::seed_from_u64(2024);

    let trials = 200;
    let mut no_difference = 0;
    for trial in 0..trials {
        let recommendation = run_trial(&manager, &format!("trial-{trial}"), &mut rng, 0.0).await;
        if recommendation == AbRecommendation::NoSignificantDifference {
            no_difference += 1;
        }
    }

    assert!(
        no_difference * 100 >= trials * 85,
        "only {no_difference} of {trials} trials found no difference"
    );
}

#[tokio::test]
async fn test_clear_improvement_is_adopted() {
    let manager = ExperimentManager::new(ExperimentsConfig::default()).with_seed(5);
    let mut rng = StdRng::seed_from_u64(99);

    assert_eq!(
        run_trial(&manager, "shifted", &mut rng, 0.15).await,
        AbRecommendation::AdoptWinner
    );
    let result = manager.evaluate("shifted").await.unwrap();
    assert_eq!(result.winner.as_deref(), Some("challenger"));
    assert!(result.p_value < 0.05);
    assert!(result.confidence_interval.0 > 0.0);
}

#[tokio::test]
async fn test_assignment_follows_allocation() {
    let manager = ExperimentManager::new(ExperimentsConfig::default()).with_seed(3);
    let config = AbTestConfig::new(
        "skewed",
        vec![VariantConfig::new("control", 0.8), VariantConfig::new("challenger", 0.2)],
        10,
    );
    assert!(manager.configure(config).await);

    let mut control = 0;
    for _ in 0..1000 {
        if manager.assign("skewed").await.unwrap().name == "control" {
            control += 1;
        }
    }
    assert!((700..=900).contains(&control), "control assigned {control} times");
}
