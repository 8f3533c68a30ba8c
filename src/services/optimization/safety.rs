//! Safety predicate for candidate parameter sets.
//!
//! | Risk     | Condition                                                    |
//! |----------|--------------------------------------------------------------|
//! | critical | weight <= 0 or non-finite, normalized weight above the cap,  |
//! |          | default threshold outside the band, hard floor outside range |
//! | high     | any parameter moved more than 50% from the baseline          |
//! | medium   | any parameter moved more than 20% from the baseline          |
//! | low      | everything else                                              |

use crate::domain::models::{
    QualityCategory, QualityParameters, RiskLevel, SafetyAssessment, ThresholdBand,
};

pub const HARD_FLOOR_MIN: f64 = 0.3;
pub const HARD_FLOOR_MAX: f64 = 0.8;
const HIGH_RELATIVE_CHANGE: f64 = 0.5;
const MEDIUM_RELATIVE_CHANGE: f64 = 0.2;

#[derive(Debug, Clone)]
pub struct SafetyPredicate {
    band: ThresholdBand,
    max_weight_share: f64,
}

impl SafetyPredicate {
    pub fn new(band: ThresholdBand, max_weight_share: f64) -> Self {
        Self {
            band,
            max_weight_share,
        }
    }

    pub fn assess(&self, candidate: &QualityParameters, baseline: &QualityParameters) -> SafetyAssessment {
        let mut critical = Vec::new();

        for category in QualityCategory::ALL {
            let weight = candidate.weights.get(category);
            if !weight.is_finite() || weight <= 0.0 {
                critical.push(format!("weight for {category} is {weight}"));
            }
        }
        if critical.is_empty() {
            let share = candidate.weights.max_share();
            if share > self.max_weight_share {
                critical.push(format!(
                    "one category carries {:.0}% of the weight (cap {:.0}%)",
                    share * 100.0,
                    self.max_weight_share * 100.0
                ));
            }
        }
        if !self.band.contains(candidate.default_threshold) {
            critical.push(format!(
                "default threshold {:.3} outside [{:.2}, {:.2}]",
                candidate.default_threshold, self.band.min, self.band.max
            ));
        }
        if !(HARD_FLOOR_MIN..=HARD_FLOOR_MAX).contains(&candidate.hard_floor) {
            critical.push(format!(
                "hard floor {:.3} outside [{HARD_FLOOR_MIN}, {HARD_FLOOR_MAX}]",
                candidate.hard_floor
            ));
        }
        if !critical.is_empty() {
            return SafetyAssessment {
                risk: RiskLevel::Critical,
                reasons: critical,
            };
        }

        let baseline_set = baseline.to_parameter_set();
        let mut risk = RiskLevel::Low;
        let mut reasons = Vec::new();
        for (name, value) in candidate.to_parameter_set() {
            let Some(&base) = baseline_set.get(&name) else {
                continue;
            };
            let change = if base.abs() > f64::EPSILON {
                ((value - base) / base).abs()
            } else {
                value.abs()
            };
            if change > HIGH_RELATIVE_CHANGE {
                risk = risk.max(RiskLevel::High);
                reasons.push(format!("{name} moved {:.0}% from {base:.3}", change * 100.0));
            } else if change > MEDIUM_RELATIVE_CHANGE {
                risk = risk.max(RiskLevel::Medium);
                reasons.push(format!("{name} moved {:.0}% from {base:.3}", change * 100.0));
            }
        }

        SafetyAssessment { risk, reasons }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn predicate() -> SafetyPredicate {
        SafetyPredicate::new(ThresholdBand::default(), 0.6)
    }

    #[test]
    fn test_unchanged_parameters_are_low_risk() {
        let params = QualityParameters::default();
        let verdict = predicate().assess(&params, &params);
        assert_eq!(verdict.risk, RiskLevel::Low);
        assert!(verdict.reasons.is_empty());
    }

    #[test]
    fn test_zero_weight_is_critical() {
        let baseline = QualityParameters::default();
        let mut candidate = baseline.clone();
        candidate.weights.specificity = 0.0;
        assert!(predicate().assess(&candidate, &baseline).is_critical());
    }

    #[test]
    fn test_dominant_weight_is_critical() {
        let baseline = QualityParameters::default();
        let mut candidate = baseline.clone();
        candidate.weights.format = 7.0;
        let verdict = predicate().assess(&candidate, &baseline);
        assert!(verdict.is_critical());
        assert!(verdict.reasons[0].contains("cap"));
    }

    #[test]
    fn test_threshold_and_floor_bounds_are_critical() {
        let baseline = QualityParameters::default();
        let mut candidate = baseline.clone();
        candidate.default_threshold = 0.95;
        assert!(predicate().assess(&candidate, &baseline).is_critical());

        let mut candidate = baseline.clone();
        candidate.hard_floor = 0.2;
        assert!(predicate().assess(&candidate, &baseline).is_critical());
    }

    #[test]
    fn test_large_move_is_high_risk() {
        let baseline = QualityParameters::default();
        let mut candidate = baseline.clone();
        candidate.weights.completeness = 1.6;
        let verdict = predicate().assess(&candidate, &baseline);
        assert_eq!(verdict.risk, RiskLevel::High);

        candidate.weights.completeness = 1.3;
        assert_eq!(predicate().assess(&candidate, &baseline).risk, RiskLevel::Medium);
    }
}
