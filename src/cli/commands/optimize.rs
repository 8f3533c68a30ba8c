//! Parameter optimization command.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt::Write as _;

use crate::application::QualitySystem;
use crate::cli::output::{list_table, output, CommandOutput};
use crate::domain::models::{OptimizationConfig, OptimizationResult};

#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct OptimizeOutput(pub OptimizationResult);

impl CommandOutput for OptimizeOutput {
    fn to_human(&self) -> String {
        let result = &self.0;
        let mut out = String::new();
        let _ = writeln!(out, "Termination:  {}", result.termination);
        let _ = writeln!(out, "Iterations:   {}", result.iterations);
        let _ = writeln!(out, "Baseline:     {:.4}", result.baseline_score);
        let _ = writeln!(out, "Best:         {:.4} ({:+.2}%)", result.best_score, result.improvement_pct);
        if let Some(reason) = &result.safety_violation {
            let _ = writeln!(out, "Halted:       {reason}");
        }
        match result.published_version {
            Some(version) => {
                let _ = writeln!(out, "Published:    v{version}");
            }
            None => out.push_str("Published:    no\n"),
        }

        let mut table = list_table(&["parameter", "value"]);
        for (name, value) in &result.best_parameters {
            table.add_row(vec![name.clone(), format!("{value:.3}")]);
        }
        let _ = write!(out, "\n{table}");
        out
    }
}

pub async fn handle_optimize(
    system: &QualitySystem,
    max_iterations: u32,
    max_duration_ms: u64,
    seed: Option<u64>,
    publish: bool,
    json: bool,
) -> Result<()> {
    let config = OptimizationConfig {
        max_iterations,
        max_duration_ms,
        seed,
        publish,
        ..OptimizationConfig::default()
    };
    let result = system
        .run_optimization(&config)
        .await
        .context("Optimization failed")?;
    output(&OptimizeOutput(result), json);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{ParameterSet, TerminationReason};

    #[test]
    fn test_unpublished_result() {
        let mut best = ParameterSet::new();
        best.insert("threshold.default".to_string(), 0.75);
        let result = OptimizationResult {
            iterations: 5,
            baseline_score: 0.8,
            best_score: 0.8,
            best_parameters: best,
            improvement_pct: 0.0,
            convergence_history: vec![],
            termination: TerminationReason::Converged,
            safety_violation: None,
            published_version: None,
        };
        let text = OptimizeOutput(result).to_human();
        assert!(text.contains("Published:    no"));
        assert!(text.contains("threshold.default"));
    }
}
