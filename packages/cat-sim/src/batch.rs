//! Batch simulation
//!
//! Runs independent sessions (replications x true abilities) in parallel.
//! Each session owns its sequencer, its respondent and its RNG streams, so
//! results depend only on the plan seed.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use cat_engine::{CatConfig, Item, Phase, StopReason, TrialSequencer};

use crate::error::SimResult;
use crate::respondent::{ResponseModel, SimulatedRespondent};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationPlan {
    pub true_thetas: Vec<f64>,
    pub replications: usize,
    pub seed: u64,
    pub response_model: ResponseModel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOutcome {
    pub true_theta: f64,
    pub replication: usize,
    pub final_theta: f64,
    pub standard_error: f64,
    pub items_administered: usize,
    pub end_reason: Option<StopReason>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThetaSummary {
    pub true_theta: f64,
    pub sessions: usize,
    /// Mean of (estimate - true theta)
    pub bias: f64,
    pub rmse: f64,
    pub mean_items: f64,
    pub mean_standard_error: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub sessions: usize,
    pub response_model: ResponseModel,
    pub by_theta: Vec<ThetaSummary>,
}

/// Distinct, reproducible seed per (theta index, replication, stream)
fn derive_seed(base: u64, theta_idx: usize, replication: usize, stream: u64) -> u64 {
    base.wrapping_mul(0x9E37_79B9_7F4A_7C15)
        .wrapping_add((theta_idx as u64) << 32)
        .wrapping_add(replication as u64)
        .wrapping_mul(31)
        .wrapping_add(stream)
}

/// Run one full session against a simulated respondent
pub fn run_session(
    corpus: &[Item],
    config: &CatConfig,
    respondent: &mut SimulatedRespondent,
) -> SimResult<SessionOutcome> {
    let mut seq = TrialSequencer::new(corpus, config.clone())?;

    while let Some(trial) = seq.next_trial() {
        let correct = respondent.respond(&trial.item);
        seq.submit(correct)?;
    }

    let report = seq.report();
    let items_administered = report
        .responses
        .iter()
        .filter(|r| r.phase == Phase::Adaptive)
        .count();
    let (final_theta, standard_error) = report
        .blocks
        .last()
        .map(|b| (b.theta, b.standard_error))
        .unwrap_or((config.starting_theta, config.max_standard_error));

    Ok(SessionOutcome {
        true_theta: respondent.true_theta(),
        replication: 0,
        final_theta,
        standard_error,
        items_administered,
        end_reason: report.end_reason,
    })
}

pub fn summarize(true_theta: f64, outcomes: &[SessionOutcome]) -> ThetaSummary {
    let n = outcomes.len().max(1) as f64;
    let errors: Vec<f64> = outcomes.iter().map(|o| o.final_theta - true_theta).collect();

    ThetaSummary {
        true_theta,
        sessions: outcomes.len(),
        bias: errors.iter().sum::<f64>() / n,
        rmse: (errors.iter().map(|e| e * e).sum::<f64>() / n).sqrt(),
        mean_items: outcomes.iter().map(|o| o.items_administered as f64).sum::<f64>() / n,
        mean_standard_error: outcomes.iter().map(|o| o.standard_error).sum::<f64>() / n,
    }
}

/// Run every (true theta, replication) pair in parallel and aggregate
pub fn run_batch(
    corpus: &[Item],
    config: &CatConfig,
    plan: &SimulationPlan,
) -> SimResult<BatchSummary> {
    config.validate()?;

    let jobs: Vec<(usize, usize)> = (0..plan.true_thetas.len())
        .flat_map(|t| (0..plan.replications).map(move |r| (t, r)))
        .collect();

    let outcomes: Vec<SessionOutcome> = jobs
        .par_iter()
        .map(|&(theta_idx, replication)| -> SimResult<SessionOutcome> {
            let true_theta = plan.true_thetas[theta_idx];
            let session_config = CatConfig {
                seed: Some(derive_seed(plan.seed, theta_idx, replication, 0)),
                ..config.clone()
            };
            let mut respondent = SimulatedRespondent::new(
                true_theta,
                plan.response_model,
                derive_seed(plan.seed, theta_idx, replication, 1),
            );
            let mut outcome = run_session(corpus, &session_config, &mut respondent)?;
            outcome.replication = replication;
            Ok(outcome)
        })
        .collect::<SimResult<Vec<_>>>()?;

    // par_iter collect keeps job order: one contiguous run per true theta
    let reps = plan.replications;
    let by_theta: Vec<ThetaSummary> = plan
        .true_thetas
        .iter()
        .enumerate()
        .map(|(t, &theta)| summarize(theta, &outcomes[t * reps..(t + 1) * reps]))
        .collect();

    for summary in &by_theta {
        tracing::info!(
            true_theta = summary.true_theta,
            bias = summary.bias,
            rmse = summary.rmse,
            mean_items = summary.mean_items,
            "simulated ability level"
        );
    }

    Ok(BatchSummary {
        sessions: outcomes.len(),
        response_model: plan.response_model,
        by_theta,
    })
}
