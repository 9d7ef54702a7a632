//! Ability Estimator
//!
//! Maximum-likelihood ability estimation under the logistic item response
//! model, recomputed from the full response history after every response.
//!
//! Core principles:
//! - P(correct | theta) = c + (d - c) / (1 + exp(-a * (theta - b)))
//! - Newton-Raphson in Fisher-scoring form: theta += score / information,
//!   step length capped, theta clamped to [min_theta, max_theta]
//! - Standard error = 1 / sqrt(test information at the estimate)
//! - Empty or single-outcome histories have no finite MLE; the prior theta is
//!   returned with the uninformative standard error
//!
//! EAP (posterior mean on a fixed quadrature grid, unit-variance normal prior
//! centred on the prior theta) is available as an alternative method. It is
//! defined for every history of two or more responses.

use serde::{Deserialize, Serialize};

use crate::config::{CatConfig, EstimationMethod};
use crate::sanitize::{clamp_probability, clamp_theta, standard_error_from_information};
use crate::types::{IrtParams, ScoredResponse, EPSILON, MAX_LOGIT, MAX_NEWTON_STEP};

// ==================== Constants ====================

/// Quadrature points for EAP estimation
const EAP_QUADRATURE_POINTS: usize = 121;

/// Standard deviation of the EAP normal prior around the prior theta
const EAP_PRIOR_SD: f64 = 1.0;

// ==================== Item Response Function ====================

/// Probability of a correct response and its derivative with respect to theta
fn probability_and_slope(params: &IrtParams, theta: f64) -> (f64, f64) {
    let z = (params.discrimination * (theta - params.difficulty)).clamp(-MAX_LOGIT, MAX_LOGIT);
    let logistic = 1.0 / (1.0 + (-z).exp());
    let range = params.upper_asymptote - params.guessing;
    let p = params.guessing + range * logistic;
    let slope = range * params.discrimination * logistic * (1.0 - logistic);
    (p, slope)
}

/// Probability of a correct response at `theta`
pub fn probability(params: &IrtParams, theta: f64) -> f64 {
    probability_and_slope(params, theta).0
}

/// Fisher information of one item at `theta`
pub fn item_information(params: &IrtParams, theta: f64) -> f64 {
    let (p, slope) = probability_and_slope(params, theta);
    let p = clamp_probability(p);
    slope * slope / (p * (1.0 - p))
}

/// Test information of a response history at `theta`
pub fn test_information(history: &[ScoredResponse], theta: f64) -> f64 {
    history
        .iter()
        .map(|r| item_information(&r.params, theta))
        .sum()
}

pub fn log_likelihood(history: &[ScoredResponse], theta: f64) -> f64 {
    history
        .iter()
        .map(|r| {
            let p = clamp_probability(probability(&r.params, theta));
            if r.correct {
                p.ln()
            } else {
                (1.0 - p).ln()
            }
        })
        .sum()
}

/// First derivative of the log-likelihood and the test information
fn score_and_information(history: &[ScoredResponse], theta: f64) -> (f64, f64) {
    history.iter().fold((0.0, 0.0), |(score, info), r| {
        let (p, slope) = probability_and_slope(&r.params, theta);
        let p = clamp_probability(p);
        let u = if r.correct { 1.0 } else { 0.0 };
        let denom = p * (1.0 - p);
        (score + (u - p) * slope / denom, info + slope * slope / denom)
    })
}

/// All responses share one outcome, so the likelihood is monotone in theta
pub fn is_degenerate(history: &[ScoredResponse]) -> bool {
    match history.first() {
        None => true,
        Some(first) => history.iter().all(|r| r.correct == first.correct),
    }
}

// ==================== Estimates ====================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EstimateStatus {
    /// Empty history; prior returned
    NoData,
    /// Single-outcome history; prior returned
    Degenerate,
    Converged,
    /// Iteration cap reached; best estimate found is returned
    NotConverged,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Estimate {
    pub theta: f64,
    pub standard_error: f64,
    pub status: EstimateStatus,
    pub iterations: usize,
}

/// Estimator settings derived from the session configuration
#[derive(Clone, Debug)]
pub struct EstimatorSettings {
    pub method: EstimationMethod,
    pub min_theta: f64,
    pub max_theta: f64,
    pub max_iterations: usize,
    pub tolerance: f64,
    pub max_standard_error: f64,
    pub degenerate_step: f64,
}

impl From<&CatConfig> for EstimatorSettings {
    fn from(config: &CatConfig) -> Self {
        Self {
            method: config.method,
            min_theta: config.min_theta,
            max_theta: config.max_theta,
            max_iterations: config.max_iterations,
            tolerance: config.tolerance,
            max_standard_error: config.max_standard_error,
            degenerate_step: config.degenerate_step,
        }
    }
}

impl Default for EstimatorSettings {
    fn default() -> Self {
        Self::from(&CatConfig::default())
    }
}

// ==================== Estimator ====================

#[derive(Clone, Debug, Default)]
pub struct AbilityEstimator {
    settings: EstimatorSettings,
}

impl AbilityEstimator {
    pub fn new(settings: EstimatorSettings) -> Self {
        Self { settings }
    }

    pub fn from_config(config: &CatConfig) -> Self {
        Self::new(EstimatorSettings::from(config))
    }

    pub fn settings(&self) -> &EstimatorSettings {
        &self.settings
    }

    fn clamp(&self, theta: f64) -> f64 {
        clamp_theta(theta, self.settings.min_theta, self.settings.max_theta)
    }

    fn prior_estimate(&self, prior: f64, status: EstimateStatus) -> Estimate {
        Estimate {
            theta: prior,
            standard_error: self.settings.max_standard_error,
            status,
            iterations: 0,
        }
    }

    /// Estimate theta and its standard error from the full history
    pub fn estimate(&self, history: &[ScoredResponse], prior_theta: f64) -> Estimate {
        let prior = self.clamp(prior_theta);
        if history.is_empty() {
            return self.prior_estimate(prior, EstimateStatus::NoData);
        }

        match self.settings.method {
            EstimationMethod::Mle => self.estimate_mle(history, prior),
            EstimationMethod::Eap => self.estimate_eap(history, prior),
        }
    }

    fn estimate_mle(&self, history: &[ScoredResponse], prior: f64) -> Estimate {
        if is_degenerate(history) {
            return self.prior_estimate(prior, EstimateStatus::Degenerate);
        }

        let mut theta = prior;
        let mut best_theta = prior;
        let mut best_ll = log_likelihood(history, prior);
        let mut converged = false;
        let mut iterations = 0;

        for iter in 1..=self.settings.max_iterations {
            iterations = iter;
            let (score, info) = score_and_information(history, theta);
            if !score.is_finite() || !info.is_finite() || info <= EPSILON {
                break;
            }

            let step = (score / info).clamp(-MAX_NEWTON_STEP, MAX_NEWTON_STEP);
            let next = self.clamp(theta + step);

            let ll = log_likelihood(history, next);
            if ll > best_ll {
                best_ll = ll;
                best_theta = next;
            }

            let delta = (next - theta).abs();
            theta = next;
            if delta < self.settings.tolerance {
                converged = true;
                break;
            }
        }

        let (theta, status) = if converged {
            (theta, EstimateStatus::Converged)
        } else {
            (best_theta, EstimateStatus::NotConverged)
        };

        Estimate {
            theta,
            standard_error: standard_error_from_information(
                test_information(history, theta),
                self.settings.max_standard_error,
            ),
            status,
            iterations,
        }
    }

    fn estimate_eap(&self, history: &[ScoredResponse], prior: f64) -> Estimate {
        if history.len() < 2 {
            return self.prior_estimate(prior, EstimateStatus::Degenerate);
        }

        let min = self.settings.min_theta;
        let step = (self.settings.max_theta - min) / (EAP_QUADRATURE_POINTS - 1) as f64;

        let log_posterior: Vec<(f64, f64)> = (0..EAP_QUADRATURE_POINTS)
            .map(|k| {
                let theta = min + step * k as f64;
                let z = (theta - prior) / EAP_PRIOR_SD;
                (theta, log_likelihood(history, theta) - 0.5 * z * z)
            })
            .collect();

        let max_lp = log_posterior
            .iter()
            .map(|&(_, lp)| lp)
            .fold(f64::NEG_INFINITY, f64::max);

        let (mut weight_sum, mut mean_acc) = (0.0, 0.0);
        for &(theta, lp) in &log_posterior {
            let w = (lp - max_lp).exp();
            weight_sum += w;
            mean_acc += w * theta;
        }
        let mean = mean_acc / weight_sum;
        let variance = log_posterior
            .iter()
            .map(|&(theta, lp)| (lp - max_lp).exp() * (theta - mean).powi(2))
            .sum::<f64>()
            / weight_sum;

        Estimate {
            theta: self.clamp(mean),
            standard_error: variance.max(0.0).sqrt().min(self.settings.max_standard_error),
            status: EstimateStatus::Converged,
            iterations: 0,
        }
    }
}

// ==================== Ability State ====================

/// Per-session ability state: current estimate plus the append-only history
///
/// Theta and the standard error are always defined; they start at the
/// configured starting theta and the uninformative standard error.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbilityState {
    /// Centre of the EAP prior; fixed for the session
    #[serde(default)]
    prior_theta: f64,
    theta: f64,
    standard_error: f64,
    history: Vec<ScoredResponse>,
    last_status: EstimateStatus,
}

impl AbilityState {
    pub fn new(starting_theta: f64, standard_error: f64) -> Self {
        Self {
            prior_theta: starting_theta,
            theta: starting_theta,
            standard_error,
            history: Vec::new(),
            last_status: EstimateStatus::NoData,
        }
    }

    pub fn from_config(config: &CatConfig) -> Self {
        Self::new(config.starting_theta, config.max_standard_error)
    }

    pub fn theta(&self) -> f64 {
        self.theta
    }

    pub fn standard_error(&self) -> f64 {
        self.standard_error
    }

    pub fn history(&self) -> &[ScoredResponse] {
        &self.history
    }

    pub fn last_status(&self) -> EstimateStatus {
        self.last_status
    }

    /// Append a response and re-estimate from the full history
    ///
    /// While the history is single-outcome the working theta moves by the
    /// configured step towards the observed outcome so that selection leaves
    /// the prior. A non-converged estimate keeps the last valid values.
    pub fn record(&mut self, estimator: &AbilityEstimator, response: ScoredResponse) -> Estimate {
        self.history.push(response);
        // MLE iterates from the working theta; EAP needs the fixed session prior
        let prior = match estimator.settings().method {
            EstimationMethod::Mle => self.theta,
            EstimationMethod::Eap => self.prior_theta,
        };
        let estimate = estimator.estimate(&self.history, prior);

        match estimate.status {
            EstimateStatus::Converged => {
                self.theta = estimate.theta;
                self.standard_error = estimate.standard_error;
            }
            EstimateStatus::NotConverged => {
                tracing::warn!(
                    responses = self.history.len(),
                    iterations = estimate.iterations,
                    best_theta = estimate.theta,
                    kept_theta = self.theta,
                    "ability estimate did not converge, keeping last valid estimate"
                );
            }
            EstimateStatus::NoData | EstimateStatus::Degenerate => {
                let step = estimator.settings().degenerate_step;
                let moved = if response.correct {
                    self.theta + step
                } else {
                    self.theta - step
                };
                self.theta = estimator.clamp(moved);
                self.standard_error = estimate.standard_error;
            }
        }
        self.last_status = estimate.status;

        tracing::debug!(
            theta = self.theta,
            standard_error = self.standard_error,
            status = ?estimate.status,
            responses = self.history.len(),
            "ability updated"
        );

        estimate
    }
}

// ==================== Tests ====================
