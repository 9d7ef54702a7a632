use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::partition::PartitionRules;
use crate::types::{
    DEFAULT_MAX_ITERATIONS, DEFAULT_MAX_THETA, DEFAULT_MIN_THETA, DEFAULT_TOLERANCE,
    UNINFORMATIVE_STANDARD_ERROR,
};

/// Adaptive item selection rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ItemSelect {
    /// Difficulty numerically closest to theta
    #[default]
    Closest,
    /// Maximum Fisher information at theta
    #[serde(alias = "maxinfo")]
    Mfi,
    /// Uniform over the eligible pool
    Random,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EstimationMethod {
    #[default]
    Mle,
    Eap,
}

/// End the task when `max_incorrect` of the last `window` scored responses
/// were incorrect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentIncorrectRule {
    pub window: usize,
    pub max_incorrect: usize,
}

impl Default for RecentIncorrectRule {
    fn default() -> Self {
        Self {
            window: 10,
            max_incorrect: 4,
        }
    }
}

/// Task-level stopping rules, independent of ability estimation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskStopPolicy {
    pub max_incorrect_in_row: Option<u32>,
    pub recent_incorrect: Option<RecentIncorrectRule>,
}

/// Per-session CAT configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CatConfig {
    pub starting_theta: f64,
    pub min_theta: f64,
    pub max_theta: f64,
    /// Adaptive phase stops once the standard error drops below this value
    pub sem_threshold: f64,
    /// Safety bound on adaptive items per block
    pub max_items: usize,
    pub item_select: ItemSelect,
    pub method: EstimationMethod,
    pub max_iterations: usize,
    pub tolerance: f64,
    pub max_standard_error: f64,
    /// Working-theta move per response while the history is all-correct or
    /// all-incorrect
    pub degenerate_step: f64,
    /// Draw start items at random instead of corpus order
    pub randomize_start: bool,
    /// Items sampled from the unnormed pool at the end of the session
    pub unnormed_count: usize,
    /// Use the heavy (downex) instruction track instead of the light one
    pub heavy_instructions: bool,
    pub task_stop: TaskStopPolicy,
    pub partition: PartitionRules,
    /// Fixed RNG seed; the system clock is used when absent
    pub seed: Option<u64>,
}

impl Default for CatConfig {
    fn default() -> Self {
        Self {
            starting_theta: 0.0,
            min_theta: DEFAULT_MIN_THETA,
            max_theta: DEFAULT_MAX_THETA,
            sem_threshold: 0.3,
            max_items: 50,
            item_select: ItemSelect::Closest,
            method: EstimationMethod::Mle,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tolerance: DEFAULT_TOLERANCE,
            max_standard_error: UNINFORMATIVE_STANDARD_ERROR,
            degenerate_step: 1.0,
            randomize_start: false,
            unnormed_count: 5,
            heavy_instructions: false,
            task_stop: TaskStopPolicy::default(),
            partition: PartitionRules::default(),
            seed: None,
        }
    }
}

impl CatConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.min_theta.is_finite() || !self.max_theta.is_finite() {
            return Err(ConfigError::Validation(
                "theta bounds must be finite".to_string(),
            ));
        }
        if self.min_theta >= self.max_theta {
            return Err(ConfigError::Validation(format!(
                "minTheta ({}) must be below maxTheta ({})",
                self.min_theta, self.max_theta
            )));
        }
        if !self.starting_theta.is_finite()
            || self.starting_theta < self.min_theta
            || self.starting_theta > self.max_theta
        {
            return Err(ConfigError::Validation(format!(
                "startingTheta ({}) must lie within [{}, {}]",
                self.starting_theta, self.min_theta, self.max_theta
            )));
        }
        if !self.sem_threshold.is_finite() || self.sem_threshold < 0.0 {
            return Err(ConfigError::Validation(format!(
                "semThreshold must be a non-negative number, got {}",
                self.sem_threshold
            )));
        }
        if self.max_items == 0 {
            return Err(ConfigError::Validation(
                "maxItems must be at least 1".to_string(),
            ));
        }
        if self.max_iterations == 0 {
            return Err(ConfigError::Validation(
                "maxIterations must be at least 1".to_string(),
            ));
        }
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
            return Err(ConfigError::Validation(format!(
                "tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        if !self.max_standard_error.is_finite() || self.max_standard_error <= 0.0 {
            return Err(ConfigError::Validation(format!(
                "maxStandardError must be positive, got {}",
                self.max_standard_error
            )));
        }
        if !self.degenerate_step.is_finite() || self.degenerate_step < 0.0 {
            return Err(ConfigError::Validation(format!(
                "degenerateStep must be a non-negative number, got {}",
                self.degenerate_step
            )));
        }
        if let Some(0) = self.task_stop.max_incorrect_in_row {
            return Err(ConfigError::Validation(
                "maxIncorrectInRow must be at least 1 when set".to_string(),
            ));
        }
        if let Some(rule) = self.task_stop.recent_incorrect {
            if rule.window == 0 || rule.max_incorrect == 0 || rule.max_incorrect > rule.window {
                return Err(ConfigError::Validation(format!(
                    "recentIncorrect needs 0 < maxIncorrect <= window, got {}/{}",
                    rule.max_incorrect, rule.window
                )));
            }
        }
        Ok(())
    }
}
