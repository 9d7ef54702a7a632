//! Common Types and Constants
//!
//! Shared data structures used across the CAT engine modules: corpus items,
//! IRT parameter bundles, scored responses and session phases.

use serde::{Deserialize, Serialize};

use crate::error::ParamError;
use crate::sanitize;

// ==================== Constants ====================

/// Lower bound of the ability scale
pub const DEFAULT_MIN_THETA: f64 = -6.0;

/// Upper bound of the ability scale
pub const DEFAULT_MAX_THETA: f64 = 6.0;

/// Standard error reported while the history carries no usable information
pub const UNINFORMATIVE_STANDARD_ERROR: f64 = 10.0;

/// Iteration cap for the Newton-Raphson ability search
pub const DEFAULT_MAX_ITERATIONS: usize = 50;

/// Convergence tolerance on theta between iterations
pub const DEFAULT_TOLERANCE: f64 = 1e-6;

/// Largest theta move allowed in a single Newton-Raphson step
pub const MAX_NEWTON_STEP: f64 = 1.0;

/// Logit clamp used by the item response function
pub const MAX_LOGIT: f64 = 35.0;

/// Probabilities are kept inside [PROBABILITY_FLOOR, 1 - PROBABILITY_FLOOR]
pub const PROBABILITY_FLOOR: f64 = 1e-9;

/// Numerical stability epsilon
pub const EPSILON: f64 = 1e-10;

// ==================== Assessment Stage ====================

/// Assessment stage tag carried by every corpus row
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AssessmentStage {
    Instructions,
    PracticeResponse,
    #[default]
    TestResponse,
    /// Task-specific stages (e.g. follow-up responses) are kept verbatim
    Other(String),
}

impl AssessmentStage {
    pub fn as_str(&self) -> &str {
        match self {
            AssessmentStage::Instructions => "instructions",
            AssessmentStage::PracticeResponse => "practice_response",
            AssessmentStage::TestResponse => "test_response",
            AssessmentStage::Other(stage) => stage.as_str(),
        }
    }

    /// Instruction and practice rows never reach the scored phases
    pub fn is_instruction_or_practice(&self) -> bool {
        matches!(
            self,
            AssessmentStage::Instructions | AssessmentStage::PracticeResponse
        )
    }
}

impl From<String> for AssessmentStage {
    fn from(value: String) -> Self {
        match value.trim().to_lowercase().replace('-', "_").as_str() {
            "instructions" | "instruction" => AssessmentStage::Instructions,
            "practice_response" | "practice" => AssessmentStage::PracticeResponse,
            "test_response" | "test" | "" => AssessmentStage::TestResponse,
            _ => AssessmentStage::Other(value),
        }
    }
}

impl From<AssessmentStage> for String {
    fn from(stage: AssessmentStage) -> Self {
        stage.as_str().to_string()
    }
}

// ==================== IRT Types ====================

/// Validated item parameters for the four-parameter logistic model
///
/// P(correct | theta) = c + (d - c) / (1 + exp(-a * (theta - b)))
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IrtParams {
    /// a: slope of the response curve (> 0)
    pub discrimination: f64,
    /// b: location on the theta scale
    pub difficulty: f64,
    /// c: lower asymptote, chance of a correct guess, in [0, 1)
    pub guessing: f64,
    /// d: upper asymptote, in (c, 1]
    pub upper_asymptote: f64,
}

impl IrtParams {
    /// Two/three-parameter item with the upper asymptote fixed at 1
    pub fn new(discrimination: f64, difficulty: f64, guessing: f64) -> Self {
        Self {
            discrimination,
            difficulty,
            guessing,
            upper_asymptote: 1.0,
        }
    }

    /// Rasch-style item: a = 1, c = 0, d = 1
    pub fn rasch(difficulty: f64) -> Self {
        Self::new(1.0, difficulty, 0.0)
    }
}

/// One entry of the adaptive response history
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredResponse {
    pub params: IrtParams,
    pub correct: bool,
}

impl ScoredResponse {
    pub fn new(params: IrtParams, correct: bool) -> Self {
        Self { params, correct }
    }
}

// ==================== Corpus Item ====================

fn default_discrimination() -> f64 {
    1.0
}

fn default_upper_asymptote() -> f64 {
    1.0
}

/// An assessment stimulus record
///
/// Items are read-only once loaded. The engine only looks at identity,
/// classification tags and IRT parameters; `payload` (answer, distractors,
/// prompt and audio references) is passed through to the presentation layer.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    #[serde(alias = "itemId", alias = "item_id")]
    pub id: String,
    /// Stable across corpus revisions
    #[serde(default, alias = "itemUid", alias = "item_uid")]
    pub uid: String,
    #[serde(default, alias = "trial_type")]
    pub trial_type: String,
    #[serde(default, alias = "assessment_stage")]
    pub assessment_stage: AssessmentStage,
    /// Informational; blocks are formed by matching `trial_type`
    #[serde(default, alias = "block_index")]
    pub block_index: Option<u32>,
    /// Missing or NaN for items without validated parameters
    #[serde(default)]
    pub difficulty: Option<f64>,
    #[serde(default = "default_discrimination")]
    pub discrimination: f64,
    #[serde(default, alias = "chanceLevel", alias = "chance_level")]
    pub guessing: f64,
    #[serde(default = "default_upper_asymptote")]
    pub upper_asymptote: f64,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Item {
    pub fn new(id: impl Into<String>, assessment_stage: AssessmentStage) -> Self {
        let id = id.into();
        Self {
            uid: id.clone(),
            id,
            trial_type: String::new(),
            assessment_stage,
            block_index: None,
            difficulty: None,
            discrimination: 1.0,
            guessing: 0.0,
            upper_asymptote: 1.0,
            payload: serde_json::Value::Null,
        }
    }

    /// Scored test item with Rasch parameters
    pub fn test(id: impl Into<String>, difficulty: f64) -> Self {
        Self::new(id, AssessmentStage::TestResponse).with_difficulty(difficulty)
    }

    pub fn with_difficulty(mut self, difficulty: f64) -> Self {
        self.difficulty = Some(difficulty);
        self
    }

    pub fn with_params(mut self, discrimination: f64, difficulty: f64, guessing: f64) -> Self {
        self.discrimination = discrimination;
        self.difficulty = Some(difficulty);
        self.guessing = guessing;
        self
    }

    pub fn with_trial_type(mut self, trial_type: impl Into<String>) -> Self {
        self.trial_type = trial_type.into();
        self
    }

    /// Validated IRT parameters, or the reason the item cannot be scored
    pub fn irt_params(&self) -> Result<IrtParams, ParamError> {
        sanitize::validate_params(
            self.difficulty,
            self.discrimination,
            self.guessing,
            self.upper_asymptote,
        )
    }

    pub fn has_usable_params(&self) -> bool {
        self.irt_params().is_ok()
    }
}

// ==================== Session Phase ====================

/// Trial sequencer states
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Instruction,
    Practice,
    Start,
    Adaptive,
    Unnormed,
    Done,
}

impl Phase {
    /// Phases whose responses count toward task-level stopping rules
    pub fn is_scored(&self) -> bool {
        matches!(self, Phase::Start | Phase::Adaptive | Phase::Unnormed)
    }
}

// ==================== Tests ====================
