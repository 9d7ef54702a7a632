use std::str::FromStr;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use cat_engine::{probability, Item};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseModel {
    /// Correct iff difficulty <= true theta
    #[default]
    Deterministic,
    /// Bernoulli draw on the item response probability
    Stochastic,
}

impl FromStr for ResponseModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deterministic" => Ok(Self::Deterministic),
            "stochastic" => Ok(Self::Stochastic),
            other => Err(format!("unknown response model: {other}")),
        }
    }
}

/// Answers trials on behalf of a test taker with known ability
pub struct SimulatedRespondent {
    true_theta: f64,
    model: ResponseModel,
    rng: ChaCha8Rng,
}

impl SimulatedRespondent {
    pub fn new(true_theta: f64, model: ResponseModel, seed: u64) -> Self {
        Self {
            true_theta,
            model,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn true_theta(&self) -> f64 {
        self.true_theta
    }

    /// Items without usable parameters are answered at chance
    pub fn respond(&mut self, item: &Item) -> bool {
        let Ok(params) = item.irt_params() else {
            return self.rng.gen_bool(0.5);
        };
        match self.model {
            ResponseModel::Deterministic => params.difficulty <= self.true_theta,
            ResponseModel::Stochastic => {
                let p = probability(&params, self.true_theta).clamp(0.0, 1.0);
                self.rng.gen_bool(p)
            }
        }
    }
}
