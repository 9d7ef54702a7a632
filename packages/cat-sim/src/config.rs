use std::path::{Path, PathBuf};

use cat_engine::CatConfig;

use crate::error::{SimError, SimResult};
use crate::respondent::ResponseModel;

#[derive(Debug, Clone)]
pub struct SimConfig {
    pub corpus_path: PathBuf,
    /// Optional JSON file holding a `CatConfig`
    pub config_path: Option<PathBuf>,
    pub true_thetas: Vec<f64>,
    pub replications: usize,
    pub seed: u64,
    pub response_model: ResponseModel,
    pub log_level: String,
}

impl SimConfig {
    pub fn from_env() -> SimResult<Self> {
        let corpus_path = std::env::var("CAT_CORPUS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("corpus.json"));

        let config_path = std::env::var("CAT_CONFIG_PATH").ok().map(PathBuf::from);

        let true_thetas = match std::env::var("CAT_TRUE_THETAS") {
            Ok(value) => parse_thetas(&value)?,
            Err(_) => vec![-2.0, -1.0, 0.0, 1.0, 2.0],
        };

        let replications = std::env::var("CAT_REPLICATIONS")
            .ok()
            .and_then(|value| value.parse::<usize>().ok())
            .filter(|&n| n > 0)
            .unwrap_or(100);

        let seed = std::env::var("CAT_SEED")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(42);

        let response_model = match std::env::var("CAT_RESPONSE_MODEL") {
            Ok(value) => value.parse().map_err(|_| SimError::Env {
                name: "CAT_RESPONSE_MODEL",
                value,
            })?,
            Err(_) => ResponseModel::default(),
        };

        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            corpus_path,
            config_path,
            true_thetas,
            replications,
            seed,
            response_model,
            log_level,
        })
    }

    /// Session configuration from `config_path`, or defaults
    pub fn cat_config(&self) -> SimResult<CatConfig> {
        match &self.config_path {
            Some(path) => load_cat_config(path),
            None => Ok(CatConfig::default()),
        }
    }
}

pub fn load_cat_config(path: &Path) -> SimResult<CatConfig> {
    let raw = std::fs::read_to_string(path)?;
    let config: CatConfig = serde_json::from_str(&raw)?;
    config.validate()?;
    Ok(config)
}

/// Comma-separated list of abilities, e.g. `-1.5, 0, 1.5`
pub fn parse_thetas(value: &str) -> SimResult<Vec<f64>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<f64>()
                .ok()
                .filter(|t| t.is_finite())
                .ok_or_else(|| SimError::Env {
                    name: "CAT_TRUE_THETAS",
                    value: value.to_string(),
                })
        })
        .collect()
}
