use cat_engine::{CatError, ConfigError};

#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Engine(#[from] CatError),
    #[error("corpus row {row}: {message}")]
    Corpus { row: usize, message: String },
    #[error("invalid environment value {name}={value}")]
    Env { name: &'static str, value: String },
}

pub type SimResult<T> = Result<T, SimError>;
