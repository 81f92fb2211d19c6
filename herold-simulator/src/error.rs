use std::path::PathBuf;

use herold_config::ConfigError;
use herold_engine::DispatchError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("Simulation file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Invalid simulation settings: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Simulation settings parsing error: {0}")]
    Parsing(#[from] figment::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("Metrics setup failed: {0}")]
    Metrics(String),

    #[error("Scenario encoding error: {0}")]
    Scenario(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Outcome digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },
}
