use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("Unknown severity: {0}")]
    UnknownSeverity(String),

    #[error("Unknown channel type: {0}")]
    UnknownChannelType(String),
}
