use thiserror::Error;

#[derive(Error, Debug)]
pub enum HeraldError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Invalid rule id '{0}'")]
    InvalidRuleId(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
