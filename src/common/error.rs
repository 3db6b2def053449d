use thiserror::Error;

#[derive(Error, Debug)]
pub enum MaVilleError {
    #[error("{entity} not found with id {id}")]
    NotFound { entity: &'static str, id: i64 },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("candidature {0} has already been processed")]
    AlreadyProcessed(i64),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<rusqlite::Error> for MaVilleError {
    fn from(e: rusqlite::Error) -> Self {
        MaVilleError::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MaVilleError>;
