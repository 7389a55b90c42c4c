//! Persistence errors

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("state file version {found} is newer than supported version {supported}")]
    Version { found: u32, supported: u32 },
}

pub type Result<T> = std::result::Result<T, PersistError>;
