use thiserror::Error;

use crate::cache::{CacheError, StoreError};
use crate::drive::DriveError;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),
    #[error("cache store error: {0}")]
    Store(#[from] StoreError),
    #[error("drive error: {0}")]
    Drive(#[from] DriveError),
    #[error("telemetry initialization failed: {0}")]
    Telemetry(String),
}

impl InfraError {
    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }
}
