use thiserror::Error;

use crate::cache::FingerprintError;
use crate::config::LoadError;
use crate::infra::error::InfraError;
use crate::transport::FetchError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("failed to load configuration: {0}")]
    Config(#[from] LoadError),
    #[error("request failed: {0}")]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Fingerprint(#[from] FingerprintError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}
