// src/errors.rs

//! Crate-wide error types and aliases.

use std::fmt;

use thiserror::Error;

use crate::types::ErrorCode;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// The single typed failure a Job reports to the front-end.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct JobError {
    pub code: ErrorCode,
    pub message: String,
}

impl JobError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Result of one step of a Job.
pub type JobResult<T> = std::result::Result<T, JobError>;
