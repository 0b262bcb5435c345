use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] crate::config::Error),
    #[error("Refusing to overwrite existing file {0}")]
    AlreadyExists(PathBuf),
    #[error("No alert with id {0}")]
    AlertNotFound(i64),
    #[error("{0:#}")]
    Runtime(#[from] anyhow::Error),
}
