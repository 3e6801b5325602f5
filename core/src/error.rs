use thiserror::Error;

///
/// Errors shared by every crate in the workspace - configuration loading and
/// the handful of low-level failures that don't belong to any one component.
///
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration file {path} not found")]
    ConfigFileNotFound { path: String, source: std::io::Error },

    #[error("Configuration file {path} contains invalid configuration")]
    InvalidConfig { path: String, source: serde_json::Error },

    #[error("Configuration is invalid - {reason}")]
    ConfigValidationError { reason: String },
}
