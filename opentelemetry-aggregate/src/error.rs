use std::result;
use thiserror::Error;

/// A specialized `Result` type for aggregation configuration.
pub type MetricResult<T> = result::Result<T, MetricError>;

/// Errors returned while configuring aggregation.
///
/// Recording and collecting never fail; only configuration input is checked.
#[derive(Error, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum MetricError {
    /// Invalid configuration
    #[error("Config error {0}")]
    Config(String),
}
