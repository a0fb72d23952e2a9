use thiserror::Error;

/// Failures that happen before an audit can run.
///
/// The run itself never fails: irreconcilable data becomes findings and an
/// empty adjudication becomes a rejected result.
#[derive(Debug, Error)]
pub enum AuditError {
    /// TOML parse / deserialization error.
    #[error("config parse error: {0}")]
    ConfigParse(String),
    /// Config validation error (out-of-range threshold, empty budget, etc.).
    #[error("config validation error: {0}")]
    ConfigValidation(String),
    /// Canonical input JSON could not be decoded.
    #[error("input parse error: {0}")]
    InputParse(String),
}
