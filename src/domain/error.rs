//! Domain error types.

/// Top-level error type for extremescope.
#[derive(Debug, thiserror::Error)]
pub enum ScopeError {
    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    /// A column the query needs is not part of the segment's schema.
    #[error("column {column} is not available for segment {segment}")]
    SchemaGap { segment: String, column: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("unknown indicator key: {0}")]
    UnknownIndicator(String),

    #[error("unknown market segment: {0}")]
    UnknownSegment(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&ScopeError> for std::process::ExitCode {
    fn from(err: &ScopeError) -> Self {
        let code: u8 = match err {
            ScopeError::Io(_) => 1,
            ScopeError::ConfigParse { .. }
            | ScopeError::ConfigMissing { .. }
            | ScopeError::ConfigInvalid { .. } => 2,
            ScopeError::Database { .. }
            | ScopeError::DatabaseQuery { .. }
            | ScopeError::SchemaGap { .. } => 3,
            ScopeError::UnknownIndicator(_)
            | ScopeError::UnknownSegment(_)
            | ScopeError::InvalidRequest(_) => 4,
            ScopeError::NotFound(_) => 5,
        };
        std::process::ExitCode::from(code)
    }
}

/// Failure talking to the remote bar provider.
///
/// Never fatal to a bar request: the reconciliation service logs it and
/// serves local data instead.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned status {0}")]
    Status(u16),

    #[error("rate limited by local guard or remote API")]
    RateLimited,

    #[error("missing provider API key")]
    MissingApiKey,

    #[error("malformed provider payload: {0}")]
    Parse(String),
}

/// Failure inside the chart lifecycle controller.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ChartError {
    #[error("renderer module failed to load: {0}")]
    ModuleLoad(String),

    #[error("chart surface creation failed: {0}")]
    SurfaceCreate(String),

    /// The series exists but its backing handle is not attached yet.
    #[error("series handle is not attached yet")]
    SeriesNotAttached,

    #[error("bar fetch failed: {0}")]
    Fetch(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_gap_message_names_column_and_segment() {
        let err = ScopeError::SchemaGap {
            segment: "US".into(),
            column: "rsi_14_extreme".into(),
        };
        assert_eq!(
            err.to_string(),
            "column rsi_14_extreme is not available for segment US"
        );
    }

    #[test]
    fn io_errors_convert_transparently() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.ini");
        let err: ScopeError = io.into();
        assert!(matches!(err, ScopeError::Io(_)));
        assert_eq!(err.to_string(), "missing.ini");
    }
}
