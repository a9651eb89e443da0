use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidArgument,
    InvalidCommit,
    SourceUnavailable,
    Timeout,
    FileNotFound,
    IoError,
    InvalidRequest,
    PathOutOfBounds,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument => write!(f, "INVALID_ARGUMENT"),
            Self::InvalidCommit => write!(f, "INVALID_COMMIT"),
            Self::SourceUnavailable => write!(f, "SOURCE_UNAVAILABLE"),
            Self::Timeout => write!(f, "TIMEOUT"),
            Self::FileNotFound => write!(f, "FILE_NOT_FOUND"),
            Self::IoError => write!(f, "IO_ERROR"),
            Self::InvalidRequest => write!(f, "INVALID_REQUEST"),
            Self::PathOutOfBounds => write!(f, "PATH_OUT_OF_BOUNDS"),
        }
    }
}

/// Pipeline stage an analysis had reached when it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Extraction,
    Indexing,
    Traversal,
    Correlation,
    Ownership,
    Aggregation,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Extraction => "extraction",
            Self::Indexing => "indexing",
            Self::Traversal => "traversal",
            Self::Correlation => "correlation",
            Self::Ownership => "ownership",
            Self::Aggregation => "aggregation",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Serialize)]
pub struct AnalyzeError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
}

impl fmt::Display for AnalyzeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.stage {
            Some(stage) => write!(f, "[{}] {} (stage: {stage})", self.code, self.message),
            None => write!(f, "[{}] {}", self.code, self.message),
        }
    }
}

impl std::error::Error for AnalyzeError {}

impl AnalyzeError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            stage: None,
        }
    }

    pub fn at_stage(mut self, stage: Stage) -> Self {
        self.stage = Some(stage);
        self
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidArgument, message)
    }

    pub fn invalid_commit(rev: &str) -> Self {
        Self::new(ErrorCode::InvalidCommit, format!("Commit not found: {rev}"))
    }

    pub fn source_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::SourceUnavailable, message)
    }

    pub fn timeout(stage: Stage, budget: Duration) -> Self {
        Self::new(
            ErrorCode::Timeout,
            format!("Analysis exceeded its {}s budget", budget.as_secs()),
        )
        .at_stage(stage)
    }
}

/// Extract the [`ErrorCode`] carried by an `anyhow` error, if any.
pub fn error_code(e: &anyhow::Error) -> Option<ErrorCode> {
    e.downcast_ref::<AnalyzeError>().map(|ae| ae.code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_stage_when_present() {
        let err = AnalyzeError::timeout(Stage::Correlation, Duration::from_secs(60));
        let text = err.to_string();
        assert!(text.starts_with("[TIMEOUT]"), "{text}");
        assert!(text.contains("stage: correlation"), "{text}");
    }

    #[test]
    fn display_without_stage() {
        let err = AnalyzeError::invalid_commit("deadbeef");
        assert_eq!(err.to_string(), "[INVALID_COMMIT] Commit not found: deadbeef");
    }

    #[test]
    fn error_code_survives_anyhow_wrapping() {
        let err: anyhow::Error = AnalyzeError::invalid_argument("depth must be >= 1").into();
        assert_eq!(error_code(&err), Some(ErrorCode::InvalidArgument));

        let plain = anyhow::anyhow!("boom");
        assert_eq!(error_code(&plain), None);
    }

    #[test]
    fn serialized_codes_match_display() {
        let err = AnalyzeError::timeout(Stage::Traversal, Duration::from_secs(30));
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "TIMEOUT");
        assert_eq!(json["stage"], "traversal");

        for code in [
            ErrorCode::InvalidArgument,
            ErrorCode::InvalidCommit,
            ErrorCode::SourceUnavailable,
            ErrorCode::FileNotFound,
            ErrorCode::IoError,
            ErrorCode::InvalidRequest,
            ErrorCode::PathOutOfBounds,
        ] {
            assert_eq!(serde_json::to_value(code).unwrap(), code.to_string());
        }
    }
}
