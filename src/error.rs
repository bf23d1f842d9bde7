use serde_json::json;
use thiserror::Error;

/// Errors the engine reports back to the caller. Dirty score data never ends up
/// here; it becomes a `cohort::Diagnostic` instead.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0}")]
    BadParams(String),

    #[error("invalid grading scheme: {0}")]
    InvalidScheme(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("cohort has {count} students, limit is {limit}")]
    TooManyStudents { count: usize, limit: usize },

    #[error("student {student_id} has {count} subjects, limit is {limit}")]
    TooManySubjects {
        student_id: String,
        count: usize,
        limit: usize,
    },

    #[error("export failed for {path}: {message}")]
    ExportFailed { path: String, message: String },
}

impl EngineError {
    pub fn bad_params(message: impl Into<String>) -> Self {
        EngineError::BadParams(message.into())
    }

    /// Stable wire code used in `{ok:false,error:{code}}` responses.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::BadParams(_) => "bad_params",
            EngineError::InvalidScheme(_) => "bad_scheme",
            EngineError::InvalidConfig(_) => "bad_config",
            EngineError::TooManyStudents { .. } | EngineError::TooManySubjects { .. } => {
                "too_large"
            }
            EngineError::ExportFailed { .. } => "export_failed",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            EngineError::TooManyStudents { count, limit } => {
                Some(json!({ "count": count, "limit": limit }))
            }
            EngineError::TooManySubjects {
                student_id,
                count,
                limit,
            } => Some(json!({ "studentId": student_id, "count": count, "limit": limit })),
            EngineError::ExportFailed { path, .. } => Some(json!({ "path": path })),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
