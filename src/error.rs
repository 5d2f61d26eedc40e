use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

/// Fatal errors. Anything recoverable at row/column level is reported in the
/// `ApplyReport` instead of surfacing here.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid operation spec: {0}")]
    SpecValidation(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Cannot resolve base artifact: {0}")]
    BaseResolution(String),

    #[error("Export error: {0}")]
    Export(String),

    #[error("Import error: {0}")]
    Import(String),

    #[error("Artifact not found: {0}")]
    ArtifactNotFound(String),
}

impl EngineError {
    /// True for errors caused by the request itself rather than the environment.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            EngineError::SpecValidation(_) | EngineError::Json(_) | EngineError::Yaml(_)
        )
    }
}
