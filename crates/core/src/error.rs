use std::fmt;
use thiserror::Error;

/// Pipeline stage reported when `process_pdf` fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Load,
    Split,
    Embed,
    Index,
    Chain,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Load => "load",
            Stage::Split => "split",
            Stage::Embed => "embed",
            Stage::Index => "index",
            Stage::Chain => "chain",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum QaError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf load error: {0}")]
    Load(String),

    #[error("invalid splitter config: {0}")]
    Split(String),

    #[error("embedding request failed: {0}")]
    Embedding(String),

    #[error("completion request failed: {0}")]
    Completion(String),

    #[error("PDF not processed yet")]
    NotInitialized,

    #[error("invalid prompt template: {0}")]
    Prompt(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("PDF processing failed at {stage} stage: {source}")]
    Processing {
        stage: Stage,
        #[source]
        source: Box<QaError>,
    },
}

impl QaError {
    pub fn at_stage(stage: Stage, source: QaError) -> Self {
        QaError::Processing {
            stage,
            source: Box::new(source),
        }
    }

    /// Stage a processing failure originated from, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            QaError::Processing { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

pub type Result<T, E = QaError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processing_error_names_the_stage() {
        let error = QaError::at_stage(Stage::Embed, QaError::Embedding("401 Unauthorized".into()));
        assert_eq!(error.stage(), Some(Stage::Embed));
        assert_eq!(
            error.to_string(),
            "PDF processing failed at embed stage: embedding request failed: 401 Unauthorized"
        );
    }

    #[test]
    fn not_initialized_message_is_stable() {
        assert_eq!(QaError::NotInitialized.to_string(), "PDF not processed yet");
        assert_eq!(QaError::NotInitialized.stage(), None);
    }
}
