use std::fmt;
use thiserror::Error;

/// Pipeline stages, in the order a run walks through them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Loading,
    Splitting,
    Indexing,
    Retrieving,
    Prompting,
    Generating,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Loading => "loading",
            Stage::Splitting => "splitting",
            Stage::Indexing => "indexing",
            Stage::Retrieving => "retrieving",
            Stage::Prompting => "prompting",
            Stage::Generating => "generating",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Failure of a pipeline run, classified by the collaborator that failed
#[derive(Debug, Error)]
pub enum RagError {
    /// Rejected before any document is loaded
    #[error("invalid configuration: {0:#}")]
    Config(anyhow::Error),

    #[error("failed to load document: {0:#}")]
    Load(anyhow::Error),

    #[error("embedding request failed while {stage}: {cause:#}")]
    Embedding { stage: Stage, cause: anyhow::Error },

    #[error("vector store error while {stage}: {cause:#}")]
    Store { stage: Stage, cause: anyhow::Error },

    #[error("answer generation failed: {0:#}")]
    Generation(anyhow::Error),
}

impl RagError {
    /// The stage the run was in when it failed
    pub fn stage(&self) -> Stage {
        match self {
            RagError::Config(_) | RagError::Load(_) => Stage::Loading,
            RagError::Embedding { stage, .. } | RagError::Store { stage, .. } => *stage,
            RagError::Generation(_) => Stage::Generating,
        }
    }
}

pub type Result<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_of_each_kind() {
        let err = RagError::Load(anyhow::anyhow!("missing"));
        assert_eq!(err.stage(), Stage::Loading);

        let err = RagError::Embedding {
            stage: Stage::Retrieving,
            cause: anyhow::anyhow!("timeout"),
        };
        assert_eq!(err.stage(), Stage::Retrieving);
        assert_eq!(
            err.to_string(),
            "embedding request failed while retrieving: timeout"
        );
    }
}
