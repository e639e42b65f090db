use thiserror::Error;

use crate::revision::Revision;

/// Failures reported by a [`RevisionSource`](crate::source::RevisionSource).
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("revision {0} is not present in the source")]
    Unknown(Revision),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("revision source snapshot is stale: {0}")]
    StaleSnapshot(String),
    #[error("revision {0} is not part of this graph")]
    RevisionNotFound(Revision),
    #[error("invalid traversal configuration: {0}")]
    InvalidTraversalConfiguration(String),
    #[error("revision source failed")]
    Source(#[source] anyhow::Error),
}

impl From<SourceError> for GraphError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::Unknown(revision) => {
                Self::StaleSnapshot(format!("revision {revision} vanished from the source"))
            }
            SourceError::Backend(err) => Self::Source(err),
        }
    }
}

impl GraphError {
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::StaleSnapshot(_))
    }
}
