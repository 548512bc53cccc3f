use thiserror::Error;

/// Possible errors that arise while clustering matches.
#[derive(Debug, Error)]
pub enum ClusteringError {
    #[error("The dataset provided is empty")]
    EmptyDataset,
    #[error("No match clears the clustering threshold of {0} cM")]
    NoClusterableMatches(f64),
    #[error("Duplicate match index: {0}")]
    DuplicateIndex(String),
    #[error("Non finite shared centimorgans: {0}")]
    NonFiniteCentimorgans(String),
    #[error("Internal invariant violated: {0}")]
    InternalInvariant(String),
    #[error("Failed to write correlation output: {0}")]
    Output(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ClusteringError {
    /// Whether the error reports unusable input rather than a defect in the engine.
    pub fn is_input_error(&self) -> bool {
        !matches!(self, ClusteringError::InternalInvariant(_) | ClusteringError::Output(_))
    }
}
