//! Engine error types.
//!
//! Every failure mode has a named variant. Unknown sensors are not an
//! error: ingestion reports them as ignored.

use thiserror::Error;

/// Request-scoped input failure. The engine guarantees no state was
/// mutated when one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Missing required fields: {0:?}")]
    MissingFields(Vec<String>),

    #[error("Invalid field {field}: {reason}")]
    InvalidField { field: String, reason: String },

    #[error("Duplicate sale_id: {0}")]
    DuplicateSaleId(String),
}

/// Fatal at load time. The process must not start with one of these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("Shelf {shelf_id} misconfigured: {reason}")]
    InvalidShelf { shelf_id: String, reason: String },

    #[error("Policy {field} invalid: {reason}")]
    InvalidPolicy { field: String, reason: String },
}

/// Failure reported by the misplacement classifier collaborator
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("Classifier not configured")]
    Unavailable,

    #[error("Classifier transport error: {0}")]
    Transport(String),

    #[error("Classifier returned HTTP {0}")]
    Status(u16),

    #[error("Image larger than {limit} bytes")]
    TooLarge { limit: usize },

    #[error("Classifier response could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
}
