use thiserror::Error;

#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum Error {
    #[error("Entity not found: {entity}")]
    NotFound { entity: String },

    #[error("Uniqueness conflict: {field}")]
    Uniqueness { field: String },

    #[error("Forbidden action")]
    Forbidden,

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Validation error: {}", .errors.join("; "))]
    Validation { errors: Vec<String> },

    #[error("Incomplete fulfillment: missing {}", .missing.join(", "))]
    IncompleteFulfillment { missing: Vec<String> },

    /// The order was submitted and no longer accepts writes.
    #[error("Order is frozen")]
    OrderFrozen,

    /// Stale version on a conditional write.
    #[error("Version conflict: expected {expected}, found {actual}")]
    Conflict { expected: u64, actual: u64 },

    #[error("Upstream failure: {message}")]
    Upstream { message: String },

    #[error("Persistence error: {message}")]
    Persistence { message: String },
}

impl Error {
    pub fn validation(error: impl Into<String>) -> Self {
        Self::Validation {
            errors: vec![error.into()],
        }
    }

    pub fn persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence {
            message: err.to_string(),
        }
    }

    pub fn upstream(err: impl std::fmt::Display) -> Self {
        Self::Upstream {
            message: err.to_string(),
        }
    }

    /// Short machine-readable name used in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NotFound { .. } => "NotFound",
            Error::Uniqueness { .. } => "Uniqueness",
            Error::Forbidden => "Forbidden",
            Error::InvalidStateTransition { .. } => "InvalidStateTransition",
            Error::Validation { .. } => "ValidationError",
            Error::IncompleteFulfillment { .. } => "IncompleteFulfillment",
            Error::OrderFrozen => "OrderFrozen",
            Error::Conflict { .. } => "Conflict",
            Error::Upstream { .. } => "UpstreamFailure",
            Error::Persistence { .. } => "PersistenceFailure",
        }
    }
}
