//! Prescription Order Domain

/// Prescription aggregate, resolver and registry
pub mod prescriptions;

/// Domain errors
pub mod errors;

/// Injected configuration
pub mod config;

pub use config::OrderConfig;
pub use errors::Error;
