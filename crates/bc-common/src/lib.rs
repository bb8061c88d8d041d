//! bindcheck common types, IDs, and errors.
//!
//! This crate provides foundational types shared across bc-core modules:
//! - Process identity wrapper
//! - The unified error taxonomy and its failure classification
//! - Output format specifications

pub mod error;
pub mod id;
pub mod output;

pub use error::{format_error_human, Error, ErrorCategory, FailureKind, Result, StructuredError};
pub use id::ProcessId;
pub use output::OutputFormat;

/// Version of the JSON report and error envelopes.
pub const SCHEMA_VERSION: &str = "1.0.0";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_error_reexported() {
        let err = Error::Config("bad key".to_string());
        let text = format_error_human(&err, false);
        assert!(text.contains("bad key"));
        assert!(!text.contains("\x1b["));
    }
}
