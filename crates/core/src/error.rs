//! Naming error model.

use thiserror::Error;

/// Validation failure for protocol names.
///
/// Keep this focused on deterministic naming rules; transport concerns
/// belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NameError {
    /// The service name was empty.
    #[error("service name must not be empty")]
    Empty,

    /// The service name contained the scope delimiter.
    #[error("service name must not contain the scope delimiter: {0:?}")]
    ContainsDelimiter(String),
}
