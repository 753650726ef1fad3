//! Topic naming and per-service scoping.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::NameError;

/// Delimiter between the service scope and the logical topic name.
pub const SCOPE_DELIMITER: char = ':';

/// Name of the service a publisher or dispatcher acts for.
///
/// Validated at construction: non-empty and free of the scope delimiter.
/// Because the delimiter can never occur inside a service name, everything
/// up to the first delimiter of a qualified topic identifies the service,
/// so two services can never produce colliding topic keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceName(String);

impl ServiceName {
    pub fn new(name: impl Into<String>) -> Result<Self, NameError> {
        let name = name.into();
        if name.is_empty() {
            return Err(NameError::Empty);
        }
        if name.contains(SCOPE_DELIMITER) {
            return Err(NameError::ContainsDelimiter(name));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for ServiceName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for ServiceName {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Fully-qualified topic key used for publish, subscribe and backlog
/// storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topic(String);

impl Topic {
    /// Derive the qualified key for a logical topic within a service scope.
    pub fn scoped(service: &ServiceName, name: &str) -> Self {
        Self(format!("{}{}{}", service.as_str(), SCOPE_DELIMITER, name))
    }

    /// Wrap an already-qualified key, e.g. a channel name reported by the
    /// backing bus.
    pub fn from_qualified(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Topic {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}
