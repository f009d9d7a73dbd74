//! Profile names owned by the external tuning service.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Name of a tuned profile (e.g. `"balanced"`, `"latency-performance"`).
///
/// Opaque to the daemon: it is only compared for equality and passed back
/// to the tuning service, never interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileName(String);

impl ProfileName {
    /// Creates a profile name without validation.
    ///
    /// Used for names reported by the tuning service itself.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the underlying string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ProfileName {
    type Err = DomainError;

    /// Parses a user-supplied profile name, trimming surrounding whitespace.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(DomainError::EmptyProfileName);
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl fmt::Display for ProfileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trims_whitespace() {
        let name: ProfileName = "  latency-performance\n".parse().unwrap();
        assert_eq!(name.as_str(), "latency-performance");
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert_eq!("".parse::<ProfileName>(), Err(DomainError::EmptyProfileName));
        assert_eq!("   ".parse::<ProfileName>(), Err(DomainError::EmptyProfileName));
    }

    #[test]
    fn test_serde_is_transparent() {
        let name = ProfileName::new("balanced");
        assert_eq!(serde_json::to_string(&name).unwrap(), "\"balanced\"");
    }
}
