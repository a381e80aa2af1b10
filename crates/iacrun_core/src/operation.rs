//! Supported operations.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::OrchestratorError;

/// Operation requested by a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    /// `terraform fmt -check`, no initialization
    FormatCheck,
    /// Offline init followed by `terraform validate`
    Validate,
    /// Full init, plan, and plan rendering
    Plan,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FormatCheck => "format-check",
            Self::Validate => "validate",
            Self::Plan => "plan",
        }
    }

    pub fn all() -> [Operation; 3] {
        [Self::FormatCheck, Self::Validate, Self::Plan]
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Operation {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "format-check" | "fmt" | "format" => Ok(Self::FormatCheck),
            "validate" => Ok(Self::Validate),
            "plan" => Ok(Self::Plan),
            other => Err(OrchestratorError::UnsupportedOperation(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_aliases() {
        assert_eq!("fmt".parse::<Operation>().unwrap(), Operation::FormatCheck);
        assert_eq!("Format-Check".parse::<Operation>().unwrap(), Operation::FormatCheck);
        assert_eq!(" PLAN ".parse::<Operation>().unwrap(), Operation::Plan);
        assert!(matches!(
            "apply".parse::<Operation>(),
            Err(OrchestratorError::UnsupportedOperation(op)) if op == "apply"
        ));
    }

    #[test]
    fn test_round_trips_display() {
        for op in Operation::all() {
            assert_eq!(op.as_str().parse::<Operation>().unwrap(), op);
        }
    }
}
