//! Decorator mode.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Whether a context builds a new cluster or patches an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecoratorMode {
    Create,
    Update,
}

impl DecoratorMode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
        }
    }

    #[must_use]
    pub const fn is_create(self) -> bool {
        matches!(self, Self::Create)
    }

    #[must_use]
    pub const fn is_update(self) -> bool {
        matches!(self, Self::Update)
    }
}

impl fmt::Display for DecoratorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DecoratorMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            other => Err(Error::internal(format!(
                "Unexpected decorator mode '{other}'."
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;

    #[test]
    fn test_mode_from_str() {
        assert_eq!("create".parse::<DecoratorMode>().unwrap(), DecoratorMode::Create);
        assert_eq!("update".parse::<DecoratorMode>().unwrap(), DecoratorMode::Update);
    }

    #[test]
    fn test_unknown_mode_is_internal_error() {
        let err = "delete".parse::<DecoratorMode>().unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Internal);
        assert!("Create".parse::<DecoratorMode>().is_err());
    }

    #[test]
    fn test_mode_serde() {
        let mode: DecoratorMode = serde_json::from_str("\"update\"").unwrap();
        assert_eq!(mode, DecoratorMode::Update);
        assert!(serde_json::from_str::<DecoratorMode>("1").is_err());
        assert_eq!(DecoratorMode::Create.to_string(), "create");
    }
}
