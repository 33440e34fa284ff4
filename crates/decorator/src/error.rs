//! Error types for parameter resolution and descriptor construction.
//!
//! Every failure is classified by an [`ErrorCategory`] so the front end can
//! print consistent advice without matching on individual variants.

use std::fmt;

/// Result type alias for decorator operations.
pub type Result<T> = std::result::Result<T, Error>;

/// User-facing kinds of decorator errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// A contract was broken inside the engine.
    Internal,
    /// A required parameter was not supplied.
    MissingArgument,
    /// A parameter value is not acceptable.
    InvalidArgument,
    /// Parameters that cannot be combined were supplied together.
    MutuallyExclusive,
    /// A prompt was needed but no terminal is attached.
    NoTty,
    /// The stored cluster is not in a shape the operation can work on.
    UnknownState,
    /// The user declined a confirmation.
    Aborted,
    /// A collaborator (cloud, store, prompt) failed.
    Collaborator,
}

impl ErrorCategory {
    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Internal => "Internal error",
            Self::MissingArgument => "Missing argument",
            Self::InvalidArgument => "Invalid argument value",
            Self::MutuallyExclusive => "Conflicting arguments",
            Self::NoTty => "No terminal available",
            Self::UnknownState => "Unexpected cluster state",
            Self::Aborted => "Operation cancelled",
            Self::Collaborator => "Backend error",
        }
    }

    /// Get actionable advice for resolving this error category.
    #[must_use]
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Internal => "This is a bug, please report it with the command you ran",
            Self::MissingArgument => "Supply the missing parameter with --set or in the params file",
            Self::InvalidArgument => "Check the parameter value and try again",
            Self::MutuallyExclusive => "Remove one of the conflicting parameters",
            Self::NoTty => "Pass the value explicitly or run from an interactive terminal",
            Self::UnknownState => "Inspect the stored cluster with `akscli show`",
            Self::Aborted => "Nothing was changed",
            Self::Collaborator => "Check your configuration and the error details",
        }
    }

    /// Whether the error should end the command successfully.
    #[must_use]
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::Aborted)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur while resolving parameters or building a descriptor.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Engine misuse, e.g. a phase run before a descriptor was attached.
    #[error("{0}")]
    Internal(String),

    /// A required parameter is missing.
    #[error("{0}")]
    RequiredArgumentMissing(String),

    /// A parameter value was rejected.
    #[error("{0}")]
    InvalidArgumentValue(String),

    /// Two or more parameters conflict.
    #[error("{0}")]
    MutuallyExclusiveArguments(String),

    /// A value had to be prompted for without a terminal.
    #[error("{0}")]
    NoTty(String),

    /// The stored descriptor lacks something the operation needs.
    #[error("{0}")]
    UnknownState(String),

    /// An update asked for a state the cluster is already in.
    #[error("cannot apply --{parameter}: the cluster autoscaler is currently {current} for this node pool")]
    StateTransition {
        /// Flag that requested the transition, in dash form.
        parameter: String,
        /// Current state of the target.
        current: String,
    },

    /// The user declined a confirmation prompt.
    #[error("operation cancelled by user")]
    EarlyExit,

    /// A collaborator call failed.
    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),
}

impl Error {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn missing(message: impl Into<String>) -> Self {
        Self::RequiredArgumentMissing(message.into())
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgumentValue(message.into())
    }

    pub fn exclusive(message: impl Into<String>) -> Self {
        Self::MutuallyExclusiveArguments(message.into())
    }

    pub fn no_tty(message: impl Into<String>) -> Self {
        Self::NoTty(message.into())
    }

    pub fn unknown_state(message: impl Into<String>) -> Self {
        Self::UnknownState(message.into())
    }

    /// Create a state transition error.
    pub fn state_transition(parameter: impl Into<String>, current: impl Into<String>) -> Self {
        Self::StateTransition {
            parameter: parameter.into(),
            current: current.into(),
        }
    }

    /// Get the error category.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Internal(_) => ErrorCategory::Internal,
            Self::RequiredArgumentMissing(_) => ErrorCategory::MissingArgument,
            Self::InvalidArgumentValue(_) | Self::StateTransition { .. } => {
                ErrorCategory::InvalidArgument
            }
            Self::MutuallyExclusiveArguments(_) => ErrorCategory::MutuallyExclusive,
            Self::NoTty(_) => ErrorCategory::NoTty,
            Self::UnknownState(_) => ErrorCategory::UnknownState,
            Self::EarlyExit => ErrorCategory::Aborted,
            Self::Collaborator(_) => ErrorCategory::Collaborator,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category_description_and_advice() {
        for category in [
            ErrorCategory::Internal,
            ErrorCategory::MissingArgument,
            ErrorCategory::InvalidArgument,
            ErrorCategory::MutuallyExclusive,
            ErrorCategory::NoTty,
            ErrorCategory::UnknownState,
            ErrorCategory::Aborted,
            ErrorCategory::Collaborator,
        ] {
            assert!(!category.description().is_empty());
            assert!(!category.advice().is_empty());
        }
    }

    #[test]
    fn test_error_category_display() {
        assert_eq!(ErrorCategory::NoTty.to_string(), "No terminal available");
    }

    #[test]
    fn test_state_transition_is_invalid_argument() {
        let err = Error::state_transition("enable-cluster-autoscaler", "enabled");
        assert_eq!(err.category(), ErrorCategory::InvalidArgument);
        assert!(err.to_string().contains("enable-cluster-autoscaler"));
        assert!(err.to_string().contains("enabled"));
    }

    #[test]
    fn test_early_exit_is_benign() {
        assert!(Error::EarlyExit.category().is_benign());
        assert!(!Error::invalid("x").category().is_benign());
    }

    #[test]
    fn test_collaborator_error_is_transparent() {
        let err = Error::from(anyhow::anyhow!("subscription lookup failed"));
        assert_eq!(err.to_string(), "subscription lookup failed");
        assert_eq!(err.category(), ErrorCategory::Collaborator);
    }

    #[test]
    fn test_message_variants_display_verbatim() {
        let err = Error::missing("No assigned identity provided.");
        assert_eq!(err.to_string(), "No assigned identity provided.");
        assert_eq!(err.category(), ErrorCategory::MissingArgument);
    }
}
