//! Precedence between raw parameters and the attached descriptor.
//!
//! Every accessor reconciles its raw value with what the descriptor already
//! holds using the same rule:
//!
//! | mode   | raw set | descriptor set | result                 |
//! |--------|---------|----------------|------------------------|
//! | update | no      | any            | `Unset` (no change)    |
//! | any    | yes     | any            | `Raw`                  |
//! | create | no      | yes            | `Descriptor`           |
//! | create | no      | no             | `Unset` (may complete) |

use crate::mode::DecoratorMode;

/// Outcome of reconciling one parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved<T> {
    /// Supplied by the user.
    Raw(T),
    /// Read back from the attached descriptor.
    Descriptor(T),
    /// Neither source has a value.
    Unset,
}

impl<T> Resolved<T> {
    /// Apply the mode-aware precedence rule.
    ///
    /// The descriptor lookup only runs when it can affect the outcome.
    pub fn resolve(
        mode: DecoratorMode,
        raw: Option<T>,
        descriptor: impl FnOnce() -> Option<T>,
    ) -> Self {
        match (mode, raw) {
            (_, Some(value)) => Self::Raw(value),
            (DecoratorMode::Update, None) => Self::Unset,
            (DecoratorMode::Create, None) => descriptor().map_or(Self::Unset, Self::Descriptor),
        }
    }

    /// Raw first, then descriptor, regardless of mode.
    ///
    /// Used by parameters whose stored value is itself under validation.
    pub fn reconcile(raw: Option<T>, descriptor: impl FnOnce() -> Option<T>) -> Self {
        match raw {
            Some(value) => Self::Raw(value),
            None => descriptor().map_or(Self::Unset, Self::Descriptor),
        }
    }

    pub const fn is_descriptor(&self) -> bool {
        matches!(self, Self::Descriptor(_))
    }

    pub const fn is_set(&self) -> bool {
        !matches!(self, Self::Unset)
    }

    pub const fn as_ref(&self) -> Resolved<&T> {
        match self {
            Self::Raw(v) => Resolved::Raw(v),
            Self::Descriptor(v) => Resolved::Descriptor(v),
            Self::Unset => Resolved::Unset,
        }
    }

    /// Map the value while keeping its origin.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Resolved<U> {
        match self {
            Self::Raw(v) => Resolved::Raw(f(v)),
            Self::Descriptor(v) => Resolved::Descriptor(f(v)),
            Self::Unset => Resolved::Unset,
        }
    }

    /// Drop the origin.
    pub fn value(self) -> Option<T> {
        match self {
            Self::Raw(v) | Self::Descriptor(v) => Some(v),
            Self::Unset => None,
        }
    }

    /// The value, or `default` when unset.
    pub fn or(self, default: T) -> T {
        self.value().unwrap_or(default)
    }

    /// The value, or a lazily computed default when unset.
    pub fn or_else_with(self, f: impl FnOnce() -> T) -> T {
        self.value().unwrap_or_else(f)
    }
}

impl<T: Default> Resolved<T> {
    pub fn or_default(self) -> T {
        self.value().unwrap_or_default()
    }
}
