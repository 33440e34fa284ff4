//! Fully-qualified resource id parsing.
//!
//! Ids have the shape
//! `/subscriptions/{sub}/resourceGroups/{rg}/providers/{namespace}/{type}/{name}`.
//! Segment keywords are matched case-insensitively, values are kept verbatim.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// A parsed resource id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceId {
    /// Subscription id.
    pub subscription: String,
    /// Resource group name.
    pub resource_group: String,
    /// Provider namespace, e.g. `Microsoft.ManagedIdentity`.
    pub namespace: String,
    /// Resource type, e.g. `userAssignedIdentities`.
    pub kind: String,
    /// Resource name.
    pub name: String,
}

impl ResourceId {
    /// Parse a fully-qualified id.
    pub fn parse(id: &str) -> Result<Self> {
        let segments: Vec<&str> = id.trim().trim_matches('/').split('/').collect();

        // subscriptions/{s}/resourceGroups/{rg}/providers/{ns}/{type}/{name}
        if segments.len() < 8 || segments.iter().any(|s| s.is_empty()) {
            return Err(Error::invalid_resource_id(id));
        }

        let keyword = |idx: usize, expected: &str| segments[idx].eq_ignore_ascii_case(expected);
        if !keyword(0, "subscriptions") || !keyword(2, "resourceGroups") || !keyword(4, "providers") {
            return Err(Error::invalid_resource_id(id));
        }

        // Nested child resources keep the last type/name pair.
        let rest = &segments[6..];
        if rest.len() % 2 != 0 {
            return Err(Error::invalid_resource_id(id));
        }

        Ok(Self {
            subscription: segments[1].to_string(),
            resource_group: segments[3].to_string(),
            namespace: segments[5].to_string(),
            kind: rest[rest.len() - 2].to_string(),
            name: rest[rest.len() - 1].to_string(),
        })
    }
}

impl FromStr for ResourceId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "/subscriptions/{}/resourceGroups/{}/providers/{}/{}/{}",
            self.subscription, self.resource_group, self.namespace, self.kind, self.name
        )
    }
}

/// Whether `id` parses as a fully-qualified resource id.
pub fn is_valid_resource_id(id: &str) -> bool {
    ResourceId::parse(id).is_ok()
}
