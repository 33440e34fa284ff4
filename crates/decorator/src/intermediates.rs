//! Per-invocation store of values computed while resolving parameters.
//!
//! Accessors record dynamically completed values here so that a second call
//! returns the same answer without talking to a collaborator again.

use log::{debug, warn};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::BTreeMap;

pub const SUBSCRIPTION_ID: &str = "subscription_id";
pub const LOCATION: &str = "location";
pub const SERVICE_PRINCIPAL: &str = "service_principal";
pub const CLIENT_SECRET: &str = "client_secret";
pub const AAD_SESSION_KEY: &str = "aad_session_key";
pub const WINDOWS_ADMIN_USERNAME: &str = "windows_admin_username";
pub const WINDOWS_ADMIN_PASSWORD: &str = "windows_admin_password";
pub const WORKSPACE_RESOURCE_ID: &str = "workspace_resource_id";
pub const TENANT_ID: &str = "aad_tenant_id";
pub const MONITORING_ADDON_ENABLED: &str = "monitoring_addon_enabled";
pub const VIRTUAL_NODE_ADDON_ENABLED: &str = "virtual_node_addon_enabled";
pub const INGRESS_APPGW_ADDON_ENABLED: &str = "ingress_appgw_addon_enabled";
pub const NEED_POST_CREATION_VNET_PERMISSION: &str = "need_post_creation_vnet_permission_granting";
pub const CUSTOM_HEADERS: &str = "custom_headers";
pub const GMSA_CONFIRMED: &str = "gmsa_dns_confirmed";

/// Key/value cache keyed by intermediate name.
#[derive(Debug, Default)]
pub struct Intermediates {
    values: RefCell<BTreeMap<String, Value>>,
}

impl Intermediates {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a value, or `None` if it was never set.
    pub fn get(&self, key: &str) -> Option<Value> {
        let value = self.values.borrow().get(key).cloned();
        if value.is_none() {
            debug!("intermediate '{key}' does not exist");
        }
        value
    }

    /// Get a value, falling back to `default`.
    pub fn get_or(&self, key: &str, default: Value) -> Value {
        self.get(key).unwrap_or(default)
    }

    /// Get a string value.
    pub fn get_str(&self, key: &str) -> Option<String> {
        self.get(key).and_then(|v| v.as_str().map(str::to_string))
    }

    /// Get a boolean value, `false` when unset.
    pub fn get_flag(&self, key: &str) -> bool {
        self.get(key).and_then(|v| v.as_bool()).unwrap_or(false)
    }

    /// Insert a value.
    ///
    /// An existing value is only replaced when `overwrite` is set. Otherwise
    /// the old value is kept, with a warning if the candidate differs.
    pub fn set(&self, key: &str, value: impl Into<Value>, overwrite: bool) {
        let value = value.into();
        let mut values = self.values.borrow_mut();
        match values.get(key) {
            Some(existing) if overwrite => {
                debug!("intermediate '{key}' overwritten: {existing} -> {value}");
                values.insert(key.to_string(), value);
            }
            Some(existing) => {
                if existing != &value {
                    warn!(
                        "intermediate '{key}' already exists and overwrite is not enabled \
                         (kept {existing}, ignored {value})"
                    );
                }
            }
            None => {
                values.insert(key.to_string(), value);
            }
        }
    }

    /// Remove a value. Removing a missing key is a no-op.
    pub fn remove(&self, key: &str) {
        self.values.borrow_mut().remove(key);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.borrow().contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_and_get() {
        let store = Intermediates::new();
        assert_eq!(store.get("k"), None);
        store.set("k", "v", false);
        assert_eq!(store.get_str("k").as_deref(), Some("v"));
    }

    #[test]
    fn test_set_without_overwrite_keeps_existing() {
        let store = Intermediates::new();
        store.set("k", 1, false);
        store.set("k", 2, false);
        assert_eq!(store.get("k"), Some(json!(1)));
        store.set("k", 3, true);
        assert_eq!(store.get("k"), Some(json!(3)));
    }

    #[test]
    fn test_get_or_and_flag() {
        let store = Intermediates::new();
        assert_eq!(store.get_or("missing", json!("d")), json!("d"));
        assert!(!store.get_flag(MONITORING_ADDON_ENABLED));
        store.set(MONITORING_ADDON_ENABLED, true, true);
        assert!(store.get_flag(MONITORING_ADDON_ENABLED));
    }

    #[test]
    fn test_remove_missing_is_noop() {
        let store = Intermediates::new();
        store.remove("nothing");
        store.set("k", "v", false);
        store.remove("k");
        assert!(!store.contains("k"));
    }
}
