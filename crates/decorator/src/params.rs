//! Typed raw parameters.
//!
//! Field names follow the command-line flags with dashes replaced by
//! underscores, so `--enable-managed-identity` is `enable_managed_identity`.
//! Every field is optional: `None` means the flag was not given.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// User-supplied parameters for one create or update invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawParameters {
    // ------------------------------------------------------------------------
    // Basics
    // ------------------------------------------------------------------------
    pub resource_group_name: Option<String>,
    pub name: Option<String>,
    pub location: Option<String>,
    pub tags: Option<BTreeMap<String, String>>,
    pub kubernetes_version: Option<String>,
    pub dns_name_prefix: Option<String>,
    pub node_osdisk_diskencryptionset_id: Option<String>,
    pub yes: Option<bool>,
    pub no_wait: Option<bool>,
    /// Comma separated `key=value` pairs sent as request headers.
    pub aks_custom_headers: Option<String>,
    pub edge_zone: Option<String>,
    pub node_resource_group: Option<String>,

    // ------------------------------------------------------------------------
    // Linux / Windows
    // ------------------------------------------------------------------------
    pub ssh_key_value: Option<String>,
    pub no_ssh_key: Option<bool>,
    pub admin_username: Option<String>,
    pub windows_admin_username: Option<String>,
    pub windows_admin_password: Option<String>,
    pub enable_ahub: Option<bool>,
    pub disable_ahub: Option<bool>,
    pub enable_windows_gmsa: Option<bool>,
    pub gmsa_dns_server: Option<String>,
    pub gmsa_root_domain_name: Option<String>,

    // ------------------------------------------------------------------------
    // Identity, service principal, registry
    // ------------------------------------------------------------------------
    pub service_principal: Option<String>,
    pub client_secret: Option<String>,
    pub enable_managed_identity: Option<bool>,
    pub skip_subnet_role_assignment: Option<bool>,
    /// Resource id of the user-assigned control plane identity.
    pub assign_identity: Option<String>,
    /// Resource id of the user-assigned kubelet identity.
    pub assign_kubelet_identity: Option<String>,
    pub attach_acr: Option<String>,
    pub detach_acr: Option<String>,

    // ------------------------------------------------------------------------
    // Network
    // ------------------------------------------------------------------------
    pub load_balancer_sku: Option<String>,
    pub load_balancer_managed_outbound_ip_count: Option<u32>,
    /// Comma separated public IP resource ids.
    pub load_balancer_outbound_ips: Option<String>,
    /// Comma separated public IP prefix resource ids.
    pub load_balancer_outbound_ip_prefixes: Option<String>,
    pub load_balancer_outbound_ports: Option<u32>,
    pub load_balancer_idle_timeout: Option<u32>,
    pub nat_gateway_managed_outbound_ip_count: Option<u32>,
    pub nat_gateway_idle_timeout: Option<u32>,
    pub outbound_type: Option<String>,
    pub network_plugin: Option<String>,
    pub network_policy: Option<String>,
    pub pod_cidr: Option<String>,
    pub service_cidr: Option<String>,
    pub dns_service_ip: Option<String>,
    pub docker_bridge_address: Option<String>,

    // ------------------------------------------------------------------------
    // Node pool
    // ------------------------------------------------------------------------
    pub nodepool_name: Option<String>,
    pub nodepool_tags: Option<BTreeMap<String, String>>,
    pub nodepool_labels: Option<BTreeMap<String, String>>,
    pub node_count: Option<u32>,
    pub node_vm_size: Option<String>,
    pub vnet_subnet_id: Option<String>,
    pub ppg: Option<String>,
    pub zones: Option<Vec<String>>,
    pub enable_node_public_ip: Option<bool>,
    pub node_public_ip_prefix_id: Option<String>,
    pub enable_encryption_at_host: Option<bool>,
    pub enable_ultra_ssd: Option<bool>,
    pub max_pods: Option<u32>,
    pub node_osdisk_size: Option<u32>,
    pub node_osdisk_type: Option<String>,
    pub vm_set_type: Option<String>,
    pub enable_cluster_autoscaler: Option<bool>,
    pub disable_cluster_autoscaler: Option<bool>,
    pub update_cluster_autoscaler: Option<bool>,
    pub min_count: Option<u32>,
    pub max_count: Option<u32>,

    // ------------------------------------------------------------------------
    // Addons
    // ------------------------------------------------------------------------
    /// Comma separated addon names.
    pub enable_addons: Option<String>,
    pub workspace_resource_id: Option<String>,
    pub enable_msi_auth_for_monitoring: Option<bool>,
    pub aci_subnet_name: Option<String>,
    pub appgw_name: Option<String>,
    pub appgw_subnet_cidr: Option<String>,
    pub appgw_id: Option<String>,
    pub appgw_subnet_id: Option<String>,
    pub appgw_watch_namespace: Option<String>,
    pub enable_sgxquotehelper: Option<bool>,
    pub enable_secret_rotation: Option<bool>,
    pub disable_secret_rotation: Option<bool>,
    pub rotation_poll_interval: Option<String>,

    // ------------------------------------------------------------------------
    // AAD and RBAC
    // ------------------------------------------------------------------------
    pub enable_aad: Option<bool>,
    pub aad_client_app_id: Option<String>,
    pub aad_server_app_id: Option<String>,
    pub aad_server_app_secret: Option<String>,
    pub aad_tenant_id: Option<String>,
    /// Comma separated group object ids.
    pub aad_admin_group_object_ids: Option<String>,
    pub enable_rbac: Option<bool>,
    pub disable_rbac: Option<bool>,
    pub enable_azure_rbac: Option<bool>,
    pub disable_azure_rbac: Option<bool>,

    // ------------------------------------------------------------------------
    // API server
    // ------------------------------------------------------------------------
    /// Comma separated CIDRs. An empty string clears the ranges on update.
    pub api_server_authorized_ip_ranges: Option<String>,
    pub fqdn_subdomain: Option<String>,
    pub enable_private_cluster: Option<bool>,
    pub disable_public_fqdn: Option<bool>,
    pub enable_public_fqdn: Option<bool>,
    pub private_dns_zone: Option<String>,

    // ------------------------------------------------------------------------
    // Misc
    // ------------------------------------------------------------------------
    pub auto_upgrade_channel: Option<String>,
    /// Autoscaler settings keyed by dash or underscore form.
    pub cluster_autoscaler_profile: Option<BTreeMap<String, String>>,
    pub uptime_sla: Option<bool>,
    pub no_uptime_sla: Option<bool>,
    pub disable_local_accounts: Option<bool>,
    pub enable_local_accounts: Option<bool>,
}

/// Keys that identify the cluster rather than request a change.
const IDENTIFYING_KEYS: &[&str] = &["resource_group_name", "name"];

impl RawParameters {
    /// Whether any parameter other than the cluster's identity carries a
    /// truthy value (`true`, a non-empty string, a non-zero number or a
    /// non-empty collection).
    pub fn has_truthy_changes(&self) -> Result<bool> {
        let value = serde_json::to_value(self)
            .map_err(|e| Error::internal(format!("failed to inspect raw parameters: {e}")))?;
        let Value::Object(map) = value else {
            return Err(Error::internal("raw parameters did not serialize to a mapping"));
        };
        Ok(map
            .iter()
            .filter(|(key, _)| !IDENTIFYING_KEYS.contains(&key.as_str()))
            .any(|(_, value)| is_truthy(value)))
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Split a comma separated list, dropping empty items.
pub(crate) fn split_comma(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
