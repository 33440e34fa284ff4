//! Well-known names used inside the descriptor.

// ============================================================================
// Addon profile keys and config keys
// ============================================================================

pub const HTTP_APPLICATION_ROUTING_ADDON_NAME: &str = "httpApplicationRouting";
pub const MONITORING_ADDON_NAME: &str = "omsagent";
pub const MONITORING_LOG_ANALYTICS_WORKSPACE_RESOURCE_ID: &str = "logAnalyticsWorkspaceResourceID";
pub const MONITORING_USING_AAD_MSI_AUTH: &str = "useAADAuth";
pub const VIRTUAL_NODE_ADDON_NAME: &str = "aciConnector";
pub const VIRTUAL_NODE_SUBNET_NAME: &str = "SubnetName";
pub const KUBE_DASHBOARD_ADDON_NAME: &str = "kubeDashboard";
pub const AZURE_POLICY_ADDON_NAME: &str = "azurepolicy";
pub const INGRESS_APPGW_ADDON_NAME: &str = "ingressApplicationGateway";
pub const INGRESS_APPGW_APPLICATION_GATEWAY_NAME: &str = "applicationGatewayName";
pub const INGRESS_APPGW_APPLICATION_GATEWAY_ID: &str = "applicationGatewayId";
pub const INGRESS_APPGW_SUBNET_ID: &str = "subnetId";
pub const INGRESS_APPGW_SUBNET_CIDR: &str = "subnetCIDR";
pub const INGRESS_APPGW_WATCH_NAMESPACE: &str = "watchNamespace";
pub const CONFCOM_ADDON_NAME: &str = "ACCSGXDevicePlugin";
pub const ACC_SGX_QUOTE_HELPER_ENABLED: &str = "ACCSGXQuoteHelperEnabled";
pub const OPEN_SERVICE_MESH_ADDON_NAME: &str = "openServiceMesh";
pub const AZURE_KEYVAULT_SECRETS_PROVIDER_ADDON_NAME: &str = "azureKeyvaultSecretsProvider";
pub const SECRET_ROTATION_ENABLED: &str = "enableSecretRotation";
pub const ROTATION_POLL_INTERVAL: &str = "rotationPollInterval";

/// Addon names accepted on the command line, mapped to their profile key.
///
/// `virtual-node` gets the os type appended to its key.
pub const ADDONS: &[(&str, &str)] = &[
    ("http_application_routing", HTTP_APPLICATION_ROUTING_ADDON_NAME),
    ("monitoring", MONITORING_ADDON_NAME),
    ("virtual-node", VIRTUAL_NODE_ADDON_NAME),
    ("kube-dashboard", KUBE_DASHBOARD_ADDON_NAME),
    ("azure-policy", AZURE_POLICY_ADDON_NAME),
    ("ingress-appgw", INGRESS_APPGW_ADDON_NAME),
    ("confcom", CONFCOM_ADDON_NAME),
    ("open-service-mesh", OPEN_SERVICE_MESH_ADDON_NAME),
    (
        "azure-keyvault-secrets-provider",
        AZURE_KEYVAULT_SECRETS_PROVIDER_ADDON_NAME,
    ),
];

// ============================================================================
// Networking
// ============================================================================

pub const LOAD_BALANCER_SKU_BASIC: &str = "basic";
pub const LOAD_BALANCER_SKU_STANDARD: &str = "standard";

pub const OUTBOUND_TYPE_LOAD_BALANCER: &str = "loadBalancer";
pub const OUTBOUND_TYPE_USER_DEFINED_ROUTING: &str = "userDefinedRouting";
pub const OUTBOUND_TYPE_MANAGED_NAT_GATEWAY: &str = "managedNATGateway";
pub const OUTBOUND_TYPE_USER_ASSIGNED_NAT_GATEWAY: &str = "userAssignedNATGateway";

pub const PRIVATE_DNS_ZONE_SYSTEM: &str = "system";
pub const PRIVATE_DNS_ZONE_NONE: &str = "none";

// ============================================================================
// Node pools
// ============================================================================

pub const NODEPOOL_MODE_SYSTEM: &str = "System";
pub const OS_TYPE_LINUX: &str = "Linux";
pub const VM_SET_TYPE_VMSS: &str = "VirtualMachineScaleSets";
pub const VM_SET_TYPE_AVAILABILITY_SET: &str = "AvailabilitySet";

/// Identity profile key of the kubelet identity.
pub const KUBELET_IDENTITY: &str = "kubeletidentity";

pub const LICENSE_TYPE_WINDOWS_SERVER: &str = "Windows_Server";
pub const LICENSE_TYPE_NONE: &str = "None";

pub const SKU_NAME_BASIC: &str = "Basic";
pub const SKU_TIER_PAID: &str = "Paid";
pub const SKU_TIER_FREE: &str = "Free";

/// Keys accepted by the cluster autoscaler profile (dash form).
pub const AUTOSCALER_PROFILE_KEYS: &[&str] = &[
    "balance-similar-node-groups",
    "expander",
    "max-empty-bulk-delete",
    "max-graceful-termination-sec",
    "max-node-provision-time",
    "max-total-unready-percentage",
    "new-pod-scale-up-delay",
    "ok-total-unready-count",
    "scan-interval",
    "scale-down-delay-after-add",
    "scale-down-delay-after-delete",
    "scale-down-delay-after-failure",
    "scale-down-unneeded-time",
    "scale-down-unready-time",
    "scale-down-utilization-threshold",
    "skip-nodes-with-local-storage",
    "skip-nodes-with-system-pods",
];

/// Look up the profile key for a command-line addon name.
pub fn addon_profile_key(addon: &str) -> Option<&'static str> {
    ADDONS
        .iter()
        .find(|(name, _)| *name == addon)
        .map(|(_, key)| *key)
}
