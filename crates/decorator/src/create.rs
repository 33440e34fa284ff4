//! Construction of a new managed cluster.
//!
//! [`CreateDecorator::construct_mc_profile_default`] attaches an empty
//! descriptor to the context and runs one phase per sub-profile over it.
//! [`CreateDecorator::create_mc`] submits the result and performs the role
//! assignments that can only happen once the cluster exists.

use crate::context::{DecoratorContext, virtual_node_addon_key};
use crate::error::{Error, Result};
use crate::external::{CloudBackend, ClusterClient, ContainerInsightsRequest, SecretSource};
use crate::intermediates::{
    AAD_SESSION_KEY, CUSTOM_HEADERS, INGRESS_APPGW_ADDON_ENABLED, MONITORING_ADDON_ENABLED,
    NEED_POST_CREATION_VNET_PERMISSION, VIRTUAL_NODE_ADDON_ENABLED,
};
use crate::mode::DecoratorMode;
use crate::params::RawParameters;
use crate::postprocess::{
    NETWORK_CONTRIBUTOR, SUBNET_ROLE_ASSIGNMENT_FAILED, addons_need_postprocessing,
    postprocessing_after_mc_created,
};
use clustermodel::consts::{
    ACC_SGX_QUOTE_HELPER_ENABLED, AZURE_KEYVAULT_SECRETS_PROVIDER_ADDON_NAME,
    AZURE_POLICY_ADDON_NAME, CONFCOM_ADDON_NAME, HTTP_APPLICATION_ROUTING_ADDON_NAME,
    INGRESS_APPGW_ADDON_NAME, INGRESS_APPGW_APPLICATION_GATEWAY_ID,
    INGRESS_APPGW_APPLICATION_GATEWAY_NAME, INGRESS_APPGW_SUBNET_CIDR, INGRESS_APPGW_SUBNET_ID,
    INGRESS_APPGW_WATCH_NAMESPACE, KUBE_DASHBOARD_ADDON_NAME, KUBELET_IDENTITY,
    LICENSE_TYPE_WINDOWS_SERVER, LOAD_BALANCER_SKU_BASIC, LOAD_BALANCER_SKU_STANDARD,
    MONITORING_ADDON_NAME, MONITORING_LOG_ANALYTICS_WORKSPACE_RESOURCE_ID,
    MONITORING_USING_AAD_MSI_AUTH, NODEPOOL_MODE_SYSTEM, OPEN_SERVICE_MESH_ADDON_NAME,
    OS_TYPE_LINUX, ROTATION_POLL_INTERVAL, SECRET_ROTATION_ENABLED, SKU_NAME_BASIC, SKU_TIER_PAID,
    VIRTUAL_NODE_SUBNET_NAME,
};
use clustermodel::{
    AadProfile, AddonProfile, AgentPoolProfile, ApiServerAccessProfile, AutoUpgradeProfile,
    ClusterIdentity, ExtendedLocation, GmsaProfile, IdentityType, LinuxProfile, ManagedCluster,
    NetworkProfile, ServicePrincipalProfile, Sku, SshConfiguration, SshPublicKey,
    UserAssignedIdentity, WindowsProfile,
};
use log::{debug, info, warn};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

const AAD_SESSION_KEY_HEADER: &str = "Ocp-Aad-Session-Key";
const EXTENDED_LOCATION_EDGE_ZONE: &str = "EdgeZone";
const DEFAULT_ROTATION_POLL_INTERVAL: &str = "2m";

const SYSTEM_ASSIGNED_SUBNET_PROMPT: &str = "It is highly recommended to use USER assigned identity \
    (option --assign-identity) when you want to bring your own subnet, which will have no latency \
    for the role assignment to take effect. When using SYSTEM assigned identity, the Network \
    Contributor role will be granted to the system assigned identity after the cluster is created, \
    and the role assignment will take some time to take effect, see \
    https://docs.microsoft.com/azure/aks/use-managed-identity, proceed to create cluster with \
    system assigned identity?";

fn bool_config(value: bool) -> String {
    if value { "true" } else { "false" }.to_string()
}

/// Builds and submits a new managed cluster.
pub struct CreateDecorator {
    ctx: DecoratorContext,
    client: Arc<dyn ClusterClient>,
}

impl CreateDecorator {
    pub fn new(
        raw: RawParameters,
        cloud: Arc<dyn CloudBackend>,
        secrets: Arc<dyn SecretSource>,
        client: Arc<dyn ClusterClient>,
    ) -> Result<Self> {
        Ok(Self {
            ctx: DecoratorContext::new(raw, DecoratorMode::Create, cloud, secrets)?,
            client,
        })
    }

    pub fn context(&self) -> &DecoratorContext {
        &self.ctx
    }

    fn mc_mut(&mut self) -> Result<&mut ManagedCluster> {
        self.ctx.mc_mut()
    }

    /// Phases may only run once `init_mc` attached a descriptor.
    fn ensure_mc(&self) -> Result<()> {
        self.ctx.require_mc().map(|_| ())
    }

    // ========================================================================
    // Phases
    // ========================================================================

    pub fn init_mc(&mut self) -> Result<()> {
        let location = self.ctx.get_location()?;
        self.ctx.attach_mc(ManagedCluster::new(location))
    }

    /// The single system node pool.
    pub fn set_up_agentpool_profile(&mut self) -> Result<()> {
        self.ensure_mc()?;
        let ctx = &self.ctx;
        let (enable_auto_scaling, min_count, max_count) =
            ctx.get_enable_cluster_autoscaler_and_min_count_and_max_count()?;
        let kubernetes_version = ctx.get_kubernetes_version();
        let pool = AgentPoolProfile {
            name: ctx.get_nodepool_name(true),
            count: Some(ctx.get_node_count()),
            vm_size: Some(ctx.get_node_vm_size()),
            os_type: Some(OS_TYPE_LINUX.to_string()),
            mode: Some(NODEPOOL_MODE_SYSTEM.to_string()),
            vm_set_type: Some(ctx.get_vm_set_type()?),
            orchestrator_version: Some(kubernetes_version).filter(|v| !v.is_empty()),
            vnet_subnet_id: ctx.get_vnet_subnet_id(),
            proximity_placement_group_id: ctx.get_ppg(),
            availability_zones: ctx.get_zones(),
            enable_node_public_ip: Some(ctx.get_enable_node_public_ip()),
            node_public_ip_prefix_id: ctx.get_node_public_ip_prefix_id(),
            enable_encryption_at_host: Some(ctx.get_enable_encryption_at_host()),
            enable_ultra_ssd: Some(ctx.get_enable_ultra_ssd()),
            max_pods: ctx.get_max_pods(),
            os_disk_size_gb: ctx.get_node_osdisk_size(),
            os_disk_type: ctx.get_node_osdisk_type(),
            enable_auto_scaling: Some(enable_auto_scaling),
            min_count,
            max_count,
            tags: ctx.get_nodepool_tags(),
            node_labels: ctx.get_nodepool_labels(),
        };
        self.mc_mut()?.agent_pool_profiles = Some(vec![pool]);
        Ok(())
    }

    pub fn set_up_mc_properties(&mut self) -> Result<()> {
        self.ensure_mc()?;
        let tags = self.ctx.get_tags();
        let kubernetes_version = Some(self.ctx.get_kubernetes_version()).filter(|v| !v.is_empty());
        let dns_prefix = self.ctx.get_dns_name_prefix()?;
        let disk_encryption_set_id = self.ctx.get_node_osdisk_diskencryptionset_id();
        let disable_local_accounts = self.ctx.get_disable_local_accounts()?;
        let enable_rbac = !self.ctx.get_disable_rbac()?;

        let mc = self.mc_mut()?;
        mc.tags = tags;
        mc.kubernetes_version = kubernetes_version;
        mc.dns_prefix = dns_prefix;
        mc.disk_encryption_set_id = disk_encryption_set_id;
        mc.disable_local_accounts = Some(disable_local_accounts);
        mc.enable_rbac = Some(enable_rbac);
        Ok(())
    }

    pub fn set_up_linux_profile(&mut self) -> Result<()> {
        self.ensure_mc()?;
        let (key, no_ssh_key) = self.ctx.get_ssh_key_value_and_no_ssh_key()?;
        let profile = match key {
            Some(key_data) if !no_ssh_key => Some(LinuxProfile {
                admin_username: self.ctx.get_admin_username(),
                ssh: SshConfiguration {
                    public_keys: vec![SshPublicKey { key_data }],
                },
            }),
            _ => None,
        };
        self.mc_mut()?.linux_profile = profile;
        Ok(())
    }

    pub fn set_up_windows_profile(&mut self) -> Result<()> {
        self.ensure_mc()?;
        let (admin_username, admin_password) = self.ctx.get_windows_admin_username_and_password()?;
        let profile = if admin_username.is_some() || admin_password.is_some() {
            let license_type = self
                .ctx
                .get_enable_ahub()?
                .then(|| LICENSE_TYPE_WINDOWS_SERVER.to_string());
            let gmsa_profile = if self.ctx.get_enable_windows_gmsa()? {
                let (dns_server, root_domain_name) =
                    self.ctx.get_gmsa_dns_server_and_root_domain_name()?;
                Some(GmsaProfile {
                    enabled: true,
                    dns_server,
                    root_domain_name,
                })
            } else {
                None
            };
            Some(WindowsProfile {
                admin_username,
                admin_password,
                license_type,
                gmsa_profile,
            })
        } else {
            None
        };
        self.mc_mut()?.windows_profile = profile;
        Ok(())
    }

    /// Skipped when a managed identity is used without explicit credentials.
    pub fn set_up_service_principal_profile(&mut self) -> Result<()> {
        self.ensure_mc()?;
        let (service_principal, client_secret) = self.ctx.get_service_principal_and_client_secret()?;
        let msi_only = self.ctx.get_enable_managed_identity()?
            && service_principal.is_none()
            && client_secret.is_none();
        let profile = (!msi_only).then(|| ServicePrincipalProfile {
            client_id: service_principal.unwrap_or_default(),
            secret: client_secret,
        });
        self.mc_mut()?.service_principal_profile = profile;
        Ok(())
    }

    /// Grant Network Contributor on a custom subnet, or defer it until the
    /// system-assigned identity exists.
    pub fn process_add_role_assignment_for_vnet_subnet(&self) -> Result<()> {
        self.ensure_mc()?;
        let ctx = &self.ctx;
        let mut need_post_creation_grant = false;
        if let Some(subnet_id) = ctx.get_vnet_subnet_id().filter(|id| !id.is_empty())
            && !ctx.get_skip_subnet_role_assignment()
            && !ctx.cloud().subnet_role_assignment_exists(&subnet_id)?
        {
            let service_principal = ctx
                .require_mc()?
                .service_principal_profile
                .as_ref()
                .map(|p| p.client_id.clone());
            let assign_identity = ctx.get_assign_identity()?.filter(|id| !id.is_empty());
            if service_principal.is_none() && assign_identity.is_none() {
                ctx.confirm_or_exit(SYSTEM_ASSIGNED_SUBNET_PROMPT)?;
                need_post_creation_grant = true;
            } else {
                let assignee = match assign_identity {
                    Some(_) => ctx.get_user_assigned_identity_client_id()?,
                    None => service_principal.unwrap_or_default(),
                };
                if !ctx
                    .cloud()
                    .add_role_assignment(NETWORK_CONTRIBUTOR, &assignee, &subnet_id, true)?
                {
                    warn!("{SUBNET_ROLE_ASSIGNMENT_FAILED}");
                }
            }
        }
        ctx.set_intermediate(NEED_POST_CREATION_VNET_PERMISSION, need_post_creation_grant, true);
        Ok(())
    }

    /// Without a managed identity the registry is granted to the service principal.
    pub fn process_attach_acr(&self) -> Result<()> {
        self.ensure_mc()?;
        let Some(acr) = self.ctx.get_attach_acr()?.filter(|acr| !acr.is_empty()) else {
            return Ok(());
        };
        if self.ctx.get_enable_managed_identity()? {
            return Ok(());
        }
        let client_id = self
            .ctx
            .require_mc()?
            .service_principal_profile
            .as_ref()
            .map(|p| p.client_id.clone())
            .ok_or_else(|| {
                Error::missing(
                    "No service principal provided to create the acrpull role assignment for acr.",
                )
            })?;
        self.ctx
            .cloud()
            .ensure_acr(&client_id, &acr, &self.ctx.get_subscription_id()?, false, true)?;
        Ok(())
    }

    pub fn set_up_network_profile(&mut self) -> Result<()> {
        self.ensure_mc()?;
        let ctx = &self.ctx;
        let load_balancer_profile = ctx.get_load_balancer_settings()?.create_profile();
        let outbound_type = ctx.get_outbound_type(load_balancer_profile.as_ref())?;
        let sku = ctx.get_load_balancer_sku()?;
        let network_plugin = ctx.get_network_plugin()?;
        let addressing = ctx
            .get_pod_cidr_and_service_cidr_and_dns_service_ip_and_docker_bridge_address_and_network_policy()?;
        let nat_gateway_profile = ctx.get_nat_gateway_settings()?.create_profile();

        let mut profile = if network_plugin.as_deref().is_some_and(|p| !p.is_empty())
            || addressing.any()
        {
            Some(NetworkProfile {
                network_plugin,
                network_policy: addressing.network_policy,
                pod_cidr: addressing.pod_cidr,
                service_cidr: addressing.service_cidr,
                dns_service_ip: addressing.dns_service_ip,
                docker_bridge_cidr: addressing.docker_bridge_address,
                outbound_type: Some(outbound_type),
                load_balancer_sku: Some(sku.clone()),
                load_balancer_profile,
                nat_gateway_profile: None,
            })
        } else if sku == LOAD_BALANCER_SKU_BASIC {
            Some(NetworkProfile {
                load_balancer_sku: Some(sku.clone()),
                ..NetworkProfile::default()
            })
        } else if sku == LOAD_BALANCER_SKU_STANDARD || load_balancer_profile.is_some() {
            Some(NetworkProfile {
                network_plugin: Some("kubenet".to_string()),
                outbound_type: Some(outbound_type),
                load_balancer_sku: Some(sku.clone()),
                load_balancer_profile,
                ..NetworkProfile::default()
            })
        } else {
            None
        };
        if sku != LOAD_BALANCER_SKU_BASIC
            && let Some(profile) = profile.as_mut()
        {
            profile.nat_gateway_profile = nat_gateway_profile;
        }
        self.mc_mut()?.network_profile = profile;
        Ok(())
    }

    // ========================================================================
    // Addons
    // ========================================================================

    fn build_monitoring_addon_profile(&self) -> Result<AddonProfile> {
        let ctx = &self.ctx;
        let msi_auth = ctx.get_enable_msi_auth_for_monitoring().unwrap_or(false);
        let mut config = BTreeMap::new();
        if let Some(workspace) = ctx.get_workspace_resource_id()? {
            config.insert(MONITORING_LOG_ANALYTICS_WORKSPACE_RESOURCE_ID.to_string(), workspace);
        }
        config.insert(
            MONITORING_USING_AAD_MSI_AUTH.to_string(),
            if msi_auth { "True" } else { "False" }.to_string(),
        );
        let addon = AddonProfile::enabled_with(config);
        ctx.cloud().ensure_container_insights(&ContainerInsightsRequest {
            addon: addon.clone(),
            subscription_id: ctx.get_subscription_id()?,
            resource_group: ctx.get_resource_group_name()?,
            cluster_name: ctx.get_name()?,
            location: ctx.get_location()?,
            aad_route: msi_auth,
            create_dcr: true,
            create_dcra: false,
        })?;
        ctx.set_intermediate(MONITORING_ADDON_ENABLED, true, true);
        Ok(addon)
    }

    fn build_virtual_node_addon_profile(&self) -> AddonProfile {
        let mut config = BTreeMap::new();
        if let Some(subnet) = self.ctx.get_aci_subnet_name() {
            config.insert(VIRTUAL_NODE_SUBNET_NAME.to_string(), subnet);
        }
        self.ctx.set_intermediate(VIRTUAL_NODE_ADDON_ENABLED, true, true);
        AddonProfile::enabled_with(config)
    }

    fn build_ingress_appgw_addon_profile(&self) -> AddonProfile {
        let ctx = &self.ctx;
        let config: BTreeMap<String, String> = [
            (INGRESS_APPGW_APPLICATION_GATEWAY_NAME, ctx.get_appgw_name()),
            (INGRESS_APPGW_SUBNET_CIDR, ctx.get_appgw_subnet_cidr()),
            (INGRESS_APPGW_APPLICATION_GATEWAY_ID, ctx.get_appgw_id()),
            (INGRESS_APPGW_SUBNET_ID, ctx.get_appgw_subnet_id()),
            (INGRESS_APPGW_WATCH_NAMESPACE, ctx.get_appgw_watch_namespace()),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.map(|v| (key.to_string(), v)))
        .collect();
        ctx.set_intermediate(INGRESS_APPGW_ADDON_ENABLED, true, true);
        AddonProfile::enabled_with(config)
    }

    fn build_confcom_addon_profile(&self) -> AddonProfile {
        AddonProfile::enabled_with(BTreeMap::from([(
            ACC_SGX_QUOTE_HELPER_ENABLED.to_string(),
            bool_config(self.ctx.get_enable_sgxquotehelper()),
        )]))
    }

    fn build_azure_keyvault_secrets_provider_addon_profile(&self) -> Result<AddonProfile> {
        let interval = self
            .ctx
            .get_rotation_poll_interval()?
            .unwrap_or_else(|| DEFAULT_ROTATION_POLL_INTERVAL.to_string());
        Ok(AddonProfile::enabled_with(BTreeMap::from([
            (
                SECRET_ROTATION_ENABLED.to_string(),
                bool_config(self.ctx.get_enable_secret_rotation()?),
            ),
            (ROTATION_POLL_INTERVAL.to_string(), interval),
        ])))
    }

    pub fn set_up_addon_profiles(&mut self) -> Result<()> {
        self.ensure_mc()?;
        let mut profiles = BTreeMap::new();
        for addon in self.ctx.get_enable_addons()? {
            let (key, profile) = match addon.as_str() {
                "http_application_routing" => (
                    HTTP_APPLICATION_ROUTING_ADDON_NAME.to_string(),
                    AddonProfile::enabled_with(BTreeMap::new()),
                ),
                "kube-dashboard" => (
                    KUBE_DASHBOARD_ADDON_NAME.to_string(),
                    AddonProfile::enabled_with(BTreeMap::new()),
                ),
                "monitoring" => (
                    MONITORING_ADDON_NAME.to_string(),
                    self.build_monitoring_addon_profile()?,
                ),
                "azure-policy" => (
                    AZURE_POLICY_ADDON_NAME.to_string(),
                    AddonProfile::enabled_with(BTreeMap::new()),
                ),
                "virtual-node" => (
                    virtual_node_addon_key(self.ctx.get_virtual_node_addon_os_type()),
                    self.build_virtual_node_addon_profile(),
                ),
                "ingress-appgw" => (
                    INGRESS_APPGW_ADDON_NAME.to_string(),
                    self.build_ingress_appgw_addon_profile(),
                ),
                "confcom" => (
                    CONFCOM_ADDON_NAME.to_string(),
                    self.build_confcom_addon_profile(),
                ),
                "open-service-mesh" => (
                    OPEN_SERVICE_MESH_ADDON_NAME.to_string(),
                    AddonProfile::enabled_with(BTreeMap::new()),
                ),
                "azure-keyvault-secrets-provider" => (
                    AZURE_KEYVAULT_SECRETS_PROVIDER_ADDON_NAME.to_string(),
                    self.build_azure_keyvault_secrets_provider_addon_profile()?,
                ),
                other => {
                    return Err(Error::internal(format!("no profile builder for addon '{other}'")));
                }
            };
            profiles.insert(key, profile);
        }
        self.mc_mut()?.addon_profiles = (!profiles.is_empty()).then_some(profiles);
        Ok(())
    }

    // ========================================================================
    // AAD, API server and identity
    // ========================================================================

    pub fn set_up_aad_profile(&mut self) -> Result<()> {
        self.ensure_mc()?;
        let ctx = &self.ctx;
        let profile = if ctx.get_enable_aad()? {
            Some(AadProfile {
                managed: Some(true),
                enable_azure_rbac: Some(ctx.get_enable_azure_rbac()?),
                admin_group_object_ids: ctx.get_aad_admin_group_object_ids()?,
                tenant_id: ctx.get_aad_tenant_id()?,
                ..AadProfile::default()
            })
        } else {
            let apps = ctx.get_aad_client_app_id_and_aad_server_app_id_and_aad_server_app_secret()?;
            let tenant_id = ctx.get_aad_tenant_id()?;
            let any = [
                &apps.client_app_id,
                &apps.server_app_id,
                &apps.server_app_secret,
                &tenant_id,
            ]
            .iter()
            .any(|v| v.as_deref().is_some_and(|v| !v.is_empty()));
            any.then(|| AadProfile {
                client_app_id: apps.client_app_id,
                server_app_id: apps.server_app_id,
                server_app_secret: apps.server_app_secret,
                tenant_id,
                ..AadProfile::default()
            })
        };
        self.mc_mut()?.aad_profile = profile;
        Ok(())
    }

    pub fn set_up_api_server_access_profile(&mut self) -> Result<()> {
        self.ensure_mc()?;
        let ctx = &self.ctx;
        let ranges = ctx.get_api_server_authorized_ip_ranges()?;
        let private = ctx.get_enable_private_cluster()?;
        let disable_public_fqdn = ctx.get_disable_public_fqdn()?;
        let private_dns_zone = ctx.get_private_dns_zone()?;
        let has_ranges = ranges.as_ref().is_some_and(|r| !r.is_empty());
        let profile = (has_ranges || private).then(|| ApiServerAccessProfile {
            authorized_ip_ranges: ranges.filter(|r| !r.is_empty()),
            enable_private_cluster: private.then_some(true),
            enable_private_cluster_public_fqdn: disable_public_fqdn.then_some(false),
            private_dns_zone,
        });
        let fqdn_subdomain = ctx.get_fqdn_subdomain()?;

        let mc = self.mc_mut()?;
        mc.api_server_access_profile = profile;
        mc.fqdn_subdomain = fqdn_subdomain;
        Ok(())
    }

    pub fn set_up_identity(&mut self) -> Result<()> {
        self.ensure_mc()?;
        let identity = if self.ctx.get_enable_managed_identity()? {
            Some(match self.ctx.get_assign_identity()?.filter(|id| !id.is_empty()) {
                Some(id) => ClusterIdentity {
                    kind: IdentityType::UserAssigned,
                    principal_id: None,
                    user_assigned_identities: Some(BTreeMap::from([(
                        id,
                        UserAssignedIdentity::default(),
                    )])),
                },
                None => ClusterIdentity {
                    kind: IdentityType::SystemAssigned,
                    ..ClusterIdentity::default()
                },
            })
        } else {
            None
        };
        self.mc_mut()?.identity = identity;
        Ok(())
    }

    /// Kubelet identity, with the control plane identity allowed to use it.
    pub fn set_up_identity_profile(&mut self) -> Result<()> {
        self.ensure_mc()?;
        let ctx = &self.ctx;
        let profile = match ctx.get_assign_kubelet_identity()?.filter(|id| !id.is_empty()) {
            Some(resource_id) => {
                let kubelet = ctx.get_identity_by_msi_client(&resource_id)?;
                let cluster_identity_object_id = ctx.get_user_assigned_identity_object_id()?;
                ctx.cloud()
                    .ensure_kubelet_identity_permission(&cluster_identity_object_id, &resource_id)?;
                Some(BTreeMap::from([(
                    KUBELET_IDENTITY.to_string(),
                    UserAssignedIdentity {
                        resource_id: Some(resource_id),
                        client_id: Some(kubelet.client_id),
                        object_id: Some(kubelet.principal_id),
                    },
                )]))
            }
            None => None,
        };
        self.mc_mut()?.identity_profile = profile;
        Ok(())
    }

    // ========================================================================
    // Remaining properties
    // ========================================================================

    pub fn set_up_auto_upgrade_profile(&mut self) -> Result<()> {
        self.ensure_mc()?;
        let profile = self
            .ctx
            .get_auto_upgrade_channel()
            .filter(|c| !c.is_empty())
            .map(|channel| AutoUpgradeProfile {
                upgrade_channel: Some(channel),
            });
        self.mc_mut()?.auto_upgrade_profile = profile;
        Ok(())
    }

    pub fn set_up_auto_scaler_profile(&mut self) -> Result<()> {
        self.ensure_mc()?;
        let profile = self.ctx.get_cluster_autoscaler_profile()?;
        self.mc_mut()?.auto_scaler_profile = profile;
        Ok(())
    }

    pub fn set_up_sku(&mut self) -> Result<()> {
        self.ensure_mc()?;
        let sku = self.ctx.get_uptime_sla()?.then(|| Sku {
            name: SKU_NAME_BASIC.to_string(),
            tier: SKU_TIER_PAID.to_string(),
        });
        self.mc_mut()?.sku = sku;
        Ok(())
    }

    pub fn set_up_extended_location(&mut self) -> Result<()> {
        self.ensure_mc()?;
        let location = self
            .ctx
            .get_edge_zone()
            .filter(|zone| !zone.is_empty())
            .map(|name| ExtendedLocation {
                name,
                kind: EXTENDED_LOCATION_EDGE_ZONE.to_string(),
            });
        self.mc_mut()?.extended_location = location;
        Ok(())
    }

    pub fn set_up_node_resource_group(&mut self) -> Result<()> {
        self.ensure_mc()?;
        let node_resource_group = self.ctx.get_node_resource_group();
        self.mc_mut()?.node_resource_group = node_resource_group;
        Ok(())
    }

    /// Request headers for the submission, kept in an intermediate.
    pub fn build_custom_headers(&self) -> Result<()> {
        self.ensure_mc()?;
        let mut headers = self.ctx.get_aks_custom_headers()?;
        if let Some(key) = self.ctx.intermediates().get_str(AAD_SESSION_KEY) {
            headers.insert(AAD_SESSION_KEY_HEADER.to_string(), key);
        }
        if headers.is_empty() {
            self.ctx.remove_intermediate(CUSTOM_HEADERS);
        } else {
            let value: serde_json::Map<String, Value> = headers
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect();
            self.ctx.set_intermediate(CUSTOM_HEADERS, Value::Object(value), true);
        }
        Ok(())
    }

    /// Run every phase and return the finished descriptor.
    pub fn construct_mc_profile_default(&mut self) -> Result<ManagedCluster> {
        self.init_mc()?;
        self.set_up_agentpool_profile()?;
        self.set_up_mc_properties()?;
        self.set_up_linux_profile()?;
        self.set_up_windows_profile()?;
        self.set_up_service_principal_profile()?;
        self.process_add_role_assignment_for_vnet_subnet()?;
        self.process_attach_acr()?;
        self.set_up_network_profile()?;
        self.set_up_addon_profiles()?;
        self.set_up_aad_profile()?;
        self.set_up_api_server_access_profile()?;
        self.set_up_identity()?;
        self.set_up_identity_profile()?;
        self.set_up_auto_upgrade_profile()?;
        self.set_up_auto_scaler_profile()?;
        self.set_up_sku()?;
        self.set_up_extended_location()?;
        self.set_up_node_resource_group()?;
        self.build_custom_headers()?;
        debug!("constructed managed cluster profile");
        Ok(self.ctx.require_mc()?.clone())
    }

    // ========================================================================
    // Submission
    // ========================================================================

    pub fn check_is_postprocessing_required(&self) -> Result<bool> {
        let attach_acr = self.ctx.get_attach_acr()?.is_some_and(|acr| !acr.is_empty());
        Ok(addons_need_postprocessing(&self.ctx)
            || (self.ctx.get_enable_managed_identity()? && attach_acr)
            || self.ctx.intermediates().get_flag(NEED_POST_CREATION_VNET_PERMISSION))
    }

    fn custom_headers(&self) -> BTreeMap<String, String> {
        self.ctx
            .get_intermediate(CUSTOM_HEADERS)
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_default()
    }

    /// Grant the deferred subnet permission to the new system-assigned identity.
    fn immediate_processing_after_request(&self) -> Result<()> {
        if !self.ctx.intermediates().get_flag(NEED_POST_CREATION_VNET_PERMISSION) {
            return Ok(());
        }
        let cluster = self
            .client
            .get(&self.ctx.get_resource_group_name()?, &self.ctx.get_name()?)?;
        let principal_id = cluster.identity.as_ref().and_then(|i| i.principal_id.clone());
        let (Some(principal_id), Some(subnet_id)) = (principal_id, self.ctx.get_vnet_subnet_id())
        else {
            warn!("{SUBNET_ROLE_ASSIGNMENT_FAILED}");
            return Ok(());
        };
        if !self
            .ctx
            .cloud()
            .add_role_assignment(NETWORK_CONTRIBUTOR, &principal_id, &subnet_id, false)?
        {
            warn!("{SUBNET_ROLE_ASSIGNMENT_FAILED}");
        }
        Ok(())
    }

    /// Submit the constructed descriptor.
    pub fn create_mc(&self) -> Result<ManagedCluster> {
        let mc = self.ctx.require_mc()?;
        let resource_group = self.ctx.get_resource_group_name()?;
        let name = self.ctx.get_name()?;
        let headers = self.custom_headers();

        if self.check_is_postprocessing_required()? {
            if self.ctx.get_no_wait() {
                warn!("Ignoring --no-wait, the cluster must exist before its role assignments can be added");
            }
            info!("creating cluster {name} and waiting for post-creation steps");
            let cluster = self
                .client
                .create_or_update(&resource_group, &name, mc, &headers, false)?;
            self.immediate_processing_after_request()?;
            let msi = self.ctx.get_enable_managed_identity()?;
            postprocessing_after_mc_created(&self.ctx, &cluster, msi)?;
            Ok(cluster)
        } else {
            info!("creating cluster {name}");
            Ok(self.client.create_or_update(
                &resource_group,
                &name,
                mc,
                &headers,
                self.ctx.get_no_wait(),
            )?)
        }
    }
}
