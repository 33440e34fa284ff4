//! Modification of an existing managed cluster.
//!
//! The stored descriptor is fetched and attached, then each phase
//! overwrites only the fields whose accessor reported a change.

use crate::context::{DecoratorContext, virtual_node_addon_key};
use crate::error::{Error, Result};
use crate::external::{CloudBackend, ClusterClient, SecretSource};
use crate::intermediates::{
    INGRESS_APPGW_ADDON_ENABLED, MONITORING_ADDON_ENABLED, VIRTUAL_NODE_ADDON_ENABLED,
};
use crate::mode::DecoratorMode;
use crate::params::RawParameters;
use crate::postprocess::{addons_need_postprocessing, postprocessing_after_mc_created};
use clustermodel::consts::{
    AZURE_KEYVAULT_SECRETS_PROVIDER_ADDON_NAME, INGRESS_APPGW_ADDON_NAME,
    LICENSE_TYPE_NONE, LICENSE_TYPE_WINDOWS_SERVER, MONITORING_ADDON_NAME,
    ROTATION_POLL_INTERVAL, SECRET_ROTATION_ENABLED, SKU_NAME_BASIC, SKU_TIER_FREE, SKU_TIER_PAID,
};
use clustermodel::{
    AadProfile, ApiServerAccessProfile, AutoUpgradeProfile, ClusterIdentity, GmsaProfile,
    IdentityType, ManagedCluster, Sku, UserAssignedIdentity, WindowsProfile,
};
use log::{debug, info};
use std::collections::BTreeMap;
use std::sync::Arc;

const NO_CHANGES_REQUESTED: &str = "Please specify one or more of \"--enable-cluster-autoscaler\" or \
    \"--disable-cluster-autoscaler\" or \"--update-cluster-autoscaler\" or \
    \"--cluster-autoscaler-profile\" or \"--load-balancer-managed-outbound-ip-count\" or \
    \"--load-balancer-outbound-ips\" or \"--load-balancer-outbound-ip-prefixes\" or \
    \"--load-balancer-outbound-ports\" or \"--load-balancer-idle-timeout\" or \
    \"--nat-gateway-managed-outbound-ip-count\" or \"--nat-gateway-idle-timeout\" or \
    \"--auto-upgrade-channel\" or \"--attach-acr\" or \"--detach-acr\" or \"--uptime-sla\" or \
    \"--no-uptime-sla\" or \"--api-server-authorized-ip-ranges\" or \"--enable-aad\" or \
    \"--aad-tenant-id\" or \"--aad-admin-group-object-ids\" or \"--enable-ahub\" or \
    \"--disable-ahub\" or \"--windows-admin-password\" or \"--enable-managed-identity\" or \
    \"--assign-identity\" or \"--enable-azure-rbac\" or \"--disable-azure-rbac\" or \
    \"--enable-public-fqdn\" or \"--disable-public-fqdn\" or \"--tags\" or \
    \"--nodepool-labels\" or \"--enable-windows-gmsa\".";

/// Identity a cluster runs with, as far as an update is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IdentityKind {
    ServicePrincipal,
    SystemAssigned,
    UserAssigned,
}

impl IdentityKind {
    fn of(mc: &ManagedCluster) -> Self {
        match mc.identity.as_ref().map(|identity| identity.kind) {
            Some(IdentityType::SystemAssigned) => Self::SystemAssigned,
            Some(IdentityType::UserAssigned) => Self::UserAssigned,
            Some(IdentityType::None) | None => Self::ServicePrincipal,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::ServicePrincipal => "spn",
            Self::SystemAssigned => "systemassigned",
            Self::UserAssigned => "userassigned",
        }
    }
}

fn identity_change_prompt(current: IdentityKind, goal: IdentityKind) -> String {
    match current {
        IdentityKind::ServicePrincipal => format!(
            "Your cluster is using service principal, and you are going to update the cluster to \
             use {} managed identity.\nAfter updating, your cluster's control plane and addon \
             pods will switch to use managed identity, but kubelet will KEEP USING SERVICE \
             PRINCIPAL until you upgrade your agentpool.\nAre you sure you want to perform this \
             operation?",
            goal.label()
        ),
        IdentityKind::SystemAssigned | IdentityKind::UserAssigned => format!(
            "Your cluster is already using {} managed identity, and you are going to update the \
             cluster to use {} managed identity.\nAre you sure you want to perform this operation?",
            current.label(),
            goal.label()
        ),
    }
}

/// Applies requested changes to a stored managed cluster.
pub struct UpdateDecorator {
    ctx: DecoratorContext,
    client: Arc<dyn ClusterClient>,
}

impl UpdateDecorator {
    pub fn new(
        raw: RawParameters,
        cloud: Arc<dyn CloudBackend>,
        secrets: Arc<dyn SecretSource>,
        client: Arc<dyn ClusterClient>,
    ) -> Result<Self> {
        Ok(Self {
            ctx: DecoratorContext::new(raw, DecoratorMode::Update, cloud, secrets)?,
            client,
        })
    }

    pub fn context(&self) -> &DecoratorContext {
        &self.ctx
    }

    fn mc_mut(&mut self) -> Result<&mut ManagedCluster> {
        self.ctx.mc_mut()
    }

    /// Fail unless at least one change was requested.
    pub fn check_raw_parameters(&self) -> Result<()> {
        let changed = self.ctx.raw().has_truthy_changes()?;
        let defaults = self.ctx.get_cluster_autoscaler_profile()?.is_none()
            && self.ctx.get_api_server_authorized_ip_ranges()?.is_none()
            && self.ctx.get_nodepool_labels().is_none();
        if !changed && defaults {
            return Err(Error::missing(NO_CHANGES_REQUESTED));
        }
        Ok(())
    }

    pub fn fetch_mc(&mut self) -> Result<()> {
        let mc = self
            .client
            .get(&self.ctx.get_resource_group_name()?, &self.ctx.get_name()?)?;
        debug!("fetched cluster descriptor");
        self.ctx.attach_mc(mc)
    }

    // ========================================================================
    // Phases
    // ========================================================================

    pub fn update_agentpool_profile(&mut self) -> Result<()> {
        if self
            .ctx
            .require_mc()?
            .agent_pool_profiles
            .as_ref()
            .is_none_or(Vec::is_empty)
        {
            return Err(Error::unknown_state(
                "Encounter an unexpected error while getting agent pool profiles from the cluster \
                 in the process of updating agentpool profile.",
            ));
        }
        let autoscaler = self
            .ctx
            .get_update_enable_disable_cluster_autoscaler_and_min_max_count()?;
        let labels = self.ctx.get_nodepool_labels();

        let pools = self
            .mc_mut()?
            .agent_pool_profiles
            .get_or_insert_with(Vec::new);
        if let Some(first) = pools.first_mut() {
            autoscaler.apply_to(first);
        }
        if let Some(labels) = labels {
            for pool in pools.iter_mut() {
                pool.node_labels = Some(labels.clone());
            }
        }
        Ok(())
    }

    pub fn update_auto_scaler_profile(&mut self) -> Result<()> {
        if let Some(profile) = self.ctx.get_cluster_autoscaler_profile()? {
            self.mc_mut()?.auto_scaler_profile = Some(profile);
        }
        Ok(())
    }

    pub fn update_tags(&mut self) -> Result<()> {
        if let Some(tags) = self.ctx.get_tags() {
            self.mc_mut()?.tags = Some(tags);
        }
        Ok(())
    }

    /// Grant or revoke acrpull for the cluster's identity.
    pub fn process_attach_detach_acr(&self) -> Result<()> {
        let attach_acr = self.ctx.get_attach_acr()?.filter(|acr| !acr.is_empty());
        let detach_acr = self.ctx.get_detach_acr().filter(|acr| !acr.is_empty());
        if attach_acr.is_none() && detach_acr.is_none() {
            return Ok(());
        }
        let subscription_id = self.ctx.get_subscription_id()?;
        let (assignee, is_service_principal) =
            self.ctx.get_assignee_from_identity_or_sp_profile()?;
        if let Some(acr) = attach_acr {
            self.ctx
                .cloud()
                .ensure_acr(&assignee, &acr, &subscription_id, false, is_service_principal)?;
        }
        if let Some(acr) = detach_acr {
            self.ctx
                .cloud()
                .ensure_acr(&assignee, &acr, &subscription_id, true, is_service_principal)?;
        }
        Ok(())
    }

    pub fn update_sku(&mut self) -> Result<()> {
        let tier = if self.ctx.get_uptime_sla()? {
            Some(SKU_TIER_PAID)
        } else if self.ctx.get_no_uptime_sla()? {
            Some(SKU_TIER_FREE)
        } else {
            None
        };
        if let Some(tier) = tier {
            self.mc_mut()?.sku = Some(Sku {
                name: SKU_NAME_BASIC.to_string(),
                tier: tier.to_string(),
            });
        }
        Ok(())
    }

    pub fn update_load_balancer_profile(&mut self) -> Result<()> {
        let settings = self.ctx.get_load_balancer_settings()?;
        let network = self.mc_mut()?.network_profile.as_mut().ok_or_else(|| {
            Error::unknown_state(
                "Encounter an unexpected error while getting network profile from the cluster in \
                 the process of updating its load balancer profile.",
            )
        })?;
        network.load_balancer_profile = settings.update_profile(network.load_balancer_profile.take());
        Ok(())
    }

    pub fn update_nat_gateway_profile(&mut self) -> Result<()> {
        let settings = self.ctx.get_nat_gateway_settings()?;
        if !settings.is_provided() {
            return Ok(());
        }
        let network = self.mc_mut()?.network_profile.as_mut().ok_or_else(|| {
            Error::unknown_state(
                "Unexpectedly get an empty network profile in the process of updating nat \
                 gateway profile.",
            )
        })?;
        network.nat_gateway_profile = settings.update_profile(network.nat_gateway_profile.take());
        Ok(())
    }

    pub fn update_disable_local_accounts(&mut self) -> Result<()> {
        let disable = self.ctx.get_disable_local_accounts()?;
        let enable = self.ctx.get_enable_local_accounts()?;
        let mc = self.mc_mut()?;
        if disable {
            mc.disable_local_accounts = Some(true);
        }
        if enable {
            mc.disable_local_accounts = Some(false);
        }
        Ok(())
    }

    /// A holder created here and left empty collapses back to `None`.
    pub fn update_api_server_access_profile(&mut self) -> Result<()> {
        let ranges = self.ctx.get_api_server_authorized_ip_ranges()?;
        let disable_public_fqdn = self.ctx.get_disable_public_fqdn()?;
        let enable_public_fqdn = self.ctx.get_enable_public_fqdn()?;

        let mc = self.mc_mut()?;
        let existed = mc.api_server_access_profile.is_some();
        let mut holder = mc.api_server_access_profile.take().unwrap_or_default();
        if let Some(ranges) = ranges {
            holder.authorized_ip_ranges = Some(ranges);
        }
        if disable_public_fqdn {
            holder.enable_private_cluster_public_fqdn = Some(false);
        }
        if enable_public_fqdn {
            holder.enable_private_cluster_public_fqdn = Some(true);
        }
        mc.api_server_access_profile =
            (existed || holder != ApiServerAccessProfile::default()).then_some(holder);
        Ok(())
    }

    pub fn update_windows_profile(&mut self) -> Result<()> {
        let enable_ahub = self.ctx.get_enable_ahub()?;
        let disable_ahub = self.ctx.get_disable_ahub()?;
        let admin_password = self.ctx.get_windows_admin_password();
        let enable_gmsa = self.ctx.get_enable_windows_gmsa()?;
        if !(enable_ahub || disable_ahub || admin_password.is_some() || enable_gmsa) {
            return Ok(());
        }
        let gmsa = if enable_gmsa {
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

        let profile: &mut WindowsProfile =
            self.mc_mut()?.windows_profile.as_mut().ok_or_else(|| {
                Error::unknown_state(
                    "Encounter an unexpected error while getting windows profile from the \
                     cluster in the process of update.",
                )
            })?;
        if enable_ahub {
            profile.license_type = Some(LICENSE_TYPE_WINDOWS_SERVER.to_string());
        }
        if disable_ahub {
            profile.license_type = Some(LICENSE_TYPE_NONE.to_string());
        }
        if let Some(password) = admin_password {
            profile.admin_password = Some(password);
        }
        if gmsa.is_some() {
            profile.gmsa_profile = gmsa;
        }
        Ok(())
    }

    pub fn update_aad_profile(&mut self) -> Result<()> {
        if self.ctx.get_enable_aad()? {
            self.mc_mut()?.aad_profile = Some(AadProfile {
                managed: Some(true),
                ..AadProfile::default()
            });
        }
        let tenant_id = self.ctx.get_aad_tenant_id()?;
        let admin_group_object_ids = self.ctx.get_aad_admin_group_object_ids()?;
        let enable_azure_rbac = self.ctx.get_enable_azure_rbac()?;
        let disable_azure_rbac = self.ctx.get_disable_azure_rbac()?;
        if tenant_id.is_none()
            && admin_group_object_ids.is_none()
            && !enable_azure_rbac
            && !disable_azure_rbac
        {
            return Ok(());
        }

        let aad = self.mc_mut()?.aad_profile.as_mut().ok_or_else(|| {
            Error::unknown_state(
                "Encounter an unexpected error while getting the AAD profile from the cluster in \
                 the process of update.",
            )
        })?;
        if tenant_id.is_some() {
            aad.tenant_id = tenant_id;
        }
        if admin_group_object_ids.is_some() {
            aad.admin_group_object_ids = admin_group_object_ids;
        }
        if enable_azure_rbac {
            aad.enable_azure_rbac = Some(true);
        }
        if disable_azure_rbac {
            aad.enable_azure_rbac = Some(false);
        }
        Ok(())
    }

    pub fn update_auto_upgrade_profile(&mut self) -> Result<()> {
        if let Some(channel) = self.ctx.get_auto_upgrade_channel() {
            self.mc_mut()?
                .auto_upgrade_profile
                .get_or_insert_with(AutoUpgradeProfile::default)
                .upgrade_channel = Some(channel);
        }
        Ok(())
    }

    /// Switch the control plane identity, after confirmation.
    pub fn update_identity(&mut self) -> Result<()> {
        let current = IdentityKind::of(self.ctx.require_mc()?);
        let assign_identity = self.ctx.get_assign_identity()?.filter(|id| !id.is_empty());
        let goal = if self.ctx.get_enable_managed_identity()? {
            if assign_identity.is_some() {
                IdentityKind::UserAssigned
            } else {
                IdentityKind::SystemAssigned
            }
        } else {
            current
        };
        if goal == current {
            return Ok(());
        }

        self.ctx
            .confirm_or_exit(&identity_change_prompt(current, goal))?;
        let identity = match (goal, assign_identity) {
            (IdentityKind::UserAssigned, Some(id)) => ClusterIdentity {
                kind: IdentityType::UserAssigned,
                principal_id: None,
                user_assigned_identities: Some(BTreeMap::from([(
                    id,
                    UserAssignedIdentity::default(),
                )])),
            },
            _ => ClusterIdentity {
                kind: IdentityType::SystemAssigned,
                ..ClusterIdentity::default()
            },
        };
        info!(
            "switching cluster identity from {} to {}",
            current.label(),
            goal.label()
        );
        self.mc_mut()?.identity = Some(identity);
        Ok(())
    }

    /// Record which addons need post-update role assignments and apply
    /// secret rotation changes.
    pub fn update_addon_profiles(&mut self) -> Result<()> {
        let virtual_node_key = virtual_node_addon_key(self.ctx.get_virtual_node_addon_os_type());
        let mc = self.ctx.require_mc()?;
        if mc.addon_profiles.is_some() {
            let monitoring = mc.addon_enabled(MONITORING_ADDON_NAME);
            let ingress_appgw = mc.addon_enabled(INGRESS_APPGW_ADDON_NAME);
            let virtual_node = mc.addon_enabled(&virtual_node_key);
            self.ctx
                .set_intermediate(MONITORING_ADDON_ENABLED, monitoring, true);
            self.ctx
                .set_intermediate(INGRESS_APPGW_ADDON_ENABLED, ingress_appgw, true);
            self.ctx
                .set_intermediate(VIRTUAL_NODE_ADDON_ENABLED, virtual_node, true);
        }

        let enable_rotation = self.ctx.get_enable_secret_rotation()?;
        let disable_rotation = self.ctx.get_disable_secret_rotation()?;
        let poll_interval = self.ctx.get_rotation_poll_interval()?;
        let Some(addon) = self
            .mc_mut()?
            .addon_profiles
            .as_mut()
            .and_then(|addons| addons.get_mut(AZURE_KEYVAULT_SECRETS_PROVIDER_ADDON_NAME))
        else {
            return Ok(());
        };
        let config = addon.config.get_or_insert_with(BTreeMap::new);
        if enable_rotation {
            config.insert(SECRET_ROTATION_ENABLED.to_string(), "true".to_string());
        }
        if disable_rotation {
            config.insert(SECRET_ROTATION_ENABLED.to_string(), "false".to_string());
        }
        if let Some(interval) = poll_interval {
            config.insert(ROTATION_POLL_INTERVAL.to_string(), interval);
        }
        Ok(())
    }

    /// Fetch the stored cluster and apply every phase to it.
    pub fn update_mc_profile_default(&mut self) -> Result<ManagedCluster> {
        self.check_raw_parameters()?;
        self.fetch_mc()?;
        self.update_agentpool_profile()?;
        self.update_auto_scaler_profile()?;
        self.update_tags()?;
        self.process_attach_detach_acr()?;
        self.update_sku()?;
        self.update_load_balancer_profile()?;
        self.update_nat_gateway_profile()?;
        self.update_disable_local_accounts()?;
        self.update_api_server_access_profile()?;
        self.update_windows_profile()?;
        self.update_aad_profile()?;
        self.update_auto_upgrade_profile()?;
        self.update_identity()?;
        self.update_addon_profiles()?;
        Ok(self.ctx.require_mc()?.clone())
    }

    // ========================================================================
    // Submission
    // ========================================================================

    pub fn check_is_postprocessing_required(&self) -> Result<bool> {
        let msi = self.ctx.require_mc()?.is_msi_cluster();
        let attach_acr = self.ctx.get_attach_acr()?.is_some_and(|acr| !acr.is_empty());
        Ok(addons_need_postprocessing(&self.ctx) || (msi && attach_acr))
    }

    /// Submit the updated descriptor.
    pub fn update_mc(&self) -> Result<ManagedCluster> {
        let mc = self.ctx.require_mc()?;
        let resource_group = self.ctx.get_resource_group_name()?;
        let name = self.ctx.get_name()?;
        let headers = self.ctx.get_aks_custom_headers()?;

        if self.check_is_postprocessing_required()? {
            info!("updating cluster {name} and waiting for post-update steps");
            let cluster = self
                .client
                .create_or_update(&resource_group, &name, mc, &headers, false)?;
            postprocessing_after_mc_created(&self.ctx, &cluster, cluster.is_msi_cluster())?;
            Ok(cluster)
        } else {
            info!("updating cluster {name}");
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
