//! Work that follows a submission: role assignments owed to the cluster's
//! identities once the control plane has created them.

use crate::context::DecoratorContext;
use crate::error::Result;
use crate::external::{AddonRoleAssignments, ContainerInsightsRequest};
use crate::intermediates::{
    INGRESS_APPGW_ADDON_ENABLED, MONITORING_ADDON_ENABLED, VIRTUAL_NODE_ADDON_ENABLED,
};
use clustermodel::ManagedCluster;
use clustermodel::consts::MONITORING_ADDON_NAME;
use log::{debug, warn};

pub(crate) const NETWORK_CONTRIBUTOR: &str = "Network Contributor";

pub(crate) const SUBNET_ROLE_ASSIGNMENT_FAILED: &str =
    "Could not create a role assignment for subnet. Are you an Owner on this subscription?";

/// Full resource id of a managed cluster.
pub(crate) fn cluster_resource_id(subscription_id: &str, resource_group: &str, name: &str) -> String {
    format!(
        "/subscriptions/{subscription_id}/resourceGroups/{resource_group}/providers/\
         Microsoft.ContainerService/managedClusters/{name}"
    )
}

/// Whether any addon recorded that it needs follow-up role assignments.
pub(crate) fn addons_need_postprocessing(ctx: &DecoratorContext) -> bool {
    let intermediates = ctx.intermediates();
    [
        MONITORING_ADDON_ENABLED,
        INGRESS_APPGW_ADDON_ENABLED,
        VIRTUAL_NODE_ADDON_ENABLED,
    ]
    .iter()
    .any(|key| intermediates.get_flag(key))
}

/// Grant the roles that depend on the created cluster.
///
/// `msi` tells whether the cluster runs with a managed identity, in which
/// case an attached registry is granted to the kubelet identity.
pub(crate) fn postprocessing_after_mc_created(
    ctx: &DecoratorContext,
    cluster: &ManagedCluster,
    msi: bool,
) -> Result<()> {
    let intermediates = ctx.intermediates();
    let mut assignments = AddonRoleAssignments::default();

    if intermediates.get_flag(MONITORING_ADDON_ENABLED) {
        if ctx.get_enable_msi_auth_for_monitoring().unwrap_or(false) {
            match cluster.addon(MONITORING_ADDON_NAME) {
                Some(addon) => {
                    ctx.cloud().ensure_container_insights(&ContainerInsightsRequest {
                        addon: addon.clone(),
                        subscription_id: ctx.get_subscription_id()?,
                        resource_group: ctx.get_resource_group_name()?,
                        cluster_name: ctx.get_name()?,
                        location: ctx.get_location()?,
                        aad_route: true,
                        create_dcr: false,
                        create_dcra: true,
                    })?;
                }
                None => warn!("monitoring addon missing from the submitted cluster"),
            }
        } else {
            assignments.monitoring_cluster_id = Some(cluster_resource_id(
                &ctx.get_subscription_id()?,
                &ctx.get_resource_group_name()?,
                &ctx.get_name()?,
            ));
        }
    }
    assignments.ingress_appgw = intermediates.get_flag(INGRESS_APPGW_ADDON_ENABLED);
    if intermediates.get_flag(VIRTUAL_NODE_ADDON_ENABLED) {
        assignments.virtual_node_subnet_id = ctx.get_vnet_subnet_id();
        if assignments.virtual_node_subnet_id.is_none() {
            warn!("virtual node addon enabled without a subnet, skipping its role assignment");
        }
    }
    if !assignments.is_empty() {
        debug!("adding addon role assignments: {assignments:?}");
        ctx.cloud().add_addon_role_assignments(cluster, &assignments)?;
    }

    if msi && let Some(acr) = ctx.get_attach_acr()?.filter(|acr| !acr.is_empty()) {
        match cluster.kubelet_identity().and_then(|k| k.object_id.as_deref()) {
            Some(object_id) => {
                ctx.cloud()
                    .ensure_acr(object_id, &acr, &ctx.get_subscription_id()?, false, false)?;
            }
            None => warn!(
                "Your cluster is successfully created, but we failed to attach acr to it, you can \
                 manually grant permission to the identity named <ClUSTER_NAME>-agentpool in MC_ \
                 resource group to give it permission to pull from ACR."
            ),
        }
    }
    Ok(())
}
