//! Settings of the cluster's first (system) node pool.

use super::{DecoratorContext, flag};
use crate::error::{Error, Result};
use crate::resolve::Resolved;
use clustermodel::consts::{VM_SET_TYPE_AVAILABILITY_SET, VM_SET_TYPE_VMSS};
use clustermodel::{AgentPoolProfile, ManagedCluster};
use std::collections::BTreeMap;

const DEFAULT_NODEPOOL_NAME: &str = "nodepool1";
const DEFAULT_NODE_COUNT: u32 = 3;
const DEFAULT_NODE_VM_SIZE: &str = "Standard_DS2_v2";
const NODEPOOL_NAME_MAX_LEN: usize = 12;
const AUTOSCALER_COUNT_RANGE: std::ops::RangeInclusive<u32> = 1..=100;

fn first_pool(mc: &ManagedCluster) -> Option<&AgentPoolProfile> {
    mc.agent_pool_profiles.as_ref().and_then(|pools| pools.first())
}

/// Autoscaler change requested on update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AutoscalerUpdate {
    pub enable: bool,
    pub disable: bool,
    pub update: bool,
    pub min_count: Option<u32>,
    pub max_count: Option<u32>,
}

impl AutoscalerUpdate {
    pub fn is_requested(&self) -> bool {
        self.enable || self.disable || self.update
    }

    /// Apply the change to a node pool.
    pub fn apply_to(&self, pool: &mut AgentPoolProfile) {
        if self.enable || self.update {
            pool.enable_auto_scaling = Some(true);
            pool.min_count = self.min_count;
            pool.max_count = self.max_count;
        } else if self.disable {
            pool.enable_auto_scaling = Some(false);
            pool.min_count = None;
            pool.max_count = None;
        }
    }
}

fn check_min_max(min_count: Option<u32>, max_count: Option<u32>, flags: &str) -> Result<(u32, u32)> {
    let (Some(min), Some(max)) = (min_count, max_count) else {
        return Err(Error::missing(format!(
            "Please specify both min-count and max-count when {flags} set."
        )));
    };
    for (name, value) in [("min-count", min), ("max-count", max)] {
        if !AUTOSCALER_COUNT_RANGE.contains(&value) {
            return Err(Error::invalid(format!(
                "--{name} must be in the range [{},{}]",
                AUTOSCALER_COUNT_RANGE.start(),
                AUTOSCALER_COUNT_RANGE.end()
            )));
        }
    }
    if min > max {
        return Err(Error::invalid(
            "Value of min-count should be less than or equal to value of max-count.",
        ));
    }
    Ok((min, max))
}

impl DecoratorContext {
    // ========================================================================
    // Naming and placement
    // ========================================================================

    /// Node pool name, `nodepool1` unless given.
    ///
    /// With `enable_trim` a raw name is cut to 12 characters.
    pub fn get_nodepool_name(&self, enable_trim: bool) -> String {
        match self.resolve(self.raw.nodepool_name.clone(), |mc| {
            first_pool(mc).map(|p| p.name.clone())
        }) {
            Resolved::Raw(name) if enable_trim => {
                name.chars().take(NODEPOOL_NAME_MAX_LEN).collect()
            }
            resolved => resolved
                .value()
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| DEFAULT_NODEPOOL_NAME.to_string()),
        }
    }

    pub fn get_nodepool_tags(&self) -> Option<BTreeMap<String, String>> {
        self.resolve(self.raw.nodepool_tags.clone(), |mc| {
            first_pool(mc).and_then(|p| p.tags.clone())
        })
        .value()
    }

    pub fn get_nodepool_labels(&self) -> Option<BTreeMap<String, String>> {
        self.resolve(self.raw.nodepool_labels.clone(), |mc| {
            first_pool(mc).and_then(|p| p.node_labels.clone())
        })
        .value()
    }

    pub fn get_node_count(&self) -> u32 {
        self.resolve(self.raw.node_count, |mc| first_pool(mc).and_then(|p| p.count))
            .or(DEFAULT_NODE_COUNT)
    }

    pub fn get_node_vm_size(&self) -> String {
        self.resolve(self.raw.node_vm_size.clone(), |mc| {
            first_pool(mc).and_then(|p| p.vm_size.clone())
        })
        .or_else_with(|| DEFAULT_NODE_VM_SIZE.to_string())
    }

    pub fn get_vnet_subnet_id(&self) -> Option<String> {
        self.resolve(self.raw.vnet_subnet_id.clone(), |mc| {
            first_pool(mc).and_then(|p| p.vnet_subnet_id.clone())
        })
        .value()
    }

    pub fn get_ppg(&self) -> Option<String> {
        self.resolve(self.raw.ppg.clone(), |mc| {
            first_pool(mc).and_then(|p| p.proximity_placement_group_id.clone())
        })
        .value()
    }

    pub fn get_zones(&self) -> Option<Vec<String>> {
        self.resolve(self.raw.zones.clone(), |mc| {
            first_pool(mc).and_then(|p| p.availability_zones.clone())
        })
        .value()
    }

    // ========================================================================
    // Node settings
    // ========================================================================

    pub fn get_enable_node_public_ip(&self) -> bool {
        flag(
            self.resolve(self.raw.enable_node_public_ip, |mc| {
                first_pool(mc).and_then(|p| p.enable_node_public_ip)
            })
            .value(),
        )
    }

    pub fn get_node_public_ip_prefix_id(&self) -> Option<String> {
        self.resolve(self.raw.node_public_ip_prefix_id.clone(), |mc| {
            first_pool(mc).and_then(|p| p.node_public_ip_prefix_id.clone())
        })
        .value()
    }

    pub fn get_enable_encryption_at_host(&self) -> bool {
        flag(
            self.resolve(self.raw.enable_encryption_at_host, |mc| {
                first_pool(mc).and_then(|p| p.enable_encryption_at_host)
            })
            .value(),
        )
    }

    pub fn get_enable_ultra_ssd(&self) -> bool {
        flag(
            self.resolve(self.raw.enable_ultra_ssd, |mc| {
                first_pool(mc).and_then(|p| p.enable_ultra_ssd)
            })
            .value(),
        )
    }

    /// Maximum pods per node. Zero counts as unset.
    pub fn get_max_pods(&self) -> Option<u32> {
        self.resolve(self.raw.max_pods, |mc| first_pool(mc).and_then(|p| p.max_pods))
            .value()
            .filter(|v| *v != 0)
    }

    /// OS disk size in GB. Zero counts as unset.
    pub fn get_node_osdisk_size(&self) -> Option<u32> {
        self.resolve(self.raw.node_osdisk_size, |mc| {
            first_pool(mc).and_then(|p| p.os_disk_size_gb)
        })
        .value()
        .filter(|v| *v != 0)
    }

    pub fn get_node_osdisk_type(&self) -> Option<String> {
        self.resolve(self.raw.node_osdisk_type.clone(), |mc| {
            first_pool(mc).and_then(|p| p.os_disk_type.clone())
        })
        .value()
    }

    /// Scale set type, normalised to its canonical spelling.
    pub fn get_vm_set_type(&self) -> Result<String> {
        let vm_set_type = self
            .resolve(self.raw.vm_set_type.clone(), |mc| {
                first_pool(mc).and_then(|p| p.vm_set_type.clone())
            })
            .value()
            .filter(|v| !v.is_empty());
        let Some(vm_set_type) = vm_set_type else {
            return Ok(VM_SET_TYPE_VMSS.to_string());
        };
        if vm_set_type.eq_ignore_ascii_case(VM_SET_TYPE_VMSS) {
            Ok(VM_SET_TYPE_VMSS.to_string())
        } else if vm_set_type.eq_ignore_ascii_case(VM_SET_TYPE_AVAILABILITY_SET) {
            Ok(VM_SET_TYPE_AVAILABILITY_SET.to_string())
        } else {
            Err(Error::invalid(format!(
                "--vm-set-type can only be {VM_SET_TYPE_VMSS} or {VM_SET_TYPE_AVAILABILITY_SET}"
            )))
        }
    }

    // ========================================================================
    // Cluster autoscaler
    // ========================================================================

    /// Autoscaler switch with its bounds, validated together.
    pub fn get_enable_cluster_autoscaler_and_min_count_and_max_count(
        &self,
    ) -> Result<(bool, Option<u32>, Option<u32>)> {
        let enable = flag(
            self.resolve(self.raw.enable_cluster_autoscaler, |mc| {
                first_pool(mc).and_then(|p| p.enable_auto_scaling)
            })
            .value(),
        );
        let min_count = self
            .resolve(self.raw.min_count, |mc| first_pool(mc).and_then(|p| p.min_count))
            .value();
        let max_count = self
            .resolve(self.raw.max_count, |mc| first_pool(mc).and_then(|p| p.max_count))
            .value();

        if enable {
            let (min, max) = check_min_max(min_count, max_count, "--enable-cluster-autoscaler")?;
            if self.mode.is_create() {
                let node_count = self.get_node_count();
                if node_count < min || node_count > max {
                    return Err(Error::invalid(
                        "node-count is not in the range of min-count and max-count",
                    ));
                }
            }
        } else if min_count.is_some() || max_count.is_some() {
            return Err(Error::missing(
                "min-count and max-count are required for --enable-cluster-autoscaler, please use the flag",
            ));
        }
        Ok((enable, min_count, max_count))
    }

    pub fn get_enable_cluster_autoscaler(&self) -> Result<bool> {
        Ok(self.get_enable_cluster_autoscaler_and_min_count_and_max_count()?.0)
    }

    pub fn get_min_count(&self) -> Result<Option<u32>> {
        Ok(self.get_enable_cluster_autoscaler_and_min_count_and_max_count()?.1)
    }

    pub fn get_max_count(&self) -> Result<Option<u32>> {
        Ok(self.get_enable_cluster_autoscaler_and_min_count_and_max_count()?.2)
    }

    /// Autoscaler change on update, checked against the current state of
    /// the first node pool.
    pub fn get_update_enable_disable_cluster_autoscaler_and_min_max_count(
        &self,
    ) -> Result<AutoscalerUpdate> {
        let request = AutoscalerUpdate {
            enable: flag(self.raw.enable_cluster_autoscaler),
            disable: flag(self.raw.disable_cluster_autoscaler),
            update: flag(self.raw.update_cluster_autoscaler),
            min_count: self.raw.min_count,
            max_count: self.raw.max_count,
        };

        let requested = [request.enable, request.disable, request.update]
            .into_iter()
            .filter(|f| *f)
            .count();
        if requested > 1 {
            return Err(Error::exclusive(
                "Cannot specify more than one of \"--enable-cluster-autoscaler\" or \
                 \"--disable-cluster-autoscaler\" or \"--update-cluster-autoscaler\"",
            ));
        }
        if requested == 0 {
            return Ok(request);
        }
        if request.enable || request.update {
            check_min_max(
                request.min_count,
                request.max_count,
                "--enable-cluster-autoscaler or --update-cluster-autoscaler",
            )?;
        }

        let pools = self
            .mc
            .as_ref()
            .and_then(|mc| mc.agent_pool_profiles.as_deref())
            .unwrap_or_default();
        if pools.len() > 1 {
            return Err(Error::invalid(
                "There are more than one node pool in the cluster. Please update the autoscaler \
                 settings of each node pool separately",
            ));
        }

        let enabled = pools
            .first()
            .is_some_and(|pool| flag(pool.enable_auto_scaling));
        if request.enable && enabled {
            return Err(Error::state_transition("enable-cluster-autoscaler", "enabled"));
        }
        if request.update && !enabled {
            return Err(Error::state_transition("update-cluster-autoscaler", "disabled"));
        }
        if request.disable && !enabled {
            return Err(Error::state_transition("disable-cluster-autoscaler", "disabled"));
        }
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::params::RawParameters;

    fn cluster_with_pools(pools: Vec<AgentPoolProfile>) -> ManagedCluster {
        ManagedCluster {
            agent_pool_profiles: Some(pools),
            ..ManagedCluster::new("westus2")
        }
    }

    fn pool(autoscaling: bool) -> AgentPoolProfile {
        AgentPoolProfile {
            name: "nodepool1".to_string(),
            enable_auto_scaling: Some(autoscaling),
            ..AgentPoolProfile::default()
        }
    }

    #[test]
    fn test_nodepool_defaults() {
        let ctx = create_ctx(RawParameters::default());
        assert_eq!(ctx.get_nodepool_name(true), "nodepool1");
        assert_eq!(ctx.get_node_count(), 3);
        assert_eq!(ctx.get_node_vm_size(), "Standard_DS2_v2");
        assert_eq!(ctx.get_vm_set_type().unwrap(), VM_SET_TYPE_VMSS);
        assert!(!ctx.get_enable_node_public_ip());
        assert_eq!(ctx.get_max_pods(), None);
    }

    #[test]
    fn test_nodepool_name_trim() {
        let raw = RawParameters {
            nodepool_name: Some("averyveryverylongname".to_string()),
            ..RawParameters::default()
        };
        let ctx = create_ctx(raw);
        assert_eq!(ctx.get_nodepool_name(true), "averyveryver");
        assert_eq!(ctx.get_nodepool_name(false), "averyveryverylongname");
    }

    #[test]
    fn test_nodepool_name_from_descriptor_is_not_trimmed() {
        let mut ctx = create_ctx(RawParameters::default());
        let mut existing = pool(false);
        existing.name = "systempoolnamelong".to_string();
        ctx.attach_mc(cluster_with_pools(vec![existing])).unwrap();
        assert_eq!(ctx.get_nodepool_name(true), "systempoolnamelong");
    }

    #[test]
    fn test_zero_means_unset() {
        let raw = RawParameters {
            max_pods: Some(0),
            node_osdisk_size: Some(0),
            ..RawParameters::default()
        };
        let ctx = create_ctx(raw);
        assert_eq!(ctx.get_max_pods(), None);
        assert_eq!(ctx.get_node_osdisk_size(), None);
    }

    #[test]
    fn test_vm_set_type_normalisation() {
        let raw = RawParameters {
            vm_set_type: Some("availabilityset".to_string()),
            ..RawParameters::default()
        };
        assert_eq!(create_ctx(raw).get_vm_set_type().unwrap(), VM_SET_TYPE_AVAILABILITY_SET);

        let raw = RawParameters {
            vm_set_type: Some("spot".to_string()),
            ..RawParameters::default()
        };
        assert!(create_ctx(raw).get_vm_set_type().is_err());
    }

    #[test]
    fn test_create_autoscaler_checks() {
        let base = RawParameters {
            enable_cluster_autoscaler: Some(true),
            ..RawParameters::default()
        };
        assert!(matches!(
            create_ctx(base.clone()).get_enable_cluster_autoscaler(),
            Err(Error::RequiredArgumentMissing(_))
        ));

        let inverted = RawParameters {
            min_count: Some(5),
            max_count: Some(2),
            ..base.clone()
        };
        assert!(matches!(
            create_ctx(inverted).get_min_count(),
            Err(Error::InvalidArgumentValue(_))
        ));

        let outside = RawParameters {
            min_count: Some(4),
            max_count: Some(6),
            ..base.clone()
        };
        let err = create_ctx(outside).get_max_count().unwrap_err();
        assert!(err.to_string().contains("node-count"));

        let ok = RawParameters {
            min_count: Some(1),
            max_count: Some(5),
            ..base
        };
        assert_eq!(
            create_ctx(ok).get_enable_cluster_autoscaler_and_min_count_and_max_count().unwrap(),
            (true, Some(1), Some(5))
        );
    }

    #[test]
    fn test_bounds_without_autoscaler() {
        let raw = RawParameters {
            min_count: Some(1),
            ..RawParameters::default()
        };
        assert!(matches!(
            create_ctx(raw).get_enable_cluster_autoscaler(),
            Err(Error::RequiredArgumentMissing(_))
        ));
    }

    #[test]
    fn test_update_autoscaler_exclusive_flags() {
        let raw = RawParameters {
            enable_cluster_autoscaler: Some(true),
            disable_cluster_autoscaler: Some(true),
            ..RawParameters::default()
        };
        let ctx = update_ctx(raw, cluster_with_pools(vec![pool(false)]));
        assert!(matches!(
            ctx.get_update_enable_disable_cluster_autoscaler_and_min_max_count(),
            Err(Error::MutuallyExclusiveArguments(_))
        ));
    }

    #[test]
    fn test_update_autoscaler_state_transitions() {
        let enable = RawParameters {
            enable_cluster_autoscaler: Some(true),
            min_count: Some(1),
            max_count: Some(3),
            ..RawParameters::default()
        };
        let ctx = update_ctx(enable.clone(), cluster_with_pools(vec![pool(true)]));
        assert!(matches!(
            ctx.get_update_enable_disable_cluster_autoscaler_and_min_max_count(),
            Err(Error::StateTransition { .. })
        ));

        let ctx = update_ctx(enable, cluster_with_pools(vec![pool(false)]));
        let change = ctx
            .get_update_enable_disable_cluster_autoscaler_and_min_max_count()
            .unwrap();
        let mut target = pool(false);
        change.apply_to(&mut target);
        assert_eq!(target.enable_auto_scaling, Some(true));
        assert_eq!((target.min_count, target.max_count), (Some(1), Some(3)));

        let disable = RawParameters {
            disable_cluster_autoscaler: Some(true),
            ..RawParameters::default()
        };
        let ctx = update_ctx(disable, cluster_with_pools(vec![pool(false)]));
        let err = ctx
            .get_update_enable_disable_cluster_autoscaler_and_min_max_count()
            .unwrap_err();
        assert!(err.to_string().contains("disable-cluster-autoscaler"));

        let update = RawParameters {
            update_cluster_autoscaler: Some(true),
            min_count: Some(1),
            max_count: Some(3),
            ..RawParameters::default()
        };
        let ctx = update_ctx(update, cluster_with_pools(vec![pool(false)]));
        assert!(matches!(
            ctx.get_update_enable_disable_cluster_autoscaler_and_min_max_count(),
            Err(Error::StateTransition { .. })
        ));
    }

    #[test]
    fn test_update_autoscaler_rejects_multiple_pools() {
        let raw = RawParameters {
            disable_cluster_autoscaler: Some(true),
            ..RawParameters::default()
        };
        let ctx = update_ctx(raw, cluster_with_pools(vec![pool(true), pool(true)]));
        assert!(matches!(
            ctx.get_update_enable_disable_cluster_autoscaler_and_min_max_count(),
            Err(Error::InvalidArgumentValue(_))
        ));
    }

    #[test]
    fn test_disable_clears_bounds() {
        let mut target = AgentPoolProfile {
            enable_auto_scaling: Some(true),
            min_count: Some(1),
            max_count: Some(3),
            ..AgentPoolProfile::default()
        };
        AutoscalerUpdate {
            disable: true,
            ..AutoscalerUpdate::default()
        }
        .apply_to(&mut target);
        assert_eq!(target.enable_auto_scaling, Some(false));
        assert_eq!(target.min_count, None);
        assert!(!AutoscalerUpdate::default().is_requested());
    }
}
