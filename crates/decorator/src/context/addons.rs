//! Addon selection and addon configuration.

use super::{DecoratorContext, flag};
use crate::error::{Error, Result};
use crate::graph::Accessor;
use crate::intermediates::WORKSPACE_RESOURCE_ID;
use crate::params::split_comma;
use clustermodel::ManagedCluster;
use clustermodel::consts::{
    ACC_SGX_QUOTE_HELPER_ENABLED, ADDONS, AZURE_KEYVAULT_SECRETS_PROVIDER_ADDON_NAME,
    CONFCOM_ADDON_NAME, INGRESS_APPGW_ADDON_NAME, INGRESS_APPGW_APPLICATION_GATEWAY_ID,
    INGRESS_APPGW_APPLICATION_GATEWAY_NAME, INGRESS_APPGW_SUBNET_CIDR, INGRESS_APPGW_SUBNET_ID,
    INGRESS_APPGW_WATCH_NAMESPACE, MONITORING_ADDON_NAME,
    MONITORING_LOG_ANALYTICS_WORKSPACE_RESOURCE_ID, MONITORING_USING_AAD_MSI_AUTH, OS_TYPE_LINUX,
    ROTATION_POLL_INTERVAL, SECRET_ROTATION_ENABLED, VIRTUAL_NODE_ADDON_NAME,
    VIRTUAL_NODE_SUBNET_NAME,
};
use log::debug;
use std::collections::BTreeSet;

/// Profile key of the virtual node addon for the given os type.
pub(crate) fn virtual_node_addon_key(os_type: &str) -> String {
    format!("{VIRTUAL_NODE_ADDON_NAME}{os_type}")
}

fn config_value(mc: &ManagedCluster, addon: &str, key: &str) -> Option<String> {
    mc.addon_config(addon, key).map(str::to_string)
}

fn plural(count: usize, many: &'static str, one: &'static str) -> &'static str {
    if count > 1 { many } else { one }
}

impl DecoratorContext {
    // ========================================================================
    // Selection
    // ========================================================================

    fn peek_enable_addons(&self) -> Vec<String> {
        self.raw
            .enable_addons
            .as_deref()
            .map(split_comma)
            .unwrap_or_default()
    }

    /// Addons to enable, as given on the command line.
    pub fn get_enable_addons(&self) -> Result<Vec<String>> {
        let addons = self.peek_enable_addons();

        let mut seen = BTreeSet::new();
        let duplicates: BTreeSet<&str> = addons
            .iter()
            .filter(|addon| !seen.insert(addon.as_str()))
            .map(String::as_str)
            .collect();
        if !duplicates.is_empty() {
            return Err(Error::invalid(format!(
                "Duplicate addon{} '{}' found in option --enable-addons.",
                plural(duplicates.len(), "s", ""),
                duplicates.into_iter().collect::<Vec<_>>().join(",")
            )));
        }

        let unknown: BTreeSet<&str> = addons
            .iter()
            .map(String::as_str)
            .filter(|addon| !ADDONS.iter().any(|(name, _)| name == addon))
            .collect();
        if !unknown.is_empty() {
            return Err(Error::invalid(format!(
                "'{}' {} not recognized by the --enable-addons argument.",
                unknown.iter().copied().collect::<Vec<_>>().join(","),
                plural(unknown.len(), "are", "is")
            )));
        }

        let monitoring = addons.iter().any(|a| a == "monitoring");
        if !monitoring && self.peek_workspace_resource_id().is_some() {
            return Err(Error::missing(
                "\"--workspace-resource-id\" requires \"--enable-addons monitoring\".",
            ));
        }
        if addons.iter().any(|a| a == "virtual-node") {
            self.completing(Accessor::EnableAddons);
            if self.get_aci_subnet_name().is_none() || self.get_vnet_subnet_id().is_none() {
                return Err(Error::missing(
                    "\"--enable-addons virtual-node\" requires \"--aci-subnet-name\" and \"--vnet-subnet-id\".",
                ));
            }
        }
        Ok(addons)
    }

    // ========================================================================
    // Monitoring
    // ========================================================================

    pub(super) fn peek_workspace_resource_id(&self) -> Option<String> {
        self.resolve(self.raw.workspace_resource_id.clone(), |mc| {
            config_value(mc, MONITORING_ADDON_NAME, MONITORING_LOG_ANALYTICS_WORKSPACE_RESOURCE_ID)
        })
        .value()
        .filter(|id| !id.is_empty())
    }

    /// Log Analytics workspace of the monitoring addon.
    ///
    /// Without one, the default workspace of the subscription is used and
    /// created when missing. Ids are normalised to a single leading slash.
    pub fn get_workspace_resource_id(&self) -> Result<Option<String>> {
        let resolved = self.resolve(self.raw.workspace_resource_id.clone(), |mc| {
            config_value(mc, MONITORING_ADDON_NAME, MONITORING_LOG_ANALYTICS_WORKSPACE_RESOURCE_ID)
        });
        let monitoring = self.peek_enable_addons().iter().any(|a| a == "monitoring");
        let workspace = if resolved.is_descriptor() {
            resolved.value()
        } else {
            let id = match resolved.value() {
                Some(id) => id,
                None if !monitoring => return Ok(None),
                None => match self.intermediates.get_str(WORKSPACE_RESOURCE_ID) {
                    Some(cached) => cached,
                    None => {
                        self.completing(Accessor::WorkspaceResourceId);
                        let id = self.cloud.ensure_default_workspace(
                            &self.get_subscription_id()?,
                            &self.get_resource_group_name()?,
                        )?;
                        self.intermediates.set(WORKSPACE_RESOURCE_ID, id.clone(), true);
                        id
                    }
                },
            };
            Some(format!("/{}", id.trim_matches(|c| c == ' ' || c == '/')))
        };

        if workspace.is_some() && !monitoring {
            return Err(Error::missing(
                "\"--workspace-resource-id\" requires \"--enable-addons monitoring\".",
            ));
        }
        Ok(workspace)
    }

    pub fn get_enable_msi_auth_for_monitoring(&self) -> Option<bool> {
        self.resolve(self.raw.enable_msi_auth_for_monitoring, |mc| {
            config_value(mc, MONITORING_ADDON_NAME, MONITORING_USING_AAD_MSI_AUTH)
                .map(|v| v.eq_ignore_ascii_case("true"))
        })
        .value()
    }

    // ========================================================================
    // Virtual node and ingress
    // ========================================================================

    pub fn get_virtual_node_addon_os_type(&self) -> &'static str {
        OS_TYPE_LINUX
    }

    pub fn get_aci_subnet_name(&self) -> Option<String> {
        let key = virtual_node_addon_key(self.get_virtual_node_addon_os_type());
        self.resolve(self.raw.aci_subnet_name.clone(), |mc| {
            config_value(mc, &key, VIRTUAL_NODE_SUBNET_NAME)
        })
        .value()
    }

    fn appgw_setting(&self, raw: Option<&String>, config_key: &str) -> Option<String> {
        self.resolve(raw.cloned(), |mc| {
            config_value(mc, INGRESS_APPGW_ADDON_NAME, config_key)
        })
        .value()
    }

    pub fn get_appgw_name(&self) -> Option<String> {
        self.appgw_setting(self.raw.appgw_name.as_ref(), INGRESS_APPGW_APPLICATION_GATEWAY_NAME)
    }

    pub fn get_appgw_subnet_cidr(&self) -> Option<String> {
        self.appgw_setting(self.raw.appgw_subnet_cidr.as_ref(), INGRESS_APPGW_SUBNET_CIDR)
    }

    pub fn get_appgw_id(&self) -> Option<String> {
        self.appgw_setting(self.raw.appgw_id.as_ref(), INGRESS_APPGW_APPLICATION_GATEWAY_ID)
    }

    pub fn get_appgw_subnet_id(&self) -> Option<String> {
        self.appgw_setting(self.raw.appgw_subnet_id.as_ref(), INGRESS_APPGW_SUBNET_ID)
    }

    pub fn get_appgw_watch_namespace(&self) -> Option<String> {
        self.appgw_setting(self.raw.appgw_watch_namespace.as_ref(), INGRESS_APPGW_WATCH_NAMESPACE)
    }

    pub fn get_enable_sgxquotehelper(&self) -> bool {
        flag(
            self.resolve(self.raw.enable_sgxquotehelper, |mc| {
                config_value(mc, CONFCOM_ADDON_NAME, ACC_SGX_QUOTE_HELPER_ENABLED)
                    .map(|v| v == "true")
            })
            .value(),
        )
    }

    // ========================================================================
    // Key vault secrets provider
    // ========================================================================

    /// Fail in update mode unless the secrets provider addon is enabled.
    fn require_secrets_provider(&self, option: &str) -> Result<()> {
        if !self.mode.is_update() {
            return Ok(());
        }
        let enabled = self
            .mc
            .as_ref()
            .is_some_and(|mc| mc.addon_enabled(AZURE_KEYVAULT_SECRETS_PROVIDER_ADDON_NAME));
        if enabled {
            Ok(())
        } else {
            debug!("{option} given without the secrets provider addon");
            Err(Error::invalid(format!(
                "--{option} can only be specified when azure-keyvault-secrets-provider is enabled"
            )))
        }
    }

    pub fn get_enable_secret_rotation(&self) -> Result<bool> {
        let enabled = flag(
            self.resolve(self.raw.enable_secret_rotation, |mc| {
                config_value(mc, AZURE_KEYVAULT_SECRETS_PROVIDER_ADDON_NAME, SECRET_ROTATION_ENABLED)
                    .map(|v| v == "true")
            })
            .value(),
        );
        if enabled {
            self.require_secrets_provider("enable-secret-rotation")?;
        }
        Ok(enabled)
    }

    pub fn get_disable_secret_rotation(&self) -> Result<bool> {
        let disabled = flag(self.raw.disable_secret_rotation);
        if disabled {
            self.require_secrets_provider("disable-secret-rotation")?;
        }
        Ok(disabled)
    }

    pub fn get_rotation_poll_interval(&self) -> Result<Option<String>> {
        let interval = self
            .resolve(self.raw.rotation_poll_interval.clone(), |mc| {
                config_value(mc, AZURE_KEYVAULT_SECRETS_PROVIDER_ADDON_NAME, ROTATION_POLL_INTERVAL)
            })
            .value();
        if interval.as_deref().is_some_and(|v| !v.is_empty()) {
            self.require_secrets_provider("rotation-poll-interval")?;
        }
        Ok(interval)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::external::{MockCloud, NoTtySecrets};
    use crate::mode::DecoratorMode;
    use crate::params::RawParameters;
    use clustermodel::AddonProfile;
    use std::collections::BTreeMap;

    fn addons(value: &str) -> RawParameters {
        RawParameters {
            enable_addons: Some(value.to_string()),
            ..RawParameters::default()
        }
    }

    fn cluster_with_addon(key: &str, enabled: bool, config: &[(&str, &str)]) -> ManagedCluster {
        let config: BTreeMap<String, String> = config
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        let profile = AddonProfile {
            enabled,
            config: Some(config),
        };
        ManagedCluster {
            addon_profiles: Some(BTreeMap::from([(key.to_string(), profile)])),
            ..ManagedCluster::new("westus2")
        }
    }

    #[test]
    fn test_enable_addons_split() {
        let ctx = create_ctx(addons("http_application_routing,azure-policy"));
        assert_eq!(
            ctx.get_enable_addons().unwrap(),
            vec!["http_application_routing", "azure-policy"]
        );
        assert!(create_ctx(RawParameters::default()).get_enable_addons().unwrap().is_empty());
    }

    #[test]
    fn test_enable_addons_duplicates() {
        let err = create_ctx(addons("confcom,confcom")).get_enable_addons().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Duplicate addon 'confcom' found in option --enable-addons."
        );
    }

    #[test]
    fn test_enable_addons_unknown() {
        let err = create_ctx(addons("gitops,confcom,serverless"))
            .get_enable_addons()
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "'gitops,serverless' are not recognized by the --enable-addons argument."
        );
    }

    #[test]
    fn test_workspace_requires_monitoring() {
        let raw = RawParameters {
            workspace_resource_id: Some("/ws".to_string()),
            ..addons("confcom")
        };
        let ctx = create_ctx(raw);
        assert!(matches!(ctx.get_enable_addons(), Err(Error::RequiredArgumentMissing(_))));
        assert!(matches!(
            ctx.get_workspace_resource_id(),
            Err(Error::RequiredArgumentMissing(_))
        ));
    }

    #[test]
    fn test_no_workspace_lookup_without_monitoring() {
        let cloud = MockCloud::new().with_workspace("/ws");
        let ctx = ctx_with(addons("confcom"), DecoratorMode::Create, cloud.clone(), NoTtySecrets);
        assert_eq!(ctx.get_workspace_resource_id().unwrap(), None);
        assert!(cloud.calls().is_empty());
    }

    #[test]
    fn test_virtual_node_requires_subnets() {
        let ctx = create_ctx(addons("virtual-node"));
        assert!(matches!(ctx.get_enable_addons(), Err(Error::RequiredArgumentMissing(_))));

        let raw = RawParameters {
            aci_subnet_name: Some("aci".to_string()),
            vnet_subnet_id: Some("/subnet".to_string()),
            ..addons("virtual-node")
        };
        assert_eq!(create_ctx(raw).get_enable_addons().unwrap(), vec!["virtual-node"]);
    }

    #[test]
    fn test_workspace_is_normalised() {
        let raw = RawParameters {
            workspace_resource_id: Some(" //subscriptions/x/workspaces/w/ ".to_string()),
            ..addons("monitoring")
        };
        assert_eq!(
            create_ctx(raw).get_workspace_resource_id().unwrap().as_deref(),
            Some("/subscriptions/x/workspaces/w")
        );
    }

    #[test]
    fn test_default_workspace_is_created_once() {
        let raw = RawParameters {
            resource_group_name: Some("rg".to_string()),
            ..addons("monitoring")
        };
        let cloud = MockCloud::new()
            .with_subscription("sub")
            .with_workspace("subscriptions/sub/workspaces/default/");
        let ctx = ctx_with(raw, DecoratorMode::Create, cloud.clone(), NoTtySecrets);
        let expected = Some("/subscriptions/sub/workspaces/default".to_string());
        assert_eq!(ctx.get_workspace_resource_id().unwrap(), expected);
        assert_eq!(ctx.get_workspace_resource_id().unwrap(), expected);
        assert_eq!(cloud.count("ensure_default_workspace"), 1);
    }

    #[test]
    fn test_workspace_from_descriptor_is_untouched() {
        let mut ctx = create_ctx(addons("monitoring"));
        ctx.attach_mc(cluster_with_addon(
            MONITORING_ADDON_NAME,
            true,
            &[(MONITORING_LOG_ANALYTICS_WORKSPACE_RESOURCE_ID, "/ws/")],
        ))
        .unwrap();
        assert_eq!(ctx.get_workspace_resource_id().unwrap().as_deref(), Some("/ws/"));
    }

    #[test]
    fn test_addon_config_read_back() {
        let mut ctx = create_ctx(RawParameters::default());
        ctx.attach_mc(cluster_with_addon(
            INGRESS_APPGW_ADDON_NAME,
            true,
            &[
                (INGRESS_APPGW_APPLICATION_GATEWAY_NAME, "gw"),
                (INGRESS_APPGW_WATCH_NAMESPACE, "default"),
            ],
        ))
        .unwrap();
        assert_eq!(ctx.get_appgw_name().as_deref(), Some("gw"));
        assert_eq!(ctx.get_appgw_watch_namespace().as_deref(), Some("default"));
        assert_eq!(ctx.get_appgw_id(), None);
    }

    #[test]
    fn test_msi_auth_and_sgx_read_back() {
        let mut ctx = create_ctx(RawParameters::default());
        ctx.attach_mc(cluster_with_addon(
            MONITORING_ADDON_NAME,
            true,
            &[(MONITORING_USING_AAD_MSI_AUTH, "True")],
        ))
        .unwrap();
        assert_eq!(ctx.get_enable_msi_auth_for_monitoring(), Some(true));
        assert!(!ctx.get_enable_sgxquotehelper());
    }

    #[test]
    fn test_aci_subnet_uses_os_specific_key() {
        let mut ctx = create_ctx(RawParameters::default());
        ctx.attach_mc(cluster_with_addon(
            &virtual_node_addon_key(OS_TYPE_LINUX),
            true,
            &[(VIRTUAL_NODE_SUBNET_NAME, "aci")],
        ))
        .unwrap();
        assert_eq!(ctx.get_aci_subnet_name().as_deref(), Some("aci"));
    }

    #[test]
    fn test_secret_rotation_needs_provider_on_update() {
        let raw = RawParameters {
            enable_secret_rotation: Some(true),
            rotation_poll_interval: Some("5m".to_string()),
            ..RawParameters::default()
        };
        let ctx = update_ctx(raw.clone(), ManagedCluster::new("westus2"));
        assert!(matches!(ctx.get_enable_secret_rotation(), Err(Error::InvalidArgumentValue(_))));
        assert!(ctx.get_rotation_poll_interval().is_err());

        let ctx = update_ctx(
            raw,
            cluster_with_addon(AZURE_KEYVAULT_SECRETS_PROVIDER_ADDON_NAME, true, &[]),
        );
        assert!(ctx.get_enable_secret_rotation().unwrap());
        assert_eq!(ctx.get_rotation_poll_interval().unwrap().as_deref(), Some("5m"));
    }

    #[test]
    fn test_disable_secret_rotation_on_create_is_unchecked() {
        let raw = RawParameters {
            disable_secret_rotation: Some(true),
            ..RawParameters::default()
        };
        assert!(create_ctx(raw).get_disable_secret_rotation().unwrap());
    }
}
