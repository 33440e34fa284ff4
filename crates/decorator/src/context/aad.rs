//! Azure AD integration and Kubernetes RBAC.

use super::{DecoratorContext, flag, present};
use crate::error::{Error, Result};
use crate::graph::Accessor;
use crate::intermediates::TENANT_ID;
use crate::mode::DecoratorMode;
use crate::params::split_comma;

/// Legacy AAD application settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AadApps {
    pub client_app_id: Option<String>,
    pub server_app_id: Option<String>,
    pub server_app_secret: Option<String>,
}

impl AadApps {
    fn any(&self) -> bool {
        present(self.client_app_id.as_deref())
            || present(self.server_app_id.as_deref())
            || present(self.server_app_secret.as_deref())
    }
}

const AAD_APPS_CONFLICT: &str = "--enable-aad cannot be used together with --aad-client-app-id, \
                                 --aad-server-app-id or --aad-server-app-secret";
const AZURE_RBAC_NEEDS_AAD: &str = "--enable-azure-rbac can only be used together with --enable-aad";
const AZURE_RBAC_DISABLE_RBAC: &str = "--enable-azure-rbac cannot be used together with --disable-rbac";
const AZURE_RBAC_TOGGLES: &str =
    "Cannot specify \"--enable-azure-rbac\" and \"--disable-azure-rbac\" at the same time";

impl DecoratorContext {
    fn managed_aad_enabled(&self) -> bool {
        self.mc
            .as_ref()
            .and_then(|mc| mc.aad_profile.as_ref())
            .is_some_and(|aad| aad.is_managed())
    }

    fn require_managed_aad(&self, option: &str) -> Result<()> {
        if self.managed_aad_enabled() {
            Ok(())
        } else {
            Err(Error::invalid(format!(
                "Cannot specify \"--{option}\" if managed AAD is not enabled"
            )))
        }
    }

    // ========================================================================
    // AAD
    // ========================================================================

    pub(super) fn peek_enable_aad(&self) -> bool {
        flag(
            self.resolve(self.raw.enable_aad, |mc| {
                mc.aad_profile.as_ref().and_then(|aad| aad.managed)
            })
            .value(),
        )
    }

    pub fn get_enable_aad(&self) -> Result<bool> {
        let enable_aad = self.peek_enable_aad();
        match self.mode {
            DecoratorMode::Create => {
                if enable_aad && self.peek_aad_apps().any() {
                    return Err(Error::exclusive(AAD_APPS_CONFLICT));
                }
                if !enable_aad && self.peek_enable_azure_rbac() {
                    return Err(Error::missing(AZURE_RBAC_NEEDS_AAD));
                }
            }
            DecoratorMode::Update => {
                if enable_aad && self.managed_aad_enabled() {
                    return Err(Error::invalid(
                        "Cannot specify \"--enable-aad\" if managed AAD is already enabled",
                    ));
                }
            }
        }
        Ok(enable_aad)
    }

    pub(super) fn peek_aad_apps(&self) -> AadApps {
        let aad = |mc: &clustermodel::ManagedCluster| mc.aad_profile.clone();
        AadApps {
            client_app_id: self
                .resolve(self.raw.aad_client_app_id.clone(), |mc| {
                    aad(mc).and_then(|a| a.client_app_id)
                })
                .value(),
            server_app_id: self
                .resolve(self.raw.aad_server_app_id.clone(), |mc| {
                    aad(mc).and_then(|a| a.server_app_id)
                })
                .value(),
            server_app_secret: self
                .resolve(self.raw.aad_server_app_secret.clone(), |mc| {
                    aad(mc).and_then(|a| a.server_app_secret)
                })
                .value(),
        }
    }

    pub fn get_aad_client_app_id_and_aad_server_app_id_and_aad_server_app_secret(
        &self,
    ) -> Result<AadApps> {
        let apps = self.peek_aad_apps();
        if self.peek_enable_aad() && apps.any() {
            return Err(Error::exclusive(AAD_APPS_CONFLICT));
        }
        Ok(apps)
    }

    /// Tenant of the AAD integration.
    ///
    /// Legacy AAD apps without an explicit tenant use the tenant of the
    /// current login.
    pub fn get_aad_tenant_id(&self) -> Result<Option<String>> {
        let resolved = self.resolve(self.raw.aad_tenant_id.clone(), |mc| {
            mc.aad_profile.as_ref().and_then(|aad| aad.tenant_id.clone())
        });
        let from_descriptor = resolved.is_descriptor();
        let mut tenant = resolved.value();

        if self.mode.is_create()
            && !from_descriptor
            && tenant.is_none()
            && !self.peek_enable_aad()
            && self.peek_aad_apps().any()
        {
            tenant = match self.intermediates.get_str(TENANT_ID) {
                Some(cached) => Some(cached),
                None => {
                    self.completing(Accessor::AadTenantId);
                    let id = self.cloud.tenant_id()?;
                    self.intermediates.set(TENANT_ID, id.clone(), true);
                    Some(id)
                }
            };
        }

        if self.mode.is_update() && present(tenant.as_deref()) {
            self.require_managed_aad("aad-tenant-id")?;
        }
        Ok(tenant)
    }

    pub fn get_aad_admin_group_object_ids(&self) -> Result<Option<Vec<String>>> {
        let ids = self
            .resolve(self.raw.aad_admin_group_object_ids.as_deref().map(split_comma), |mc| {
                mc.aad_profile
                    .as_ref()
                    .and_then(|aad| aad.admin_group_object_ids.clone())
            })
            .value();
        if self.mode.is_update() && ids.as_ref().is_some_and(|ids| !ids.is_empty()) {
            self.require_managed_aad("aad-admin-group-object-ids")?;
        }
        Ok(ids)
    }

    // ========================================================================
    // RBAC
    // ========================================================================

    pub(super) fn peek_disable_rbac(&self) -> bool {
        flag(
            self.reconcile(self.raw.disable_rbac, |mc| mc.enable_rbac.map(|enabled| !enabled))
                .value(),
        )
    }

    pub(super) fn peek_enable_rbac(&self) -> bool {
        flag(self.reconcile(self.raw.enable_rbac, |mc| mc.enable_rbac).value())
    }

    pub fn get_disable_rbac(&self) -> Result<bool> {
        let disable_rbac = self.peek_disable_rbac();
        if disable_rbac {
            if self.peek_enable_azure_rbac() {
                return Err(Error::exclusive(AZURE_RBAC_DISABLE_RBAC));
            }
            if self.peek_enable_rbac() {
                return Err(Error::exclusive(
                    "specify either '--disable-rbac' or '--enable-rbac', not both.",
                ));
            }
        }
        Ok(disable_rbac)
    }

    pub fn get_enable_rbac(&self) -> Result<bool> {
        let enable_rbac = self.peek_enable_rbac();
        if enable_rbac && self.peek_disable_rbac() {
            return Err(Error::exclusive(
                "specify either '--disable-rbac' or '--enable-rbac', not both.",
            ));
        }
        Ok(enable_rbac)
    }

    pub(super) fn peek_enable_azure_rbac(&self) -> bool {
        flag(
            self.resolve(self.raw.enable_azure_rbac, |mc| {
                mc.aad_profile.as_ref().and_then(|aad| aad.enable_azure_rbac)
            })
            .value(),
        )
    }

    pub fn get_enable_azure_rbac(&self) -> Result<bool> {
        let enabled = self.peek_enable_azure_rbac();
        if enabled {
            match self.mode {
                DecoratorMode::Create => {
                    if !self.peek_enable_aad() {
                        return Err(Error::missing(AZURE_RBAC_NEEDS_AAD));
                    }
                    if self.peek_disable_rbac() {
                        return Err(Error::exclusive(AZURE_RBAC_DISABLE_RBAC));
                    }
                }
                DecoratorMode::Update => {
                    self.require_managed_aad("enable-azure-rbac")?;
                    if self.peek_disable_azure_rbac() {
                        return Err(Error::exclusive(AZURE_RBAC_TOGGLES));
                    }
                }
            }
        }
        Ok(enabled)
    }

    pub(super) fn peek_disable_azure_rbac(&self) -> bool {
        flag(self.raw.disable_azure_rbac)
    }

    pub fn get_disable_azure_rbac(&self) -> Result<bool> {
        let disabled = self.peek_disable_azure_rbac();
        if disabled && self.mode.is_update() {
            self.require_managed_aad("disable-azure-rbac")?;
            if self.peek_enable_azure_rbac() {
                return Err(Error::exclusive(AZURE_RBAC_TOGGLES));
            }
        }
        Ok(disabled)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::external::{MockCloud, NoTtySecrets};
    use crate::params::RawParameters;
    use clustermodel::{AadProfile, ManagedCluster};

    fn managed_aad_cluster() -> ManagedCluster {
        ManagedCluster {
            aad_profile: Some(AadProfile {
                managed: Some(true),
                ..AadProfile::default()
            }),
            ..ManagedCluster::new("westus2")
        }
    }

    #[test]
    fn test_enable_aad_conflicts_with_legacy_apps() {
        let raw = RawParameters {
            enable_aad: Some(true),
            aad_server_app_id: Some("server".to_string()),
            ..RawParameters::default()
        };
        let ctx = create_ctx(raw);
        assert!(matches!(ctx.get_enable_aad(), Err(Error::MutuallyExclusiveArguments(_))));
        assert!(
            ctx.get_aad_client_app_id_and_aad_server_app_id_and_aad_server_app_secret()
                .is_err()
        );
    }

    #[test]
    fn test_azure_rbac_requires_aad_on_create() {
        let raw = RawParameters {
            enable_azure_rbac: Some(true),
            ..RawParameters::default()
        };
        let ctx = create_ctx(raw);
        assert!(matches!(ctx.get_enable_aad(), Err(Error::RequiredArgumentMissing(_))));
        assert!(matches!(
            ctx.get_enable_azure_rbac(),
            Err(Error::RequiredArgumentMissing(_))
        ));
    }

    #[test]
    fn test_enable_aad_on_managed_cluster_is_rejected() {
        let raw = RawParameters {
            enable_aad: Some(true),
            ..RawParameters::default()
        };
        let ctx = update_ctx(raw, managed_aad_cluster());
        assert_eq!(
            ctx.get_enable_aad().unwrap_err().to_string(),
            "Cannot specify \"--enable-aad\" if managed AAD is already enabled"
        );
    }

    #[test]
    fn test_tenant_from_login_for_legacy_apps() {
        let raw = RawParameters {
            aad_client_app_id: Some("client".to_string()),
            aad_server_app_id: Some("server".to_string()),
            ..RawParameters::default()
        };
        let cloud = MockCloud::new().with_tenant("tenant-1");
        let ctx = ctx_with(raw, DecoratorMode::Create, cloud.clone(), NoTtySecrets);
        assert_eq!(ctx.get_aad_tenant_id().unwrap().as_deref(), Some("tenant-1"));
        assert_eq!(ctx.get_aad_tenant_id().unwrap().as_deref(), Some("tenant-1"));
        assert_eq!(cloud.count("tenant_id"), 1);
    }

    #[test]
    fn test_tenant_without_apps_stays_unset() {
        assert_eq!(create_ctx(RawParameters::default()).get_aad_tenant_id().unwrap(), None);
    }

    #[test]
    fn test_update_requires_managed_aad() {
        let raw = RawParameters {
            aad_tenant_id: Some("tenant".to_string()),
            aad_admin_group_object_ids: Some("g1,g2".to_string()),
            enable_azure_rbac: Some(true),
            ..RawParameters::default()
        };
        let ctx = update_ctx(raw.clone(), ManagedCluster::new("westus2"));
        assert!(matches!(ctx.get_aad_tenant_id(), Err(Error::InvalidArgumentValue(_))));
        assert!(ctx.get_aad_admin_group_object_ids().is_err());
        assert!(ctx.get_enable_azure_rbac().is_err());

        let ctx = update_ctx(raw, managed_aad_cluster());
        assert_eq!(ctx.get_aad_tenant_id().unwrap().as_deref(), Some("tenant"));
        assert_eq!(
            ctx.get_aad_admin_group_object_ids().unwrap(),
            Some(vec!["g1".to_string(), "g2".to_string()])
        );
        assert!(ctx.get_enable_azure_rbac().unwrap());
    }

    #[test]
    fn test_azure_rbac_toggles_conflict_on_update() {
        let raw = RawParameters {
            enable_azure_rbac: Some(true),
            disable_azure_rbac: Some(true),
            ..RawParameters::default()
        };
        let ctx = update_ctx(raw, managed_aad_cluster());
        assert!(matches!(
            ctx.get_enable_azure_rbac(),
            Err(Error::MutuallyExclusiveArguments(_))
        ));
        assert!(matches!(
            ctx.get_disable_azure_rbac(),
            Err(Error::MutuallyExclusiveArguments(_))
        ));
    }

    #[test]
    fn test_disable_azure_rbac_guard_reads_flag() {
        let ctx = update_ctx(RawParameters::default(), managed_aad_cluster());
        assert!(!ctx.peek_disable_azure_rbac());

        let raw = RawParameters {
            disable_azure_rbac: Some(true),
            ..RawParameters::default()
        };
        let ctx = update_ctx(raw, managed_aad_cluster());
        assert!(ctx.peek_disable_azure_rbac());
        assert!(ctx.get_disable_azure_rbac().unwrap());
    }

    #[test]
    fn test_rbac_toggles() {
        let raw = RawParameters {
            enable_rbac: Some(true),
            disable_rbac: Some(true),
            ..RawParameters::default()
        };
        let ctx = create_ctx(raw);
        assert!(ctx.get_enable_rbac().is_err());
        assert!(ctx.get_disable_rbac().is_err());

        let raw = RawParameters {
            disable_rbac: Some(true),
            enable_aad: Some(true),
            enable_azure_rbac: Some(true),
            ..RawParameters::default()
        };
        let err = create_ctx(raw).get_disable_rbac().unwrap_err();
        assert_eq!(err.to_string(), AZURE_RBAC_DISABLE_RBAC);
    }

    #[test]
    fn test_rbac_read_back_in_update() {
        let mc = ManagedCluster {
            enable_rbac: Some(false),
            ..ManagedCluster::new("westus2")
        };
        let ctx = update_ctx(RawParameters::default(), mc);
        assert!(ctx.get_disable_rbac().unwrap());
        assert!(!ctx.get_enable_rbac().unwrap());
    }

    #[test]
    fn test_admin_group_ids_empty_string() {
        let raw = RawParameters {
            aad_admin_group_object_ids: Some(String::new()),
            ..RawParameters::default()
        };
        assert_eq!(
            create_ctx(raw).get_aad_admin_group_object_ids().unwrap(),
            Some(Vec::new())
        );
    }
}
