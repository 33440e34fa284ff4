//! Config-backed cloud backend.
//!
//! Lookups are answered from [`AksConfig`]. Role assignments and addon
//! setup have no local effect beyond a log line, and a dry run skips them.

use crate::config::AksConfig;
use anyhow::{Context, Result, bail};
use clustermodel::{ManagedCluster, ResourceId};
use decorator::external::{
    AddonRoleAssignments, CloudBackend, ContainerInsightsRequest, Identity,
    ServicePrincipalCredentials, ServicePrincipalRequest,
};
use log::{debug, info};

pub struct ConfigCloud {
    config: AksConfig,
    dry_run: bool,
}

impl ConfigCloud {
    pub fn new(config: AksConfig) -> Self {
        Self {
            config,
            dry_run: false,
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// True when `action` must not run.
    fn skipped(&self, action: &str) -> bool {
        if self.dry_run {
            info!("dry run, skipping {action}");
        }
        self.dry_run
    }

    fn location_of(&self, resource_group: &str) -> Option<&String> {
        self.config
            .resource_groups
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(resource_group))
            .map(|(_, location)| location)
    }
}

/// Default Log Analytics workspace for a subscription and region.
fn default_workspace_id(subscription_id: &str, location: &str) -> String {
    format!(
        "/subscriptions/{subscription_id}/resourceGroups/DefaultResourceGroup-{location}/providers/\
         Microsoft.OperationalInsights/workspaces/DefaultWorkspace-{subscription_id}-{location}"
    )
}

impl CloudBackend for ConfigCloud {
    fn subscription_id(&self) -> Result<String> {
        self.config
            .account
            .subscription_id
            .clone()
            .context("No subscription configured, set [account].subscription_id in config.toml")
    }

    fn tenant_id(&self) -> Result<String> {
        self.config
            .account
            .tenant_id
            .clone()
            .context("No tenant configured, set [account].tenant_id in config.toml")
    }

    fn resource_group_location(&self, resource_group: &str) -> Result<String> {
        self.location_of(resource_group).cloned().with_context(|| {
            format!(
                "Resource group '{resource_group}' not found, add it under [resource_groups] \
                 in config.toml or pass a location"
            )
        })
    }

    fn user_assigned_identity(&self, id: &ResourceId) -> Result<Identity> {
        let identity = self
            .config
            .identity(&id.to_string())
            .with_context(|| format!("Identity '{}' not found in config.toml", id.name))?;
        Ok(Identity {
            client_id: identity.client_id.clone(),
            principal_id: identity.principal_id.clone(),
        })
    }

    fn ensure_service_principal(
        &self,
        request: &ServicePrincipalRequest,
    ) -> Result<ServicePrincipalCredentials> {
        match (&request.service_principal, &request.client_secret) {
            (Some(client_id), Some(secret)) => Ok(ServicePrincipalCredentials {
                client_id: client_id.clone(),
                secret: secret.clone(),
                aad_session_key: None,
            }),
            (Some(_), None) => bail!("--client-secret is required if --service-principal is specified"),
            (None, _) => {
                let configured = self.config.service_principal.as_ref().context(
                    "No service principal given and none configured, add [service_principal] \
                     to config.toml",
                )?;
                info!("using configured service principal for {}", request.name);
                Ok(ServicePrincipalCredentials {
                    client_id: configured.client_id.clone(),
                    secret: configured.secret.clone(),
                    aad_session_key: configured.aad_session_key.clone(),
                })
            }
        }
    }

    fn ensure_default_workspace(&self, subscription_id: &str, resource_group: &str) -> Result<String> {
        if let Some(id) = &self.config.workspace.default_id {
            return Ok(id.clone());
        }
        let location = self.resource_group_location(resource_group)?;
        let id = default_workspace_id(subscription_id, &location);
        debug!("using default workspace {id}");
        Ok(id)
    }

    fn ensure_container_insights(&self, request: &ContainerInsightsRequest) -> Result<()> {
        if self.skipped("container insights setup") {
            return Ok(());
        }
        info!(
            "container insights for {} (dcr: {}, dcra: {})",
            request.cluster_name, request.create_dcr, request.create_dcra
        );
        Ok(())
    }

    fn subnet_role_assignment_exists(&self, subnet_id: &str) -> Result<bool> {
        debug!("no recorded role assignments on {subnet_id}");
        Ok(false)
    }

    fn add_role_assignment(
        &self,
        role: &str,
        assignee: &str,
        scope: &str,
        _is_service_principal: bool,
    ) -> Result<bool> {
        if self.skipped(&format!("{role} assignment on {scope}")) {
            return Ok(true);
        }
        info!("role assignment: {role} for {assignee} on {scope}");
        Ok(true)
    }

    fn ensure_kubelet_identity_permission(
        &self,
        cluster_identity_object_id: &str,
        kubelet_identity_id: &str,
    ) -> Result<()> {
        if self.skipped("Managed Identity Operator assignment") {
            return Ok(());
        }
        info!("Managed Identity Operator for {cluster_identity_object_id} on {kubelet_identity_id}");
        Ok(())
    }

    fn ensure_acr(
        &self,
        assignee: &str,
        acr: &str,
        _subscription_id: &str,
        detach: bool,
        _is_service_principal: bool,
    ) -> Result<()> {
        if self.skipped(&format!("acrpull on {acr}")) {
            return Ok(());
        }
        if detach {
            info!("acrpull revoked from {assignee} on {acr}");
        } else {
            info!("acrpull granted to {assignee} on {acr}");
        }
        Ok(())
    }

    fn add_addon_role_assignments(
        &self,
        _cluster: &ManagedCluster,
        assignments: &AddonRoleAssignments,
    ) -> Result<()> {
        if self.skipped("addon role assignments") {
            return Ok(());
        }
        info!("addon role assignments: {assignments:?}");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{IdentityConfig, ServicePrincipalConfig};

    const IDENTITY: &str = "/subscriptions/1234-5678/resourceGroups/id/providers/Microsoft.ManagedIdentity/userAssignedIdentities/control";

    fn config() -> AksConfig {
        let mut config = AksConfig::default();
        config.account.subscription_id = Some("1234-5678".to_string());
        config
            .resource_groups
            .insert("MyRG".to_string(), "westus2".to_string());
        config.identities.insert(
            IDENTITY.to_string(),
            IdentityConfig {
                client_id: "client-1".to_string(),
                principal_id: "principal-1".to_string(),
            },
        );
        config
    }

    fn request(sp: Option<&str>, secret: Option<&str>) -> ServicePrincipalRequest {
        ServicePrincipalRequest {
            service_principal: sp.map(str::to_string),
            client_secret: secret.map(str::to_string),
            subscription_id: "1234-5678".to_string(),
            location: "westus2".to_string(),
            name: "aks".to_string(),
            ..ServicePrincipalRequest::default()
        }
    }

    #[test]
    fn test_lookups() {
        let cloud = ConfigCloud::new(config());
        assert_eq!(cloud.subscription_id().unwrap(), "1234-5678");
        assert!(cloud.tenant_id().is_err());
        assert_eq!(cloud.resource_group_location("myrg").unwrap(), "westus2");
        assert!(cloud.resource_group_location("other").is_err());

        let id: ResourceId = IDENTITY.parse().unwrap();
        assert_eq!(
            cloud.user_assigned_identity(&id).unwrap(),
            Identity {
                client_id: "client-1".to_string(),
                principal_id: "principal-1".to_string(),
            }
        );
    }

    #[test]
    fn test_service_principal_resolution() {
        let cloud = ConfigCloud::new(config());
        assert_eq!(
            cloud
                .ensure_service_principal(&request(Some("sp"), Some("secret")))
                .unwrap()
                .client_id,
            "sp"
        );
        assert!(cloud.ensure_service_principal(&request(Some("sp"), None)).is_err());
        assert!(cloud.ensure_service_principal(&request(None, None)).is_err());

        let mut with_sp = config();
        with_sp.service_principal = Some(ServicePrincipalConfig {
            client_id: "configured".to_string(),
            secret: "s".to_string(),
            aad_session_key: Some("key".to_string()),
        });
        let credentials = ConfigCloud::new(with_sp)
            .ensure_service_principal(&request(None, None))
            .unwrap();
        assert_eq!(credentials.client_id, "configured");
        assert_eq!(credentials.aad_session_key.as_deref(), Some("key"));
    }

    #[test]
    fn test_dry_run_skips_assignments() {
        let cloud = ConfigCloud::new(config()).with_dry_run(true);
        assert!(cloud.skipped("acrpull on registry"));
        assert!(cloud.ensure_acr("sp-id", "registry", "1234-5678", false, true).is_ok());
        assert!(cloud.ensure_acr("sp-id", "old", "1234-5678", true, true).is_ok());
        assert!(cloud.add_role_assignment("Network Contributor", "a", "s", true).unwrap());
        assert_eq!(cloud.subscription_id().unwrap(), "1234-5678");

        assert!(!ConfigCloud::new(config()).skipped("acrpull on registry"));
    }

    #[test]
    fn test_default_workspace() {
        let cloud = ConfigCloud::new(config());
        assert_eq!(
            cloud.ensure_default_workspace("1234-5678", "MyRG").unwrap(),
            "/subscriptions/1234-5678/resourceGroups/DefaultResourceGroup-westus2/providers/\
             Microsoft.OperationalInsights/workspaces/DefaultWorkspace-1234-5678-westus2"
        );
    }
}
