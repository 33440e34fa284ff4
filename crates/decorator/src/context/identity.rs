//! Cluster identity, service principal and container registry access.

use super::{DecoratorContext, flag, present};
use crate::error::{Error, Result};
use crate::external::{Identity, ServicePrincipalRequest};
use crate::graph::Accessor;
use crate::intermediates::{AAD_SESSION_KEY, CLIENT_SECRET, SERVICE_PRINCIPAL};
use crate::mode::DecoratorMode;
use clustermodel::ResourceId;
use log::debug;

impl DecoratorContext {
    // ========================================================================
    // Service principal
    // ========================================================================

    /// Service principal and secret without completion.
    ///
    /// The flag tells whether the pair was read back from the descriptor.
    pub(super) fn peek_service_principal_and_client_secret(
        &self,
    ) -> Result<(Option<String>, Option<String>, bool)> {
        let from_descriptor = self.descriptor_holds_pair(
            |mc| {
                mc.service_principal_profile
                    .as_ref()
                    .map_or((false, false), |p| (true, p.secret.is_some()))
            },
            "sp",
            "secret",
        )?;
        let service_principal = self
            .resolve(self.raw.service_principal.clone(), |mc| {
                mc.service_principal_profile.as_ref().map(|p| p.client_id.clone())
            })
            .value();
        let client_secret = self
            .resolve(self.raw.client_secret.clone(), |mc| {
                mc.service_principal_profile.as_ref().and_then(|p| p.secret.clone())
            })
            .value();
        Ok((service_principal, client_secret, from_descriptor))
    }

    /// Service principal credentials.
    ///
    /// Unless a managed identity is used without explicit credentials, the
    /// credentials are completed by the cloud, which may create a new
    /// principal. The result is cached for the rest of the invocation.
    pub fn get_service_principal_and_client_secret(
        &self,
    ) -> Result<(Option<String>, Option<String>)> {
        let (service_principal, client_secret, from_descriptor) =
            self.peek_service_principal_and_client_secret()?;
        if from_descriptor {
            return Ok((service_principal, client_secret));
        }
        if let (Some(sp), Some(secret)) = (
            self.intermediates().get_str(SERVICE_PRINCIPAL),
            self.intermediates().get_str(CLIENT_SECRET),
        ) {
            return Ok((Some(sp), Some(secret)));
        }
        if self.peek_enable_managed_identity()?
            && !present(service_principal.as_deref())
            && !present(client_secret.as_deref())
        {
            return Ok((service_principal, client_secret));
        }

        self.completing(Accessor::ServicePrincipal);
        let request = ServicePrincipalRequest {
            service_principal,
            client_secret,
            subscription_id: self.get_subscription_id()?,
            dns_name_prefix: self.get_dns_name_prefix()?,
            fqdn_subdomain: self.peek_fqdn_subdomain().value(),
            location: self.get_location()?,
            name: self.get_name()?,
        };
        let credentials = self.cloud.ensure_service_principal(&request)?;
        self.set_intermediate(SERVICE_PRINCIPAL, credentials.client_id.clone(), true);
        self.set_intermediate(CLIENT_SECRET, credentials.secret.clone(), true);
        if let Some(key) = credentials.aad_session_key {
            self.set_intermediate(AAD_SESSION_KEY, key, true);
        }
        Ok((Some(credentials.client_id), Some(credentials.secret)))
    }

    // ========================================================================
    // Managed identity
    // ========================================================================

    pub(super) fn peek_enable_managed_identity(&self) -> Result<bool> {
        match self.mode {
            DecoratorMode::Create => {
                if let Some(msi) = self.descriptor(|mc| mc.identity.as_ref().map(|_| mc.is_msi_cluster())) {
                    return Ok(msi);
                }
                let (sp, secret, _) = self.peek_service_principal_and_client_secret()?;
                if present(sp.as_deref()) && present(secret.as_deref()) {
                    return Ok(false);
                }
                Ok(flag(self.raw.enable_managed_identity))
            }
            DecoratorMode::Update => Ok(flag(self.raw.enable_managed_identity)),
        }
    }

    pub fn get_enable_managed_identity(&self) -> Result<bool> {
        let enable_managed_identity = self.peek_enable_managed_identity()?;
        if !enable_managed_identity && present(self.peek_assign_identity().as_deref()) {
            return Err(assign_identity_requires_msi());
        }
        Ok(enable_managed_identity)
    }

    pub fn get_skip_subnet_role_assignment(&self) -> bool {
        flag(self.raw.skip_subnet_role_assignment)
    }

    pub(super) fn peek_assign_identity(&self) -> Option<String> {
        self.resolve(self.raw.assign_identity.clone(), |mc| {
            mc.identity
                .as_ref()
                .and_then(|i| i.user_assigned_identities.as_ref())
                .and_then(|ids| ids.keys().next().cloned())
        })
        .value()
    }

    /// Resource id of the user-assigned control plane identity.
    pub fn get_assign_identity(&self) -> Result<Option<String>> {
        let assign_identity = self.peek_assign_identity();
        if present(assign_identity.as_deref()) {
            if !self.peek_enable_managed_identity()? {
                return Err(assign_identity_requires_msi());
            }
        } else {
            match self.mode {
                DecoratorMode::Create => {
                    if present(self.peek_assign_kubelet_identity().as_deref()) {
                        return Err(kubelet_identity_requires_assign_identity());
                    }
                }
                DecoratorMode::Update => {}
            }
        }
        Ok(assign_identity)
    }

    pub(super) fn peek_assign_kubelet_identity(&self) -> Option<String> {
        self.resolve(self.raw.assign_kubelet_identity.clone(), |mc| {
            mc.kubelet_identity().and_then(|i| i.resource_id.clone())
        })
        .value()
    }

    /// Resource id of the user-assigned kubelet identity.
    pub fn get_assign_kubelet_identity(&self) -> Result<Option<String>> {
        let kubelet_identity = self.peek_assign_kubelet_identity();
        if present(kubelet_identity.as_deref()) && !present(self.peek_assign_identity().as_deref()) {
            return Err(kubelet_identity_requires_assign_identity());
        }
        Ok(kubelet_identity)
    }

    /// Look up a user-assigned identity by resource id.
    pub fn get_identity_by_msi_client(&self, resource_id: &str) -> Result<Identity> {
        let id = ResourceId::parse(resource_id).map_err(|e| Error::invalid(e.to_string()))?;
        debug!("looking up identity {} in {}", id.name, id.resource_group);
        Ok(self.cloud.user_assigned_identity(&id)?)
    }

    fn user_assigned_identity(&self) -> Result<Identity> {
        self.completing(Accessor::UserAssignedIdentity);
        match self.get_assign_identity()? {
            Some(id) if !id.is_empty() => self.get_identity_by_msi_client(&id),
            _ => Err(Error::missing("No assigned identity provided.")),
        }
    }

    pub fn get_user_assigned_identity_client_id(&self) -> Result<String> {
        Ok(self.user_assigned_identity()?.client_id)
    }

    pub fn get_user_assigned_identity_object_id(&self) -> Result<String> {
        Ok(self.user_assigned_identity()?.principal_id)
    }

    // ========================================================================
    // Container registry
    // ========================================================================

    pub fn get_attach_acr(&self) -> Result<Option<String>> {
        let attach_acr = self.raw.attach_acr.clone();
        match self.mode {
            DecoratorMode::Create if present(attach_acr.as_deref()) => {
                self.completing(Accessor::AttachAcr);
                if self.peek_enable_managed_identity()? {
                    if self.get_no_wait() {
                        return Err(Error::exclusive(
                            "When --attach-acr and --enable-managed-identity are both specified, \
                             --no-wait is not allowed, please wait until the whole operation \
                             succeeds.",
                        ));
                    }
                } else {
                    let (service_principal, _, _) = self.peek_service_principal_and_client_secret()?;
                    if !present(service_principal.as_deref())
                        && self.intermediates().get_str(SERVICE_PRINCIPAL).is_none()
                    {
                        return Err(Error::missing(
                            "No service principal provided to create the acrpull role assignment \
                             for acr.",
                        ));
                    }
                }
            }
            DecoratorMode::Create | DecoratorMode::Update => {}
        }
        Ok(attach_acr)
    }

    pub fn get_detach_acr(&self) -> Option<String> {
        self.raw.detach_acr.clone()
    }

    /// Principal that registry permissions are granted to on an existing
    /// cluster, and whether it is a service principal.
    pub fn get_assignee_from_identity_or_sp_profile(&self) -> Result<(String, bool)> {
        self.completing(Accessor::Assignee);
        let mc = self.require_mc()?;
        let (assignee, is_service_principal) = if mc.is_msi_cluster() {
            let object_id = mc
                .kubelet_identity()
                .ok_or_else(|| {
                    Error::unknown_state(
                        "Unexpected error getting kubelet's identity for the cluster. Please do \
                         not set --attach-acr or --detach-acr. You can manually grant or revoke \
                         permission to the identity named <ClUSTER_NAME>-agentpool in MC_ \
                         resource group to access ACR.",
                    )
                })?
                .object_id
                .clone();
            (object_id, false)
        } else {
            (
                mc.service_principal_profile.as_ref().map(|p| p.client_id.clone()),
                true,
            )
        };
        match assignee {
            Some(assignee) if !assignee.is_empty() => Ok((assignee, is_service_principal)),
            _ => Err(Error::unknown_state(
                "Cannot get the AKS cluster's service principal.",
            )),
        }
    }
}

fn assign_identity_requires_msi() -> Error {
    Error::missing(
        "--assign-identity can only be specified when --enable-managed-identity is specified",
    )
}

fn kubelet_identity_requires_assign_identity() -> Error {
    Error::missing(
        "--assign-kubelet-identity can only be specified when --assign-identity is specified",
    )
}
