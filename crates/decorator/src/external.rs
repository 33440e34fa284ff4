//! Collaborators the context reaches out to.
//!
//! The decorator never talks to the network or a terminal itself. Lookups,
//! role assignments and submission go through [`CloudBackend`] and
//! [`ClusterClient`]; prompts go through [`SecretSource`].
//!
//! # Testing
//!
//! Use [`MockCloud`], [`MockClusterClient`] and [`ScriptedSecrets`] to run the
//! pipelines without side effects:
//!
//! ```
//! use decorator::external::{CloudBackend, MockCloud};
//!
//! let cloud = MockCloud::new().with_subscription("1234-5678");
//! assert_eq!(cloud.subscription_id().unwrap(), "1234-5678");
//! assert_eq!(cloud.calls(), vec!["subscription_id".to_string()]);
//! ```

use anyhow::anyhow;
use clustermodel::{AddonProfile, ManagedCluster, ResourceId};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

// ============================================================================
// Requests and responses
// ============================================================================

/// Client and principal ids of a user-assigned identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub client_id: String,
    pub principal_id: String,
}

/// Inputs for creating or reusing a service principal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServicePrincipalRequest {
    pub service_principal: Option<String>,
    pub client_secret: Option<String>,
    pub subscription_id: String,
    pub dns_name_prefix: Option<String>,
    pub fqdn_subdomain: Option<String>,
    pub location: String,
    pub name: String,
}

/// A service principal ready to use.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServicePrincipalCredentials {
    pub client_id: String,
    pub secret: String,
    /// Set when the principal was just created in a fresh AAD session.
    pub aad_session_key: Option<String>,
}

/// Inputs for preparing the monitoring addon's workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInsightsRequest {
    pub addon: AddonProfile,
    pub subscription_id: String,
    pub resource_group: String,
    pub cluster_name: String,
    pub location: String,
    /// Authenticate the agent with the cluster's managed identity.
    pub aad_route: bool,
    /// Create the data collection rule.
    pub create_dcr: bool,
    /// Associate the data collection rule with the cluster.
    pub create_dcra: bool,
}

/// Role assignments owed to addon identities once the cluster exists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddonRoleAssignments {
    /// Full resource id of the cluster, set when monitoring needs a metrics role.
    pub monitoring_cluster_id: Option<String>,
    pub ingress_appgw: bool,
    /// Subnet of the virtual node addon, set when the addon is enabled.
    pub virtual_node_subnet_id: Option<String>,
}

impl AddonRoleAssignments {
    pub fn is_empty(&self) -> bool {
        self.monitoring_cluster_id.is_none()
            && !self.ingress_appgw
            && self.virtual_node_subnet_id.is_none()
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Lookups and side effects against the cloud account.
pub trait CloudBackend: Send + Sync {
    fn subscription_id(&self) -> anyhow::Result<String>;

    fn tenant_id(&self) -> anyhow::Result<String>;

    /// Location of an existing resource group.
    fn resource_group_location(&self, resource_group: &str) -> anyhow::Result<String>;

    /// Resolve a user-assigned identity by its parsed resource id.
    fn user_assigned_identity(&self, id: &ResourceId) -> anyhow::Result<Identity>;

    /// Return usable service principal credentials, creating a principal
    /// when none was given.
    fn ensure_service_principal(
        &self,
        request: &ServicePrincipalRequest,
    ) -> anyhow::Result<ServicePrincipalCredentials>;

    /// Resource id of the default Log Analytics workspace, created on demand.
    fn ensure_default_workspace(
        &self,
        subscription_id: &str,
        resource_group: &str,
    ) -> anyhow::Result<String>;

    fn ensure_container_insights(&self, request: &ContainerInsightsRequest) -> anyhow::Result<()>;

    /// Whether a Network Contributor assignment already exists on the subnet.
    fn subnet_role_assignment_exists(&self, subnet_id: &str) -> anyhow::Result<bool>;

    /// Create a role assignment. Returns `false` when the caller lacks permission.
    fn add_role_assignment(
        &self,
        role: &str,
        assignee: &str,
        scope: &str,
        is_service_principal: bool,
    ) -> anyhow::Result<bool>;

    /// Let the control plane identity operate the kubelet identity.
    fn ensure_kubelet_identity_permission(
        &self,
        cluster_identity_object_id: &str,
        kubelet_identity_id: &str,
    ) -> anyhow::Result<()>;

    /// Grant (or with `detach`, revoke) acrpull on a registry.
    fn ensure_acr(
        &self,
        assignee: &str,
        acr: &str,
        subscription_id: &str,
        detach: bool,
        is_service_principal: bool,
    ) -> anyhow::Result<()>;

    fn add_addon_role_assignments(
        &self,
        cluster: &ManagedCluster,
        assignments: &AddonRoleAssignments,
    ) -> anyhow::Result<()>;
}

/// Reads and writes cluster descriptors on the control plane.
pub trait ClusterClient: Send + Sync {
    fn get(&self, resource_group: &str, name: &str) -> anyhow::Result<ManagedCluster>;

    /// Submit a descriptor and return the stored result.
    fn create_or_update(
        &self,
        resource_group: &str,
        name: &str,
        mc: &ManagedCluster,
        headers: &BTreeMap<String, String>,
        no_wait: bool,
    ) -> anyhow::Result<ManagedCluster>;
}

/// Failure of an interactive prompt.
#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    /// No terminal is attached to ask on.
    #[error("no terminal available for prompting")]
    NoTty,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Interactive input.
pub trait SecretSource: Send + Sync {
    fn prompt(&self, message: &str) -> Result<String, PromptError>;

    /// Ask for a hidden value, optionally twice for confirmation.
    fn prompt_password(&self, message: &str, confirm: bool) -> Result<String, PromptError>;

    fn confirm(&self, message: &str, default: bool) -> Result<bool, PromptError>;
}

// ============================================================================
// Test doubles
// ============================================================================

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory cloud that records every call.
///
/// Unconfigured lookups fail, so a test only succeeds when it configured
/// the collaborators it expects to be used.
#[derive(Debug, Clone, Default)]
pub struct MockCloud {
    subscription: Option<String>,
    tenant: Option<String>,
    locations: BTreeMap<String, String>,
    identities: BTreeMap<String, Identity>,
    service_principal: Option<ServicePrincipalCredentials>,
    workspace: Option<String>,
    subnet_assignment_exists: bool,
    deny_role_assignments: bool,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockCloud {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_subscription(mut self, id: impl Into<String>) -> Self {
        self.subscription = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_tenant(mut self, id: impl Into<String>) -> Self {
        self.tenant = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_resource_group(mut self, name: impl Into<String>, location: impl Into<String>) -> Self {
        self.locations.insert(name.into(), location.into());
        self
    }

    /// Register an identity under its full resource id.
    #[must_use]
    pub fn with_identity(mut self, resource_id: impl Into<String>, identity: Identity) -> Self {
        self.identities.insert(resource_id.into().to_lowercase(), identity);
        self
    }

    #[must_use]
    pub fn with_service_principal(mut self, credentials: ServicePrincipalCredentials) -> Self {
        self.service_principal = Some(credentials);
        self
    }

    #[must_use]
    pub fn with_workspace(mut self, id: impl Into<String>) -> Self {
        self.workspace = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_existing_subnet_assignment(mut self) -> Self {
        self.subnet_assignment_exists = true;
        self
    }

    /// Make `add_role_assignment` report missing permission.
    #[must_use]
    pub fn denying_role_assignments(mut self) -> Self {
        self.deny_role_assignments = true;
        self
    }

    /// Calls recorded so far, as `name` or `name:args`.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    /// Number of recorded calls whose name matches.
    pub fn count(&self, name: &str) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|call| call.split(':').next() == Some(name))
            .count()
    }

    fn record(&self, call: impl Into<String>) {
        lock(&self.calls).push(call.into());
    }
}

impl CloudBackend for MockCloud {
    fn subscription_id(&self) -> anyhow::Result<String> {
        self.record("subscription_id");
        self.subscription
            .clone()
            .ok_or_else(|| anyhow!("no subscription configured"))
    }

    fn tenant_id(&self) -> anyhow::Result<String> {
        self.record("tenant_id");
        self.tenant.clone().ok_or_else(|| anyhow!("no tenant configured"))
    }

    fn resource_group_location(&self, resource_group: &str) -> anyhow::Result<String> {
        self.record(format!("resource_group_location:{resource_group}"));
        self.locations
            .get(resource_group)
            .cloned()
            .ok_or_else(|| anyhow!("resource group '{resource_group}' not found"))
    }

    fn user_assigned_identity(&self, id: &ResourceId) -> anyhow::Result<Identity> {
        self.record(format!("user_assigned_identity:{}", id.name));
        self.identities
            .get(&id.to_string().to_lowercase())
            .cloned()
            .ok_or_else(|| anyhow!("identity '{}' not found", id.name))
    }

    fn ensure_service_principal(
        &self,
        request: &ServicePrincipalRequest,
    ) -> anyhow::Result<ServicePrincipalCredentials> {
        self.record(format!("ensure_service_principal:{}", request.name));
        if let (Some(client_id), Some(secret)) =
            (&request.service_principal, &request.client_secret)
        {
            return Ok(ServicePrincipalCredentials {
                client_id: client_id.clone(),
                secret: secret.clone(),
                aad_session_key: None,
            });
        }
        self.service_principal
            .clone()
            .ok_or_else(|| anyhow!("no service principal configured"))
    }

    fn ensure_default_workspace(
        &self,
        subscription_id: &str,
        resource_group: &str,
    ) -> anyhow::Result<String> {
        self.record(format!("ensure_default_workspace:{subscription_id}/{resource_group}"));
        self.workspace
            .clone()
            .ok_or_else(|| anyhow!("no default workspace configured"))
    }

    fn ensure_container_insights(&self, request: &ContainerInsightsRequest) -> anyhow::Result<()> {
        self.record(format!(
            "ensure_container_insights:dcr={},dcra={}",
            request.create_dcr, request.create_dcra
        ));
        Ok(())
    }

    fn subnet_role_assignment_exists(&self, subnet_id: &str) -> anyhow::Result<bool> {
        self.record(format!("subnet_role_assignment_exists:{subnet_id}"));
        Ok(self.subnet_assignment_exists)
    }

    fn add_role_assignment(
        &self,
        role: &str,
        assignee: &str,
        scope: &str,
        is_service_principal: bool,
    ) -> anyhow::Result<bool> {
        self.record(format!(
            "add_role_assignment:{role},{assignee},{scope},{is_service_principal}"
        ));
        Ok(!self.deny_role_assignments)
    }

    fn ensure_kubelet_identity_permission(
        &self,
        cluster_identity_object_id: &str,
        kubelet_identity_id: &str,
    ) -> anyhow::Result<()> {
        self.record(format!(
            "ensure_kubelet_identity_permission:{cluster_identity_object_id},{kubelet_identity_id}"
        ));
        Ok(())
    }

    fn ensure_acr(
        &self,
        assignee: &str,
        acr: &str,
        subscription_id: &str,
        detach: bool,
        is_service_principal: bool,
    ) -> anyhow::Result<()> {
        self.record(format!(
            "ensure_acr:{assignee},{acr},{subscription_id},{detach},{is_service_principal}"
        ));
        Ok(())
    }

    fn add_addon_role_assignments(
        &self,
        _cluster: &ManagedCluster,
        assignments: &AddonRoleAssignments,
    ) -> anyhow::Result<()> {
        self.record(format!(
            "add_addon_role_assignments:monitoring={},appgw={},virtual_node={}",
            assignments.monitoring_cluster_id.is_some(),
            assignments.ingress_appgw,
            assignments.virtual_node_subnet_id.is_some()
        ));
        Ok(())
    }
}

/// In-memory cluster store.
#[derive(Debug, Clone, Default)]
pub struct MockClusterClient {
    clusters: Arc<Mutex<BTreeMap<(String, String), ManagedCluster>>>,
    submissions: Arc<Mutex<Vec<(BTreeMap<String, String>, bool)>>>,
}

impl MockClusterClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a stored cluster.
    #[must_use]
    pub fn with_cluster(self, resource_group: &str, name: &str, mc: ManagedCluster) -> Self {
        lock(&self.clusters).insert((resource_group.to_string(), name.to_string()), mc);
        self
    }

    pub fn stored(&self, resource_group: &str, name: &str) -> Option<ManagedCluster> {
        lock(&self.clusters)
            .get(&(resource_group.to_string(), name.to_string()))
            .cloned()
    }

    /// Headers and `no_wait` of each submission, in order.
    pub fn submissions(&self) -> Vec<(BTreeMap<String, String>, bool)> {
        lock(&self.submissions).clone()
    }
}

impl ClusterClient for MockClusterClient {
    fn get(&self, resource_group: &str, name: &str) -> anyhow::Result<ManagedCluster> {
        self.stored(resource_group, name).ok_or_else(|| {
            anyhow!("managed cluster '{name}' not found in resource group '{resource_group}'")
        })
    }

    fn create_or_update(
        &self,
        resource_group: &str,
        name: &str,
        mc: &ManagedCluster,
        headers: &BTreeMap<String, String>,
        no_wait: bool,
    ) -> anyhow::Result<ManagedCluster> {
        lock(&self.submissions).push((headers.clone(), no_wait));
        lock(&self.clusters).insert((resource_group.to_string(), name.to_string()), mc.clone());
        Ok(mc.clone())
    }
}

/// Answers prompts from a queue and never blocks.
///
/// Running out of answers behaves like a missing terminal.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSecrets {
    answers: Arc<Mutex<VecDeque<String>>>,
    confirmations: Arc<Mutex<VecDeque<bool>>>,
    asked: Arc<Mutex<Vec<String>>>,
}

impl ScriptedSecrets {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an answer for `prompt` or `prompt_password`.
    #[must_use]
    pub fn answer(self, value: impl Into<String>) -> Self {
        lock(&self.answers).push_back(value.into());
        self
    }

    /// Queue an answer for `confirm`.
    #[must_use]
    pub fn confirmation(self, value: bool) -> Self {
        lock(&self.confirmations).push_back(value);
        self
    }

    /// Prompt messages shown so far.
    pub fn asked(&self) -> Vec<String> {
        lock(&self.asked).clone()
    }
}

impl SecretSource for ScriptedSecrets {
    fn prompt(&self, message: &str) -> Result<String, PromptError> {
        lock(&self.asked).push(message.to_string());
        lock(&self.answers).pop_front().ok_or(PromptError::NoTty)
    }

    fn prompt_password(&self, message: &str, _confirm: bool) -> Result<String, PromptError> {
        self.prompt(message)
    }

    fn confirm(&self, message: &str, _default: bool) -> Result<bool, PromptError> {
        lock(&self.asked).push(message.to_string());
        lock(&self.confirmations).pop_front().ok_or(PromptError::NoTty)
    }
}

/// Prompt source for unattended runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTtySecrets;

impl SecretSource for NoTtySecrets {
    fn prompt(&self, _message: &str) -> Result<String, PromptError> {
        Err(PromptError::NoTty)
    }

    fn prompt_password(&self, _message: &str, _confirm: bool) -> Result<String, PromptError> {
        Err(PromptError::NoTty)
    }

    fn confirm(&self, _message: &str, _default: bool) -> Result<bool, PromptError> {
        Err(PromptError::NoTty)
    }
}
