//! The resolution context.
//!
//! One [`DecoratorContext`] exists per create or update invocation. It owns
//! the raw parameters, the decorator mode, the intermediate store, the
//! attached descriptor and the injected collaborators, and exposes one
//! accessor per logical parameter.
//!
//! Accessors come in two layers. A private `resolve_*` / `peek_*`
//! primitive reconciles the raw value with the attached descriptor and has
//! no side effects. The public `get_*` accessor adds dynamic completion,
//! validation and normalisation on top. Guards that need another
//! parameter's value only call that parameter's primitive.

mod aad;
mod addons;
mod apiserver;
mod basic;
mod identity;
mod misc;
mod network;
mod nodepool;
mod profiles;

use crate::error::{Error, Result};
use crate::external::{CloudBackend, PromptError, SecretSource};
use crate::graph::{Accessor, AccessorGraph, default_graph};
use crate::intermediates::Intermediates;
use crate::mode::DecoratorMode;
use crate::params::RawParameters;
use crate::resolve::Resolved;
use clustermodel::ManagedCluster;
use log::debug;
use serde_json::Value;
use std::cell::RefCell;
use std::sync::Arc;

pub use aad::AadApps;
pub(crate) use addons::virtual_node_addon_key;
pub use network::{LoadBalancerSettings, NatGatewaySettings, NetworkAddressing};
pub use nodepool::AutoscalerUpdate;

/// Parameter resolution state for one invocation.
pub struct DecoratorContext {
    raw: RawParameters,
    mode: DecoratorMode,
    intermediates: Intermediates,
    mc: Option<ManagedCluster>,
    existing_mc: Option<ManagedCluster>,
    cloud: Arc<dyn CloudBackend>,
    secrets: Arc<dyn SecretSource>,
    graph: AccessorGraph,
    completions: RefCell<Vec<Accessor>>,
}

impl std::fmt::Debug for DecoratorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoratorContext")
            .field("mode", &self.mode)
            .field("raw", &self.raw)
            .field("intermediates", &self.intermediates)
            .field("mc_attached", &self.mc.is_some())
            .finish_non_exhaustive()
    }
}

impl DecoratorContext {
    /// Create a context.
    ///
    /// Fails with an internal error if the accessor dependency graph has a
    /// cycle.
    pub fn new(
        raw: RawParameters,
        mode: DecoratorMode,
        cloud: Arc<dyn CloudBackend>,
        secrets: Arc<dyn SecretSource>,
    ) -> Result<Self> {
        let graph = default_graph();
        graph.check()?;
        Ok(Self {
            raw,
            mode,
            intermediates: Intermediates::new(),
            mc: None,
            existing_mc: None,
            cloud,
            secrets,
            graph,
            completions: RefCell::new(Vec::new()),
        })
    }

    pub fn raw(&self) -> &RawParameters {
        &self.raw
    }

    pub fn mode(&self) -> DecoratorMode {
        self.mode
    }

    pub fn cloud(&self) -> &dyn CloudBackend {
        self.cloud.as_ref()
    }

    pub fn graph(&self) -> &AccessorGraph {
        &self.graph
    }

    // ========================================================================
    // Descriptor slot
    // ========================================================================

    /// Attach the descriptor the pipeline works on.
    ///
    /// The slot can only be filled once. In update mode the descriptor is
    /// also recorded as the existing descriptor.
    pub fn attach_mc(&mut self, mc: ManagedCluster) -> Result<()> {
        match self.mode {
            DecoratorMode::Update => self.attach_existing_mc(mc.clone())?,
            DecoratorMode::Create => {}
        }
        if let Some(current) = &self.mc {
            return Err(Error::internal(format!(
                "Attempting to attach the `mc` object again, the two objects are {}.",
                sameness(current, &mc)
            )));
        }
        self.mc = Some(mc);
        Ok(())
    }

    fn attach_existing_mc(&mut self, mc: ManagedCluster) -> Result<()> {
        if let Some(current) = &self.existing_mc {
            return Err(Error::internal(format!(
                "Attempting to attach the existing `mc` object again, the two objects are {}.",
                sameness(current, &mc)
            )));
        }
        self.existing_mc = Some(mc);
        Ok(())
    }

    /// The attached descriptor, if any.
    pub fn mc(&self) -> Option<&ManagedCluster> {
        self.mc.as_ref()
    }

    /// The attached descriptor, or an internal error when nothing is attached.
    pub fn require_mc(&self) -> Result<&ManagedCluster> {
        self.mc.as_ref().ok_or_else(not_attached)
    }

    pub fn mc_mut(&mut self) -> Result<&mut ManagedCluster> {
        self.mc.as_mut().ok_or_else(not_attached)
    }

    /// Snapshot of the descriptor as fetched, in update mode.
    pub fn existing_mc(&self) -> Option<&ManagedCluster> {
        self.existing_mc.as_ref()
    }

    // ========================================================================
    // Intermediates
    // ========================================================================

    pub fn get_intermediate(&self, key: &str) -> Option<Value> {
        self.intermediates.get(key)
    }

    pub fn get_intermediate_or(&self, key: &str, default: Value) -> Value {
        self.intermediates.get_or(key, default)
    }

    pub fn set_intermediate(&self, key: &str, value: impl Into<Value>, overwrite: bool) {
        self.intermediates.set(key, value, overwrite);
    }

    pub fn remove_intermediate(&self, key: &str) {
        self.intermediates.remove(key);
    }

    pub(crate) fn intermediates(&self) -> &Intermediates {
        &self.intermediates
    }

    // ========================================================================
    // Reconciliation helpers
    // ========================================================================

    /// Look something up on the attached descriptor.
    fn descriptor<T>(&self, lookup: impl FnOnce(&ManagedCluster) -> Option<T>) -> Option<T> {
        self.mc.as_ref().and_then(lookup)
    }

    /// Mode-aware precedence between a raw value and the descriptor.
    fn resolve<T>(
        &self,
        raw: Option<T>,
        lookup: impl FnOnce(&ManagedCluster) -> Option<T>,
    ) -> Resolved<T> {
        Resolved::resolve(self.mode, raw, || self.descriptor(lookup))
    }

    /// Raw then descriptor, in both modes.
    fn reconcile<T>(
        &self,
        raw: Option<T>,
        lookup: impl FnOnce(&ManagedCluster) -> Option<T>,
    ) -> Resolved<T> {
        Resolved::reconcile(raw, || self.descriptor(lookup))
    }

    /// Whether the descriptor should be consulted for pairs that are read
    /// back as a unit.
    fn reads_descriptor(&self) -> bool {
        match self.mode {
            DecoratorMode::Create => self.mc.is_some(),
            DecoratorMode::Update => false,
        }
    }

    /// Whether the descriptor holds both halves of a pair that is read back
    /// as a unit. Holding only one half is an internal error.
    fn descriptor_holds_pair(
        &self,
        lookup: impl FnOnce(&ManagedCluster) -> (bool, bool),
        first: &str,
        second: &str,
    ) -> Result<bool> {
        if !self.reads_descriptor() {
            return Ok(false);
        }
        match self.descriptor(|mc| Some(lookup(mc))) {
            Some((true, true)) => Ok(true),
            Some((true, false) | (false, true)) => Err(Error::internal(format!(
                "Inconsistent state detected, one of {first} and {second} is read from the `mc` object."
            ))),
            _ => Ok(false),
        }
    }

    /// Accessors that completed a value dynamically, in call order.
    pub fn completions(&self) -> Vec<Accessor> {
        self.completions.borrow().clone()
    }

    fn completing(&self, accessor: Accessor) {
        self.completions.borrow_mut().push(accessor);
        let deps: Vec<String> = self.graph.dependencies(accessor).map(|d| d.to_string()).collect();
        if deps.is_empty() {
            debug!("completing {accessor}");
        } else {
            debug!("completing {accessor} via {}", deps.join(", "));
        }
    }

    // ========================================================================
    // Prompts
    // ========================================================================

    /// Ask for confirmation unless `--yes` was given. Declining is an early exit.
    pub(crate) fn confirm_or_exit(&self, message: &str) -> Result<()> {
        if self.get_yes() {
            return Ok(());
        }
        match self.secrets.confirm(message, false) {
            Ok(true) => Ok(()),
            Ok(false) | Err(PromptError::NoTty) => Err(Error::EarlyExit),
            Err(PromptError::Other(e)) => Err(Error::Collaborator(e)),
        }
    }
}

fn sameness(current: &ManagedCluster, incoming: &ManagedCluster) -> &'static str {
    if current == incoming { "the same" } else { "different" }
}

fn not_attached() -> Error {
    Error::internal("No managed cluster descriptor is attached to the context.")
}

/// Map a prompt failure onto a no-tty error with the given message.
fn prompt_error(err: PromptError, no_tty_message: &str) -> Error {
    match err {
        PromptError::NoTty => Error::no_tty(no_tty_message),
        PromptError::Other(e) => Error::Collaborator(e),
    }
}

/// Truthiness of an optional flag.
fn flag(value: Option<bool>) -> bool {
    value.unwrap_or(false)
}

/// Truthiness of an optional string.
fn present(value: Option<&str>) -> bool {
    value.is_some_and(|v| !v.is_empty())
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::external::{MockCloud, NoTtySecrets};

    pub fn ctx_with(
        raw: RawParameters,
        mode: DecoratorMode,
        cloud: MockCloud,
        secrets: impl SecretSource + 'static,
    ) -> DecoratorContext {
        DecoratorContext::new(raw, mode, Arc::new(cloud), Arc::new(secrets)).unwrap()
    }

    pub fn create_ctx(raw: RawParameters) -> DecoratorContext {
        ctx_with(raw, DecoratorMode::Create, MockCloud::new(), NoTtySecrets)
    }

    pub fn update_ctx(raw: RawParameters, mc: ManagedCluster) -> DecoratorContext {
        let mut ctx = ctx_with(raw, DecoratorMode::Update, MockCloud::new(), NoTtySecrets);
        ctx.attach_mc(mc).unwrap();
        ctx
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::external::{MockCloud, ScriptedSecrets};
    use std::collections::BTreeSet;

    #[test]
    fn test_attach_mc_once() {
        let mut ctx = create_ctx(RawParameters::default());
        assert!(ctx.mc().is_none());
        ctx.attach_mc(ManagedCluster::new("westus2")).unwrap();
        assert!(ctx.existing_mc().is_none());

        let err = ctx.attach_mc(ManagedCluster::new("westus2")).unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
        assert!(err.to_string().contains("the same"));

        let err = ctx.attach_mc(ManagedCluster::new("eastus")).unwrap_err();
        assert!(err.to_string().contains("different"));
    }

    /// Everything completed after `root` must be reachable from it in the
    /// accessor graph.
    fn assert_completions_follow_edges(ctx: &DecoratorContext, root: Accessor) {
        let completions = ctx.completions();
        assert_eq!(completions.first(), Some(&root));
        let mut reachable = BTreeSet::new();
        let mut pending = vec![root];
        while let Some(next) = pending.pop() {
            for dep in ctx.graph().dependencies(next) {
                if reachable.insert(dep) {
                    pending.push(dep);
                }
            }
        }
        for accessor in &completions[1..] {
            assert!(reachable.contains(accessor), "{root} completed {accessor} without an edge");
        }
    }

    #[test]
    fn test_completions_match_edges() {
        let raw = RawParameters {
            name: Some("test_cluster".to_string()),
            resource_group_name: Some("test_rg".to_string()),
            ..RawParameters::default()
        };
        let cloud = MockCloud::new()
            .with_subscription("1234-5678")
            .with_resource_group("test_rg", "westus2");

        let ctx = ctx_with(
            raw.clone(),
            DecoratorMode::Create,
            cloud.clone(),
            ScriptedSecrets::new(),
        );
        assert!(ctx.get_dns_name_prefix().unwrap().is_some());
        assert_completions_follow_edges(&ctx, Accessor::DnsNamePrefix);
        assert_eq!(ctx.completions(), vec![Accessor::DnsNamePrefix, Accessor::SubscriptionId]);

        let ctx = ctx_with(raw, DecoratorMode::Create, cloud, ScriptedSecrets::new());
        assert_eq!(ctx.get_location().unwrap(), "westus2");
        assert_completions_follow_edges(&ctx, Accessor::Location);
    }

    #[test]
    fn test_update_attach_records_existing() {
        let ctx = update_ctx(RawParameters::default(), ManagedCluster::new("westus2"));
        assert_eq!(ctx.existing_mc(), ctx.mc());
    }

    #[test]
    fn test_update_attach_twice_reports_existing() {
        let mut ctx = update_ctx(RawParameters::default(), ManagedCluster::new("westus2"));
        let err = ctx.attach_mc(ManagedCluster::new("eastus")).unwrap_err();
        assert!(err.to_string().contains("existing `mc` object again"));
        assert!(err.to_string().contains("different"));
    }

    #[test]
    fn test_mc_mut_requires_attachment() {
        let mut ctx = create_ctx(RawParameters::default());
        assert!(matches!(ctx.mc_mut(), Err(Error::Internal(_))));
        assert!(ctx.require_mc().is_err());
    }

    #[test]
    fn test_intermediate_passthrough() {
        let ctx = create_ctx(RawParameters::default());
        ctx.set_intermediate("k", "v", false);
        assert_eq!(ctx.get_intermediate("k"), Some(Value::from("v")));
        ctx.remove_intermediate("k");
        ctx.remove_intermediate("k");
        assert_eq!(
            ctx.get_intermediate_or("k", Value::Bool(false)),
            Value::Bool(false)
        );
    }

    #[test]
    fn test_confirm_or_exit() {
        let raw = RawParameters {
            yes: Some(true),
            ..RawParameters::default()
        };
        let ctx = create_ctx(raw);
        assert!(ctx.confirm_or_exit("go?").is_ok());

        let secrets = ScriptedSecrets::new().confirmation(false);
        let ctx = ctx_with(
            RawParameters::default(),
            DecoratorMode::Create,
            MockCloud::new(),
            secrets,
        );
        assert!(matches!(ctx.confirm_or_exit("go?"), Err(Error::EarlyExit)));
    }
}
