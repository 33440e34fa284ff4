//! Dependency graph between accessors.
//!
//! An edge `a -> b` means that completing `a` dynamically calls the full
//! accessor of `b`. Guards only read other parameters through side-effect
//! free primitives, so they never add edges. The graph must stay acyclic or
//! resolution could recurse forever; [`AccessorGraph::check`] verifies this
//! with Kahn's algorithm when a context is created.
//!
//! The edge table is descriptive: it is written by hand next to the
//! accessors and does not drive resolution. Contexts record every dynamic
//! completion in call order, and the context tests compare that record
//! with the edges so the table cannot drift silently.

use crate::error::{Error, Result};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

/// Accessors that complete values dynamically, or that others depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Accessor {
    SubscriptionId,
    ResourceGroupName,
    Name,
    Location,
    DnsNamePrefix,
    FqdnSubdomain,
    ServicePrincipal,
    EnableManagedIdentity,
    WindowsAdminCredentials,
    AssignIdentity,
    UserAssignedIdentity,
    AssignKubeletIdentity,
    WorkspaceResourceId,
    EnableAddons,
    AadTenantId,
    EnableAad,
    AadApps,
    VnetSubnetId,
    AciSubnetName,
    OutboundType,
    LoadBalancerProfile,
    Assignee,
    AttachAcr,
    NoWait,
    CustomHeaders,
}

impl fmt::Display for Accessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Edges of the accessors in this crate.
const DEFAULT_EDGES: &[(Accessor, Accessor)] = {
    use Accessor::{
        AadApps, AadTenantId, AciSubnetName, AssignIdentity, AssignKubeletIdentity, Assignee,
        AttachAcr, DnsNamePrefix, EnableAad, EnableAddons, EnableManagedIdentity, FqdnSubdomain,
        LoadBalancerProfile, Location, Name, NoWait, OutboundType, ResourceGroupName,
        ServicePrincipal, SubscriptionId, UserAssignedIdentity, VnetSubnetId, WorkspaceResourceId,
    };
    &[
        (Location, ResourceGroupName),
        (DnsNamePrefix, Name),
        (DnsNamePrefix, ResourceGroupName),
        (DnsNamePrefix, SubscriptionId),
        (DnsNamePrefix, FqdnSubdomain),
        (ServicePrincipal, EnableManagedIdentity),
        (ServicePrincipal, SubscriptionId),
        (ServicePrincipal, DnsNamePrefix),
        (ServicePrincipal, FqdnSubdomain),
        (ServicePrincipal, Location),
        (ServicePrincipal, Name),
        (UserAssignedIdentity, AssignIdentity),
        (AssignKubeletIdentity, AssignIdentity),
        (WorkspaceResourceId, SubscriptionId),
        (WorkspaceResourceId, ResourceGroupName),
        (EnableAddons, AciSubnetName),
        (EnableAddons, VnetSubnetId),
        (AadTenantId, EnableAad),
        (AadTenantId, AadApps),
        (OutboundType, VnetSubnetId),
        (OutboundType, LoadBalancerProfile),
        (AttachAcr, NoWait),
        (AttachAcr, EnableManagedIdentity),
        (Assignee, AttachAcr),
    ]
};

/// Directed graph of accessor dependencies.
#[derive(Debug, Clone, Default)]
pub struct AccessorGraph {
    edges: BTreeMap<Accessor, BTreeSet<Accessor>>,
}

impl AccessorGraph {
    /// Build a graph from `(dependent, dependency)` pairs.
    pub fn from_edges(edges: &[(Accessor, Accessor)]) -> Self {
        let mut graph = Self::default();
        for &(from, to) in edges {
            graph.edges.entry(from).or_default().insert(to);
            graph.edges.entry(to).or_default();
        }
        graph
    }

    /// Accessors the given accessor completes through.
    pub fn dependencies(&self, accessor: Accessor) -> impl Iterator<Item = Accessor> + '_ {
        self.edges.get(&accessor).into_iter().flatten().copied()
    }

    /// Order accessors so that every dependency precedes its dependents.
    pub fn topological_order(&self) -> Result<Vec<Accessor>> {
        // In-degree counts dependencies not yet emitted.
        let mut pending: BTreeMap<Accessor, usize> =
            self.edges.iter().map(|(node, deps)| (*node, deps.len())).collect();
        let mut dependents: BTreeMap<Accessor, Vec<Accessor>> = BTreeMap::new();
        for (node, deps) in &self.edges {
            for dep in deps {
                dependents.entry(*dep).or_default().push(*node);
            }
        }

        let mut ready: VecDeque<Accessor> = pending
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(node, _)| *node)
            .collect();
        let mut order = Vec::with_capacity(self.edges.len());

        while let Some(node) = ready.pop_front() {
            order.push(node);
            for dependent in dependents.get(&node).into_iter().flatten() {
                if let Some(count) = pending.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.push_back(*dependent);
                    }
                }
            }
        }

        if order.len() < self.edges.len() {
            let stuck: Vec<String> = pending
                .iter()
                .filter(|(_, count)| **count > 0)
                .map(|(node, _)| node.to_string())
                .collect();
            return Err(Error::internal(format!(
                "Cyclic dependency between accessors: {}",
                stuck.join(", ")
            )));
        }
        Ok(order)
    }

    /// Fail with an internal error if the graph has a cycle.
    pub fn check(&self) -> Result<()> {
        self.topological_order().map(|_| ())
    }
}

/// The graph of the accessors defined on the context.
pub fn default_graph() -> AccessorGraph {
    AccessorGraph::from_edges(DEFAULT_EDGES)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_graph_is_acyclic() {
        let graph = default_graph();
        assert!(graph.check().is_ok());
    }

    #[test]
    fn test_dependencies_come_first() {
        let order = default_graph().topological_order().unwrap();
        let pos = |a| order.iter().position(|x| *x == a).unwrap();
        assert!(pos(Accessor::SubscriptionId) < pos(Accessor::DnsNamePrefix));
        assert!(pos(Accessor::DnsNamePrefix) < pos(Accessor::ServicePrincipal));
        assert!(pos(Accessor::ResourceGroupName) < pos(Accessor::Location));
    }

    #[test]
    fn test_cycle_is_internal_error() {
        let graph = AccessorGraph::from_edges(&[
            (Accessor::DnsNamePrefix, Accessor::FqdnSubdomain),
            (Accessor::FqdnSubdomain, Accessor::DnsNamePrefix),
            (Accessor::Location, Accessor::ResourceGroupName),
        ]);
        let err = graph.check().unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
        assert!(err.to_string().contains("DnsNamePrefix"));
        assert!(!err.to_string().contains("Location"));
    }

    #[test]
    fn test_dependencies_lookup() {
        let graph = default_graph();
        let deps: Vec<_> = graph.dependencies(Accessor::Location).collect();
        assert_eq!(deps, vec![Accessor::ResourceGroupName]);
        assert_eq!(graph.dependencies(Accessor::Name).count(), 0);
    }
}
