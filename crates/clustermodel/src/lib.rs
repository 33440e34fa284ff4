//! Data model of the managed cluster descriptor.
//!
//! The descriptor is the declarative document the control plane stores for a
//! cluster. This crate models the part of it that command-line parameters
//! map onto, plus parsing of fully-qualified resource ids.
//!
//! # Example
//!
//! ```
//! use clustermodel::{ManagedCluster, ResourceId};
//!
//! let mc = ManagedCluster::new("westus2");
//! assert_eq!(mc.location.as_deref(), Some("westus2"));
//!
//! let id: ResourceId = "/subscriptions/s/resourceGroups/rg/providers/Microsoft.ManagedIdentity/userAssignedIdentities/id"
//!     .parse()
//!     .unwrap();
//! assert_eq!(id.name, "id");
//! ```

pub mod consts;
pub mod error;
pub mod resource_id;
pub mod types;

pub use error::{Error, Result};
pub use resource_id::{ResourceId, is_valid_resource_id};
pub use types::{
    AadProfile, AddonProfile, AgentPoolProfile, ApiServerAccessProfile, AutoUpgradeProfile,
    ClusterIdentity, ExtendedLocation, GmsaProfile, IdentityType, LinuxProfile, LoadBalancerProfile,
    ManagedCluster, ManagedOutboundIps, NatGatewayProfile, NetworkProfile, OutboundIpPrefixes,
    OutboundIps, ResourceReference, ServicePrincipalProfile, Sku, SshConfiguration, SshPublicKey,
    UserAssignedIdentity, WindowsProfile,
};
