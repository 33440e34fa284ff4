//! Load balancer, NAT gateway, outbound routing and network plugin settings.

use super::DecoratorContext;
use crate::error::{Error, Result};
use crate::graph::Accessor;
use clustermodel::consts::{
    LOAD_BALANCER_SKU_BASIC, LOAD_BALANCER_SKU_STANDARD, OUTBOUND_TYPE_LOAD_BALANCER,
    OUTBOUND_TYPE_MANAGED_NAT_GATEWAY, OUTBOUND_TYPE_USER_ASSIGNED_NAT_GATEWAY,
    OUTBOUND_TYPE_USER_DEFINED_ROUTING,
};
use clustermodel::{
    LoadBalancerProfile, ManagedCluster, ManagedOutboundIps, NatGatewayProfile, OutboundIpPrefixes,
    OutboundIps, ResourceReference,
};
use std::ops::RangeInclusive;

// ============================================================================
// Settings
// ============================================================================

/// Requested outbound settings of the cluster load balancer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadBalancerSettings {
    pub managed_outbound_ip_count: Option<u32>,
    pub outbound_ips: Option<Vec<ResourceReference>>,
    pub outbound_ip_prefixes: Option<Vec<ResourceReference>>,
    pub outbound_ports: Option<u32>,
    pub idle_timeout: Option<u32>,
}

impl LoadBalancerSettings {
    /// Whether any setting was given.
    pub fn is_provided(&self) -> bool {
        self.managed_outbound_ip_count.is_some()
            || self.outbound_ips.is_some()
            || self.outbound_ip_prefixes.is_some()
            || self.outbound_ports.is_some()
            || self.idle_timeout.is_some()
    }

    /// Profile for a new cluster, `None` when nothing was given.
    pub fn create_profile(&self) -> Option<LoadBalancerProfile> {
        if !self.is_provided() {
            return None;
        }
        Some(self.apply(LoadBalancerProfile::default()))
    }

    /// Merge the settings into an existing profile.
    ///
    /// Setting one outbound source clears the other two.
    pub fn update_profile(&self, existing: Option<LoadBalancerProfile>) -> Option<LoadBalancerProfile> {
        if !self.is_provided() {
            return existing;
        }
        Some(self.apply(existing.unwrap_or_default()))
    }

    fn apply(&self, mut profile: LoadBalancerProfile) -> LoadBalancerProfile {
        if let Some(count) = self.managed_outbound_ip_count {
            profile.managed_outbound_ips = Some(ManagedOutboundIps { count });
            profile.outbound_ips = None;
            profile.outbound_ip_prefixes = None;
        }
        if let Some(ips) = &self.outbound_ips {
            profile.outbound_ips = Some(OutboundIps {
                public_ips: ips.clone(),
            });
            profile.managed_outbound_ips = None;
            profile.outbound_ip_prefixes = None;
        }
        if let Some(prefixes) = &self.outbound_ip_prefixes {
            profile.outbound_ip_prefixes = Some(OutboundIpPrefixes {
                public_ip_prefixes: prefixes.clone(),
            });
            profile.managed_outbound_ips = None;
            profile.outbound_ips = None;
        }
        if let Some(ports) = self.outbound_ports {
            profile.allocated_outbound_ports = Some(ports);
        }
        if let Some(idle) = self.idle_timeout {
            profile.idle_timeout_in_minutes = Some(idle);
        }
        profile
    }
}

/// Requested settings of the managed NAT gateway.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NatGatewaySettings {
    pub managed_outbound_ip_count: Option<u32>,
    pub idle_timeout: Option<u32>,
}

impl NatGatewaySettings {
    pub fn is_provided(&self) -> bool {
        self.managed_outbound_ip_count.is_some() || self.idle_timeout.is_some()
    }

    pub fn create_profile(&self) -> Option<NatGatewayProfile> {
        self.is_provided()
            .then(|| self.apply(NatGatewayProfile::default()))
    }

    pub fn update_profile(&self, existing: Option<NatGatewayProfile>) -> Option<NatGatewayProfile> {
        if !self.is_provided() {
            return existing;
        }
        Some(self.apply(existing.unwrap_or_default()))
    }

    fn apply(&self, mut profile: NatGatewayProfile) -> NatGatewayProfile {
        if let Some(count) = self.managed_outbound_ip_count {
            profile.managed_outbound_ip_profile = Some(ManagedOutboundIps { count });
        }
        if let Some(idle) = self.idle_timeout {
            profile.idle_timeout_in_minutes = Some(idle);
        }
        profile
    }
}

/// Address ranges and policy of the cluster network.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkAddressing {
    pub pod_cidr: Option<String>,
    pub service_cidr: Option<String>,
    pub dns_service_ip: Option<String>,
    pub docker_bridge_address: Option<String>,
    pub network_policy: Option<String>,
}

impl NetworkAddressing {
    pub fn any(&self) -> bool {
        [
            &self.pod_cidr,
            &self.service_cidr,
            &self.dns_service_ip,
            &self.docker_bridge_address,
            &self.network_policy,
        ]
        .into_iter()
        .any(|v| v.as_deref().is_some_and(|v| !v.is_empty()))
    }
}

// ============================================================================
// Validation helpers
// ============================================================================

fn check_range(flag: &str, value: Option<u32>, range: RangeInclusive<u32>) -> Result<Option<u32>> {
    match value {
        Some(v) if !range.contains(&v) => Err(Error::invalid(format!(
            "--{flag} must be in the range [{},{}]",
            range.start(),
            range.end()
        ))),
        _ => Ok(value),
    }
}

/// Parse a comma separated list of resource ids.
fn parse_resource_references(flag: &str, value: &str) -> Result<Vec<ResourceReference>> {
    if value.chars().any(char::is_whitespace) {
        return Err(Error::invalid(format!("--{flag} cannot contain whitespace")));
    }
    value
        .split(',')
        .map(|id| {
            if id.is_empty() {
                Err(Error::invalid(format!("--{flag} cannot contain empty items")))
            } else {
                Ok(ResourceReference { id: id.to_string() })
            }
        })
        .collect()
}

fn load_balancer(mc: &ManagedCluster) -> Option<&LoadBalancerProfile> {
    mc.network_profile
        .as_ref()
        .and_then(|n| n.load_balancer_profile.as_ref())
}

fn nat_gateway(mc: &ManagedCluster) -> Option<&NatGatewayProfile> {
    mc.network_profile
        .as_ref()
        .and_then(|n| n.nat_gateway_profile.as_ref())
}

impl DecoratorContext {
    // ========================================================================
    // Load balancer
    // ========================================================================

    pub(super) fn peek_load_balancer_sku(&self) -> String {
        self.reconcile(self.raw.load_balancer_sku.clone(), |mc| {
            mc.network_profile.as_ref().and_then(|n| n.load_balancer_sku.clone())
        })
        .or_else_with(|| LOAD_BALANCER_SKU_STANDARD.to_string())
        .to_lowercase()
    }

    /// Load balancer sku, lowercased, `standard` unless given.
    pub fn get_load_balancer_sku(&self) -> Result<String> {
        let sku = self.peek_load_balancer_sku();
        if sku != LOAD_BALANCER_SKU_BASIC && sku != LOAD_BALANCER_SKU_STANDARD {
            return Err(Error::invalid("--load-balancer-sku can only be standard or basic"));
        }
        if sku == LOAD_BALANCER_SKU_BASIC {
            if !self.peek_api_server_authorized_ip_ranges().is_empty() {
                return Err(Error::invalid(
                    "--api-server-authorized-ip-ranges can only be used with standard load balancer",
                ));
            }
            if self.peek_enable_private_cluster() {
                return Err(Error::invalid(
                    "Please use standard load balancer for private cluster",
                ));
            }
        }
        Ok(sku)
    }

    pub fn get_load_balancer_managed_outbound_ip_count(&self) -> Result<Option<u32>> {
        let count = self
            .resolve(self.raw.load_balancer_managed_outbound_ip_count, |mc| {
                load_balancer(mc)
                    .and_then(|p| p.managed_outbound_ips.as_ref())
                    .map(|m| m.count)
            })
            .value();
        check_range("load-balancer-managed-outbound-ip-count", count, 1..=100)
    }

    pub fn get_load_balancer_outbound_ips(&self) -> Result<Option<Vec<ResourceReference>>> {
        let raw = self
            .raw
            .load_balancer_outbound_ips
            .as_deref()
            .map(|v| parse_resource_references("load-balancer-outbound-ips", v))
            .transpose()?;
        Ok(self
            .resolve(raw, |mc| {
                load_balancer(mc)
                    .and_then(|p| p.outbound_ips.as_ref())
                    .map(|o| o.public_ips.clone())
            })
            .value())
    }

    pub fn get_load_balancer_outbound_ip_prefixes(
        &self,
    ) -> Result<Option<Vec<ResourceReference>>> {
        let raw = self
            .raw
            .load_balancer_outbound_ip_prefixes
            .as_deref()
            .map(|v| parse_resource_references("load-balancer-outbound-ip-prefixes", v))
            .transpose()?;
        Ok(self
            .resolve(raw, |mc| {
                load_balancer(mc)
                    .and_then(|p| p.outbound_ip_prefixes.as_ref())
                    .map(|o| o.public_ip_prefixes.clone())
            })
            .value())
    }

    pub fn get_load_balancer_outbound_ports(&self) -> Result<Option<u32>> {
        let ports = self
            .resolve(self.raw.load_balancer_outbound_ports, |mc| {
                load_balancer(mc).and_then(|p| p.allocated_outbound_ports)
            })
            .value();
        if let Some(ports) = ports {
            if ports % 8 != 0 {
                return Err(Error::invalid(
                    "--load-balancer-allocated-ports must be a multiple of 8",
                ));
            }
        }
        check_range("load-balancer-allocated-ports", ports, 0..=64000)
    }

    pub fn get_load_balancer_idle_timeout(&self) -> Result<Option<u32>> {
        let idle = self
            .resolve(self.raw.load_balancer_idle_timeout, |mc| {
                load_balancer(mc).and_then(|p| p.idle_timeout_in_minutes)
            })
            .value();
        check_range("load-balancer-idle-timeout", idle, 4..=100)
    }

    /// All five load balancer settings.
    pub fn get_load_balancer_settings(&self) -> Result<LoadBalancerSettings> {
        self.completing(Accessor::LoadBalancerProfile);
        Ok(LoadBalancerSettings {
            managed_outbound_ip_count: self.get_load_balancer_managed_outbound_ip_count()?,
            outbound_ips: self.get_load_balancer_outbound_ips()?,
            outbound_ip_prefixes: self.get_load_balancer_outbound_ip_prefixes()?,
            outbound_ports: self.get_load_balancer_outbound_ports()?,
            idle_timeout: self.get_load_balancer_idle_timeout()?,
        })
    }

    // ========================================================================
    // NAT gateway
    // ========================================================================

    pub fn get_nat_gateway_managed_outbound_ip_count(&self) -> Result<Option<u32>> {
        let count = self
            .resolve(self.raw.nat_gateway_managed_outbound_ip_count, |mc| {
                nat_gateway(mc)
                    .and_then(|p| p.managed_outbound_ip_profile.as_ref())
                    .map(|m| m.count)
            })
            .value();
        check_range("nat-gateway-managed-outbound-ip-count", count, 1..=16)
    }

    pub fn get_nat_gateway_idle_timeout(&self) -> Result<Option<u32>> {
        let idle = self
            .resolve(self.raw.nat_gateway_idle_timeout, |mc| {
                nat_gateway(mc).and_then(|p| p.idle_timeout_in_minutes)
            })
            .value();
        check_range("nat-gateway-idle-timeout", idle, 4..=120)
    }

    pub fn get_nat_gateway_settings(&self) -> Result<NatGatewaySettings> {
        Ok(NatGatewaySettings {
            managed_outbound_ip_count: self.get_nat_gateway_managed_outbound_ip_count()?,
            idle_timeout: self.get_nat_gateway_idle_timeout()?,
        })
    }

    // ========================================================================
    // Outbound type
    // ========================================================================

    /// Outbound routing type, validated against the load balancer profile
    /// that will be submitted.
    ///
    /// Without a profile the individual load balancer settings are checked.
    pub fn get_outbound_type(
        &self,
        load_balancer_profile: Option<&LoadBalancerProfile>,
    ) -> Result<String> {
        let resolved = self.reconcile(self.raw.outbound_type.clone(), |mc| {
            mc.network_profile.as_ref().and_then(|n| n.outbound_type.clone())
        });
        let from_descriptor = resolved.is_descriptor();
        let mut outbound_type = resolved.or_default();
        let custom = [
            OUTBOUND_TYPE_MANAGED_NAT_GATEWAY,
            OUTBOUND_TYPE_USER_ASSIGNED_NAT_GATEWAY,
            OUTBOUND_TYPE_USER_DEFINED_ROUTING,
        ];
        if !from_descriptor && !custom.contains(&outbound_type.as_str()) {
            outbound_type = OUTBOUND_TYPE_LOAD_BALANCER.to_string();
        }

        if custom.contains(&outbound_type.as_str()) {
            self.completing(Accessor::OutboundType);
            if self.peek_load_balancer_sku() == LOAD_BALANCER_SKU_BASIC {
                return Err(Error::invalid(format!(
                    "{outbound_type} doesn't support basic load balancer sku"
                )));
            }
            if outbound_type != OUTBOUND_TYPE_MANAGED_NAT_GATEWAY
                && self.get_vnet_subnet_id().is_none_or(|id| id.is_empty())
            {
                return Err(Error::missing(format!(
                    "--vnet-subnet-id must be specified for {outbound_type} and it must be \
                     pre-configured with a route table with egress rules"
                )));
            }
            if outbound_type == OUTBOUND_TYPE_USER_DEFINED_ROUTING {
                let customized = match load_balancer_profile {
                    Some(profile) => {
                        profile.managed_outbound_ips.is_some()
                            || profile.outbound_ips.is_some()
                            || profile.outbound_ip_prefixes.is_some()
                    }
                    None => {
                        self.get_load_balancer_managed_outbound_ip_count()?.is_some()
                            || self.get_load_balancer_outbound_ips()?.is_some()
                            || self.get_load_balancer_outbound_ip_prefixes()?.is_some()
                    }
                };
                if customized {
                    return Err(Error::exclusive(
                        "userDefinedRouting doesn't support customizing a standard load balancer \
                         with IP addresses",
                    ));
                }
            }
        }
        Ok(outbound_type)
    }

    // ========================================================================
    // Plugin and addressing
    // ========================================================================

    pub(super) fn peek_network_plugin(&self) -> Option<String> {
        self.resolve(self.raw.network_plugin.clone(), |mc| {
            mc.network_profile.as_ref().and_then(|n| n.network_plugin.clone())
        })
        .value()
    }

    pub(super) fn peek_network_addressing(&self) -> NetworkAddressing {
        let network = |mc: &ManagedCluster| mc.network_profile.clone();
        NetworkAddressing {
            pod_cidr: self
                .resolve(self.raw.pod_cidr.clone(), |mc| network(mc).and_then(|n| n.pod_cidr))
                .value(),
            service_cidr: self
                .resolve(self.raw.service_cidr.clone(), |mc| {
                    network(mc).and_then(|n| n.service_cidr)
                })
                .value(),
            dns_service_ip: self
                .resolve(self.raw.dns_service_ip.clone(), |mc| {
                    network(mc).and_then(|n| n.dns_service_ip)
                })
                .value(),
            docker_bridge_address: self
                .resolve(self.raw.docker_bridge_address.clone(), |mc| {
                    network(mc).and_then(|n| n.docker_bridge_cidr)
                })
                .value(),
            network_policy: self
                .resolve(self.raw.network_policy.clone(), |mc| {
                    network(mc).and_then(|n| n.network_policy)
                })
                .value(),
        }
    }

    fn validate_network_plugin(
        plugin: Option<&str>,
        addressing: &NetworkAddressing,
    ) -> Result<()> {
        match plugin {
            Some(plugin) if !plugin.is_empty() => {
                if plugin == "azure" && addressing.pod_cidr.as_deref().is_some_and(|c| !c.is_empty()) {
                    return Err(Error::invalid(
                        "Please use kubenet as the network plugin type when pod_cidr is specified",
                    ));
                }
            }
            _ => {
                if addressing.any() {
                    return Err(Error::missing(
                        "Please explicitly specify the network plugin type",
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn get_network_plugin(&self) -> Result<Option<String>> {
        let plugin = self.peek_network_plugin();
        Self::validate_network_plugin(plugin.as_deref(), &self.peek_network_addressing())?;
        Ok(plugin)
    }

    pub fn get_pod_cidr_and_service_cidr_and_dns_service_ip_and_docker_bridge_address_and_network_policy(
        &self,
    ) -> Result<NetworkAddressing> {
        let addressing = self.peek_network_addressing();
        Self::validate_network_plugin(self.peek_network_plugin().as_deref(), &addressing)?;
        Ok(addressing)
    }
}
