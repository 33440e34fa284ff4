//! API server access: authorized ranges, private cluster and DNS.

use super::{DecoratorContext, flag, present};
use crate::error::{Error, Result};
use crate::mode::DecoratorMode;
use crate::params::split_comma;
use crate::resolve::Resolved;
use clustermodel::consts::{LOAD_BALANCER_SKU_BASIC, PRIVATE_DNS_ZONE_NONE, PRIVATE_DNS_ZONE_SYSTEM};
use clustermodel::{ApiServerAccessProfile, ManagedCluster, is_valid_resource_id};

const RANGES_ON_PRIVATE_CLUSTER: &str =
    "--api-server-authorized-ip-ranges is not supported for private cluster";
const PUBLIC_FQDN_TOGGLES: &str =
    "Cannot specify '--enable-public-fqdn' and '--disable-public-fqdn' at the same time";
const PRIVATE_DNS_ZONE_ON_PUBLIC_CLUSTER: &str =
    "Invalid private dns zone for public cluster. It should always be empty for public cluster";
const FQDN_SUBDOMAIN_NEEDS_CUSTOM_ZONE: &str =
    "--fqdn-subdomain should only be used for private cluster with custom private dns zone";
const DISABLE_PUBLIC_FQDN_ON_NONE_ZONE: &str =
    "--disable-public-fqdn cannot be applied for none mode private dns zone cluster";

fn access_profile(mc: &ManagedCluster) -> Option<&ApiServerAccessProfile> {
    mc.api_server_access_profile.as_ref()
}

fn invalid_resource_id(id: &str) -> Error {
    Error::invalid(format!("{id} is not a valid Azure resource ID."))
}

impl DecoratorContext {
    fn existing_private_cluster(&self) -> bool {
        self.mc.as_ref().is_some_and(ManagedCluster::is_private_cluster)
    }

    // ========================================================================
    // Authorized ranges
    // ========================================================================

    fn resolve_api_server_authorized_ip_ranges(&self) -> Option<Vec<String>> {
        self.resolve(
            self.raw.api_server_authorized_ip_ranges.as_deref().map(split_comma),
            |mc| access_profile(mc).and_then(|p| p.authorized_ip_ranges.clone()),
        )
        .value()
    }

    pub(super) fn peek_api_server_authorized_ip_ranges(&self) -> Vec<String> {
        self.resolve_api_server_authorized_ip_ranges().unwrap_or_default()
    }

    /// Authorized IP ranges of the API server.
    ///
    /// On update, `Some(vec![])` clears the ranges and `None` keeps them.
    pub fn get_api_server_authorized_ip_ranges(&self) -> Result<Option<Vec<String>>> {
        let ranges = self.resolve_api_server_authorized_ip_ranges();
        if ranges.as_ref().is_some_and(|r| !r.is_empty()) {
            match self.mode {
                DecoratorMode::Create => {
                    if self.peek_load_balancer_sku() == LOAD_BALANCER_SKU_BASIC {
                        return Err(Error::invalid(
                            "--api-server-authorized-ip-ranges can only be used with standard load balancer",
                        ));
                    }
                    if self.peek_enable_private_cluster() {
                        return Err(Error::exclusive(RANGES_ON_PRIVATE_CLUSTER));
                    }
                }
                DecoratorMode::Update => {
                    if self.existing_private_cluster() {
                        return Err(Error::exclusive(RANGES_ON_PRIVATE_CLUSTER));
                    }
                }
            }
        }
        Ok(ranges)
    }

    // ========================================================================
    // FQDN subdomain
    // ========================================================================

    pub(super) fn peek_fqdn_subdomain(&self) -> Resolved<String> {
        self.reconcile(self.raw.fqdn_subdomain.clone(), |mc| mc.fqdn_subdomain.clone())
    }

    pub fn get_fqdn_subdomain(&self) -> Result<Option<String>> {
        let fqdn_subdomain = self.peek_fqdn_subdomain().value();
        if present(fqdn_subdomain.as_deref()) {
            if present(self.peek_dns_name_prefix().value().as_deref()) {
                return Err(Error::exclusive(
                    "--dns-name-prefix and --fqdn-subdomain cannot be used at same time",
                ));
            }
            if let Some(zone) = self.peek_private_dns_zone().filter(|z| !z.is_empty()) {
                if zone.eq_ignore_ascii_case(PRIVATE_DNS_ZONE_SYSTEM) {
                    return Err(Error::invalid(FQDN_SUBDOMAIN_NEEDS_CUSTOM_ZONE));
                }
                if !is_valid_resource_id(&zone) {
                    return Err(invalid_resource_id(&zone));
                }
            }
        }
        Ok(fqdn_subdomain)
    }

    // ========================================================================
    // Private cluster
    // ========================================================================

    pub(super) fn peek_enable_private_cluster(&self) -> bool {
        flag(
            self.resolve(self.raw.enable_private_cluster, |mc| {
                access_profile(mc).and_then(|p| p.enable_private_cluster)
            })
            .value(),
        )
    }

    pub fn get_enable_private_cluster(&self) -> Result<bool> {
        let private = self.peek_enable_private_cluster();
        match self.mode {
            DecoratorMode::Create => {
                if private {
                    if self.peek_load_balancer_sku() == LOAD_BALANCER_SKU_BASIC {
                        return Err(Error::invalid(
                            "Please use standard load balancer for private cluster",
                        ));
                    }
                    if !self.peek_api_server_authorized_ip_ranges().is_empty() {
                        return Err(Error::exclusive(RANGES_ON_PRIVATE_CLUSTER));
                    }
                } else {
                    if self.peek_disable_public_fqdn() {
                        return Err(Error::invalid(
                            "--disable-public-fqdn should only be used with --enable-private-cluster",
                        ));
                    }
                    if present(self.peek_private_dns_zone().as_deref()) {
                        return Err(Error::invalid(PRIVATE_DNS_ZONE_ON_PUBLIC_CLUSTER));
                    }
                }
            }
            DecoratorMode::Update => {
                if self.existing_private_cluster() {
                    if !self.peek_api_server_authorized_ip_ranges().is_empty() {
                        return Err(Error::exclusive(RANGES_ON_PRIVATE_CLUSTER));
                    }
                } else {
                    if self.peek_disable_public_fqdn() {
                        return Err(Error::invalid(
                            "--disable-public-fqdn can only be used for private cluster",
                        ));
                    }
                    if self.peek_enable_public_fqdn() {
                        return Err(Error::invalid(
                            "--enable-public-fqdn can only be used for private cluster",
                        ));
                    }
                }
            }
        }
        Ok(private)
    }

    /// Update-only flag with no descriptor counterpart.
    pub(super) fn peek_enable_public_fqdn(&self) -> bool {
        flag(self.raw.enable_public_fqdn)
    }

    pub(super) fn peek_disable_public_fqdn(&self) -> bool {
        flag(
            self.resolve(self.raw.disable_public_fqdn, |mc| {
                access_profile(mc)
                    .and_then(|p| p.enable_private_cluster_public_fqdn)
                    .map(|enabled| !enabled)
            })
            .value(),
        )
    }

    pub fn get_disable_public_fqdn(&self) -> Result<bool> {
        let disable = self.peek_disable_public_fqdn();
        if !disable {
            return Ok(false);
        }
        match self.mode {
            DecoratorMode::Create => {
                if !self.peek_enable_private_cluster() {
                    return Err(Error::invalid(
                        "--disable-public-fqdn should only be used with --enable-private-cluster",
                    ));
                }
            }
            DecoratorMode::Update => {
                if self.peek_enable_public_fqdn() {
                    return Err(Error::exclusive(PUBLIC_FQDN_TOGGLES));
                }
                if self
                    .peek_private_dns_zone()
                    .is_some_and(|zone| zone.eq_ignore_ascii_case(PRIVATE_DNS_ZONE_NONE))
                {
                    return Err(Error::invalid(DISABLE_PUBLIC_FQDN_ON_NONE_ZONE));
                }
                if !self.existing_private_cluster() {
                    return Err(Error::invalid(
                        "--disable-public-fqdn can only be used for private cluster",
                    ));
                }
            }
        }
        Ok(true)
    }

    pub fn get_enable_public_fqdn(&self) -> Result<bool> {
        let enable = self.peek_enable_public_fqdn();
        if enable && self.mode.is_update() {
            if self.peek_disable_public_fqdn() {
                return Err(Error::exclusive(PUBLIC_FQDN_TOGGLES));
            }
            if !self.existing_private_cluster() {
                return Err(Error::invalid(
                    "--enable-public-fqdn can only be used for private cluster",
                ));
            }
        }
        Ok(enable)
    }

    // ========================================================================
    // Private DNS zone
    // ========================================================================

    pub(super) fn peek_private_dns_zone(&self) -> Option<String> {
        self.reconcile(self.raw.private_dns_zone.clone(), |mc| {
            access_profile(mc).and_then(|p| p.private_dns_zone.clone())
        })
        .value()
    }

    /// Private DNS zone: `system`, `none` or the resource id of a custom zone.
    pub fn get_private_dns_zone(&self) -> Result<Option<String>> {
        let zone = self.peek_private_dns_zone();
        match self.mode {
            DecoratorMode::Create => {
                if let Some(zone) = zone.as_deref().filter(|z| !z.is_empty()) {
                    if !self.peek_enable_private_cluster() {
                        return Err(Error::invalid(PRIVATE_DNS_ZONE_ON_PUBLIC_CLUSTER));
                    }
                    let builtin = zone.eq_ignore_ascii_case(PRIVATE_DNS_ZONE_SYSTEM)
                        || zone.eq_ignore_ascii_case(PRIVATE_DNS_ZONE_NONE);
                    if !builtin && !is_valid_resource_id(zone) {
                        return Err(invalid_resource_id(zone));
                    }
                    if builtin && present(self.peek_fqdn_subdomain().value().as_deref()) {
                        return Err(Error::invalid(FQDN_SUBDOMAIN_NEEDS_CUSTOM_ZONE));
                    }
                }
            }
            DecoratorMode::Update => {
                let none_zone = self
                    .mc
                    .as_ref()
                    .and_then(|mc| access_profile(mc))
                    .and_then(|p| p.private_dns_zone.as_deref())
                    == Some(PRIVATE_DNS_ZONE_NONE);
                if none_zone && self.peek_disable_public_fqdn() {
                    return Err(Error::invalid(DISABLE_PUBLIC_FQDN_ON_NONE_ZONE));
                }
            }
        }
        Ok(zone)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::params::RawParameters;

    const ZONE_ID: &str = "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Network/privateDnsZones/privatelink.westus2.azmk8s.io";

    fn private_cluster(zone: Option<&str>) -> ManagedCluster {
        ManagedCluster {
            api_server_access_profile: Some(ApiServerAccessProfile {
                enable_private_cluster: Some(true),
                private_dns_zone: zone.map(str::to_string),
                ..ApiServerAccessProfile::default()
            }),
            ..ManagedCluster::new("westus2")
        }
    }

    #[test]
    fn test_ip_ranges_are_split_and_trimmed() {
        let raw = RawParameters {
            api_server_authorized_ip_ranges: Some("1.2.3.4/32, 5.6.7.0/24".to_string()),
            ..RawParameters::default()
        };
        assert_eq!(
            create_ctx(raw).get_api_server_authorized_ip_ranges().unwrap(),
            Some(vec!["1.2.3.4/32".to_string(), "5.6.7.0/24".to_string()])
        );
    }

    #[test]
    fn test_ip_ranges_on_create_guards() {
        let raw = RawParameters {
            api_server_authorized_ip_ranges: Some("1.2.3.4/32".to_string()),
            load_balancer_sku: Some("basic".to_string()),
            ..RawParameters::default()
        };
        assert!(matches!(
            create_ctx(raw).get_api_server_authorized_ip_ranges(),
            Err(Error::InvalidArgumentValue(_))
        ));

        let raw = RawParameters {
            api_server_authorized_ip_ranges: Some("1.2.3.4/32".to_string()),
            enable_private_cluster: Some(true),
            ..RawParameters::default()
        };
        let ctx = create_ctx(raw);
        assert!(matches!(
            ctx.get_api_server_authorized_ip_ranges(),
            Err(Error::MutuallyExclusiveArguments(_))
        ));
        assert!(matches!(
            ctx.get_enable_private_cluster(),
            Err(Error::MutuallyExclusiveArguments(_))
        ));
    }

    #[test]
    fn test_ip_ranges_on_update() {
        let ctx = update_ctx(RawParameters::default(), ManagedCluster::new("westus2"));
        assert_eq!(ctx.get_api_server_authorized_ip_ranges().unwrap(), None);

        let clear = RawParameters {
            api_server_authorized_ip_ranges: Some(String::new()),
            ..RawParameters::default()
        };
        let ctx = update_ctx(clear, private_cluster(None));
        assert_eq!(ctx.get_api_server_authorized_ip_ranges().unwrap(), Some(Vec::new()));

        let set = RawParameters {
            api_server_authorized_ip_ranges: Some("1.2.3.4/32".to_string()),
            ..RawParameters::default()
        };
        let ctx = update_ctx(set, private_cluster(None));
        assert!(ctx.get_api_server_authorized_ip_ranges().is_err());
    }

    #[test]
    fn test_fqdn_subdomain_needs_custom_zone() {
        let raw = RawParameters {
            fqdn_subdomain: Some("sub".to_string()),
            private_dns_zone: Some("System".to_string()),
            enable_private_cluster: Some(true),
            ..RawParameters::default()
        };
        let ctx = create_ctx(raw);
        assert_eq!(
            ctx.get_fqdn_subdomain().unwrap_err().to_string(),
            FQDN_SUBDOMAIN_NEEDS_CUSTOM_ZONE
        );
        assert!(ctx.get_private_dns_zone().is_err());

        let raw = RawParameters {
            fqdn_subdomain: Some("sub".to_string()),
            private_dns_zone: Some(ZONE_ID.to_string()),
            enable_private_cluster: Some(true),
            ..RawParameters::default()
        };
        let ctx = create_ctx(raw);
        assert_eq!(ctx.get_fqdn_subdomain().unwrap().as_deref(), Some("sub"));
        assert_eq!(ctx.get_private_dns_zone().unwrap().as_deref(), Some(ZONE_ID));
    }

    #[test]
    fn test_fqdn_subdomain_conflicts_with_prefix() {
        let raw = RawParameters {
            fqdn_subdomain: Some("sub".to_string()),
            dns_name_prefix: Some("prefix".to_string()),
            ..RawParameters::default()
        };
        assert!(matches!(
            create_ctx(raw).get_fqdn_subdomain(),
            Err(Error::MutuallyExclusiveArguments(_))
        ));
    }

    #[test]
    fn test_private_dns_zone_rules_on_create() {
        let raw = RawParameters {
            private_dns_zone: Some("system".to_string()),
            ..RawParameters::default()
        };
        let ctx = create_ctx(raw);
        assert_eq!(
            ctx.get_private_dns_zone().unwrap_err().to_string(),
            PRIVATE_DNS_ZONE_ON_PUBLIC_CLUSTER
        );
        assert!(ctx.get_enable_private_cluster().is_err());

        let raw = RawParameters {
            private_dns_zone: Some("not-an-id".to_string()),
            enable_private_cluster: Some(true),
            ..RawParameters::default()
        };
        assert_eq!(
            create_ctx(raw).get_private_dns_zone().unwrap_err().to_string(),
            "not-an-id is not a valid Azure resource ID."
        );
    }

    #[test]
    fn test_public_fqdn_toggles_on_update() {
        let raw = RawParameters {
            enable_public_fqdn: Some(true),
            disable_public_fqdn: Some(true),
            ..RawParameters::default()
        };
        let ctx = update_ctx(raw, private_cluster(None));
        assert!(matches!(
            ctx.get_enable_public_fqdn(),
            Err(Error::MutuallyExclusiveArguments(_))
        ));
        assert!(matches!(
            ctx.get_disable_public_fqdn(),
            Err(Error::MutuallyExclusiveArguments(_))
        ));

        let raw = RawParameters {
            enable_public_fqdn: Some(true),
            ..RawParameters::default()
        };
        let ctx = update_ctx(raw, ManagedCluster::new("westus2"));
        assert!(ctx.get_enable_public_fqdn().is_err());
        assert!(ctx.get_enable_private_cluster().is_err());
    }

    #[test]
    fn test_public_fqdn_guards_read_flags_without_side_effects() {
        let ctx = update_ctx(RawParameters::default(), private_cluster(None));
        assert!(!ctx.peek_enable_public_fqdn());
        assert!(!ctx.peek_disable_public_fqdn());

        let raw = RawParameters {
            enable_public_fqdn: Some(true),
            ..RawParameters::default()
        };
        let ctx = update_ctx(raw, private_cluster(None));
        assert!(ctx.peek_enable_public_fqdn());
        assert!(ctx.peek_enable_public_fqdn());
        assert!(ctx.get_enable_public_fqdn().unwrap());
        assert!(!ctx.get_disable_public_fqdn().unwrap());
    }

    #[test]
    fn test_disable_public_fqdn_on_none_zone() {
        let raw = RawParameters {
            disable_public_fqdn: Some(true),
            ..RawParameters::default()
        };
        let ctx = update_ctx(raw, private_cluster(Some(PRIVATE_DNS_ZONE_NONE)));
        assert_eq!(
            ctx.get_disable_public_fqdn().unwrap_err().to_string(),
            DISABLE_PUBLIC_FQDN_ON_NONE_ZONE
        );
        assert!(ctx.get_private_dns_zone().is_err());
    }

    #[test]
    fn test_disable_public_fqdn_needs_private_cluster_on_create() {
        let raw = RawParameters {
            disable_public_fqdn: Some(true),
            ..RawParameters::default()
        };
        assert!(create_ctx(raw).get_disable_public_fqdn().is_err());

        let raw = RawParameters {
            disable_public_fqdn: Some(true),
            enable_private_cluster: Some(true),
            ..RawParameters::default()
        };
        let ctx = create_ctx(raw);
        assert!(ctx.get_disable_public_fqdn().unwrap());
        assert!(ctx.get_enable_private_cluster().unwrap());
    }
}
