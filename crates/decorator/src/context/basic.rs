//! Cluster identity, placement and request-level parameters.

use super::{DecoratorContext, flag, present};
use crate::error::{Error, Result};
use crate::graph::Accessor;
use crate::intermediates::{LOCATION, SUBSCRIPTION_ID};
use crate::mode::DecoratorMode;
use crate::resolve::Resolved;
use log::debug;
use std::collections::BTreeMap;

impl DecoratorContext {
    /// Subscription of the invocation, asked from the cloud once.
    pub fn get_subscription_id(&self) -> Result<String> {
        if let Some(id) = self.intermediates().get_str(SUBSCRIPTION_ID).filter(|id| !id.is_empty()) {
            return Ok(id);
        }
        self.completing(Accessor::SubscriptionId);
        let id = self.cloud.subscription_id()?;
        self.set_intermediate(SUBSCRIPTION_ID, id.clone(), true);
        Ok(id)
    }

    pub fn get_resource_group_name(&self) -> Result<String> {
        self.raw
            .resource_group_name
            .clone()
            .ok_or_else(|| Error::missing("--resource-group is required."))
    }

    pub fn get_name(&self) -> Result<String> {
        self.raw
            .name
            .clone()
            .ok_or_else(|| Error::missing("--name is required."))
    }

    /// Location of the cluster.
    ///
    /// Falls back to the location of the resource group, which is looked up
    /// once and cached.
    pub fn get_location(&self) -> Result<String> {
        let resolved = self.reconcile(self.raw.location.clone(), |mc| mc.location.clone());
        if let Some(location) = resolved.value() {
            return Ok(location);
        }
        if let Some(location) = self.intermediates().get_str(LOCATION) {
            return Ok(location);
        }
        self.completing(Accessor::Location);
        let location = self
            .cloud
            .resource_group_location(&self.get_resource_group_name()?)?;
        self.set_intermediate(LOCATION, location.clone(), true);
        Ok(location)
    }

    pub fn get_tags(&self) -> Option<BTreeMap<String, String>> {
        self.resolve(self.raw.tags.clone(), |mc| mc.tags.clone()).value()
    }

    pub fn get_kubernetes_version(&self) -> String {
        self.resolve(self.raw.kubernetes_version.clone(), |mc| {
            mc.kubernetes_version.clone()
        })
        .or_default()
    }

    pub(super) fn peek_dns_name_prefix(&self) -> Resolved<String> {
        self.resolve(self.raw.dns_name_prefix.clone(), |mc| mc.dns_prefix.clone())
    }

    /// DNS name prefix, generated from the cluster name, resource group and
    /// subscription when neither a prefix nor an FQDN subdomain was given.
    pub fn get_dns_name_prefix(&self) -> Result<Option<String>> {
        let resolved = self.peek_dns_name_prefix();
        let from_descriptor = resolved.is_descriptor();
        let mut prefix = resolved.value().filter(|p| !p.is_empty());
        let fqdn_subdomain = self.peek_fqdn_subdomain().value();

        let completes = match self.mode {
            DecoratorMode::Create => {
                prefix.is_none() && !present(fqdn_subdomain.as_deref()) && !from_descriptor
            }
            DecoratorMode::Update => false,
        };
        if completes {
            self.completing(Accessor::DnsNamePrefix);
            prefix = Some(generate_dns_name_prefix(
                &self.get_name()?,
                &self.get_resource_group_name()?,
                &self.get_subscription_id()?,
            ));
        }

        if prefix.is_some() && present(fqdn_subdomain.as_deref()) {
            return Err(Error::exclusive(
                "--dns-name-prefix and --fqdn-subdomain cannot be used at same time",
            ));
        }
        Ok(prefix)
    }

    pub fn get_node_osdisk_diskencryptionset_id(&self) -> Option<String> {
        self.resolve(self.raw.node_osdisk_diskencryptionset_id.clone(), |mc| {
            mc.disk_encryption_set_id.clone()
        })
        .value()
    }

    pub fn get_yes(&self) -> bool {
        flag(self.raw.yes)
    }

    pub fn get_no_wait(&self) -> bool {
        flag(self.raw.no_wait)
    }

    /// Custom request headers from `Key1=Value1,Key2=Value2`.
    ///
    /// A repeated key gets its values joined with a comma.
    pub fn get_aks_custom_headers(&self) -> Result<BTreeMap<String, String>> {
        let raw = self.raw.aks_custom_headers.as_deref().unwrap_or_default().trim();
        let mut headers = BTreeMap::new();
        if raw.is_empty() {
            return Ok(headers);
        }
        for item in raw.split(',') {
            let item = item.trim();
            let parts: Vec<&str> = item.split('=').collect();
            let (key, value) = match parts.as_slice() {
                [key] => (*key, ""),
                [key, value] => (*key, *value),
                _ => {
                    return Err(Error::invalid(format!(
                        "The format of '{item}' in '{raw}' is incorrect, correct format should be \
                         'Key1=Value1,Key2=Value2'."
                    )));
                }
            };
            if value.trim().is_empty() {
                return Err(Error::invalid(format!(
                    "Empty value not allowed. The value '{value}' of key '{key}' in '{item}' is \
                     empty. Raw input '{raw}'."
                )));
            }
            let (key, value) = (key.trim().to_string(), value.trim());
            headers
                .entry(key)
                .and_modify(|existing: &mut String| {
                    existing.push(',');
                    existing.push_str(value);
                })
                .or_insert_with(|| value.to_string());
        }
        debug!("parsed {} custom header(s)", headers.len());
        Ok(headers)
    }

    pub fn get_edge_zone(&self) -> Option<String> {
        self.reconcile(self.raw.edge_zone.clone(), |mc| {
            mc.extended_location.as_ref().map(|l| l.name.clone())
        })
        .value()
    }

    pub fn get_node_resource_group(&self) -> Option<String> {
        self.reconcile(self.raw.node_resource_group.clone(), |mc| {
            mc.node_resource_group.clone()
        })
        .value()
    }
}

/// Keep ASCII letters, digits and dashes.
fn sanitize(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect()
}

fn generate_dns_name_prefix(name: &str, resource_group: &str, subscription_id: &str) -> String {
    let mut name_part: String = sanitize(name).chars().take(10).collect();
    if !name_part.starts_with(|c: char| c.is_ascii_alphabetic()) {
        name_part = format!("a{name_part}").chars().take(10).collect();
    }
    let resource_group_part: String = sanitize(resource_group).chars().take(16).collect();
    let subscription_part: String = subscription_id.chars().take(6).collect();
    format!("{name_part}-{resource_group_part}-{subscription_part}")
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use crate::error::Error;
    use crate::external::{MockCloud, NoTtySecrets};
    use crate::mode::DecoratorMode;
    use crate::params::RawParameters;
    use clustermodel::{ExtendedLocation, ManagedCluster};

    fn named(name: &str, rg: &str) -> RawParameters {
        RawParameters {
            name: Some(name.to_string()),
            resource_group_name: Some(rg.to_string()),
            ..RawParameters::default()
        }
    }

    #[test]
    fn test_subscription_id_is_cached() {
        let cloud = MockCloud::new().with_subscription("1234-5678");
        let ctx = ctx_with(RawParameters::default(), DecoratorMode::Create, cloud.clone(), NoTtySecrets);
        assert_eq!(ctx.get_subscription_id().unwrap(), "1234-5678");
        assert_eq!(ctx.get_subscription_id().unwrap(), "1234-5678");
        assert_eq!(cloud.count("subscription_id"), 1);
    }

    #[test]
    fn test_dns_name_prefix_generation() {
        let cloud = MockCloud::new().with_subscription("1234-5678");
        let ctx = ctx_with(
            named("1234_test_name", "test_rg_name"),
            DecoratorMode::Create,
            cloud,
            NoTtySecrets,
        );
        assert_eq!(
            ctx.get_dns_name_prefix().unwrap().as_deref(),
            Some("a1234testn-testrgname-1234-5")
        );
    }

    #[test]
    fn test_dns_name_prefix_keeps_letter_start() {
        assert_eq!(
            super::generate_dns_name_prefix("test-cluster-name", "a_very_long_resource_group_name", "abcdefgh"),
            "test-clust-averylongresourc-abcdef"
        );
    }

    #[test]
    fn test_dns_name_prefix_read_from_descriptor() {
        let mut ctx = create_ctx(named("n", "rg"));
        let mut mc = ManagedCluster::new("westus");
        mc.dns_prefix = Some("stored".to_string());
        ctx.attach_mc(mc).unwrap();
        assert_eq!(ctx.get_dns_name_prefix().unwrap().as_deref(), Some("stored"));
    }

    #[test]
    fn test_dns_name_prefix_and_fqdn_subdomain_are_exclusive() {
        let raw = RawParameters {
            dns_name_prefix: Some("prefix".to_string()),
            fqdn_subdomain: Some("sub".to_string()),
            ..RawParameters::default()
        };
        let err = create_ctx(raw).get_dns_name_prefix().unwrap_err();
        assert!(matches!(err, Error::MutuallyExclusiveArguments(_)));
    }

    #[test]
    fn test_fqdn_subdomain_skips_generation() {
        let raw = RawParameters {
            fqdn_subdomain: Some("sub".to_string()),
            ..RawParameters::default()
        };
        assert_eq!(create_ctx(raw).get_dns_name_prefix().unwrap(), None);
    }

    #[test]
    fn test_location_precedence_and_cache() {
        let cloud = MockCloud::new().with_resource_group("rg", "eastus");
        let ctx = ctx_with(named("n", "rg"), DecoratorMode::Create, cloud.clone(), NoTtySecrets);
        assert_eq!(ctx.get_location().unwrap(), "eastus");
        assert_eq!(ctx.get_location().unwrap(), "eastus");
        assert_eq!(cloud.count("resource_group_location"), 1);

        let raw = RawParameters {
            location: Some("westus2".to_string()),
            ..named("n", "rg")
        };
        let mut ctx = create_ctx(raw);
        ctx.attach_mc(ManagedCluster::new("centralus")).unwrap();
        assert_eq!(ctx.get_location().unwrap(), "westus2");
    }

    #[test]
    fn test_update_location_reads_descriptor() {
        let ctx = update_ctx(named("n", "rg"), ManagedCluster::new("centralus"));
        assert_eq!(ctx.get_location().unwrap(), "centralus");
    }

    #[test]
    fn test_missing_name_is_required() {
        let err = create_ctx(RawParameters::default()).get_name().unwrap_err();
        assert!(matches!(err, Error::RequiredArgumentMissing(_)));
    }

    #[test]
    fn test_custom_headers() {
        let raw = RawParameters {
            aks_custom_headers: Some(" a=b, c=d ,a=e ".to_string()),
            ..RawParameters::default()
        };
        let headers = create_ctx(raw).get_aks_custom_headers().unwrap();
        assert_eq!(headers.get("a").map(String::as_str), Some("b,e"));
        assert_eq!(headers.get("c").map(String::as_str), Some("d"));

        assert!(create_ctx(RawParameters::default()).get_aks_custom_headers().unwrap().is_empty());
    }

    #[test]
    fn test_custom_headers_invalid() {
        for bad in ["a=b=c", "a=", "a"] {
            let raw = RawParameters {
                aks_custom_headers: Some(bad.to_string()),
                ..RawParameters::default()
            };
            let err = create_ctx(raw).get_aks_custom_headers().unwrap_err();
            assert!(matches!(err, Error::InvalidArgumentValue(_)), "{bad}");
        }
    }

    #[test]
    fn test_edge_zone_read_in_update() {
        let mut mc = ManagedCluster::new("westus");
        mc.extended_location = Some(ExtendedLocation {
            name: "zone1".to_string(),
            kind: "EdgeZone".to_string(),
        });
        let ctx = update_ctx(RawParameters::default(), mc);
        assert_eq!(ctx.get_edge_zone().as_deref(), Some("zone1"));
    }

    #[test]
    fn test_update_tags_unset_means_no_change() {
        let mut mc = ManagedCluster::new("westus");
        mc.tags = Some([("k".to_string(), "v".to_string())].into());
        let ctx = update_ctx(RawParameters::default(), mc);
        assert_eq!(ctx.get_tags(), None);
        assert_eq!(ctx.get_kubernetes_version(), "");
    }
}
