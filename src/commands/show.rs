use crate::Context;
use crate::cli::ShowArgs;
use crate::ui;
use anyhow::Result;
use clustermodel::ManagedCluster;
use decorator::external::ClusterClient;

pub fn run(ctx: &Context, args: &ShowArgs) -> Result<()> {
    let backends = super::backends(super::load_config(ctx)?, false)?;
    let mc = backends.store.get(&args.resource_group, &args.name)?;

    if args.json {
        println!("{}", mc.to_json_pretty()?);
        return Ok(());
    }

    ui::header(&format!("{} ({})", args.name, args.resource_group));
    for (key, value) in summary(&mc) {
        ui::kv(key, &value);
    }

    if let Some(pools) = &mc.agent_pool_profiles {
        ui::section("Node pools");
        for pool in pools {
            let count = pool.count.map_or_else(|| "-".to_string(), |c| c.to_string());
            let scaling = match (pool.enable_auto_scaling, pool.min_count, pool.max_count) {
                (Some(true), Some(min), Some(max)) => format!(", autoscale {min}..{max}"),
                _ => String::new(),
            };
            ui::kv(
                &pool.name,
                &format!(
                    "{} x {}{scaling}",
                    count,
                    ui::or_dash(pool.vm_size.as_deref())
                ),
            );
        }
    }
    Ok(())
}

/// Headline fields of a descriptor.
fn summary(mc: &ManagedCluster) -> Vec<(&'static str, String)> {
    let network = mc.network_profile.as_ref();
    let addons = mc
        .addon_profiles
        .as_ref()
        .map(|addons| {
            addons
                .iter()
                .filter(|(_, addon)| addon.enabled)
                .map(|(key, _)| key.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default();

    vec![
        ("location", ui::or_dash(mc.location.as_deref())),
        ("kubernetes", ui::or_dash(mc.kubernetes_version.as_deref())),
        ("dns prefix", ui::or_dash(mc.dns_prefix.as_deref())),
        (
            "identity",
            mc.identity
                .as_ref()
                .map_or_else(|| "service principal".to_string(), |i| i.kind.to_string()),
        ),
        (
            "network plugin",
            ui::or_dash(network.and_then(|n| n.network_plugin.as_deref())),
        ),
        (
            "load balancer",
            ui::or_dash(network.and_then(|n| n.load_balancer_sku.as_deref())),
        ),
        ("sku tier", ui::or_dash(mc.sku.as_ref().map(|s| s.tier.as_str()))),
        ("addons", ui::or_dash(Some(addons.as_str()))),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use clustermodel::{AddonProfile, ClusterIdentity, IdentityType, NetworkProfile};
    use std::collections::BTreeMap;

    #[test]
    fn test_summary() {
        let mc = ManagedCluster {
            kubernetes_version: Some("1.29.2".to_string()),
            identity: Some(ClusterIdentity {
                kind: IdentityType::UserAssigned,
                ..ClusterIdentity::default()
            }),
            network_profile: Some(NetworkProfile {
                network_plugin: Some("azure".to_string()),
                ..NetworkProfile::default()
            }),
            addon_profiles: Some(BTreeMap::from([
                ("omsagent".to_string(), AddonProfile::enabled_with(BTreeMap::new())),
                (
                    "azurepolicy".to_string(),
                    AddonProfile {
                        enabled: false,
                        ..AddonProfile::default()
                    },
                ),
            ])),
            ..ManagedCluster::new("westus2")
        };
        let summary: BTreeMap<_, _> = summary(&mc).into_iter().collect();
        assert_eq!(summary["location"], "westus2");
        assert_eq!(summary["kubernetes"], "1.29.2");
        assert_eq!(summary["dns prefix"], "-");
        assert_eq!(summary["identity"], "UserAssigned");
        assert_eq!(summary["network plugin"], "azure");
        assert_eq!(summary["addons"], "omsagent");
    }
}
