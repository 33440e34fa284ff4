//! Auto-upgrade, autoscaler profile, uptime SLA and local accounts.

use super::{DecoratorContext, flag};
use crate::error::{Error, Result};
use clustermodel::consts::{AUTOSCALER_PROFILE_KEYS, SKU_TIER_PAID};
use std::collections::BTreeMap;

/// Bring a user supplied autoscaler profile key into dash form and check it.
fn normalize_autoscaler_key(key: &str) -> Result<String> {
    let key = key.trim();
    if key.is_empty() {
        return Err(Error::invalid("Empty key specified for cluster-autoscaler-profile"));
    }
    let normalized = key.replace('_', "-");
    if AUTOSCALER_PROFILE_KEYS.contains(&normalized.as_str()) {
        Ok(normalized)
    } else {
        Err(Error::invalid(format!(
            "'{key}' is an invalid key for cluster-autoscaler-profile. Valid keys are {}.",
            AUTOSCALER_PROFILE_KEYS.join(", ")
        )))
    }
}

fn normalize_autoscaler_profile(
    profile: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, String>> {
    profile
        .iter()
        .map(|(key, value)| Ok((normalize_autoscaler_key(key)?, value.clone())))
        .collect()
}

impl DecoratorContext {
    pub fn get_auto_upgrade_channel(&self) -> Option<String> {
        self.resolve(self.raw.auto_upgrade_channel.clone(), |mc| {
            mc.auto_upgrade_profile
                .as_ref()
                .and_then(|p| p.upgrade_channel.clone())
        })
        .value()
    }

    /// Cluster autoscaler profile with keys in dash form.
    ///
    /// On update the given keys are merged over the existing profile, while
    /// an empty map clears it.
    pub fn get_cluster_autoscaler_profile(&self) -> Result<Option<BTreeMap<String, String>>> {
        let resolved = self.resolve(self.raw.cluster_autoscaler_profile.clone(), |mc| {
            mc.auto_scaler_profile.clone()
        });
        if resolved.is_descriptor() {
            return Ok(resolved.value());
        }
        let Some(requested) = resolved.value() else {
            return Ok(None);
        };
        let requested = normalize_autoscaler_profile(&requested)?;
        if self.mode.is_update() && !requested.is_empty() {
            let mut merged = self
                .descriptor(|mc| mc.auto_scaler_profile.clone())
                .unwrap_or_default();
            merged.extend(requested);
            return Ok(Some(merged));
        }
        Ok(Some(requested))
    }

    // ========================================================================
    // Uptime SLA
    // ========================================================================

    fn peek_uptime_sla(&self) -> bool {
        flag(
            self.resolve(self.raw.uptime_sla, |mc| {
                mc.sku.as_ref().map(|sku| sku.tier == SKU_TIER_PAID)
            })
            .value(),
        )
    }

    fn peek_no_uptime_sla(&self) -> bool {
        flag(self.raw.no_uptime_sla)
    }

    fn check_uptime_sla_toggles(&self) -> Result<()> {
        if self.peek_uptime_sla() && self.peek_no_uptime_sla() {
            return Err(Error::exclusive(
                "Cannot specify \"--uptime-sla\" and \"--no-uptime-sla\" at the same time.",
            ));
        }
        Ok(())
    }

    pub fn get_uptime_sla(&self) -> Result<bool> {
        self.check_uptime_sla_toggles()?;
        Ok(self.peek_uptime_sla())
    }

    pub fn get_no_uptime_sla(&self) -> Result<bool> {
        self.check_uptime_sla_toggles()?;
        Ok(self.peek_no_uptime_sla())
    }

    // ========================================================================
    // Local accounts
    // ========================================================================

    fn peek_disable_local_accounts(&self) -> bool {
        flag(
            self.resolve(self.raw.disable_local_accounts, |mc| mc.disable_local_accounts)
                .value(),
        )
    }

    fn peek_enable_local_accounts(&self) -> bool {
        flag(self.raw.enable_local_accounts)
    }

    fn check_local_accounts_toggles(&self) -> Result<()> {
        if self.peek_disable_local_accounts() && self.peek_enable_local_accounts() {
            return Err(Error::exclusive(
                "Cannot specify --disable-local-accounts and --enable-local-accounts at the same time.",
            ));
        }
        Ok(())
    }

    pub fn get_disable_local_accounts(&self) -> Result<bool> {
        self.check_local_accounts_toggles()?;
        Ok(self.peek_disable_local_accounts())
    }

    pub fn get_enable_local_accounts(&self) -> Result<bool> {
        self.check_local_accounts_toggles()?;
        Ok(self.peek_enable_local_accounts())
    }
}
