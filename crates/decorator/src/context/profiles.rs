//! Linux and Windows node profiles.

use super::{DecoratorContext, flag, present, prompt_error};
use crate::error::{Error, Result};
use crate::graph::Accessor;
use crate::intermediates::{GMSA_CONFIRMED, WINDOWS_ADMIN_PASSWORD, WINDOWS_ADMIN_USERNAME};
use crate::mode::DecoratorMode;
use clustermodel::consts::LICENSE_TYPE_WINDOWS_SERVER;
use regex::Regex;
use std::sync::LazyLock;

const DEFAULT_ADMIN_USERNAME: &str = "azureuser";

static SSH_RSA_PUBLIC_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^ssh-rsa AAAA[0-9A-Za-z+/]+={0,3}(\s+\S.*)?$").expect("ssh-rsa key pattern is valid")
});

/// Whether `key` looks like an OpenSSH `ssh-rsa` public key.
pub fn is_valid_ssh_rsa_public_key(key: &str) -> bool {
    SSH_RSA_PUBLIC_KEY.is_match(key.trim())
}

/// Shorten long values for error messages.
fn truncate_text(text: &str, width: usize) -> String {
    const PLACEHOLDER: &str = " [...]";
    if text.chars().count() <= width {
        return text.to_string();
    }
    let kept: String = text.chars().take(width.saturating_sub(PLACEHOLDER.len())).collect();
    format!("{}{PLACEHOLDER}", kept.trim_end())
}

impl DecoratorContext {
    // ========================================================================
    // Linux
    // ========================================================================

    /// The ssh public key and whether ssh access is disabled.
    ///
    /// Unless `no_ssh_key` is set the key must be a valid `ssh-rsa` key.
    pub fn get_ssh_key_value_and_no_ssh_key(&self) -> Result<(Option<String>, bool)> {
        let resolved = self.resolve(self.raw.ssh_key_value.clone(), |mc| {
            mc.linux_profile
                .as_ref()
                .and_then(|p| p.ssh.public_keys.first())
                .map(|k| k.key_data.clone())
        });
        let no_ssh_key = flag(self.raw.no_ssh_key);
        if resolved.is_descriptor() && no_ssh_key {
            return Err(Error::internal(
                "Inconsistent state detected, ssh_key_value is read from the `mc` object while \
                 no_ssh_key is enabled.",
            ));
        }
        let key = resolved.value();
        if !no_ssh_key && !key.as_deref().is_some_and(is_valid_ssh_rsa_public_key) {
            return Err(Error::invalid(format!(
                "Provided ssh key ({}) is invalid or non-existent",
                truncate_text(key.as_deref().unwrap_or("None"), 70)
            )));
        }
        Ok((key, no_ssh_key))
    }

    pub fn get_admin_username(&self) -> String {
        self.resolve(self.raw.admin_username.clone(), |mc| {
            mc.linux_profile.as_ref().map(|p| p.admin_username.clone())
        })
        .or_else_with(|| DEFAULT_ADMIN_USERNAME.to_string())
    }

    // ========================================================================
    // Windows
    // ========================================================================

    /// Windows admin username and password.
    ///
    /// When only one of the two is known the other is prompted for. Prompted
    /// values are cached for the rest of the invocation.
    pub fn get_windows_admin_username_and_password(
        &self,
    ) -> Result<(Option<String>, Option<String>)> {
        let from_descriptor = self.descriptor_holds_pair(
            |mc| {
                mc.windows_profile.as_ref().map_or((false, false), |p| {
                    (p.admin_username.is_some(), p.admin_password.is_some())
                })
            },
            "windows admin name",
            "password",
        )?;
        let mut username = self
            .resolve(self.raw.windows_admin_username.clone(), |mc| {
                mc.windows_profile.as_ref().and_then(|p| p.admin_username.clone())
            })
            .value()
            .or_else(|| self.intermediates().get_str(WINDOWS_ADMIN_USERNAME));
        let mut password = self
            .resolve(self.raw.windows_admin_password.clone(), |mc| {
                mc.windows_profile.as_ref().and_then(|p| p.admin_password.clone())
            })
            .value()
            .or_else(|| self.intermediates().get_str(WINDOWS_ADMIN_PASSWORD));

        if !from_descriptor {
            if username.is_none() && present(password.as_deref()) {
                self.completing(Accessor::WindowsAdminCredentials);
                let value = self.secrets.prompt("windows_admin_username: ").map_err(|e| {
                    prompt_error(e, "Please specify username for Windows in non-interactive mode.")
                })?;
                self.set_intermediate(WINDOWS_ADMIN_USERNAME, value.clone(), true);
                username = Some(value);
            }
            if password.is_none() && present(username.as_deref()) {
                self.completing(Accessor::WindowsAdminCredentials);
                let value = self
                    .secrets
                    .prompt_password("windows-admin-password: ", true)
                    .map_err(|e| {
                        prompt_error(
                            e,
                            "Please specify both username and password in non-interactive mode.",
                        )
                    })?;
                self.set_intermediate(WINDOWS_ADMIN_PASSWORD, value.clone(), true);
                password = Some(value);
            }
        }

        match self.mode {
            DecoratorMode::Create => {
                let gmsa_requested = self.peek_enable_windows_gmsa() || {
                    let (dns, root) = self.peek_gmsa_dns_server_and_root_domain_name()?;
                    present(dns.as_deref()) || present(root.as_deref())
                };
                if !present(username.as_deref()) && !present(password.as_deref()) && gmsa_requested
                {
                    return Err(Error::missing(
                        "Please set windows admin username and password before setting gmsa \
                         related configs.",
                    ));
                }
            }
            DecoratorMode::Update => {}
        }
        Ok((username, password))
    }

    /// New Windows admin password on update.
    pub fn get_windows_admin_password(&self) -> Option<String> {
        self.raw.windows_admin_password.clone()
    }

    pub(super) fn peek_enable_ahub(&self) -> bool {
        self.resolve(self.raw.enable_ahub, |mc| {
            mc.windows_profile
                .as_ref()
                .map(|p| p.license_type.as_deref() == Some(LICENSE_TYPE_WINDOWS_SERVER))
        })
        .or(false)
    }

    pub(super) fn peek_disable_ahub(&self) -> bool {
        flag(self.raw.disable_ahub)
    }

    pub fn get_enable_ahub(&self) -> Result<bool> {
        let enable_ahub = self.peek_enable_ahub();
        if enable_ahub && self.peek_disable_ahub() {
            return Err(ahub_conflict());
        }
        Ok(enable_ahub)
    }

    pub fn get_disable_ahub(&self) -> Result<bool> {
        let disable_ahub = self.peek_disable_ahub();
        if disable_ahub && self.peek_enable_ahub() {
            return Err(ahub_conflict());
        }
        Ok(disable_ahub)
    }

    // ========================================================================
    // gMSA
    // ========================================================================

    pub(super) fn peek_enable_windows_gmsa(&self) -> bool {
        self.resolve(self.raw.enable_windows_gmsa, |mc| {
            mc.windows_profile
                .as_ref()
                .and_then(|p| p.gmsa_profile.as_ref())
                .map(|g| g.enabled)
        })
        .or(false)
    }

    pub(super) fn peek_gmsa_dns_server_and_root_domain_name(
        &self,
    ) -> Result<(Option<String>, Option<String>)> {
        self.descriptor_holds_pair(
            |mc| {
                mc.windows_profile
                    .as_ref()
                    .and_then(|p| p.gmsa_profile.as_ref())
                    .map_or((false, false), |g| {
                        (g.dns_server.is_some(), g.root_domain_name.is_some())
                    })
            },
            "gmsa_dns_server",
            "gmsa_root_domain_name",
        )?;
        let gmsa = |mc: &clustermodel::ManagedCluster| {
            mc.windows_profile
                .as_ref()
                .and_then(|p| p.gmsa_profile.clone())
        };
        let dns_server = self
            .resolve(self.raw.gmsa_dns_server.clone(), |mc| {
                gmsa(mc).and_then(|g| g.dns_server)
            })
            .value();
        let root_domain_name = self
            .resolve(self.raw.gmsa_root_domain_name.clone(), |mc| {
                gmsa(mc).and_then(|g| g.root_domain_name)
            })
            .value();
        Ok((dns_server, root_domain_name))
    }

    fn validate_gmsa_options(
        &self,
        enabled: bool,
        dns_server: Option<&str>,
        root_domain_name: Option<&str>,
    ) -> Result<()> {
        if enabled {
            if dns_server.is_none() && root_domain_name.is_none() {
                if !self.intermediates().get_flag(GMSA_CONFIRMED) {
                    self.confirm_or_exit(
                        "Please assure that you have set the DNS server in the vnet used by the \
                         cluster when not specifying --gmsa-dns-server and --gmsa-root-domain-name",
                    )?;
                    self.set_intermediate(GMSA_CONFIRMED, true, true);
                }
            } else if !(present(dns_server) && present(root_domain_name)) {
                return Err(Error::missing(
                    "You must set or not set --gmsa-dns-server and --gmsa-root-domain-name at the \
                     same time.",
                ));
            }
        } else if present(dns_server) || present(root_domain_name) {
            return Err(Error::missing(
                "You only can set --gmsa-dns-server and --gmsa-root-domain-name when setting \
                 --enable-windows-gmsa.",
            ));
        }
        Ok(())
    }

    pub fn get_enable_windows_gmsa(&self) -> Result<bool> {
        let enabled = self.peek_enable_windows_gmsa();
        let (dns_server, root_domain_name) = self.peek_gmsa_dns_server_and_root_domain_name()?;
        self.validate_gmsa_options(enabled, dns_server.as_deref(), root_domain_name.as_deref())?;
        Ok(enabled)
    }

    pub fn get_gmsa_dns_server_and_root_domain_name(
        &self,
    ) -> Result<(Option<String>, Option<String>)> {
        let (dns_server, root_domain_name) = self.peek_gmsa_dns_server_and_root_domain_name()?;
        self.validate_gmsa_options(
            self.peek_enable_windows_gmsa(),
            dns_server.as_deref(),
            root_domain_name.as_deref(),
        )?;
        Ok((dns_server, root_domain_name))
    }
}

fn ahub_conflict() -> Error {
    Error::exclusive(r#"Cannot specify "--enable-ahub" and "--disable-ahub" at the same time"#)
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::external::{MockCloud, ScriptedSecrets};
    use crate::params::RawParameters;
    use clustermodel::{
        GmsaProfile, LinuxProfile, ManagedCluster, SshConfiguration, SshPublicKey, WindowsProfile,
    };

    const KEY: &str = "ssh-rsa AAAAB3NzaC1yc2EAAAADAQABAAABAQC7m1Jm9pq4R0nS3Jx test@example";

    #[test]
    fn test_ssh_key_validation() {
        assert!(is_valid_ssh_rsa_public_key(KEY));
        assert!(is_valid_ssh_rsa_public_key("ssh-rsa AAAAB3NzaC1yc2E="));
        assert!(!is_valid_ssh_rsa_public_key("ssh-ed25519 AAAAC3Nza"));
        assert!(!is_valid_ssh_rsa_public_key("not a key"));
    }

    #[test]
    fn test_ssh_key_pattern_compiles() {
        assert!(LazyLock::force(&SSH_RSA_PUBLIC_KEY).as_str().starts_with("^ssh-rsa"));
        assert!(is_valid_ssh_rsa_public_key("  ssh-rsa AAAAB3NzaC1yc2E= user@host\n"));
        assert!(!is_valid_ssh_rsa_public_key("ssh-rsa AAAA!"));
    }

    #[test]
    fn test_ssh_key_invalid_message_truncates() {
        let raw = RawParameters {
            ssh_key_value: Some("x".repeat(100)),
            ..RawParameters::default()
        };
        let err = create_ctx(raw).get_ssh_key_value_and_no_ssh_key().unwrap_err();
        assert!(matches!(err, Error::InvalidArgumentValue(_)));
        assert!(err.to_string().contains("[...]"));
    }

    #[test]
    fn test_no_ssh_key_skips_validation() {
        let raw = RawParameters {
            no_ssh_key: Some(true),
            ..RawParameters::default()
        };
        assert_eq!(
            create_ctx(raw).get_ssh_key_value_and_no_ssh_key().unwrap(),
            (None, true)
        );
    }

    #[test]
    fn test_ssh_key_from_descriptor_with_no_ssh_key_is_internal() {
        let raw = RawParameters {
            no_ssh_key: Some(true),
            ..RawParameters::default()
        };
        let mut ctx = create_ctx(raw);
        let mut mc = ManagedCluster::new("westus");
        mc.linux_profile = Some(LinuxProfile {
            admin_username: "azureuser".to_string(),
            ssh: SshConfiguration {
                public_keys: vec![SshPublicKey {
                    key_data: KEY.to_string(),
                }],
            },
        });
        ctx.attach_mc(mc).unwrap();
        assert!(matches!(
            ctx.get_ssh_key_value_and_no_ssh_key(),
            Err(Error::Internal(_))
        ));
    }

    #[test]
    fn test_admin_username_default() {
        assert_eq!(create_ctx(RawParameters::default()).get_admin_username(), "azureuser");
    }

    #[test]
    fn test_windows_password_prompted_once() {
        let raw = RawParameters {
            windows_admin_username: Some("winuser".to_string()),
            ..RawParameters::default()
        };
        let secrets = ScriptedSecrets::new().answer("P@ssw0rd1234");
        let ctx = ctx_with(raw, DecoratorMode::Create, MockCloud::new(), secrets.clone());
        let expected = (Some("winuser".to_string()), Some("P@ssw0rd1234".to_string()));
        assert_eq!(ctx.get_windows_admin_username_and_password().unwrap(), expected);
        assert_eq!(ctx.get_windows_admin_username_and_password().unwrap(), expected);
        assert_eq!(secrets.asked(), vec!["windows-admin-password: "]);
    }

    #[test]
    fn test_windows_username_without_tty() {
        let raw = RawParameters {
            windows_admin_password: Some("P@ssw0rd1234".to_string()),
            ..RawParameters::default()
        };
        let err = create_ctx(raw)
            .get_windows_admin_username_and_password()
            .unwrap_err();
        assert!(matches!(err, Error::NoTty(_)));
        assert_eq!(
            err.to_string(),
            "Please specify username for Windows in non-interactive mode."
        );
    }

    #[test]
    fn test_windows_half_pair_in_descriptor_is_internal() {
        let mut ctx = create_ctx(RawParameters::default());
        let mut mc = ManagedCluster::new("westus");
        mc.windows_profile = Some(WindowsProfile {
            admin_username: Some("winuser".to_string()),
            ..WindowsProfile::default()
        });
        ctx.attach_mc(mc).unwrap();
        let err = ctx.get_windows_admin_username_and_password().unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }

    #[test]
    fn test_gmsa_requires_windows_credentials() {
        let raw = RawParameters {
            enable_windows_gmsa: Some(true),
            ..RawParameters::default()
        };
        let err = create_ctx(raw)
            .get_windows_admin_username_and_password()
            .unwrap_err();
        assert!(matches!(err, Error::RequiredArgumentMissing(_)));
    }

    #[test]
    fn test_ahub_exclusive_both_ways() {
        let raw = RawParameters {
            enable_ahub: Some(true),
            disable_ahub: Some(true),
            ..RawParameters::default()
        };
        let ctx = create_ctx(raw);
        assert!(matches!(ctx.get_enable_ahub(), Err(Error::MutuallyExclusiveArguments(_))));
        assert!(matches!(ctx.get_disable_ahub(), Err(Error::MutuallyExclusiveArguments(_))));
    }

    #[test]
    fn test_ahub_guards_read_flags() {
        let raw = RawParameters {
            disable_ahub: Some(true),
            ..RawParameters::default()
        };
        let ctx = create_ctx(raw);
        assert!(ctx.peek_disable_ahub());
        assert!(!ctx.peek_enable_ahub());
        assert!(ctx.get_disable_ahub().unwrap());
        assert!(!ctx.get_enable_ahub().unwrap());
    }

    #[test]
    fn test_ahub_read_from_license_type() {
        let mut ctx = create_ctx(RawParameters::default());
        let mut mc = ManagedCluster::new("westus");
        mc.windows_profile = Some(WindowsProfile {
            license_type: Some(LICENSE_TYPE_WINDOWS_SERVER.to_string()),
            ..WindowsProfile::default()
        });
        ctx.attach_mc(mc).unwrap();
        assert!(ctx.get_enable_ahub().unwrap());
    }

    #[test]
    fn test_gmsa_confirmation() {
        let raw = RawParameters {
            enable_windows_gmsa: Some(true),
            ..RawParameters::default()
        };
        let secrets = ScriptedSecrets::new().confirmation(true);
        let ctx = ctx_with(raw.clone(), DecoratorMode::Create, MockCloud::new(), secrets.clone());
        assert!(ctx.get_enable_windows_gmsa().unwrap());
        assert_eq!(ctx.get_gmsa_dns_server_and_root_domain_name().unwrap(), (None, None));
        assert_eq!(secrets.asked().len(), 1);

        let declined = ScriptedSecrets::new().confirmation(false);
        let ctx = ctx_with(raw, DecoratorMode::Create, MockCloud::new(), declined);
        assert!(matches!(ctx.get_enable_windows_gmsa(), Err(Error::EarlyExit)));
    }

    #[test]
    fn test_gmsa_values_must_come_together() {
        let raw = RawParameters {
            enable_windows_gmsa: Some(true),
            gmsa_dns_server: Some("10.0.0.10".to_string()),
            ..RawParameters::default()
        };
        let err = create_ctx(raw).get_enable_windows_gmsa().unwrap_err();
        assert!(matches!(err, Error::RequiredArgumentMissing(_)));

        let raw = RawParameters {
            gmsa_root_domain_name: Some("contoso.com".to_string()),
            ..RawParameters::default()
        };
        let err = create_ctx(raw).get_gmsa_dns_server_and_root_domain_name().unwrap_err();
        assert!(err.to_string().contains("when setting --enable-windows-gmsa"));
    }

    #[test]
    fn test_gmsa_read_from_descriptor() {
        let mut ctx = create_ctx(RawParameters::default());
        let mut mc = ManagedCluster::new("westus");
        mc.windows_profile = Some(WindowsProfile {
            gmsa_profile: Some(GmsaProfile {
                enabled: true,
                dns_server: Some("10.0.0.10".to_string()),
                root_domain_name: Some("contoso.com".to_string()),
            }),
            ..WindowsProfile::default()
        });
        ctx.attach_mc(mc).unwrap();
        assert!(ctx.get_enable_windows_gmsa().unwrap());
        assert_eq!(
            ctx.get_gmsa_dns_server_and_root_domain_name().unwrap(),
            (Some("10.0.0.10".to_string()), Some("contoso.com".to_string()))
        );
    }
}
