pub mod create;
pub mod list;
pub mod show;
pub mod update;

use crate::Context;
use crate::cloud::ConfigCloud;
use crate::config::AksConfig;
use crate::params::{self, Overrides};
use crate::prompt::TerminalSecrets;
use crate::store::FileClusterStore;
use anyhow::Result;
use decorator::RawParameters;
use decorator::external::{CloudBackend, ClusterClient, SecretSource};
use std::sync::Arc;

/// Collaborators shared by the cluster commands.
pub struct Backends {
    pub cloud: Arc<dyn CloudBackend>,
    pub secrets: Arc<dyn SecretSource>,
    pub store: Arc<FileClusterStore>,
}

impl Backends {
    pub fn client(&self) -> Arc<dyn ClusterClient> {
        self.store.clone()
    }
}

/// Load the config named on the command line, or the default one.
pub fn load_config(ctx: &Context) -> Result<AksConfig> {
    match &ctx.config {
        Some(path) => AksConfig::load_from(path),
        None => AksConfig::load(),
    }
}

/// With `dry_run` the cloud backend answers lookups but skips role
/// assignments and addon setup.
pub fn backends(config: AksConfig, dry_run: bool) -> Result<Backends> {
    let store = Arc::new(FileClusterStore::new(config.store_dir()?));
    log::debug!("Using cluster store {}", store.root().display());
    Ok(Backends {
        cloud: Arc::new(ConfigCloud::new(config).with_dry_run(dry_run)),
        secrets: Arc::new(TerminalSecrets),
        store,
    })
}

pub fn raw_parameters(args: &crate::cli::ClusterArgs) -> Result<RawParameters> {
    params::build_raw(
        args.params.as_deref(),
        &args.sets,
        &Overrides {
            resource_group: &args.resource_group,
            name: &args.name,
            yes: args.yes,
            no_wait: args.no_wait,
        },
    )
}
