use crate::Context;
use crate::cli::ClusterArgs;
use crate::ui;
use anyhow::{Result, bail};
use decorator::CreateDecorator;

pub fn run(ctx: &Context, args: &ClusterArgs) -> Result<()> {
    let backends = super::backends(super::load_config(ctx)?, args.dry_run)?;
    if !args.dry_run && backends.store.exists(&args.resource_group, &args.name) {
        bail!(
            "Cluster '{}' already exists in resource group '{}', use `akscli update` to change it",
            args.name,
            args.resource_group
        );
    }

    let raw = super::raw_parameters(args)?;
    let mut decorator = CreateDecorator::new(
        raw,
        backends.cloud.clone(),
        backends.secrets.clone(),
        backends.client(),
    )?;
    let mc = decorator.construct_mc_profile_default()?;

    if args.dry_run {
        println!("{}", mc.to_json_pretty()?);
        return Ok(());
    }

    let created = decorator.create_mc()?;
    if !ctx.quiet {
        ui::success(&format!(
            "Created cluster {} in {}",
            args.name, args.resource_group
        ));
        ui::kv("location", &ui::or_dash(created.location.as_deref()));
        ui::kv("dns prefix", &ui::or_dash(created.dns_prefix.as_deref()));
        ui::kv(
            "descriptor",
            &backends
                .store
                .cluster_path(&args.resource_group, &args.name)
                .display()
                .to_string(),
        );
    }
    Ok(())
}
