use crate::Context;
use crate::cli::ClusterArgs;
use crate::ui;
use anyhow::Result;
use decorator::UpdateDecorator;
use decorator::external::ClusterClient;

pub fn run(ctx: &Context, args: &ClusterArgs) -> Result<()> {
    let backends = super::backends(super::load_config(ctx)?, args.dry_run)?;
    let raw = super::raw_parameters(args)?;
    let mut decorator = UpdateDecorator::new(
        raw,
        backends.cloud.clone(),
        backends.secrets.clone(),
        backends.client(),
    )?;
    let mc = decorator.update_mc_profile_default()?;

    let before = backends.store.get(&args.resource_group, &args.name)?;
    if !ctx.quiet || args.dry_run {
        ui::header(&format!("Changes to {}", args.name));
        if !ui::diff(&before.to_json_pretty()?, &mc.to_json_pretty()?) {
            ui::info("Descriptor unchanged, only follow-up role assignments apply");
        }
    }
    if args.dry_run {
        ui::dim("Dry run, nothing was stored and no role assignments were made");
        return Ok(());
    }

    decorator.update_mc()?;
    if !ctx.quiet {
        ui::success(&format!(
            "Updated cluster {} in {}",
            args.name, args.resource_group
        ));
    }
    Ok(())
}
