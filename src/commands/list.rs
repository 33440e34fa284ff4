use crate::Context;
use crate::ui;
use anyhow::Result;

pub fn run(ctx: &Context) -> Result<()> {
    let backends = super::backends(super::load_config(ctx)?, false)?;
    let clusters = backends.store.list()?;

    ui::header("Managed clusters");
    if clusters.is_empty() {
        ui::dim(&format!(
            "No clusters stored in {}",
            backends.store.root().display()
        ));
        return Ok(());
    }
    for (resource_group, name) in &clusters {
        ui::kv(resource_group, name);
    }
    Ok(())
}
