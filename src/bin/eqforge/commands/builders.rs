use std::io::{self, Write};

use anyhow::Result;
use equiforge::Registry;

use crate::display::{Context, print_builders, print_layers};

pub fn run_builders(ctx: Context) -> Result<()> {
    let registry = Registry::with_defaults();

    if ctx.interactive {
        print_builders(registry.model_builders());
        print_layers(registry.layer_builders());
        return Ok(());
    }

    let mut stdout = io::stdout().lock();
    for (path, builder) in registry.model_builders() {
        let slots: Vec<String> = builder.accepts.iter().map(|s| s.to_string()).collect();
        writeln!(stdout, "{}\t{}", path, slots.join(","))?;
    }
    for (path, builder) in registry.layer_builders() {
        let params: Vec<&str> = builder.params.iter().map(|p| p.name).collect();
        writeln!(stdout, "{}\t{}", path, params.join(","))?;
    }
    Ok(())
}
