mod build;
mod builders;

use build::run_build;
use builders::run_builders;

use anyhow::Result;

use crate::cli::Command;
use crate::display::Context;

pub fn dispatch(command: Command, ctx: Context) -> Result<()> {
    match command {
        Command::Build(args) => run_build(args, ctx),
        Command::Builders => run_builders(ctx),
    }
}
