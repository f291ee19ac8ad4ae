use std::process::ExitCode;

use log::LevelFilter;

mod cli;
mod commands;
mod display;
mod util;

fn main() -> ExitCode {
    let cli = cli::parse();
    let ctx = display::Context::from_options(&cli.output);
    init_logging(ctx.log_level);

    if ctx.interactive {
        display::print_banner();
    }

    match commands::dispatch(cli.command, ctx) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            display::print_error(&e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(level: LevelFilter) {
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_target(false)
        .init();
}
