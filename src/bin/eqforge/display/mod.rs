mod banner;
mod error;
mod progress;
mod tables;

pub use banner::{banner_for_help, print_banner};
pub use error::print_error;
pub use progress::Progress;
pub use tables::{print_builders, print_config_summary, print_layers, print_model, print_signature};

use std::io::{self, IsTerminal};

use log::LevelFilter;

use crate::cli::OutputOptions;

/// How much the binary prints, derived once from the output flags.
#[derive(Debug, Clone, Copy)]
pub struct Context {
    /// Banner, spinners, and tables go to a terminal.
    pub interactive: bool,
    pub log_level: LevelFilter,
}

impl Context {
    pub fn from_options(options: &OutputOptions) -> Self {
        let tty = io::stderr().is_terminal();
        let log_level = if options.verbose {
            LevelFilter::Debug
        } else if options.quiet || tty {
            // Interactive runs report each builder through the progress display.
            LevelFilter::Warn
        } else {
            LevelFilter::Info
        };
        Self {
            interactive: tty && !options.quiet,
            log_level,
        }
    }
}
