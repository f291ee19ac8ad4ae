//! Shared configuration and parameter resolution.
//!
//! - [`Config`] — The shared parameter pool, loaded from TOML
//! - [`instantiate`] — Three-tier parameter resolution for any [`Instantiate`] builder
//! - [`Arguments`] — Typed access to the resolved parameters inside a builder

mod config;
mod instantiate;

pub use config::Config;
pub use instantiate::{Argument, Arguments, Instantiate, Param, instantiate};
