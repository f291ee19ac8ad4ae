//! A pure Rust library for composing equivariant interatomic-potential models
//! from configuration. Every layer declares the symmetry type of the data
//! fields it reads and writes, and models are assembled only when those
//! declarations line up.
//!
//! # Features
//!
//! - **Irreps signatures** — Fields are typed by O(3) irreducible
//!   representations, checked whenever two modules are joined
//! - **Three-tier parameters** — Explicit arguments override per-layer keys
//!   (`<layer>_<param>`), which override shared keys
//! - **Builder pipelines** — `model_builders` lists the steps that create,
//!   derive settings for, and modify a model
//! - **Safe editing** — Layers can be appended or inserted into a built
//!   network; the edit is rejected unless the whole chain stays compatible
//!
//! # Quick Start
//!
//! The main entry point is [`model_from_config`], which runs the configured
//! builders against a [`Registry`] of known names:
//!
//! ```
//! use equiforge::{AtomicData, Config, Registry, model_from_config};
//!
//! let mut config = Config::from_toml_str(r#"
//!     model_builders = ["SimpleIrrepsConfig", "EnergyModel"]
//!     chemical_symbols = ["H", "O"]
//!     r_max = 4.0
//!     l_max = 1
//!     num_features = 8
//! "#)?;
//!
//! let model = model_from_config(&mut config, &Registry::with_defaults(), true, false)?
//!     .expect("EnergyModel returns a model");
//!
//! // Water: O at the origin, two H atoms, all pairs within the cutoff.
//! let water = AtomicData::from_graph(
//!     &[[0.0, 0.0, 0.0], [0.96, 0.0, 0.0], [-0.24, 0.93, 0.0]],
//!     vec![1, 0, 0],
//!     vec![[0, 1], [1, 0], [0, 2], [2, 0], [1, 2], [2, 1]],
//! );
//! let out = model.forward(water)?;
//! assert_eq!(out.tensor("total_energy").map(|t| t.rows()), Some(1));
//! # Ok::<(), equiforge::Error>(())
//! ```
//!
//! # Module Organization
//!
//! - [`irreps`] — Irreps descriptors, field signatures, and standard field names
//! - [`params`] — Shared configuration and three-tier parameter resolution
//! - [`nn`] — The graph-module contract, sequential networks, and reference layers
//! - [`builder`] — Model builders, the name registry, and the type mapper
//! - [`data`] — Named per-structure fields passed through a model

pub mod builder;
pub mod data;
mod error;
pub mod irreps;
pub mod nn;
pub mod params;

pub use builder::{ModelBuilder, Registry, Slot, TypeMapper, model_from_config};
pub use data::{AtomicData, FieldData, Tensor};
pub use error::{Error, ErrorKind, Result};
pub use irreps::{Irreps, IrrepsDict};
pub use nn::{GraphModule, LayerBuilder, LayerSpec, SequentialGraphNetwork};
pub use params::Config;
