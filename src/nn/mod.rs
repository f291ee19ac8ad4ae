//! Graph modules and their sequential composition.
//!
//! - [`GraphModule`] — The contract every computational layer implements
//! - [`ModuleIrreps`] — Signature validation performed at construction
//! - [`SequentialGraphNetwork`] — Ordered, named, type-checked module chain
//! - [`LayerBuilder`] — Declared-parameter constructor for a layer type
//!
//! Reference layers cover the pieces a small energy model needs: species
//! one-hot encoding, edge geometry, and per-atom linear maps and reductions.

mod atomwise;
mod edges;
mod embedding;
mod module;
mod sequential;

pub use atomwise::{AtomwiseLinear, AtomwiseReduce, PerSpeciesScaleShift, Reduce};
pub use edges::{RadialBasisEdgeEncoding, SphericalHarmonicEdgeAttrs};
pub use embedding::OneHotAtomEncoding;
pub use module::{GraphModule, IrrepsSpec, ModuleIrreps};
pub use sequential::{Anchor, SequentialGraphNetwork};

use crate::error::Result;
use crate::params::{Arguments, Instantiate, Param};

/// Constructor for a layer type, with its parameters declared up front.
#[derive(Debug, Clone, Copy)]
pub struct LayerBuilder {
    pub name: &'static str,
    pub params: &'static [Param],
    pub func: fn(Arguments) -> Result<Box<dyn GraphModule>>,
}

impl Instantiate for LayerBuilder {
    type Output = Box<dyn GraphModule>;

    fn name(&self) -> &str {
        self.name
    }

    fn params(&self) -> &[Param] {
        self.params
    }

    fn call(&self, args: Arguments) -> Result<Self::Output> {
        (self.func)(args)
    }
}

/// A layer builder paired with its per-layer parameter overrides.
#[derive(Debug, Clone)]
pub struct LayerSpec {
    pub builder: LayerBuilder,
    pub params: toml::Table,
}

impl LayerSpec {
    pub fn new(builder: LayerBuilder) -> Self {
        Self {
            builder,
            params: toml::Table::new(),
        }
    }

    /// Adds a per-layer override.
    pub fn with(mut self, key: &str, value: impl Into<toml::Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }
}

impl From<LayerBuilder> for LayerSpec {
    fn from(builder: LayerBuilder) -> Self {
        Self::new(builder)
    }
}
