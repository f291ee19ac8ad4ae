use std::collections::BTreeMap;

use super::ModelBuilder;
use super::builders::{DEPLOYMENT_MODE, ENERGY_MODEL, PER_SPECIES_RESCALE, SIMPLE_IRREPS_CONFIG};
use crate::error::{Error, Result};
use crate::nn::{
    AtomwiseLinear, AtomwiseReduce, LayerBuilder, OneHotAtomEncoding, PerSpeciesScaleShift,
    RadialBasisEdgeEncoding, SphericalHarmonicEdgeAttrs,
};

/// Namespace of the stock model builders.
pub const MODEL_PREFIX: &str = "equiforge.model";
/// Namespace of the stock layers.
pub const LAYER_PREFIX: &str = "equiforge.nn";

#[derive(Debug, Clone, Copy)]
enum Entry {
    Model(ModelBuilder),
    Layer(LayerBuilder),
}

impl Entry {
    fn kind(&self) -> &'static str {
        match self {
            Entry::Model(_) => "model builder",
            Entry::Layer(_) => "layer",
        }
    }
}

/// Resolves builder names written in a configuration to builders.
///
/// Entries are stored under fully qualified dotted paths such as
/// `equiforge.model.EnergyModel`.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: BTreeMap<String, Entry>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding every stock model builder and layer.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for builder in [SIMPLE_IRREPS_CONFIG, ENERGY_MODEL, PER_SPECIES_RESCALE, DEPLOYMENT_MODE] {
            registry.register_model(&format!("{}.{}", MODEL_PREFIX, builder.name), builder);
        }
        for builder in [
            OneHotAtomEncoding::BUILDER,
            SphericalHarmonicEdgeAttrs::BUILDER,
            RadialBasisEdgeEncoding::BUILDER,
            AtomwiseLinear::BUILDER,
            AtomwiseReduce::BUILDER,
            PerSpeciesScaleShift::BUILDER,
        ] {
            registry.register_layer(&format!("{}.{}", LAYER_PREFIX, builder.name), builder);
        }
        registry
    }

    /// Registers a model builder under `path`, replacing any previous entry.
    pub fn register_model(&mut self, path: &str, builder: ModelBuilder) {
        self.entries.insert(path.to_string(), Entry::Model(builder));
    }

    /// Registers a layer under `path`, replacing any previous entry.
    pub fn register_layer(&mut self, path: &str, builder: LayerBuilder) {
        self.entries.insert(path.to_string(), Entry::Layer(builder));
    }

    /// Resolves a model builder by exact path, then under `prefix`.
    ///
    /// # Errors
    ///
    /// - [`Error::Unresolved`] if neither path is registered
    /// - [`Error::Type`] if the path names a layer
    pub fn load_model_builder(&self, name: &str, prefix: &str) -> Result<ModelBuilder> {
        match self.lookup(name, prefix)? {
            Entry::Model(builder) => Ok(*builder),
            other => Err(wrong_kind(name, other, "model builder")),
        }
    }

    /// Resolves a layer by exact path, then under `prefix`.
    ///
    /// # Errors
    ///
    /// - [`Error::Unresolved`] if neither path is registered
    /// - [`Error::Type`] if the path names a model builder
    pub fn load_layer_builder(&self, name: &str, prefix: &str) -> Result<LayerBuilder> {
        match self.lookup(name, prefix)? {
            Entry::Layer(builder) => Ok(*builder),
            other => Err(wrong_kind(name, other, "layer")),
        }
    }

    pub fn model_builders(&self) -> impl Iterator<Item = (&str, &ModelBuilder)> {
        self.entries.iter().filter_map(|(path, entry)| match entry {
            Entry::Model(builder) => Some((path.as_str(), builder)),
            Entry::Layer(_) => None,
        })
    }

    pub fn layer_builders(&self) -> impl Iterator<Item = (&str, &LayerBuilder)> {
        self.entries.iter().filter_map(|(path, entry)| match entry {
            Entry::Layer(builder) => Some((path.as_str(), builder)),
            Entry::Model(_) => None,
        })
    }

    fn lookup(&self, name: &str, prefix: &str) -> Result<&Entry> {
        if let Some(entry) = self.entries.get(name) {
            return Ok(entry);
        }
        self.entries
            .get(&format!("{}.{}", prefix, name))
            .ok_or_else(|| Error::Unresolved {
                name: name.to_string(),
                prefix: prefix.to_string(),
            })
    }
}

fn wrong_kind(name: &str, found: &Entry, expected: &str) -> Error {
    Error::Type(format!("`{}` is a {}, not a {}", name, found.kind(), expected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn resolves_short_and_qualified_names() {
        let registry = Registry::with_defaults();
        let short = registry.load_model_builder("EnergyModel", MODEL_PREFIX).unwrap();
        let full = registry
            .load_model_builder("equiforge.model.EnergyModel", "elsewhere")
            .unwrap();
        assert_eq!(short.name, full.name);
    }

    #[test]
    fn unresolvable_name_is_an_import_error() {
        let registry = Registry::with_defaults();
        let err = registry.load_model_builder("NoSuchModel", MODEL_PREFIX).unwrap_err();
        assert!(matches!(err, Error::Unresolved { ref name, .. } if name == "NoSuchModel"));
        assert_eq!(err.kind(), ErrorKind::Import);
    }

    #[test]
    fn layer_is_not_a_model_builder() {
        let registry = Registry::with_defaults();
        let err = registry
            .load_model_builder("AtomwiseLinear", LAYER_PREFIX)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Type);

        let err = registry.load_layer_builder("EnergyModel", MODEL_PREFIX).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Type);
    }

    #[test]
    fn defaults_list_every_stock_builder() {
        let registry = Registry::with_defaults();
        assert_eq!(registry.model_builders().count(), 4);
        assert_eq!(registry.layer_builders().count(), 6);
        let layer = registry.load_layer_builder("OneHotAtomEncoding", LAYER_PREFIX).unwrap();
        assert_eq!(layer.name, "OneHotAtomEncoding");
    }
}
