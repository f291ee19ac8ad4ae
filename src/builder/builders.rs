use super::{BuilderArgs, ModelBuilder, Slot};
use crate::error::{Error, Result};
use crate::irreps::fields::{ATOM_TYPE_KEY, PER_ATOM_ENERGY_KEY, TOTAL_ENERGY_KEY};
use crate::irreps::{Irreps, IrrepsDict, Parity};
use crate::nn::{
    Anchor, AtomwiseLinear, AtomwiseReduce, GraphModule, LayerSpec, OneHotAtomEncoding,
    PerSpeciesScaleShift, RadialBasisEdgeEncoding, SequentialGraphNetwork,
    SphericalHarmonicEdgeAttrs,
};
use crate::params::Config;

/// Name of the final reduction layer of [`ENERGY_MODEL`].
const TOTAL_ENERGY_LAYER: &str = "total_energy_sum";
const RESCALE_LAYER: &str = "per_species_rescale";

/// Derives the layer irreps from `l_max`, `parity`, and `num_features`.
///
/// Fills in `chemical_embedding_irreps_out`, `irreps_edge_sh`, and
/// `conv_to_output_hidden_irreps_out` where they are not already set.
/// Returns no model.
pub const SIMPLE_IRREPS_CONFIG: ModelBuilder = ModelBuilder {
    name: "SimpleIrrepsConfig",
    accepts: &[Slot::Config],
    func: simple_irreps_config,
};

/// Builds the reference energy model.
pub const ENERGY_MODEL: ModelBuilder = ModelBuilder {
    name: "EnergyModel",
    accepts: &[Slot::Config, Slot::Initialize],
    func: energy_model,
};

/// Rescales per-atom energies by species before they are summed.
pub const PER_SPECIES_RESCALE: ModelBuilder = ModelBuilder {
    name: "PerSpeciesRescale",
    accepts: &[Slot::Model, Slot::Config, Slot::Initialize],
    func: per_species_rescale,
};

/// Marks the model as built for inference.
pub const DEPLOYMENT_MODE: ModelBuilder = ModelBuilder {
    name: "DeploymentMode",
    accepts: &[Slot::Model, Slot::Deploy],
    func: deployment_mode,
};

fn required<T: serde::de::DeserializeOwned>(config: &Config, builder: &str, key: &str) -> Result<T> {
    config
        .get_as(key)?
        .ok_or_else(|| Error::config(format!("{} requires `{}` in the config", builder, key)))
}

fn simple_irreps_config(mut args: BuilderArgs<'_>) -> Result<Option<Box<dyn GraphModule>>> {
    let config = args.config_mut()?;
    let l_max: u32 = required(config, "SimpleIrrepsConfig", "l_max")?;
    let num_features: usize = required(config, "SimpleIrrepsConfig", "num_features")?;
    let parity = config.get_as::<bool>("parity")?.unwrap_or(true);

    let sh_parity = parity.then_some(Parity::Odd);
    let derived = [
        ("chemical_embedding_irreps_out", Irreps::scalars(num_features)),
        ("irreps_edge_sh", Irreps::spherical_harmonics(l_max, sh_parity)),
        ("conv_to_output_hidden_irreps_out", Irreps::scalars((num_features / 2).max(1))),
    ];
    for (key, irreps) in derived {
        if config.contains_key(key) {
            continue;
        }
        log::debug!("derived `{}` = {}", key, irreps);
        config.insert(key, irreps.to_string());
    }

    Ok(None)
}

fn energy_model(args: BuilderArgs<'_>) -> Result<Option<Box<dyn GraphModule>>> {
    let config = args.config()?;
    let initialize = args.initialize();
    let linear = |spec: LayerSpec| {
        if initialize {
            spec.with("initialize", true)
        } else {
            spec
        }
    };

    let layers = vec![
        ("one_hot", LayerSpec::new(OneHotAtomEncoding::BUILDER)),
        ("spharm_edges", LayerSpec::new(SphericalHarmonicEdgeAttrs::BUILDER)),
        ("radial_basis", LayerSpec::new(RadialBasisEdgeEncoding::BUILDER)),
        ("chemical_embedding", linear(LayerSpec::new(AtomwiseLinear::BUILDER))),
        ("conv_to_output_hidden", linear(LayerSpec::new(AtomwiseLinear::BUILDER))),
        (
            "output_hidden_to_scalar",
            linear(LayerSpec::new(AtomwiseLinear::BUILDER))
                .with("irreps_out", "1x0e")
                .with("out_field", PER_ATOM_ENERGY_KEY),
        ),
        (
            TOTAL_ENERGY_LAYER,
            LayerSpec::new(AtomwiseReduce::BUILDER)
                .with("field", PER_ATOM_ENERGY_KEY)
                .with("out_field", TOTAL_ENERGY_KEY)
                .with("reduce", "sum"),
        ),
    ];

    let mut irreps_in = IrrepsDict::new();
    irreps_in.insert(ATOM_TYPE_KEY, None);
    let layers = layers
        .into_iter()
        .map(|(name, spec)| (name.to_string(), spec))
        .collect();
    let model = SequentialGraphNetwork::from_parameters(config, layers, Some(irreps_in))?;
    Ok(Some(Box::new(model)))
}

fn per_species_rescale(mut args: BuilderArgs<'_>) -> Result<Option<Box<dyn GraphModule>>> {
    let mut model = args.take_model()?;
    let config = args.config()?;

    let scales_key = format!("{}_scales", RESCALE_LAYER);
    let shifts_key = format!("{}_shifts", RESCALE_LAYER);
    if !config.contains_key(&scales_key) && !config.contains_key(&shifts_key) {
        log::debug!("no per-species scales or shifts configured; model unchanged");
        return Ok(Some(model));
    }

    let type_name = model.type_name();
    let Some(seq) = model.as_sequential_mut() else {
        return Err(Error::Type(format!(
            "PerSpeciesRescale needs a sequential model, got {}",
            type_name
        )));
    };

    let mut spec = LayerSpec::new(PerSpeciesScaleShift::BUILDER)
        .with("field", PER_ATOM_ENERGY_KEY)
        .with("out_field", PER_ATOM_ENERGY_KEY);
    if !args.initialize() {
        log::debug!("not initializing; per-species rescale starts as the identity");
        config.mark_consumed(&scales_key);
        config.mark_consumed(&shifts_key);
        spec = spec.with("scales", 1.0).with("shifts", 0.0);
    }

    seq.insert_from_parameters(
        config,
        RESCALE_LAYER,
        spec,
        &Anchor::Before(TOTAL_ENERGY_LAYER.to_string()),
    )?;
    Ok(Some(model))
}

fn deployment_mode(mut args: BuilderArgs<'_>) -> Result<Option<Box<dyn GraphModule>>> {
    let model = args.take_model()?;
    if args.deploy() {
        log::info!(
            "prepared {} for inference with outputs {}",
            model.type_name(),
            model.irreps_out()
        );
    }
    Ok(Some(model))
}
