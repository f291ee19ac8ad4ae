//! Model construction from configuration.
//!
//! [`model_from_config`] runs the builders listed under `model_builders`,
//! threading the model from one builder to the next. Each [`ModelBuilder`]
//! declares the [`Slot`]s it accepts, and only those inputs are supplied.

mod builders;
mod registry;
mod type_mapper;

pub use builders::{DEPLOYMENT_MODE, ENERGY_MODEL, PER_SPECIES_RESCALE, SIMPLE_IRREPS_CONFIG};
pub use registry::{LAYER_PREFIX, MODEL_PREFIX, Registry};
pub use type_mapper::{TypeMapper, atomic_number};

use std::fmt;

use crate::error::{Error, Result};
use crate::nn::GraphModule;
use crate::params::Config;

const NUM_TYPES_KEY: &str = "num_types";
const TYPE_NAMES_KEY: &str = "type_names";

/// An input a model builder may ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    /// The shared configuration.
    Config,
    /// The model returned by the previous builder.
    Model,
    /// Whether weights should be initialized.
    Initialize,
    /// Whether the model is built for inference.
    Deploy,
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Slot::Config => "config",
            Slot::Model => "model",
            Slot::Initialize => "initialize",
            Slot::Deploy => "deploy",
        };
        f.write_str(name)
    }
}

/// Inputs handed to a model builder; undeclared slots are empty.
pub struct BuilderArgs<'a> {
    builder: &'static str,
    config: Option<&'a mut Config>,
    model: Option<Box<dyn GraphModule>>,
    initialize: Option<bool>,
    deploy: Option<bool>,
}

impl BuilderArgs<'_> {
    pub fn config(&self) -> Result<&Config> {
        let builder = self.builder;
        self.config
            .as_deref()
            .ok_or_else(|| undeclared(builder, Slot::Config))
    }

    pub fn config_mut(&mut self) -> Result<&mut Config> {
        let builder = self.builder;
        self.config
            .as_deref_mut()
            .ok_or_else(|| undeclared(builder, Slot::Config))
    }

    /// Takes ownership of the previous builder's model.
    pub fn take_model(&mut self) -> Result<Box<dyn GraphModule>> {
        self.model
            .take()
            .ok_or_else(|| undeclared(self.builder, Slot::Model))
    }

    pub fn initialize(&self) -> bool {
        self.initialize.unwrap_or(false)
    }

    pub fn deploy(&self) -> bool {
        self.deploy.unwrap_or(false)
    }
}

fn undeclared(builder: &str, slot: Slot) -> Error {
    Error::Type(format!(
        "builder `{}` did not declare the `{}` slot",
        builder, slot
    ))
}

/// A step of the model-building pipeline.
#[derive(Clone, Copy)]
pub struct ModelBuilder {
    pub name: &'static str,
    /// Inputs this builder wants supplied.
    pub accepts: &'static [Slot],
    pub func: for<'a> fn(BuilderArgs<'a>) -> Result<Option<Box<dyn GraphModule>>>,
}

impl ModelBuilder {
    pub fn accepts(&self, slot: Slot) -> bool {
        self.accepts.contains(&slot)
    }
}

impl fmt::Debug for ModelBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelBuilder")
            .field("name", &self.name)
            .field("accepts", &self.accepts)
            .finish_non_exhaustive()
    }
}

/// Builds a model by running the configured `model_builders` in order.
///
/// If type information is configured (see [`TypeMapper`]), `num_types` and
/// `type_names` are checked against it, or filled in from it when absent.
/// Each builder receives only the slots it declares. Once a builder returns
/// a model, every later builder must accept it.
///
/// # Arguments
///
/// * `config` — Shared configuration; builders may add derived keys to it
/// * `registry` — Resolves the names listed under `model_builders`
/// * `initialize` — Passed to builders declaring [`Slot::Initialize`]
/// * `deploy` — Passed to builders declaring [`Slot::Deploy`]
///
/// # Returns
///
/// The model returned by the last builder, or `None` if no builder returned one.
///
/// # Errors
///
/// - [`Error::InconsistentConfig`] if explicit type keys disagree with the type mapping
/// - [`Error::Unresolved`] or [`Error::Type`] if a builder name cannot be resolved
/// - [`Error::ModelRequestedByFirst`], [`Error::ModelNotAvailable`],
///   [`Error::ModelNotAccepted`] when the model hand-off is broken
/// - Any error returned by a builder
pub fn model_from_config(
    config: &mut Config,
    registry: &Registry,
    initialize: bool,
    deploy: bool,
) -> Result<Option<Box<dyn GraphModule>>> {
    apply_type_mapping(config)?;

    let builders = config
        .model_builders()?
        .iter()
        .map(|name| registry.load_model_builder(name, MODEL_PREFIX))
        .collect::<Result<Vec<_>>>()?;

    let mut model: Option<Box<dyn GraphModule>> = None;
    for (i, builder) in builders.iter().enumerate() {
        log::info!("building model with {}", builder.name);

        let model_arg = if builder.accepts(Slot::Model) {
            if i == 0 {
                return Err(Error::ModelRequestedByFirst {
                    builder: builder.name.to_string(),
                });
            }
            let Some(previous) = model.take() else {
                return Err(Error::ModelNotAvailable {
                    builder: builder.name.to_string(),
                });
            };
            Some(previous)
        } else if model.is_some() {
            return Err(Error::ModelNotAccepted {
                builder: builder.name.to_string(),
            });
        } else {
            None
        };

        let args = BuilderArgs {
            builder: builder.name,
            config: builder.accepts(Slot::Config).then_some(&mut *config),
            model: model_arg,
            initialize: builder.accepts(Slot::Initialize).then_some(initialize),
            deploy: builder.accepts(Slot::Deploy).then_some(deploy),
        };
        model = (builder.func)(args)?;
    }

    Ok(model)
}

/// Reconciles `num_types`/`type_names` with the configured type mapping.
fn apply_type_mapping(config: &mut Config) -> Result<()> {
    let mapper = match TypeMapper::from_config(config) {
        Ok(mapper) => mapper,
        Err(Error::TypeMapperUnconfigured) => {
            log::debug!("no type mapping configured");
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    if let Some(num_types) = config.get_as::<usize>(NUM_TYPES_KEY)? {
        if num_types != mapper.num_types() {
            return Err(Error::InconsistentConfig {
                key: NUM_TYPES_KEY.to_string(),
                config: num_types.to_string(),
                derived: mapper.num_types().to_string(),
            });
        }
    }
    if let Some(type_names) = config.get_as::<Vec<String>>(TYPE_NAMES_KEY)? {
        if type_names != mapper.type_names() {
            return Err(Error::InconsistentConfig {
                key: TYPE_NAMES_KEY.to_string(),
                config: format!("{:?}", type_names),
                derived: format!("{:?}", mapper.type_names()),
            });
        }
    }

    config.insert(NUM_TYPES_KEY, mapper.num_types() as i64);
    config.insert(TYPE_NAMES_KEY, mapper.type_names().to_vec());
    config.mark_consumed(NUM_TYPES_KEY);
    config.mark_consumed(TYPE_NAMES_KEY);
    Ok(())
}
