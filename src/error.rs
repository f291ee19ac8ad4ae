//! Error types for graph module composition and model building.
//!
//! Every fallible operation in the crate returns [`Error`]. Variants are
//! grouped by [`ErrorKind`]: configuration problems, incompatible module
//! signatures, wrongly typed values, unknown module names, and builder
//! references that cannot be resolved.

use thiserror::Error;

use crate::irreps::ParseIrrepsError;

/// Errors that can occur while composing graph modules or building models.
#[derive(Debug, Error)]
pub enum Error {
    /// Generic bad or inconsistent configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A builder parameter could not be sourced from any tier.
    #[error("required parameter `{parameter}` not found for builder under prefix `{prefix}`")]
    MissingParameter {
        /// Parameter name as declared by the builder.
        parameter: String,
        /// Layer name used as the scoped lookup prefix.
        prefix: String,
    },

    /// A field is present upstream with irreps other than the ones a module requires.
    #[error(
        "the given input irreps {given} for field '{field}' is incompatible with this configuration {module}; should have been {expected}"
    )]
    IrrepsMismatch {
        /// Offending field.
        field: String,
        /// Irreps supplied by the upstream signature.
        given: String,
        /// Irreps the module requires.
        expected: String,
        /// Module type name.
        module: String,
    },

    /// A required field is absent from a module's input signature.
    #[error("this {module} requires field '{field}' to be in irreps_in")]
    MissingField {
        /// Missing field.
        field: String,
        /// Module type name.
        module: String,
    },

    /// A reserved field (`pos`, `edge_index`) was given a conflicting type.
    #[error("reserved field '{field}' {detail}")]
    ReservedField {
        /// Reserved field name.
        field: String,
        /// Description of the conflict.
        detail: String,
    },

    /// Two adjacent modules disagree on the irreps of a shared field.
    #[error(
        "incompatible irreps_out from {upstream} for input to {downstream}: {upstream_irreps} -> {downstream_irreps}"
    )]
    Incompatible {
        /// Type name of the producing module.
        upstream: String,
        /// Type name of the consuming module.
        downstream: String,
        /// Signature produced upstream.
        upstream_irreps: String,
        /// Signature expected downstream.
        downstream_irreps: String,
    },

    /// Explicit config values disagree with values derived from the type mapper.
    #[error("inconsistent config & dataset: `{key}` is {config} in config but {derived} from type mapping")]
    InconsistentConfig {
        /// Config key.
        key: String,
        /// Value present in the config.
        config: String,
        /// Value derived by the type mapper.
        derived: String,
    },

    /// A value has the wrong type for the place it is used.
    #[error("type error: {0}")]
    Type(String),

    /// No module with the given name exists in the sequence.
    #[error("no module named `{0}` in the sequence")]
    UnknownModule(String),

    /// A module with the given name already exists in the sequence.
    #[error("a module named `{0}` already exists in the sequence")]
    DuplicateModule(String),

    /// A builder reference could not be resolved.
    #[error("cannot resolve builder `{name}` (also tried `{prefix}.{name}`)")]
    Unresolved {
        /// Name as written in the config.
        name: String,
        /// Default namespace that was also tried.
        prefix: String,
    },

    /// No type information is configured.
    #[error("type mapping is not configured: set one of `type_names`, `chemical_symbols`, or `chemical_symbol_to_type`")]
    TypeMapperUnconfigured,

    /// A builder asked for the model before any builder produced one.
    #[error("builder `{builder}` asked for the model as an input, but no previous builder has returned a model")]
    ModelNotAvailable {
        /// Builder name.
        builder: String,
    },

    /// A builder after the first model-producing builder does not accept the model.
    #[error(
        "all model_builders after the first one that returns a model must take the model as an argument; `{builder}` doesn't"
    )]
    ModelNotAccepted {
        /// Builder name.
        builder: String,
    },

    /// The first builder in the pipeline declared the model slot.
    #[error("builder `{builder}` is first in the pipeline and cannot request the model")]
    ModelRequestedByFirst {
        /// Builder name.
        builder: String,
    },

    /// Failed to parse an irreps descriptor.
    #[error(transparent)]
    IrrepsParse(#[from] ParseIrrepsError),

    /// Failed to parse a TOML configuration.
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// I/O failure while reading a configuration.
    #[error("I/O operation failed: {0}")]
    Io(#[from] std::io::Error),

    /// A module failed while transforming data.
    #[error("forward pass failed in {module}: {detail}")]
    Forward {
        /// Module type name.
        module: String,
        /// Description of the failure.
        detail: String,
    },
}

/// Coarse classification of [`Error`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad, missing, or inconsistent parameters and signature mismatches.
    Configuration,
    /// Adjacent modules with mismatched types.
    Incompatibility,
    /// Wrong kind of value supplied or returned.
    Type,
    /// Unknown name.
    Key,
    /// Unresolvable builder reference.
    Import,
    /// Filesystem failure.
    Io,
    /// Failure while running a forward pass.
    Runtime,
}

impl Error {
    /// Returns the taxonomy bucket of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Configuration(_)
            | Error::MissingParameter { .. }
            | Error::IrrepsMismatch { .. }
            | Error::MissingField { .. }
            | Error::ReservedField { .. }
            | Error::InconsistentConfig { .. }
            | Error::DuplicateModule(_)
            | Error::TypeMapperUnconfigured
            | Error::ModelNotAvailable { .. }
            | Error::ModelNotAccepted { .. }
            | Error::ModelRequestedByFirst { .. }
            | Error::IrrepsParse(_)
            | Error::ConfigParse(_) => ErrorKind::Configuration,
            Error::Incompatible { .. } => ErrorKind::Incompatibility,
            Error::Type(_) => ErrorKind::Type,
            Error::UnknownModule(_) => ErrorKind::Key,
            Error::Unresolved { .. } => ErrorKind::Import,
            Error::Io(_) => ErrorKind::Io,
            Error::Forward { .. } => ErrorKind::Runtime,
        }
    }

    /// Creates a [`MissingParameter`](Error::MissingParameter) error.
    pub fn missing_parameter(parameter: &str, prefix: &str) -> Self {
        Self::MissingParameter {
            parameter: parameter.to_string(),
            prefix: prefix.to_string(),
        }
    }

    /// Creates an [`Incompatible`](Error::Incompatible) error.
    ///
    /// # Arguments
    ///
    /// * `upstream` — Type name of the module producing the signature
    /// * `downstream` — Type name of the module consuming it
    /// * `upstream_irreps` — Rendered output signature of `upstream`
    /// * `downstream_irreps` — Rendered input signature of `downstream`
    pub fn incompatible(
        upstream: &str,
        downstream: &str,
        upstream_irreps: impl ToString,
        downstream_irreps: impl ToString,
    ) -> Self {
        Self::Incompatible {
            upstream: upstream.to_string(),
            downstream: downstream.to_string(),
            upstream_irreps: upstream_irreps.to_string(),
            downstream_irreps: downstream_irreps.to_string(),
        }
    }

    /// Creates a [`Forward`](Error::Forward) error.
    pub fn forward(module: &str, detail: impl Into<String>) -> Self {
        Self::Forward {
            module: module.to_string(),
            detail: detail.into(),
        }
    }

    pub(crate) fn config(detail: impl Into<String>) -> Self {
        Self::Configuration(detail.into())
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_parameter_message_names_prefix() {
        let err = Error::missing_parameter("r_max", "radial_basis");
        assert_eq!(
            err.to_string(),
            "required parameter `r_max` not found for builder under prefix `radial_basis`"
        );
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn incompatible_is_its_own_kind() {
        let err = Error::incompatible("A", "B", "{x: 1o}", "{x: 0e}");
        assert_eq!(err.kind(), ErrorKind::Incompatibility);
        assert!(err.to_string().contains("from A for input to B"));
    }

    #[test]
    fn kinds_cover_key_import_and_type() {
        assert_eq!(Error::UnknownModule("x".into()).kind(), ErrorKind::Key);
        assert_eq!(
            Error::Unresolved {
                name: "Foo".into(),
                prefix: "equiforge.model".into()
            }
            .kind(),
            ErrorKind::Import
        );
        assert_eq!(Error::Type("bad".into()).kind(), ErrorKind::Type);
    }

    #[test]
    fn inconsistent_config_message() {
        let err = Error::InconsistentConfig {
            key: "num_types".into(),
            config: "3".into(),
            derived: "5".into(),
        };
        assert!(err.to_string().contains("inconsistent config"));
    }
}
