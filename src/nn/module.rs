use std::fmt;

use crate::data::AtomicData;
use crate::error::{Error, Result};
use crate::irreps::{Irreps, IrrepsDict};

use super::sequential::SequentialGraphNetwork;

/// Declared field requirements and outputs of a graph module.
///
/// Passed to [`ModuleIrreps::init`] by every module constructor.
#[derive(Debug, Clone, Default)]
pub struct IrrepsSpec {
    /// Signature inherited from upstream (may be empty).
    pub irreps_in: IrrepsDict,
    /// Fields this module requires with exact irreps.
    pub my_irreps_in: IrrepsDict,
    /// Fields that must be present upstream with any irreps.
    pub required_irreps_in: Vec<String>,
    /// Fields produced or overwritten by this module.
    pub irreps_out: IrrepsDict,
}

impl IrrepsSpec {
    pub fn new(irreps_in: IrrepsDict) -> Self {
        Self {
            irreps_in,
            ..Self::default()
        }
    }

    /// Requires `field` to carry exactly `irreps` if present upstream.
    pub fn expects(mut self, field: &str, irreps: Option<Irreps>) -> Self {
        self.my_irreps_in.insert(field, irreps);
        self
    }

    /// Requires `field` to be present upstream with any irreps.
    pub fn requires(mut self, field: &str) -> Self {
        self.required_irreps_in.push(field.to_string());
        self
    }

    /// Declares an output field.
    pub fn produces(mut self, field: &str, irreps: Option<Irreps>) -> Self {
        self.irreps_out.insert(field, irreps);
        self
    }
}

/// Validated input and output signatures of a graph module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleIrreps {
    irreps_in: IrrepsDict,
    irreps_out: IrrepsDict,
}

impl ModuleIrreps {
    /// Validates a module's declared fields against its upstream signature.
    ///
    /// The reserved fields are forced onto the input signature, exact-irreps
    /// requirements are checked on overlapping keys, and any-irreps
    /// requirements are checked for presence. The output signature is the
    /// input signature overridden by the declared outputs.
    ///
    /// # Arguments
    ///
    /// * `module` — Type name of the module, used in error messages
    /// * `spec` — Declared requirements and outputs
    ///
    /// # Errors
    ///
    /// - [`Error::ReservedField`] if `pos` or `edge_index` is given a conflicting type
    /// - [`Error::IrrepsMismatch`] if an upstream field has the wrong irreps
    /// - [`Error::MissingField`] if a required field is absent upstream
    pub fn init(module: &str, spec: IrrepsSpec) -> Result<Self> {
        let irreps_in = spec.irreps_in.with_reserved_fields()?;

        for (field, expected) in &spec.my_irreps_in {
            if let Some(given) = irreps_in.get(field) {
                if given != expected.as_ref() {
                    return Err(Error::IrrepsMismatch {
                        field: field.clone(),
                        given: render(given),
                        expected: render(expected.as_ref()),
                        module: module.to_string(),
                    });
                }
            }
        }

        if let Some(field) = spec
            .required_irreps_in
            .iter()
            .find(|f| !irreps_in.contains(f))
        {
            return Err(Error::MissingField {
                field: field.clone(),
                module: module.to_string(),
            });
        }

        let irreps_out = irreps_in.merged(&spec.irreps_out);
        Ok(Self {
            irreps_in,
            irreps_out,
        })
    }

    /// Builds signatures for a container from its children's signatures.
    pub(crate) fn from_parts(irreps_in: IrrepsDict, irreps_out: IrrepsDict) -> Self {
        Self {
            irreps_in,
            irreps_out,
        }
    }

    pub fn irreps_in(&self) -> &IrrepsDict {
        &self.irreps_in
    }

    pub fn irreps_out(&self) -> &IrrepsDict {
        &self.irreps_out
    }

    pub(crate) fn set_irreps_out(&mut self, irreps_out: IrrepsDict) {
        self.irreps_out = irreps_out;
    }

    /// Exposes fields introduced upstream that this module never declared.
    ///
    /// Keys already in `irreps_in` are ignored; the rest are added to
    /// `irreps_in`, and to `irreps_out` where absent there. Existing entries
    /// are never overwritten. Returns the fields added to `irreps_in`.
    pub fn add_independent_irreps(&mut self, irreps: &IrrepsDict) -> Vec<String> {
        let fresh: IrrepsDict = irreps
            .iter()
            .filter(|(k, _)| !self.irreps_in.contains(k))
            .map(|(k, v)| (k.to_string(), v.cloned()))
            .collect();
        let added = self.irreps_in.extend_missing(&fresh);
        self.irreps_out.extend_missing(&fresh);
        added
    }
}

fn render(irreps: Option<&Irreps>) -> String {
    irreps.map_or_else(|| "None".to_string(), Irreps::to_string)
}

/// A computational unit acting on [`AtomicData`] with declared field types.
///
/// Implementors validate their signatures once at construction through
/// [`ModuleIrreps::init`] and expose them through [`irreps`](GraphModule::irreps).
/// `forward` must leave every field it does not produce untouched.
pub trait GraphModule: fmt::Debug + Send + Sync {
    /// Type name used in diagnostics.
    fn type_name(&self) -> &'static str;

    fn irreps(&self) -> &ModuleIrreps;

    fn irreps_mut(&mut self) -> &mut ModuleIrreps;

    /// Transforms the running state.
    fn forward(&self, data: AtomicData) -> Result<AtomicData>;

    fn irreps_in(&self) -> &IrrepsDict {
        self.irreps().irreps_in()
    }

    fn irreps_out(&self) -> &IrrepsDict {
        self.irreps().irreps_out()
    }

    /// See [`ModuleIrreps::add_independent_irreps`].
    fn add_independent_irreps(&mut self, irreps: &IrrepsDict) -> Vec<String> {
        self.irreps_mut().add_independent_irreps(irreps)
    }

    fn as_sequential(&self) -> Option<&SequentialGraphNetwork> {
        None
    }

    fn as_sequential_mut(&mut self) -> Option<&mut SequentialGraphNetwork> {
        None
    }
}
