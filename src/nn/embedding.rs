use super::{GraphModule, IrrepsSpec, LayerBuilder, ModuleIrreps};
use crate::data::{AtomicData, FieldData, Tensor};
use crate::error::{Error, Result};
use crate::irreps::fields::{ATOM_TYPE_KEY, NODE_ATTRS_KEY, NODE_FEATURES_KEY};
use crate::irreps::{Irreps, IrrepsDict};
use crate::params::{Arguments, Param};

/// One-hot encoding of atom species.
///
/// Emits `node_attrs` as `{num_types}x0e` and, unless disabled, a copy of
/// it as the initial `node_features`.
#[derive(Debug)]
pub struct OneHotAtomEncoding {
    num_types: usize,
    set_features: bool,
    irreps: ModuleIrreps,
}

impl OneHotAtomEncoding {
    pub const BUILDER: LayerBuilder = LayerBuilder {
        name: "OneHotAtomEncoding",
        params: &[
            Param::optional("irreps_in"),
            Param::required("num_types"),
            Param::optional("set_features"),
        ],
        func: Self::build,
    };

    pub fn new(num_types: usize, set_features: bool, irreps_in: IrrepsDict) -> Result<Self> {
        if num_types == 0 {
            return Err(Error::config("OneHotAtomEncoding needs at least one atom type"));
        }

        let attrs = Some(Irreps::scalars(num_types));
        let mut spec = IrrepsSpec::new(irreps_in)
            .requires(ATOM_TYPE_KEY)
            .produces(NODE_ATTRS_KEY, attrs.clone());
        if set_features {
            spec = spec.produces(NODE_FEATURES_KEY, attrs);
        }

        Ok(Self {
            num_types,
            set_features,
            irreps: ModuleIrreps::init("OneHotAtomEncoding", spec)?,
        })
    }

    fn build(args: Arguments) -> Result<Box<dyn GraphModule>> {
        let num_types = args.require("num_types")?;
        let set_features = args.get_or("set_features", true)?;
        Ok(Box::new(Self::new(num_types, set_features, args.irreps_in()?)?))
    }
}

impl GraphModule for OneHotAtomEncoding {
    fn type_name(&self) -> &'static str {
        "OneHotAtomEncoding"
    }

    fn irreps(&self) -> &ModuleIrreps {
        &self.irreps
    }

    fn irreps_mut(&mut self) -> &mut ModuleIrreps {
        &mut self.irreps
    }

    fn forward(&self, mut data: AtomicData) -> Result<AtomicData> {
        let types = data
            .indices(ATOM_TYPE_KEY)
            .ok_or_else(|| Error::forward(self.type_name(), "missing integer field `atom_types`"))?;

        let mut one_hot = Tensor::zeros(types.len(), self.num_types);
        for (i, &t) in types.iter().enumerate() {
            if t >= self.num_types {
                return Err(Error::forward(
                    self.type_name(),
                    format!("atom type {} out of range for {} types", t, self.num_types),
                ));
            }
            one_hot.row_mut(i)[t] = 1.0;
        }

        if self.set_features {
            data.insert(NODE_FEATURES_KEY, FieldData::Float(one_hot.clone()));
        }
        data.insert(NODE_ATTRS_KEY, FieldData::Float(one_hot));
        Ok(data)
    }
}
