use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::Deserialize;

use super::{GraphModule, IrrepsSpec, LayerBuilder, ModuleIrreps};
use crate::data::{AtomicData, FieldData, Tensor};
use crate::error::{Error, Result};
use crate::irreps::fields::{ATOM_TYPE_KEY, NODE_FEATURES_KEY};
use crate::irreps::{Irreps, IrrepsDict};
use crate::params::{Arguments, Param};

/// Looks up the typed irreps of `field`, reporting absence or untypedness.
fn field_irreps(module: &str, irreps_in: &IrrepsDict, field: &str) -> Result<Irreps> {
    match irreps_in.get(field) {
        None => Err(Error::MissingField {
            field: field.to_string(),
            module: module.to_string(),
        }),
        Some(None) => Err(Error::Type(format!(
            "{} needs typed irreps for field `{}`, but it is untyped",
            module, field
        ))),
        Some(Some(irreps)) => Ok(irreps.clone()),
    }
}

fn float_field<'a>(module: &str, data: &'a AtomicData, field: &str, cols: usize) -> Result<&'a Tensor> {
    let tensor = data
        .tensor(field)
        .ok_or_else(|| Error::forward(module, format!("missing float field `{}`", field)))?;
    if tensor.cols() != cols {
        return Err(Error::forward(
            module,
            format!("field `{}` has {} columns, expected {}", field, tensor.cols(), cols),
        ));
    }
    Ok(tensor)
}

/// Weights connecting every input block of one irrep type to one output block.
#[derive(Debug)]
struct Path {
    out_offset: usize,
    mul_out: usize,
    dim: usize,
    /// `(offset, mul)` of each input block with the same irrep.
    inputs: Vec<(usize, usize)>,
    mul_in: usize,
    /// Row-major `mul_in x mul_out`.
    weights: Vec<f64>,
}

/// Equivariant per-atom linear map.
///
/// Mixes multiplicities within each irrep type and never couples different
/// irreps, so it commutes with rotations and reflections. Output blocks with
/// no matching input irrep are zero.
#[derive(Debug)]
pub struct AtomwiseLinear {
    field: String,
    out_field: String,
    irreps_in_field: Irreps,
    irreps_out_field: Irreps,
    paths: Vec<Path>,
    irreps: ModuleIrreps,
}

impl AtomwiseLinear {
    pub const BUILDER: LayerBuilder = LayerBuilder {
        name: "AtomwiseLinear",
        params: &[
            Param::optional("irreps_in"),
            Param::optional("field"),
            Param::optional("out_field"),
            Param::optional("irreps_out"),
            Param::optional("initialize"),
            Param::optional("seed"),
        ],
        func: Self::build,
    };

    /// Creates the layer.
    ///
    /// # Arguments
    ///
    /// * `field` — Input field, which must be typed in `irreps_in`
    /// * `out_field` — Field receiving the result
    /// * `irreps_out` — Output irreps; defaults to the input field's irreps
    /// * `seed` — Draws weights from a standard normal with this seed; zero weights if `None`
    /// * `irreps_in` — Upstream signature
    pub fn new(
        field: &str,
        out_field: &str,
        irreps_out: Option<Irreps>,
        seed: Option<u64>,
        irreps_in: IrrepsDict,
    ) -> Result<Self> {
        let irreps_in_field = field_irreps("AtomwiseLinear", &irreps_in, field)?;
        let irreps_out_field = irreps_out.unwrap_or_else(|| irreps_in_field.clone());

        let mut rng = seed.map(StdRng::seed_from_u64);
        let paths = irreps_out_field
            .slices()
            .filter_map(|(out_offset, mul_out, ir)| {
                let inputs: Vec<(usize, usize)> = irreps_in_field
                    .slices()
                    .filter(|&(_, _, ir_in)| ir_in == ir)
                    .map(|(offset, mul, _)| (offset, mul))
                    .collect();
                let mul_in: usize = inputs.iter().map(|&(_, mul)| mul).sum();
                if mul_in == 0 || mul_out == 0 {
                    return None;
                }
                let weights = match rng.as_mut() {
                    Some(rng) => (0..mul_in * mul_out)
                        .map(|_| rng.sample::<f64, _>(StandardNormal))
                        .collect(),
                    None => vec![0.0; mul_in * mul_out],
                };
                Some(Path {
                    out_offset,
                    mul_out,
                    dim: ir.dim(),
                    inputs,
                    mul_in,
                    weights,
                })
            })
            .collect();

        let spec = IrrepsSpec::new(irreps_in)
            .expects(field, Some(irreps_in_field.clone()))
            .produces(out_field, Some(irreps_out_field.clone()));
        Ok(Self {
            field: field.to_string(),
            out_field: out_field.to_string(),
            irreps_in_field,
            irreps_out_field,
            paths,
            irreps: ModuleIrreps::init("AtomwiseLinear", spec)?,
        })
    }

    fn build(args: Arguments) -> Result<Box<dyn GraphModule>> {
        let field: String = args.get_or("field", NODE_FEATURES_KEY.to_string())?;
        let out_field: String = args.get_or("out_field", field.clone())?;
        let seed = if args.get_or("initialize", false)? {
            Some(args.get_or("seed", 0u64)?)
        } else {
            None
        };
        Ok(Box::new(Self::new(
            &field,
            &out_field,
            args.irreps("irreps_out")?,
            seed,
            args.irreps_in()?,
        )?))
    }
}

impl GraphModule for AtomwiseLinear {
    fn type_name(&self) -> &'static str {
        "AtomwiseLinear"
    }

    fn irreps(&self) -> &ModuleIrreps {
        &self.irreps
    }

    fn irreps_mut(&mut self) -> &mut ModuleIrreps {
        &mut self.irreps
    }

    fn forward(&self, mut data: AtomicData) -> Result<AtomicData> {
        let x = float_field(self.type_name(), &data, &self.field, self.irreps_in_field.dim())?;

        let mut y = Tensor::zeros(x.rows(), self.irreps_out_field.dim());
        for atom in 0..x.rows() {
            let (xin, yout) = (x.row(atom), y.row_mut(atom));
            for path in &self.paths {
                let norm = 1.0 / (path.mul_in as f64).sqrt();
                for v in 0..path.mul_out {
                    for m in 0..path.dim {
                        let mut acc = 0.0;
                        let mut u = 0;
                        for &(offset, mul) in &path.inputs {
                            for k in 0..mul {
                                acc += path.weights[u * path.mul_out + v] * xin[offset + k * path.dim + m];
                                u += 1;
                            }
                        }
                        yout[path.out_offset + v * path.dim + m] = acc * norm;
                    }
                }
            }
        }

        data.insert(self.out_field.clone(), FieldData::Float(y));
        Ok(data)
    }
}

/// Reduction applied by [`AtomwiseReduce`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reduce {
    Sum,
    Mean,
}

impl fmt::Display for Reduce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reduce::Sum => f.write_str("sum"),
            Reduce::Mean => f.write_str("mean"),
        }
    }
}

/// Sums or averages a per-atom field into a single per-structure row.
#[derive(Debug)]
pub struct AtomwiseReduce {
    field: String,
    out_field: String,
    reduce: Reduce,
    irreps: ModuleIrreps,
}

impl AtomwiseReduce {
    pub const BUILDER: LayerBuilder = LayerBuilder {
        name: "AtomwiseReduce",
        params: &[
            Param::optional("irreps_in"),
            Param::required("field"),
            Param::optional("out_field"),
            Param::optional("reduce"),
        ],
        func: Self::build,
    };

    pub fn new(field: &str, out_field: &str, reduce: Reduce, irreps_in: IrrepsDict) -> Result<Self> {
        let produced = irreps_in.get(field).map(|irreps| irreps.cloned());
        let spec = IrrepsSpec::new(irreps_in)
            .requires(field)
            .produces(out_field, produced.flatten());
        Ok(Self {
            field: field.to_string(),
            out_field: out_field.to_string(),
            reduce,
            irreps: ModuleIrreps::init("AtomwiseReduce", spec)?,
        })
    }

    fn build(args: Arguments) -> Result<Box<dyn GraphModule>> {
        let field: String = args.require("field")?;
        let reduce = args.get_or("reduce", Reduce::Sum)?;
        let out_field = args.get_or("out_field", format!("{}_{}", reduce, field))?;
        Ok(Box::new(Self::new(&field, &out_field, reduce, args.irreps_in()?)?))
    }
}

impl GraphModule for AtomwiseReduce {
    fn type_name(&self) -> &'static str {
        "AtomwiseReduce"
    }

    fn irreps(&self) -> &ModuleIrreps {
        &self.irreps
    }

    fn irreps_mut(&mut self) -> &mut ModuleIrreps {
        &mut self.irreps
    }

    fn forward(&self, mut data: AtomicData) -> Result<AtomicData> {
        let x = data
            .tensor(&self.field)
            .ok_or_else(|| Error::forward(self.type_name(), format!("missing float field `{}`", self.field)))?;

        let mut total = Tensor::zeros(1, x.cols());
        for atom in 0..x.rows() {
            for (acc, value) in total.row_mut(0).iter_mut().zip(x.row(atom)) {
                *acc += value;
            }
        }
        if self.reduce == Reduce::Mean && x.rows() > 0 {
            let n = x.rows() as f64;
            total.row_mut(0).iter_mut().for_each(|acc| *acc /= n);
        }

        data.insert(self.out_field.clone(), FieldData::Float(total));
        Ok(data)
    }
}

/// A per-species value given either once for all species or per species.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum PerSpecies {
    Uniform(f64),
    Each(Vec<f64>),
}

impl PerSpecies {
    fn expand(self, name: &str, num_types: usize) -> Result<Vec<f64>> {
        match self {
            PerSpecies::Uniform(value) => Ok(vec![value; num_types]),
            PerSpecies::Each(values) if values.len() == num_types => Ok(values),
            PerSpecies::Each(values) => Err(Error::config(format!(
                "`{}` has {} entries but there are {} atom types",
                name,
                values.len(),
                num_types
            ))),
        }
    }
}

/// Per-species affine rescaling of a scalar per-atom field.
///
/// `out[i] = scales[type[i]] * in[i] + shifts[type[i]]`
#[derive(Debug)]
pub struct PerSpeciesScaleShift {
    field: String,
    out_field: String,
    scales: Vec<f64>,
    shifts: Vec<f64>,
    irreps: ModuleIrreps,
}

impl PerSpeciesScaleShift {
    pub const BUILDER: LayerBuilder = LayerBuilder {
        name: "PerSpeciesScaleShift",
        params: &[
            Param::optional("irreps_in"),
            Param::required("field"),
            Param::optional("out_field"),
            Param::required("num_types"),
            Param::optional("scales"),
            Param::optional("shifts"),
        ],
        func: Self::build,
    };

    pub fn new(
        field: &str,
        out_field: &str,
        scales: Vec<f64>,
        shifts: Vec<f64>,
        irreps_in: IrrepsDict,
    ) -> Result<Self> {
        if scales.len() != shifts.len() {
            return Err(Error::config(format!(
                "{} scales but {} shifts",
                scales.len(),
                shifts.len()
            )));
        }

        let scalar = Some(Irreps::scalars(1));
        let spec = IrrepsSpec::new(irreps_in)
            .expects(field, scalar.clone())
            .requires(field)
            .requires(ATOM_TYPE_KEY)
            .produces(out_field, scalar);
        Ok(Self {
            field: field.to_string(),
            out_field: out_field.to_string(),
            scales,
            shifts,
            irreps: ModuleIrreps::init("PerSpeciesScaleShift", spec)?,
        })
    }

    fn build(args: Arguments) -> Result<Box<dyn GraphModule>> {
        let field: String = args.require("field")?;
        let out_field = args.get_or("out_field", field.clone())?;
        let num_types: usize = args.require("num_types")?;
        let scales = args
            .get_or("scales", PerSpecies::Uniform(1.0))?
            .expand("scales", num_types)?;
        let shifts = args
            .get_or("shifts", PerSpecies::Uniform(0.0))?
            .expand("shifts", num_types)?;
        Ok(Box::new(Self::new(&field, &out_field, scales, shifts, args.irreps_in()?)?))
    }

    pub fn scales(&self) -> &[f64] {
        &self.scales
    }

    pub fn shifts(&self) -> &[f64] {
        &self.shifts
    }
}

impl GraphModule for PerSpeciesScaleShift {
    fn type_name(&self) -> &'static str {
        "PerSpeciesScaleShift"
    }

    fn irreps(&self) -> &ModuleIrreps {
        &self.irreps
    }

    fn irreps_mut(&mut self) -> &mut ModuleIrreps {
        &mut self.irreps
    }

    fn forward(&self, mut data: AtomicData) -> Result<AtomicData> {
        let x = float_field(self.type_name(), &data, &self.field, 1)?;
        let types = data
            .indices(ATOM_TYPE_KEY)
            .ok_or_else(|| Error::forward(self.type_name(), "missing integer field `atom_types`"))?;
        if types.len() != x.rows() {
            return Err(Error::forward(
                self.type_name(),
                format!("{} atom types for {} rows of `{}`", types.len(), x.rows(), self.field),
            ));
        }

        let mut y = Tensor::zeros(x.rows(), 1);
        for (atom, &t) in types.iter().enumerate() {
            let (Some(scale), Some(shift)) = (self.scales.get(t), self.shifts.get(t)) else {
                return Err(Error::forward(
                    self.type_name(),
                    format!("atom type {} has no scale or shift", t),
                ));
            };
            y.row_mut(atom)[0] = scale * x.row(atom)[0] + shift;
        }

        data.insert(self.out_field.clone(), FieldData::Float(y));
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::irreps::fields::{PER_ATOM_ENERGY_KEY, TOTAL_ENERGY_KEY};

    const EPS: f64 = 1e-12;

    fn sig(entries: &[(&str, &str)]) -> IrrepsDict {
        IrrepsDict::normalize(entries.iter().map(|(k, v)| (*k, *v))).unwrap()
    }

    fn features(rows: &[&[f64]]) -> AtomicData {
        let cols = rows[0].len();
        let flat = rows.iter().flat_map(|r| r.iter().copied()).collect();
        let mut data = AtomicData::new();
        data.insert(NODE_FEATURES_KEY, FieldData::Float(Tensor::new(flat, rows.len(), cols).unwrap()));
        data
    }

    fn linear(seed: Option<u64>) -> AtomwiseLinear {
        let irreps_in = sig(&[(NODE_FEATURES_KEY, "2x0e+2x1o")]);
        let out = "3x0e+1x1o+1x2e".parse().ok();
        AtomwiseLinear::new(NODE_FEATURES_KEY, "hidden", out, seed, irreps_in).unwrap()
    }

    fn run(layer: &AtomwiseLinear, row: &[f64]) -> Vec<f64> {
        let out = layer.forward(features(&[row])).unwrap();
        out.tensor("hidden").unwrap().row(0).to_vec()
    }

    const ROW: [f64; 8] = [0.3, -1.2, 0.5, 0.1, -0.7, 2.0, 0.4, 0.9];

    #[test]
    fn linear_defaults_to_input_irreps() {
        let irreps_in = sig(&[(NODE_FEATURES_KEY, "4x0e+1x1o")]);
        let layer = AtomwiseLinear::new(NODE_FEATURES_KEY, NODE_FEATURES_KEY, None, None, irreps_in).unwrap();
        assert_eq!(
            layer.irreps_out().typed(NODE_FEATURES_KEY).unwrap().to_string(),
            "4x0e+1x1o"
        );
    }

    #[test]
    fn linear_requires_typed_field() {
        let err = AtomwiseLinear::new(NODE_FEATURES_KEY, "x", None, None, IrrepsDict::new()).unwrap_err();
        assert!(matches!(err, Error::MissingField { .. }));

        let mut untyped = IrrepsDict::new();
        untyped.insert(NODE_FEATURES_KEY, None);
        let err = AtomwiseLinear::new(NODE_FEATURES_KEY, "x", None, None, untyped).unwrap_err();
        assert!(matches!(err, Error::Type(_)));
    }

    #[test]
    fn uninitialized_weights_are_zero() {
        let y = run(&linear(None), &ROW);
        assert_eq!(y.len(), 3 + 3 + 5);
        assert!(y.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn seeded_weights_are_reproducible() {
        let a = run(&linear(Some(7)), &ROW);
        let b = run(&linear(Some(7)), &ROW);
        let c = run(&linear(Some(8)), &ROW);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn linear_commutes_with_parity() {
        let layer = linear(Some(3));
        let y = run(&layer, &ROW);

        let mut flipped = ROW;
        flipped[2..].iter_mut().for_each(|v| *v = -*v);
        let y_flipped = run(&layer, &flipped);

        for k in 0..3 {
            assert!((y[k] - y_flipped[k]).abs() < EPS);
        }
        for k in 3..6 {
            assert!((y[k] + y_flipped[k]).abs() < EPS);
        }
        assert!(y[6..].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn linear_rejects_wrong_width() {
        let err = linear(None).forward(features(&[&[1.0, 2.0]])).unwrap_err();
        assert!(matches!(err, Error::Forward { .. }));
    }

    #[test]
    fn linear_builder_reads_initialize_and_seed() {
        let args = Arguments::new("AtomwiseLinear", "readout")
            .with("irreps_in", sig(&[(NODE_FEATURES_KEY, "2x0e")]))
            .with("irreps_out", toml::Value::from("1x0e"))
            .with("initialize", toml::Value::Boolean(true))
            .with("seed", toml::Value::Integer(11));
        let layer = AtomwiseLinear::build(args).unwrap();
        let out = layer.forward(features(&[&[1.0, 1.0]])).unwrap();
        assert_ne!(out.tensor(NODE_FEATURES_KEY).unwrap().row(0), &[0.0]);
    }

    #[test]
    fn reduce_sums_and_averages() {
        let irreps_in = sig(&[(PER_ATOM_ENERGY_KEY, "1x0e")]);
        let mut data = AtomicData::new();
        let energies = Tensor::from_rows(&[[1.0], [2.0], [4.0]]);
        data.insert(PER_ATOM_ENERGY_KEY, FieldData::Float(energies));

        let sum = AtomwiseReduce::new(PER_ATOM_ENERGY_KEY, TOTAL_ENERGY_KEY, Reduce::Sum, irreps_in.clone())
            .unwrap();
        let out = sum.forward(data.clone()).unwrap();
        assert_eq!(out.tensor(TOTAL_ENERGY_KEY).unwrap().as_slice(), &[7.0]);
        assert_eq!(sum.irreps_out().typed(TOTAL_ENERGY_KEY), irreps_in.typed(PER_ATOM_ENERGY_KEY));

        let mean = AtomwiseReduce::new(PER_ATOM_ENERGY_KEY, "mean", Reduce::Mean, irreps_in).unwrap();
        let out = mean.forward(data).unwrap();
        assert!((out.tensor("mean").unwrap().as_slice()[0] - 7.0 / 3.0).abs() < EPS);
    }

    #[test]
    fn reduce_out_field_defaults_from_mode() {
        let args = Arguments::new("AtomwiseReduce", "total")
            .with("irreps_in", sig(&[(PER_ATOM_ENERGY_KEY, "1x0e")]))
            .with("field", toml::Value::from(PER_ATOM_ENERGY_KEY))
            .with("reduce", toml::Value::from("mean"));
        let layer = AtomwiseReduce::build(args).unwrap();
        assert!(layer.irreps_out().contains("mean_atomic_energy"));
    }

    #[test]
    fn unknown_reduce_mode_is_a_type_error() {
        let args = Arguments::new("AtomwiseReduce", "total")
            .with("irreps_in", sig(&[(PER_ATOM_ENERGY_KEY, "1x0e")]))
            .with("field", toml::Value::from(PER_ATOM_ENERGY_KEY))
            .with("reduce", toml::Value::from("max"));
        assert!(matches!(AtomwiseReduce::build(args), Err(Error::Type(_))));
    }

    fn energy_sig() -> IrrepsDict {
        let mut sig = sig(&[(PER_ATOM_ENERGY_KEY, "1x0e")]);
        sig.insert(ATOM_TYPE_KEY, None);
        sig
    }

    #[test]
    fn scale_shift_applies_per_species() {
        let layer = PerSpeciesScaleShift::new(
            PER_ATOM_ENERGY_KEY,
            PER_ATOM_ENERGY_KEY,
            vec![2.0, 10.0],
            vec![0.5, -1.0],
            energy_sig(),
        )
        .unwrap();
        let mut data = AtomicData::from_graph(&[[0.0; 3]; 3], vec![0, 1, 1], vec![]);
        data.insert(PER_ATOM_ENERGY_KEY, FieldData::Float(Tensor::from_rows(&[[1.0], [1.0], [2.0]])));

        let out = layer.forward(data).unwrap();
        assert_eq!(out.tensor(PER_ATOM_ENERGY_KEY).unwrap().as_slice(), &[2.5, 9.0, 19.0]);
    }

    #[test]
    fn scale_shift_requires_scalar_field() {
        let mut sig = sig(&[(PER_ATOM_ENERGY_KEY, "1x1o")]);
        sig.insert(ATOM_TYPE_KEY, None);
        let err = PerSpeciesScaleShift::new(PER_ATOM_ENERGY_KEY, "e", vec![1.0], vec![0.0], sig).unwrap_err();
        assert!(matches!(err, Error::IrrepsMismatch { .. }));
    }

    #[test]
    fn scale_shift_builder_expands_uniform_values() {
        let args = Arguments::new("PerSpeciesScaleShift", "rescale")
            .with("irreps_in", energy_sig())
            .with("field", toml::Value::from(PER_ATOM_ENERGY_KEY))
            .with("num_types", toml::Value::Integer(3))
            .with("scales", toml::Value::Integer(2))
            .with("shifts", toml::Value::Array(vec![1.0.into(), 2.0.into(), 3.0.into()]));
        let layer = PerSpeciesScaleShift::build(args).unwrap();
        assert!(layer.irreps_out().contains(PER_ATOM_ENERGY_KEY));
    }

    #[test]
    fn scale_shift_builder_checks_lengths() {
        let args = Arguments::new("PerSpeciesScaleShift", "rescale")
            .with("irreps_in", energy_sig())
            .with("field", toml::Value::from(PER_ATOM_ENERGY_KEY))
            .with("num_types", toml::Value::Integer(3))
            .with("shifts", toml::Value::Array(vec![1.0.into()]));
        assert!(matches!(
            PerSpeciesScaleShift::build(args),
            Err(Error::Configuration(_))
        ));
    }
}
