use std::f64::consts::PI;

use super::{GraphModule, IrrepsSpec, LayerBuilder, ModuleIrreps};
use crate::data::{AtomicData, FieldData, Tensor};
use crate::error::{Error, Result};
use crate::irreps::fields::{
    EDGE_ATTRS_KEY, EDGE_EMBEDDING_KEY, EDGE_INDEX_KEY, EDGE_LENGTH_KEY, EDGE_VECTORS_KEY,
    POSITIONS_KEY,
};
use crate::irreps::{Irreps, IrrepsDict, Parity};
use crate::params::{Arguments, Param};

/// Highest degree [`SphericalHarmonicEdgeAttrs`] can evaluate.
const MAX_SH_DEGREE: u32 = 2;

/// Spherical harmonic projections of the edge vectors.
///
/// Emits `edge_vectors` (`pos[target] - pos[source]`, as `1o`) and
/// `edge_attrs` with the configured spherical harmonic irreps. Components
/// are normalized so each degree-`l` block of a unit vector has squared norm
/// `2l + 1`.
#[derive(Debug)]
pub struct SphericalHarmonicEdgeAttrs {
    irreps_edge_sh: Irreps,
    normalize: bool,
    irreps: ModuleIrreps,
}

impl SphericalHarmonicEdgeAttrs {
    pub const BUILDER: LayerBuilder = LayerBuilder {
        name: "SphericalHarmonicEdgeAttrs",
        params: &[
            Param::optional("irreps_in"),
            Param::optional("irreps_edge_sh"),
            Param::optional("l_max"),
            Param::optional("edge_sh_normalize"),
        ],
        func: Self::build,
    };

    pub fn new(irreps_edge_sh: Irreps, normalize: bool, irreps_in: IrrepsDict) -> Result<Self> {
        if irreps_edge_sh.entries().iter().any(|&(mul, _)| mul != 1) {
            return Err(Error::config(format!(
                "spherical harmonic irreps must have multiplicity one, got {}",
                irreps_edge_sh
            )));
        }

        let spec = IrrepsSpec::new(irreps_in)
            .produces(EDGE_VECTORS_KEY, Some(Irreps::vector()))
            .produces(EDGE_ATTRS_KEY, Some(irreps_edge_sh.clone()));
        Ok(Self {
            irreps_edge_sh,
            normalize,
            irreps: ModuleIrreps::init("SphericalHarmonicEdgeAttrs", spec)?,
        })
    }

    fn build(args: Arguments) -> Result<Box<dyn GraphModule>> {
        let irreps_edge_sh = match args.irreps("irreps_edge_sh")? {
            Some(irreps) => irreps,
            None => {
                let l_max: u32 = args.get("l_max")?.ok_or_else(|| {
                    Error::config(format!(
                        "either `irreps_edge_sh` or `l_max` is required under prefix `{}`",
                        args.prefix()
                    ))
                })?;
                Irreps::spherical_harmonics(l_max, Some(Parity::Odd))
            }
        };
        let normalize = args.get_or("edge_sh_normalize", true)?;
        Ok(Box::new(Self::new(irreps_edge_sh, normalize, args.irreps_in()?)?))
    }
}

impl GraphModule for SphericalHarmonicEdgeAttrs {
    fn type_name(&self) -> &'static str {
        "SphericalHarmonicEdgeAttrs"
    }

    fn irreps(&self) -> &ModuleIrreps {
        &self.irreps
    }

    fn irreps_mut(&mut self) -> &mut ModuleIrreps {
        &mut self.irreps
    }

    fn forward(&self, mut data: AtomicData) -> Result<AtomicData> {
        if let Some(l) = self.irreps_edge_sh.lmax().filter(|&l| l > MAX_SH_DEGREE) {
            return Err(Error::forward(
                self.type_name(),
                format!("spherical harmonics of degree {} are not supported", l),
            ));
        }

        let vectors = edge_vectors(self.type_name(), &data)?;
        let mut attrs = Tensor::zeros(vectors.rows(), self.irreps_edge_sh.dim());
        for e in 0..vectors.rows() {
            let mut v = [vectors.row(e)[0], vectors.row(e)[1], vectors.row(e)[2]];
            if self.normalize {
                let norm = v.iter().map(|c| c * c).sum::<f64>().sqrt();
                if norm > 0.0 {
                    v.iter_mut().for_each(|c| *c /= norm);
                }
            }
            let row = attrs.row_mut(e);
            for (offset, _, ir) in self.irreps_edge_sh.slices() {
                spherical_harmonic(ir.l, v, &mut row[offset..offset + ir.dim()]);
            }
        }

        data.insert(EDGE_VECTORS_KEY, FieldData::Float(vectors));
        data.insert(EDGE_ATTRS_KEY, FieldData::Float(attrs));
        Ok(data)
    }
}

fn edge_vectors(module: &str, data: &AtomicData) -> Result<Tensor> {
    let pos = data
        .tensor(POSITIONS_KEY)
        .ok_or_else(|| Error::forward(module, "missing float field `pos`"))?;
    let edges = data
        .pairs(EDGE_INDEX_KEY)
        .ok_or_else(|| Error::forward(module, "missing pair field `edge_index`"))?;

    let mut vectors = Tensor::zeros(edges.len(), 3);
    for (e, &[src, dst]) in edges.iter().enumerate() {
        if src >= pos.rows() || dst >= pos.rows() {
            return Err(Error::forward(
                module,
                format!("edge ({}, {}) references a missing atom", src, dst),
            ));
        }
        for (k, out) in vectors.row_mut(e).iter_mut().enumerate() {
            *out = pos.row(dst)[k] - pos.row(src)[k];
        }
    }
    Ok(vectors)
}

/// Writes the degree-`l` real spherical harmonics of `v` into `out`.
fn spherical_harmonic(l: u32, [x, y, z]: [f64; 3], out: &mut [f64]) {
    let s3 = 3f64.sqrt();
    let s5 = 5f64.sqrt();
    let s15 = 15f64.sqrt();
    match l {
        0 => out[0] = 1.0,
        1 => {
            out[0] = s3 * x;
            out[1] = s3 * y;
            out[2] = s3 * z;
        }
        _ => {
            out[0] = s15 * x * z;
            out[1] = s15 * x * y;
            out[2] = s5 * (y * y - 0.5 * (x * x + z * z));
            out[3] = s15 * y * z;
            out[4] = 0.5 * s15 * (z * z - x * x);
        }
    }
}

/// Bessel radial basis of the edge lengths with a smooth polynomial cutoff.
///
/// Emits untyped `edge_lengths` and `edge_embedding` as `{num_basis}x0e`.
#[derive(Debug)]
pub struct RadialBasisEdgeEncoding {
    r_max: f64,
    num_basis: usize,
    p: u32,
    irreps: ModuleIrreps,
}

impl RadialBasisEdgeEncoding {
    pub const BUILDER: LayerBuilder = LayerBuilder {
        name: "RadialBasisEdgeEncoding",
        params: &[
            Param::optional("irreps_in"),
            Param::required("r_max"),
            Param::optional("num_basis"),
            Param::optional("polynomial_p"),
        ],
        func: Self::build,
    };

    pub fn new(r_max: f64, num_basis: usize, p: u32, irreps_in: IrrepsDict) -> Result<Self> {
        if r_max <= 0.0 || !r_max.is_finite() {
            return Err(Error::config(format!("`r_max` must be positive, got {}", r_max)));
        }
        if num_basis == 0 {
            return Err(Error::config("`num_basis` must be at least 1"));
        }

        let spec = IrrepsSpec::new(irreps_in)
            .expects(EDGE_VECTORS_KEY, Some(Irreps::vector()))
            .requires(EDGE_VECTORS_KEY)
            .produces(EDGE_LENGTH_KEY, None)
            .produces(EDGE_EMBEDDING_KEY, Some(Irreps::scalars(num_basis)));
        Ok(Self {
            r_max,
            num_basis,
            p,
            irreps: ModuleIrreps::init("RadialBasisEdgeEncoding", spec)?,
        })
    }

    fn build(args: Arguments) -> Result<Box<dyn GraphModule>> {
        let r_max = args.require("r_max")?;
        let num_basis = args.get_or("num_basis", 8)?;
        let p = args.get_or("polynomial_p", 6)?;
        Ok(Box::new(Self::new(r_max, num_basis, p, args.irreps_in()?)?))
    }

    /// Polynomial envelope falling smoothly from 1 at `r = 0` to 0 at `r_max`.
    fn cutoff(&self, r: f64) -> f64 {
        let x = r / self.r_max;
        if x >= 1.0 {
            return 0.0;
        }
        let p = f64::from(self.p);
        1.0 - 0.5 * (p + 1.0) * (p + 2.0) * x.powf(p) + p * (p + 2.0) * x.powf(p + 1.0)
            - 0.5 * p * (p + 1.0) * x.powf(p + 2.0)
    }

    fn bessel(&self, r: f64, n: usize) -> f64 {
        let k = n as f64 * PI / self.r_max;
        let prefactor = 2.0 / self.r_max;
        if r > 0.0 {
            prefactor * (k * r).sin() / r
        } else {
            prefactor * k
        }
    }
}

impl GraphModule for RadialBasisEdgeEncoding {
    fn type_name(&self) -> &'static str {
        "RadialBasisEdgeEncoding"
    }

    fn irreps(&self) -> &ModuleIrreps {
        &self.irreps
    }

    fn irreps_mut(&mut self) -> &mut ModuleIrreps {
        &mut self.irreps
    }

    fn forward(&self, mut data: AtomicData) -> Result<AtomicData> {
        let vectors = data
            .tensor(EDGE_VECTORS_KEY)
            .ok_or_else(|| Error::forward(self.type_name(), "missing float field `edge_vectors`"))?;

        let num_edges = vectors.rows();
        let mut lengths = Tensor::zeros(num_edges, 1);
        let mut embedding = Tensor::zeros(num_edges, self.num_basis);
        for e in 0..num_edges {
            let r = vectors.row(e).iter().map(|c| c * c).sum::<f64>().sqrt();
            lengths.row_mut(e)[0] = r;
            let envelope = self.cutoff(r);
            for (n, out) in embedding.row_mut(e).iter_mut().enumerate() {
                *out = self.bessel(r, n + 1) * envelope;
            }
        }

        data.insert(EDGE_LENGTH_KEY, FieldData::Float(lengths));
        data.insert(EDGE_EMBEDDING_KEY, FieldData::Float(embedding));
        Ok(data)
    }
}
