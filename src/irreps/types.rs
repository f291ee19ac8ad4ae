use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid irreps descriptor: '{0}'")]
pub struct ParseIrrepsError(String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Parity {
    Even,
    Odd,
}

impl Parity {
    /// Parity of the degree-`l` spherical harmonics, `(-1)^l`.
    pub fn of_spherical_harmonic(l: u32) -> Self {
        if l % 2 == 0 { Parity::Even } else { Parity::Odd }
    }

    fn symbol(&self) -> char {
        match self {
            Parity::Even => 'e',
            Parity::Odd => 'o',
        }
    }
}

/// A single irreducible representation of O(3), labelled by degree and parity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Irrep {
    pub l: u32,
    pub parity: Parity,
}

impl Irrep {
    pub const fn new(l: u32, parity: Parity) -> Self {
        Self { l, parity }
    }

    #[inline]
    pub fn dim(&self) -> usize {
        2 * self.l as usize + 1
    }

    #[inline]
    pub fn is_scalar(&self) -> bool {
        self.l == 0 && self.parity == Parity::Even
    }
}

impl fmt::Display for Irrep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.l, self.parity.symbol())
    }
}

impl FromStr for Irrep {
    type Err = ParseIrrepsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let err = || ParseIrrepsError(s.to_string());
        let (idx, suffix) = s.char_indices().last().ok_or_else(err)?;
        let l: u32 = s[..idx].parse().map_err(|_| err())?;
        let parity = match suffix {
            'e' => Parity::Even,
            'o' => Parity::Odd,
            'y' => Parity::of_spherical_harmonic(l),
            _ => return Err(err()),
        };
        Ok(Irrep::new(l, parity))
    }
}

/// An ordered direct sum of irreps with multiplicities, e.g. `16x0e + 8x1o`.
///
/// Equality is structural on the list of `(mul, irrep)` entries: `1o` and
/// `1x1o` are equal, while `0e + 0e` and `2x0e` are not.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Irreps {
    entries: Vec<(usize, Irrep)>,
}

impl Irreps {
    pub fn new(entries: Vec<(usize, Irrep)>) -> Self {
        Self { entries }
    }

    /// The canonical type of a Cartesian position: a single odd vector.
    pub fn vector() -> Self {
        Self::new(vec![(1, Irrep::new(1, Parity::Odd))])
    }

    /// `mul` copies of the even scalar.
    pub fn scalars(mul: usize) -> Self {
        Self::new(vec![(mul, Irrep::new(0, Parity::Even))])
    }

    /// Irreps of the spherical harmonics `0..=lmax`.
    ///
    /// `parity` of `Some(Parity::Odd)` gives the physical `(-1)^l` parities;
    /// `None` makes every degree even.
    pub fn spherical_harmonics(lmax: u32, parity: Option<Parity>) -> Self {
        let entries = (0..=lmax)
            .map(|l| {
                let p = match parity {
                    Some(Parity::Odd) => Parity::of_spherical_harmonic(l),
                    _ => Parity::Even,
                };
                (1, Irrep::new(l, p))
            })
            .collect();
        Self::new(entries)
    }

    pub fn entries(&self) -> &[(usize, Irrep)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of components.
    pub fn dim(&self) -> usize {
        self.entries.iter().map(|(mul, ir)| mul * ir.dim()).sum()
    }

    /// Total multiplicity.
    pub fn num_irreps(&self) -> usize {
        self.entries.iter().map(|(mul, _)| mul).sum()
    }

    pub fn lmax(&self) -> Option<u32> {
        self.entries.iter().map(|(_, ir)| ir.l).max()
    }

    pub fn is_scalar(&self) -> bool {
        self.entries.iter().all(|(_, ir)| ir.is_scalar())
    }

    /// Iterates `(offset, mul, irrep)` for every entry in the flat layout.
    pub fn slices(&self) -> impl Iterator<Item = (usize, usize, Irrep)> + '_ {
        self.entries.iter().scan(0usize, |offset, &(mul, ir)| {
            let start = *offset;
            *offset += mul * ir.dim();
            Some((start, mul, ir))
        })
    }
}

impl fmt::Display for Irreps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (mul, ir) in &self.entries {
            if !first {
                f.write_str("+")?;
            }
            write!(f, "{}x{}", mul, ir)?;
            first = false;
        }
        Ok(())
    }
}

impl FromStr for Irreps {
    type Err = ParseIrrepsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Ok(Irreps::default());
        }

        let mut entries = Vec::new();
        for term in trimmed.split('+') {
            let term = term.trim();
            let (mul, ir) = match term.split_once('x') {
                Some((mul, ir)) => {
                    let mul: usize = mul
                        .trim()
                        .parse()
                        .map_err(|_| ParseIrrepsError(s.to_string()))?;
                    (mul, ir)
                }
                None => (1, term),
            };
            let ir = ir
                .parse::<Irrep>()
                .map_err(|_| ParseIrrepsError(s.to_string()))?;
            entries.push((mul, ir));
        }
        Ok(Irreps::new(entries))
    }
}
