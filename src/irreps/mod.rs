//! Symmetry-type descriptors and the field signatures built from them.
//!
//! - [`Irreps`] — A direct sum of O(3) irreps, parsed from strings like `"16x0e + 8x1o"`
//! - [`IrrepsDict`] — Mapping from data-field name to irreps (or untyped)
//! - [`compatible`] — Agreement check between a producer and a consumer signature
//! - [`fields`] — Names of the standard data fields

mod dict;
pub mod fields;
mod types;

pub use dict::{IrrepsDict, RawIrreps, compatible};
pub use types::{Irrep, Irreps, Parity, ParseIrrepsError};
