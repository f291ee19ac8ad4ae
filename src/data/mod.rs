//! The running state threaded through a forward pass.
//!
//! [`AtomicData`] maps field names (see [`crate::irreps::fields`]) to
//! [`FieldData`]. Modules read the fields they need and insert the fields
//! they produce; any field a module does not touch passes through unchanged.

mod tensor;

pub use tensor::Tensor;

use std::collections::BTreeMap;

use crate::irreps::fields::{ATOM_TYPE_KEY, EDGE_INDEX_KEY, POSITIONS_KEY};

/// Value stored under a single field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldData {
    /// Floating-point per-row features.
    Float(Tensor),
    /// One integer per row (e.g. atom species).
    Index(Vec<usize>),
    /// Index pairs (e.g. graph edges as `[source, target]`).
    Pairs(Vec<[usize; 2]>),
}

/// Field-name keyed graph data for a single structure.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AtomicData {
    fields: BTreeMap<String, FieldData>,
}

impl AtomicData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates data for a structure from positions, species, and edges.
    pub fn from_graph(
        positions: &[[f64; 3]],
        atom_types: Vec<usize>,
        edges: Vec<[usize; 2]>,
    ) -> Self {
        let mut data = Self::new();
        data.insert(POSITIONS_KEY, FieldData::Float(Tensor::from_rows(positions)));
        data.insert(ATOM_TYPE_KEY, FieldData::Index(atom_types));
        data.insert(EDGE_INDEX_KEY, FieldData::Pairs(edges));
        data
    }

    pub fn insert(&mut self, field: impl Into<String>, value: FieldData) {
        self.fields.insert(field.into(), value);
    }

    pub fn get(&self, field: &str) -> Option<&FieldData> {
        self.fields.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn tensor(&self, field: &str) -> Option<&Tensor> {
        match self.fields.get(field) {
            Some(FieldData::Float(t)) => Some(t),
            _ => None,
        }
    }

    pub fn indices(&self, field: &str) -> Option<&[usize]> {
        match self.fields.get(field) {
            Some(FieldData::Index(v)) => Some(v),
            _ => None,
        }
    }

    pub fn pairs(&self, field: &str) -> Option<&[[usize; 2]]> {
        match self.fields.get(field) {
            Some(FieldData::Pairs(v)) => Some(v),
            _ => None,
        }
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Number of atoms, taken from the positions field.
    pub fn num_atoms(&self) -> usize {
        self.tensor(POSITIONS_KEY).map_or(0, Tensor::rows)
    }
}
