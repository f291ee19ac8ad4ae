//! Names of the standard data fields flowing between graph modules.

/// Cartesian atom positions; always typed as a single odd vector.
pub const POSITIONS_KEY: &str = "pos";
/// Pairs of atom indices defining graph edges; always untyped.
pub const EDGE_INDEX_KEY: &str = "edge_index";
/// Integer species index of each atom.
pub const ATOM_TYPE_KEY: &str = "atom_types";
pub const NODE_ATTRS_KEY: &str = "node_attrs";
pub const NODE_FEATURES_KEY: &str = "node_features";
pub const EDGE_VECTORS_KEY: &str = "edge_vectors";
pub const EDGE_LENGTH_KEY: &str = "edge_lengths";
pub const EDGE_ATTRS_KEY: &str = "edge_attrs";
pub const EDGE_EMBEDDING_KEY: &str = "edge_embedding";
pub const PER_ATOM_ENERGY_KEY: &str = "atomic_energy";
pub const TOTAL_ENERGY_KEY: &str = "total_energy";
