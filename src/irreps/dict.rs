use std::collections::BTreeMap;
use std::fmt;

use super::fields::{EDGE_INDEX_KEY, POSITIONS_KEY};
use super::types::Irreps;
use crate::error::{Error, Result};

/// An irreps descriptor as supplied by a caller, before canonicalization.
#[derive(Debug, Clone, PartialEq)]
pub enum RawIrreps {
    /// Invariant data with no irreps description (e.g. integer indices).
    Untyped,
    /// Textual descriptor such as `"16x0e + 8x1o"`.
    Text(String),
    /// Already parsed descriptor.
    Parsed(Irreps),
}

impl RawIrreps {
    fn canonicalize(self) -> Result<Option<Irreps>> {
        match self {
            RawIrreps::Untyped => Ok(None),
            RawIrreps::Text(text) => Ok(Some(text.parse()?)),
            RawIrreps::Parsed(irreps) => Ok(Some(irreps)),
        }
    }
}

impl From<&str> for RawIrreps {
    fn from(value: &str) -> Self {
        RawIrreps::Text(value.to_string())
    }
}

impl From<String> for RawIrreps {
    fn from(value: String) -> Self {
        RawIrreps::Text(value)
    }
}

impl From<Irreps> for RawIrreps {
    fn from(value: Irreps) -> Self {
        RawIrreps::Parsed(value)
    }
}

impl From<Option<Irreps>> for RawIrreps {
    fn from(value: Option<Irreps>) -> Self {
        value.map_or(RawIrreps::Untyped, RawIrreps::Parsed)
    }
}

impl TryFrom<&toml::Value> for RawIrreps {
    type Error = Error;

    /// Strings are descriptors, except `"None"` which marks an untyped field.
    fn try_from(value: &toml::Value) -> Result<Self> {
        match value {
            toml::Value::String(s) if s == "None" => Ok(RawIrreps::Untyped),
            toml::Value::String(s) => Ok(RawIrreps::Text(s.clone())),
            other => Err(Error::config(format!(
                "cannot interpret {} `{}` as an irreps descriptor",
                other.type_str(),
                other
            ))),
        }
    }
}

/// Mapping from field name to its irreps, or `None` for untyped fields.
///
/// This is the type signature of a graph module's inputs or outputs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IrrepsDict(BTreeMap<String, Option<Irreps>>);

impl IrrepsDict {
    pub fn new() -> Self {
        Self::default()
    }

    /// Coerces raw descriptors into canonical irreps.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IrrepsParse`] if any textual descriptor is malformed.
    pub fn normalize<I, K, V>(raw: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<RawIrreps>,
    {
        let mut map = BTreeMap::new();
        for (key, value) in raw {
            map.insert(key.into(), value.into().canonicalize()?);
        }
        Ok(Self(map))
    }

    /// Normalizes a TOML table of descriptors.
    pub fn from_toml(table: &toml::Table) -> Result<Self> {
        let mut raw = Vec::with_capacity(table.len());
        for (key, value) in table {
            raw.push((key.clone(), RawIrreps::try_from(value)?));
        }
        Self::normalize(raw)
    }

    /// Returns the irreps of `field` if the field is present.
    ///
    /// The outer `Option` is presence, the inner one typedness.
    pub fn get(&self, field: &str) -> Option<Option<&Irreps>> {
        self.0.get(field).map(Option::as_ref)
    }

    /// Returns the irreps of a present, typed field.
    pub fn typed(&self, field: &str) -> Option<&Irreps> {
        self.0.get(field).and_then(Option::as_ref)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, irreps: Option<Irreps>) {
        self.0.insert(field.into(), irreps);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&Irreps>)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_ref()))
    }

    /// Returns a copy of `self` overridden by every entry of `other`.
    pub fn merged(&self, other: &IrrepsDict) -> IrrepsDict {
        let mut out = self.clone();
        for (key, value) in &other.0 {
            out.0.insert(key.clone(), value.clone());
        }
        out
    }

    /// Adds the entries of `other` whose keys are absent from `self`.
    ///
    /// Existing entries are never overwritten. Returns the names of the
    /// fields that were added.
    pub fn extend_missing(&mut self, other: &IrrepsDict) -> Vec<String> {
        let mut added = Vec::new();
        for (key, value) in &other.0 {
            if !self.0.contains_key(key) {
                self.0.insert(key.clone(), value.clone());
                added.push(key.clone());
            }
        }
        added
    }

    /// Forces the reserved fields onto an input signature.
    ///
    /// `pos` is set to `1x1o` and `edge_index` to untyped. A caller-supplied
    /// value for either that disagrees is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReservedField`] on a conflicting explicit value.
    pub fn with_reserved_fields(mut self) -> Result<Self> {
        let vector = Irreps::vector();
        if let Some(given) = self.0.get(POSITIONS_KEY) {
            if given.as_ref() != Some(&vector) {
                return Err(Error::ReservedField {
                    field: POSITIONS_KEY.to_string(),
                    detail: format!(
                        "must have irreps {}, got instead `{}`",
                        vector,
                        render(given.as_ref())
                    ),
                });
            }
        }
        self.0.insert(POSITIONS_KEY.to_string(), Some(vector));

        if let Some(Some(given)) = self.0.get(EDGE_INDEX_KEY) {
            return Err(Error::ReservedField {
                field: EDGE_INDEX_KEY.to_string(),
                detail: format!("must have irreps None, got instead `{}`", given),
            });
        }
        self.0.insert(EDGE_INDEX_KEY.to_string(), None);

        Ok(self)
    }
}

/// Returns `true` iff every field present in both signatures has equal irreps.
///
/// Fields present on only one side never conflict.
pub fn compatible(irreps_out: &IrrepsDict, irreps_in: &IrrepsDict) -> bool {
    irreps_out
        .0
        .iter()
        .all(|(key, out)| irreps_in.0.get(key).is_none_or(|inp| inp == out))
}

fn render(irreps: Option<&Irreps>) -> String {
    irreps.map_or_else(|| "None".to_string(), Irreps::to_string)
}

impl fmt::Display for IrrepsDict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (key, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", key, render(value.as_ref()))?;
        }
        f.write_str("}")
    }
}

impl FromIterator<(String, Option<Irreps>)> for IrrepsDict {
    fn from_iter<T: IntoIterator<Item = (String, Option<Irreps>)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a IrrepsDict {
    type Item = (&'a String, &'a Option<Irreps>);
    type IntoIter = std::collections::btree_map::Iter<'a, String, Option<Irreps>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dict(entries: &[(&str, &str)]) -> IrrepsDict {
        IrrepsDict::normalize(entries.iter().map(|(k, v)| (*k, *v))).unwrap()
    }

    #[test]
    fn normalize_parses_text_and_keeps_untyped() {
        let sig = IrrepsDict::normalize([
            ("node_features", RawIrreps::from("8x0e+4x1o")),
            ("edge_index", RawIrreps::Untyped),
        ])
        .unwrap();
        assert_eq!(sig.typed("node_features").unwrap().dim(), 20);
        assert_eq!(sig.get("edge_index"), Some(None));
        assert_eq!(sig.get("missing"), None);
    }

    #[test]
    fn normalize_rejects_malformed_descriptor() {
        let result = IrrepsDict::normalize([("x", "not irreps")]);
        let err = result.unwrap_err();
        assert!(matches!(err, Error::IrrepsParse(_)));
        assert_eq!(err.kind(), crate::ErrorKind::Configuration);
    }

    #[test]
    fn compatible_requires_equal_types_on_shared_keys() {
        let a = dict(&[("x", "1o"), ("y", "0e")]);
        let b = dict(&[("x", "1x1o"), ("z", "2e")]);
        let c = dict(&[("x", "0e")]);
        assert!(compatible(&a, &b));
        assert!(!compatible(&a, &c));
        assert!(!compatible(&c, &a));
    }

    #[test]
    fn compatible_distinguishes_same_dimension() {
        let a = dict(&[("x", "3x0e")]);
        let b = dict(&[("x", "1x1e")]);
        assert!(!compatible(&a, &b));
    }

    #[test]
    fn compatible_compares_untyped_against_typed() {
        let mut a = IrrepsDict::new();
        a.insert("x", None);
        let b = dict(&[("x", "0e")]);
        assert!(!compatible(&a, &b));
        assert!(compatible(&a, &a.clone()));
    }

    #[test]
    fn reserved_fields_are_forced() {
        let sig = IrrepsDict::new().with_reserved_fields().unwrap();
        assert_eq!(sig.typed(POSITIONS_KEY), Some(&Irreps::vector()));
        assert_eq!(sig.get(EDGE_INDEX_KEY), Some(None));
    }

    #[test]
    fn reserved_positions_conflict_is_rejected() {
        let err = dict(&[(POSITIONS_KEY, "0e")])
            .with_reserved_fields()
            .unwrap_err();
        assert!(matches!(err, Error::ReservedField { ref field, .. } if field == POSITIONS_KEY));
    }

    #[test]
    fn reserved_edge_index_must_be_untyped() {
        let err = dict(&[(EDGE_INDEX_KEY, "0e")])
            .with_reserved_fields()
            .unwrap_err();
        assert!(matches!(err, Error::ReservedField { ref field, .. } if field == EDGE_INDEX_KEY));
    }

    #[test]
    fn untyped_positions_are_rejected() {
        let mut sig = IrrepsDict::new();
        sig.insert(POSITIONS_KEY, None);
        assert!(sig.with_reserved_fields().is_err());
    }

    #[test]
    fn merged_overrides_and_extend_missing_does_not() {
        let base = dict(&[("x", "0e"), ("y", "1o")]);
        let over = dict(&[("x", "2x0e"), ("z", "1e")]);

        let merged = base.merged(&over);
        assert_eq!(merged.typed("x").unwrap().to_string(), "2x0e");
        assert!(merged.contains("z"));

        let mut extended = base.clone();
        let added = extended.extend_missing(&over);
        assert_eq!(added, vec!["z".to_string()]);
        assert_eq!(extended.typed("x").unwrap().to_string(), "1x0e");
    }

    #[test]
    fn from_toml_accepts_none_marker() {
        let table: toml::Table = toml::from_str(
            r#"
            node_features = "16x0e"
            edge_index = "None"
            "#,
        )
        .unwrap();
        let sig = IrrepsDict::from_toml(&table).unwrap();
        assert_eq!(sig.get(EDGE_INDEX_KEY), Some(None));
        assert_eq!(sig.typed("node_features").unwrap().num_irreps(), 16);
    }

    #[test]
    fn from_toml_rejects_non_string_values() {
        let table: toml::Table = toml::from_str("x = 3").unwrap();
        assert!(matches!(
            IrrepsDict::from_toml(&table),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn display_lists_fields_in_order() {
        let sig = IrrepsDict::new().with_reserved_fields().unwrap();
        assert_eq!(sig.to_string(), "{edge_index: None, pos: 1x1o}");
    }
}
