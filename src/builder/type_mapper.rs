use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Error, Result};
use crate::params::{Arguments, Config, Instantiate, Param, instantiate};

const TYPE_NAMES_KEY: &str = "type_names";
const CHEMICAL_SYMBOLS_KEY: &str = "chemical_symbols";
const SYMBOL_TO_TYPE_KEY: &str = "chemical_symbol_to_type";

/// Element symbols ordered by atomic number, starting at hydrogen.
#[rustfmt::skip]
const ELEMENT_SYMBOLS: [&str; 118] = [
    "H", "He",
    "Li", "Be", "B", "C", "N", "O", "F", "Ne",
    "Na", "Mg", "Al", "Si", "P", "S", "Cl", "Ar",
    "K", "Ca", "Sc", "Ti", "V", "Cr", "Mn", "Fe", "Co", "Ni", "Cu", "Zn",
    "Ga", "Ge", "As", "Se", "Br", "Kr",
    "Rb", "Sr", "Y", "Zr", "Nb", "Mo", "Tc", "Ru", "Rh", "Pd", "Ag", "Cd",
    "In", "Sn", "Sb", "Te", "I", "Xe",
    "Cs", "Ba", "La", "Ce", "Pr", "Nd", "Pm", "Sm", "Eu", "Gd", "Tb", "Dy",
    "Ho", "Er", "Tm", "Yb", "Lu", "Hf", "Ta", "W", "Re", "Os", "Ir", "Pt",
    "Au", "Hg", "Tl", "Pb", "Bi", "Po", "At", "Rn",
    "Fr", "Ra", "Ac", "Th", "Pa", "U", "Np", "Pu", "Am", "Cm", "Bk", "Cf",
    "Es", "Fm", "Md", "No", "Lr", "Rf", "Db", "Sg", "Bh", "Hs", "Mt", "Ds",
    "Rg", "Cn", "Nh", "Fl", "Mc", "Lv", "Ts", "Og",
];

/// Returns the atomic number of an element symbol.
pub fn atomic_number(symbol: &str) -> Option<u8> {
    ELEMENT_SYMBOLS
        .iter()
        .position(|&s| s == symbol)
        .map(|i| (i + 1) as u8)
}

/// Maps atom species to contiguous type indices `0..num_types`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeMapper {
    type_names: Vec<String>,
    symbol_to_type: Option<BTreeMap<String, usize>>,
}

impl TypeMapper {
    /// Uses the given names, in order, as the atom types.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the list is empty or has duplicates.
    pub fn from_type_names(type_names: Vec<String>) -> Result<Self> {
        check_unique(TYPE_NAMES_KEY, &type_names)?;
        Ok(Self {
            type_names,
            symbol_to_type: None,
        })
    }

    /// Uses chemical elements as the atom types, ordered by atomic number.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if a symbol is not an element, or on
    /// an empty or duplicated list.
    pub fn from_chemical_symbols(symbols: Vec<String>) -> Result<Self> {
        check_unique(CHEMICAL_SYMBOLS_KEY, &symbols)?;
        let mut numbered = symbols
            .into_iter()
            .map(|symbol| match atomic_number(&symbol) {
                Some(z) => Ok((z, symbol)),
                None => Err(Error::config(format!("`{}` is not a chemical symbol", symbol))),
            })
            .collect::<Result<Vec<_>>>()?;
        numbered.sort_by_key(|&(z, _)| z);

        let type_names: Vec<String> = numbered.into_iter().map(|(_, s)| s).collect();
        let symbol_to_type = type_names
            .iter()
            .enumerate()
            .map(|(i, s)| (s.clone(), i))
            .collect();
        Ok(Self {
            type_names,
            symbol_to_type: Some(symbol_to_type),
        })
    }

    /// Uses an explicit symbol-to-type mapping.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if a symbol is not an element or the
    /// type indices are not exactly `0..n`.
    pub fn from_symbol_map(map: BTreeMap<String, usize>) -> Result<Self> {
        if let Some(bad) = map.keys().find(|s| atomic_number(s).is_none()) {
            return Err(Error::config(format!("`{}` is not a chemical symbol", bad)));
        }

        let mut type_names = vec![String::new(); map.len()];
        for (symbol, &t) in &map {
            match type_names.get_mut(t) {
                Some(slot) if slot.is_empty() => *slot = symbol.clone(),
                _ => {
                    return Err(Error::config(format!(
                        "`{}` must map {} symbols onto the types 0..{} exactly once",
                        SYMBOL_TO_TYPE_KEY,
                        map.len(),
                        map.len()
                    )));
                }
            }
        }
        check_unique(SYMBOL_TO_TYPE_KEY, &type_names)?;

        Ok(Self {
            type_names,
            symbol_to_type: Some(map),
        })
    }

    /// Builds the mapper from whichever type key the configuration sets.
    ///
    /// A chemical-symbol source wins over `type_names`; the two are left for
    /// the caller to reconcile.
    ///
    /// # Errors
    ///
    /// - [`Error::TypeMapperUnconfigured`] if none of `type_names`,
    ///   `chemical_symbols`, `chemical_symbol_to_type` is set
    /// - [`Error::Configuration`] if both symbol sources are set, or the chosen one is invalid
    pub fn from_config(config: &Config) -> Result<Self> {
        let (mapper, _) = instantiate(
            &TypeMapperBuilder,
            "",
            Arguments::new(TypeMapperBuilder.name(), ""),
            &toml::Table::new(),
            config,
        )?;
        Ok(mapper)
    }

    pub fn num_types(&self) -> usize {
        self.type_names.len()
    }

    pub fn type_names(&self) -> &[String] {
        &self.type_names
    }

    /// Type index of a chemical symbol, when the mapper is element based.
    pub fn type_of(&self, symbol: &str) -> Option<usize> {
        self.symbol_to_type.as_ref()?.get(symbol).copied()
    }
}

fn check_unique(key: &str, names: &[String]) -> Result<()> {
    if names.is_empty() {
        return Err(Error::config(format!("`{}` must not be empty", key)));
    }
    let mut seen = BTreeSet::new();
    if let Some(dup) = names.iter().find(|n| !seen.insert(n.as_str())) {
        return Err(Error::config(format!("`{}` lists `{}` more than once", key, dup)));
    }
    Ok(())
}

struct TypeMapperBuilder;

impl Instantiate for TypeMapperBuilder {
    type Output = TypeMapper;

    fn name(&self) -> &str {
        "TypeMapper"
    }

    fn params(&self) -> &[Param] {
        const PARAMS: &[Param] = &[
            Param::optional(TYPE_NAMES_KEY),
            Param::optional(CHEMICAL_SYMBOLS_KEY),
            Param::optional(SYMBOL_TO_TYPE_KEY),
        ];
        PARAMS
    }

    fn call(&self, args: Arguments) -> Result<TypeMapper> {
        // `type_names` next to a symbol source is left for the caller to cross-check.
        let sources: Vec<&str> = args.names().filter(|&n| n != TYPE_NAMES_KEY).collect();
        match sources.as_slice() {
            [] if args.contains(TYPE_NAMES_KEY) => {
                TypeMapper::from_type_names(args.require(TYPE_NAMES_KEY)?)
            }
            [] => Err(Error::TypeMapperUnconfigured),
            [CHEMICAL_SYMBOLS_KEY] => {
                TypeMapper::from_chemical_symbols(args.require(CHEMICAL_SYMBOLS_KEY)?)
            }
            [SYMBOL_TO_TYPE_KEY] => TypeMapper::from_symbol_map(args.require(SYMBOL_TO_TYPE_KEY)?),
            _ => Err(Error::config(format!(
                "only one of `{}`, `{}` may be given, found {}",
                CHEMICAL_SYMBOLS_KEY,
                SYMBOL_TO_TYPE_KEY,
                sources.join(", ")
            ))),
        }
    }
}
