use std::collections::{BTreeMap, BTreeSet};

use serde::de::DeserializeOwned;

use super::config::Config;
use crate::error::{Error, Result};
use crate::irreps::{Irreps, IrrepsDict, RawIrreps};

const IRREPS_IN_KEY: &str = "irreps_in";

/// A parameter declared by a builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Param {
    pub name: &'static str,
    /// Required parameters must be resolved; the others fall back to the
    /// builder's own default when no tier supplies them.
    pub required: bool,
}

impl Param {
    pub const fn required(name: &'static str) -> Self {
        Self {
            name,
            required: true,
        }
    }

    pub const fn optional(name: &'static str) -> Self {
        Self {
            name,
            required: false,
        }
    }
}

/// A single resolved argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    /// A configuration value.
    Value(toml::Value),
    /// A field signature, typically the upstream `irreps_in`.
    Irreps(IrrepsDict),
}

impl From<toml::Value> for Argument {
    fn from(value: toml::Value) -> Self {
        Argument::Value(value)
    }
}

impl From<IrrepsDict> for Argument {
    fn from(value: IrrepsDict) -> Self {
        Argument::Irreps(value)
    }
}

/// Arguments resolved for one builder invocation.
///
/// Only parameters the builder declared, or that were passed positionally,
/// are present.
#[derive(Debug, Clone)]
pub struct Arguments {
    builder: String,
    prefix: String,
    values: BTreeMap<String, Argument>,
}

impl Arguments {
    pub fn new(builder: &str, prefix: &str) -> Self {
        Self {
            builder: builder.to_string(),
            prefix: prefix.to_string(),
            values: BTreeMap::new(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Argument>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Argument>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Deserializes the argument `name`, if it was supplied.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Type`] if the value cannot be converted to `T`.
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        match self.values.get(name) {
            None => Ok(None),
            Some(Argument::Value(value)) => value.clone().try_into::<T>().map(Some).map_err(|e| {
                Error::Type(format!(
                    "parameter `{}` of {} (prefix `{}`): {}",
                    name, self.builder, self.prefix, e
                ))
            }),
            Some(Argument::Irreps(_)) => Err(Error::Type(format!(
                "parameter `{}` of {} is a field signature, not a value",
                name, self.builder
            ))),
        }
    }

    /// Deserializes a parameter that must be present.
    pub fn require<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        self.get(name)?
            .ok_or_else(|| Error::missing_parameter(name, &self.prefix))
    }

    /// Deserializes a parameter, falling back to `default`.
    pub fn get_or<T: DeserializeOwned>(&self, name: &str, default: T) -> Result<T> {
        Ok(self.get(name)?.unwrap_or(default))
    }

    /// Parses a parameter holding an irreps descriptor.
    pub fn irreps(&self, name: &str) -> Result<Option<Irreps>> {
        match self.get::<String>(name)? {
            Some(text) => Ok(Some(text.parse()?)),
            None => Ok(None),
        }
    }

    /// The upstream field signature, or an empty one when none was given.
    ///
    /// Accepts a positional signature as well as a TOML table of
    /// descriptors (for a first layer configured from a file).
    pub fn irreps_in(&self) -> Result<IrrepsDict> {
        match self.values.get(IRREPS_IN_KEY) {
            None => Ok(IrrepsDict::new()),
            Some(Argument::Irreps(dict)) => Ok(dict.clone()),
            Some(Argument::Value(toml::Value::Table(table))) => IrrepsDict::from_toml(table),
            Some(Argument::Value(other)) => Err(Error::Type(format!(
                "`irreps_in` of {} must be a table of field irreps, got {}",
                self.builder,
                other.type_str()
            ))),
        }
    }

    /// Parses a table-valued parameter as a field signature.
    pub fn irreps_dict(&self, name: &str) -> Result<Option<IrrepsDict>> {
        match self.values.get(name) {
            None => Ok(None),
            Some(Argument::Irreps(dict)) => Ok(Some(dict.clone())),
            Some(Argument::Value(toml::Value::Table(table))) => {
                let mut raw = Vec::with_capacity(table.len());
                for (key, value) in table {
                    raw.push((key.clone(), RawIrreps::try_from(value)?));
                }
                Ok(Some(IrrepsDict::normalize(raw)?))
            }
            Some(Argument::Value(other)) => Err(Error::Type(format!(
                "parameter `{}` of {} must be a table, got {}",
                name,
                self.builder,
                other.type_str()
            ))),
        }
    }
}

/// Something that can be constructed from resolved parameters.
///
/// Builders declare their parameters explicitly; the resolution engine
/// never inspects a function signature.
pub trait Instantiate {
    type Output;

    /// Name used in diagnostics and registry lookups.
    fn name(&self) -> &str;

    /// Parameters this builder accepts.
    fn params(&self) -> &[Param];

    /// Constructs the output from resolved arguments.
    fn call(&self, args: Arguments) -> Result<Self::Output>;
}

/// Resolves a builder's parameters and invokes it.
///
/// For each declared parameter `p` not already supplied in `positional`, the
/// value is taken, in order of priority, from:
///
/// 1. `optional[p]` — the per-layer override
/// 2. `all["{prefix}_{p}"]` — the name-scoped shared value
/// 3. `all[p]` — the global shared value
///
/// Parameters found nowhere are omitted if optional, and rejected if required.
///
/// # Returns
///
/// The constructed instance and the keys of `all` that were consumed.
///
/// # Errors
///
/// - [`Error::MissingParameter`] if a required parameter cannot be resolved
/// - [`Error::Configuration`] if `optional` names a parameter the builder does not declare
/// - Any error returned by the builder itself
pub fn instantiate<B: Instantiate + ?Sized>(
    builder: &B,
    prefix: &str,
    positional: Arguments,
    optional: &toml::Table,
    all: &Config,
) -> Result<(B::Output, BTreeSet<String>)> {
    let declared = builder.params();

    if let Some(unknown) = optional
        .keys()
        .find(|k| !declared.iter().any(|p| p.name == k.as_str()))
    {
        return Err(Error::config(format!(
            "parameter `{}` given for `{}` is not accepted by {}",
            unknown,
            prefix,
            builder.name()
        )));
    }

    let mut args = Arguments {
        builder: builder.name().to_string(),
        prefix: prefix.to_string(),
        values: positional.values,
    };
    let mut used = BTreeSet::new();

    for param in declared {
        if args.contains(param.name) {
            continue;
        }

        if let Some(value) = optional.get(param.name) {
            log::debug!("{}: `{}` from layer override", prefix, param.name);
            args.insert(param.name, value.clone());
            continue;
        }

        if !prefix.is_empty() {
            let scoped = format!("{}_{}", prefix, param.name);
            if let Some(value) = all.get(&scoped) {
                log::debug!("{}: `{}` from shared `{}`", prefix, param.name, scoped);
                args.insert(param.name, value.clone());
                used.insert(scoped);
                continue;
            }
        }

        if let Some(value) = all.get(param.name) {
            log::debug!("{}: `{}` from shared config", prefix, param.name);
            args.insert(param.name, value.clone());
            used.insert(param.name.to_string());
            continue;
        }

        if param.required {
            return Err(Error::missing_parameter(param.name, prefix));
        }
    }

    let instance = builder.call(args)?;
    Ok((instance, used))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stub;

    impl Instantiate for Stub {
        type Output = Option<i64>;

        fn name(&self) -> &str {
            "Stub"
        }

        fn params(&self) -> &[Param] {
            const PARAMS: &[Param] = &[Param::required("x"), Param::optional("y")];
            PARAMS
        }

        fn call(&self, args: Arguments) -> Result<Self::Output> {
            let x: i64 = args.require("x")?;
            let y: i64 = args.get_or("y", 10)?;
            Ok(Some(x * 100 + y))
        }
    }

    fn table(text: &str) -> toml::Table {
        toml::from_str(text).unwrap()
    }

    fn resolve(optional: &str, all: &str) -> Result<(Option<i64>, BTreeSet<String>)> {
        let config = Config::from_toml_str(all).unwrap();
        instantiate(
            &Stub,
            "L",
            Arguments::new("Stub", "L"),
            &table(optional),
            &config,
        )
    }

    #[test]
    fn layer_override_has_highest_priority() {
        let (out, used) = resolve("x = 1", "L_x = 2\nx = 3").unwrap();
        assert_eq!(out, Some(110));
        assert!(used.is_empty());
    }

    #[test]
    fn scoped_value_beats_global() {
        let (out, used) = resolve("", "L_x = 2\nx = 3").unwrap();
        assert_eq!(out, Some(210));
        assert_eq!(used, BTreeSet::from(["L_x".to_string()]));
    }

    #[test]
    fn global_value_is_last_resort() {
        let (out, used) = resolve("", "x = 3").unwrap();
        assert_eq!(out, Some(310));
        assert_eq!(used, BTreeSet::from(["x".to_string()]));
    }

    #[test]
    fn optional_parameter_resolves_through_tiers() {
        let (out, used) = resolve("", "x = 1\nL_y = 7").unwrap();
        assert_eq!(out, Some(107));
        assert!(used.contains("L_y"));
    }

    #[test]
    fn missing_required_parameter_is_reported() {
        let err = resolve("", "y = 1").unwrap_err();
        assert!(matches!(
            err,
            Error::MissingParameter { ref parameter, ref prefix } if parameter == "x" && prefix == "L"
        ));
    }

    #[test]
    fn positional_arguments_are_not_overridden() {
        let config = Config::from_toml_str("x = 3").unwrap();
        let positional = Arguments::new("Stub", "L").with("x", toml::Value::Integer(9));
        let (out, used) =
            instantiate(&Stub, "L", positional, &toml::Table::new(), &config).unwrap();
        assert_eq!(out, Some(910));
        assert!(!used.contains("x"));
        assert_eq!(config.unused_keys(), vec!["x".to_string()]);
    }

    #[test]
    fn unknown_override_is_rejected() {
        let err = resolve("x = 1\nz = 2", "").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn wrongly_typed_value_is_a_type_error() {
        let err = resolve(r#"x = "one""#, "").unwrap_err();
        assert!(matches!(err, Error::Type(_)));
    }

    #[test]
    fn irreps_in_accepts_table_or_signature() {
        let from_table = Arguments::new("B", "p").with(
            "irreps_in",
            toml::Value::Table(table(r#"node_features = "4x0e""#)),
        );
        let sig = from_table.irreps_in().unwrap();
        assert_eq!(sig.typed("node_features").unwrap().dim(), 4);

        let from_sig = Arguments::new("B", "p").with("irreps_in", sig.clone());
        assert_eq!(from_sig.irreps_in().unwrap(), sig);

        assert!(Arguments::new("B", "p").irreps_in().unwrap().is_empty());
    }

    #[test]
    fn irreps_parameter_parses_descriptor() {
        let args = Arguments::new("B", "p").with("irreps_out", toml::Value::from("2x1o"));
        assert_eq!(args.irreps("irreps_out").unwrap().unwrap().dim(), 6);
        assert_eq!(args.irreps("absent").unwrap(), None);
    }
}
