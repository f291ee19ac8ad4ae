use std::collections::HashMap;

use super::module::{GraphModule, ModuleIrreps};
use super::LayerSpec;
use crate::data::AtomicData;
use crate::error::{Error, Result};
use crate::irreps::{IrrepsDict, compatible};
use crate::params::{Arguments, Config, instantiate};

const IRREPS_IN_KEY: &str = "irreps_in";

/// Where to splice a module into a sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anchor {
    After(String),
    Before(String),
}

impl Anchor {
    /// Builds an anchor from optional `after`/`before` names.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] unless exactly one name is given.
    pub fn from_options(after: Option<&str>, before: Option<&str>) -> Result<Self> {
        match (after, before) {
            (Some(name), None) => Ok(Anchor::After(name.to_string())),
            (None, Some(name)) => Ok(Anchor::Before(name.to_string())),
            (Some(_), Some(_)) => Err(Error::config("only one of `before` and `after` may be given")),
            (None, None) => Err(Error::config("either `before` or `after` must be given")),
        }
    }

    fn name(&self) -> &str {
        match self {
            Anchor::After(name) | Anchor::Before(name) => name,
        }
    }
}

/// An ordered chain of named graph modules.
///
/// Adjacent modules always have compatible signatures: every field present in
/// both a module's `irreps_out` and its successor's `irreps_in` carries equal
/// irreps. The aggregate `irreps_in` is the first module's and the aggregate
/// `irreps_out` the last module's.
///
/// Every mutator validates completely before changing anything, so a failed
/// `append` or `insert` leaves the sequence as it was.
#[derive(Debug)]
pub struct SequentialGraphNetwork {
    modules: Vec<(String, Box<dyn GraphModule>)>,
    index: HashMap<String, usize>,
    irreps: ModuleIrreps,
}

impl SequentialGraphNetwork {
    /// Chains already-built modules in order.
    ///
    /// # Errors
    ///
    /// - [`Error::Configuration`] if `modules` is empty
    /// - [`Error::DuplicateModule`] if two modules share a name
    /// - [`Error::Incompatible`] if two adjacent modules disagree on a field
    pub fn new(modules: Vec<(String, Box<dyn GraphModule>)>) -> Result<Self> {
        if modules.is_empty() {
            return Err(Error::config("a sequence needs at least one module"));
        }

        let mut index = HashMap::with_capacity(modules.len());
        for (i, (name, _)) in modules.iter().enumerate() {
            if index.insert(name.clone(), i).is_some() {
                return Err(Error::DuplicateModule(name.clone()));
            }
        }

        for pair in modules.windows(2) {
            let (upstream, downstream) = (&pair[0].1, &pair[1].1);
            check_compatible(upstream.as_ref(), downstream.irreps_in(), downstream.type_name())?;
        }

        let irreps = aggregate(&modules);
        Ok(Self {
            modules,
            index,
            irreps,
        })
    }

    /// Builds each layer through parameter resolution and chains them.
    ///
    /// Every layer after the first receives its predecessor's `irreps_out` as
    /// its positional `irreps_in`. The first receives `irreps_in` if given,
    /// and otherwise resolves it like any other parameter.
    ///
    /// # Arguments
    ///
    /// * `shared` — Shared parameter pool
    /// * `layers` — Layer names (also used as lookup prefixes) and their specs
    /// * `irreps_in` — Input signature for the first layer
    ///
    /// # Errors
    ///
    /// Any error from resolving or building a layer, or from [`new`](Self::new).
    pub fn from_parameters(
        shared: &Config,
        layers: Vec<(String, LayerSpec)>,
        irreps_in: Option<IrrepsDict>,
    ) -> Result<Self> {
        let mut built = Vec::with_capacity(layers.len());
        let mut upstream = irreps_in;

        for (name, spec) in layers {
            let module = build_layer(shared, &name, &spec, upstream.take())?;
            upstream = Some(module.irreps_out().clone());
            built.push((name, module));
        }

        Self::new(built)
    }

    /// Adds a module at the tail.
    ///
    /// # Errors
    ///
    /// - [`Error::DuplicateModule`] if `name` is taken
    /// - [`Error::Incompatible`] if the module does not accept the current `irreps_out`
    pub fn append(&mut self, name: &str, module: Box<dyn GraphModule>) -> Result<()> {
        self.ensure_vacant(name)?;
        let last = self.last();
        check_compatible(last, module.irreps_in(), module.type_name())?;

        self.irreps.set_irreps_out(module.irreps_out().clone());
        self.index.insert(name.to_string(), self.modules.len());
        self.modules.push((name.to_string(), module));
        Ok(())
    }

    /// Builds a layer that consumes the current `irreps_out` and appends it.
    pub fn append_from_parameters(
        &mut self,
        shared: &Config,
        name: &str,
        spec: LayerSpec,
    ) -> Result<()> {
        let module = build_layer(shared, name, &spec, Some(self.irreps_out().clone()))?;
        self.append(name, module)
    }

    /// Splices a module next to an existing one.
    ///
    /// Fields the new module produces that a downstream module never declared
    /// are added to that module's signatures; declared fields keep their
    /// irreps.
    ///
    /// # Errors
    ///
    /// - [`Error::DuplicateModule`] if `name` is taken
    /// - [`Error::UnknownModule`] if the anchor does not exist
    /// - [`Error::Incompatible`] if the spliced chain would be inconsistent
    pub fn insert(&mut self, name: &str, module: Box<dyn GraphModule>, anchor: &Anchor) -> Result<()> {
        self.ensure_vacant(name)?;
        let at = self.insertion_point(anchor)?;

        if at > 0 {
            check_compatible(self.modules[at - 1].1.as_ref(), module.irreps_in(), module.type_name())?;
        }

        let produced = module.irreps_out();
        let mut upstream_type = module.type_name();
        let mut upstream_out = produced.clone();
        for (_, downstream) in &self.modules[at..] {
            let mut staged = downstream.irreps().clone();
            staged.add_independent_irreps(produced);
            if !compatible(&upstream_out, staged.irreps_in()) {
                return Err(Error::incompatible(
                    upstream_type,
                    downstream.type_name(),
                    &upstream_out,
                    staged.irreps_in(),
                ));
            }
            upstream_type = downstream.type_name();
            upstream_out = staged.irreps_out().clone();
        }

        let produced = produced.clone();
        for (downstream_name, downstream) in &mut self.modules[at..] {
            let added = downstream.add_independent_irreps(&produced);
            if !added.is_empty() {
                log::debug!(
                    "propagated {:?} from `{}` into `{}`",
                    added,
                    name,
                    downstream_name
                );
            }
        }

        self.modules.insert(at, (name.to_string(), module));
        self.reindex();
        self.irreps = aggregate(&self.modules);
        Ok(())
    }

    /// Builds a layer that consumes the left neighbor's `irreps_out` and
    /// inserts it.
    ///
    /// When inserting before the first module, the sequence's own `irreps_in`
    /// is used instead.
    pub fn insert_from_parameters(
        &mut self,
        shared: &Config,
        name: &str,
        spec: LayerSpec,
        anchor: &Anchor,
    ) -> Result<()> {
        let at = self.insertion_point(anchor)?;
        let upstream = match at {
            0 => self.irreps_in().clone(),
            _ => self.modules[at - 1].1.irreps_out().clone(),
        };
        let module = build_layer(shared, name, &spec, Some(upstream))?;
        self.insert(name, module, anchor)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.modules.iter().map(|(name, _)| name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&dyn GraphModule> {
        self.index.get(name).map(|&i| self.modules[i].1.as_ref())
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut (dyn GraphModule + 'static)> {
        let i = *self.index.get(name)?;
        Some(self.modules[i].1.as_mut())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &dyn GraphModule)> {
        self.modules
            .iter()
            .map(|(name, module)| (name.as_str(), module.as_ref()))
    }

    fn last(&self) -> &dyn GraphModule {
        self.modules[self.modules.len() - 1].1.as_ref()
    }

    fn ensure_vacant(&self, name: &str) -> Result<()> {
        if self.index.contains_key(name) {
            return Err(Error::DuplicateModule(name.to_string()));
        }
        Ok(())
    }

    fn insertion_point(&self, anchor: &Anchor) -> Result<usize> {
        let &i = self
            .index
            .get(anchor.name())
            .ok_or_else(|| Error::UnknownModule(anchor.name().to_string()))?;
        Ok(match anchor {
            Anchor::After(_) => i + 1,
            Anchor::Before(_) => i,
        })
    }

    fn reindex(&mut self) {
        self.index = self
            .modules
            .iter()
            .enumerate()
            .map(|(i, (name, _))| (name.clone(), i))
            .collect();
    }
}

impl GraphModule for SequentialGraphNetwork {
    fn type_name(&self) -> &'static str {
        "SequentialGraphNetwork"
    }

    fn irreps(&self) -> &ModuleIrreps {
        &self.irreps
    }

    fn irreps_mut(&mut self) -> &mut ModuleIrreps {
        &mut self.irreps
    }

    fn forward(&self, data: AtomicData) -> Result<AtomicData> {
        self.modules
            .iter()
            .try_fold(data, |data, (_, module)| module.forward(data))
    }

    fn as_sequential(&self) -> Option<&SequentialGraphNetwork> {
        Some(self)
    }

    fn as_sequential_mut(&mut self) -> Option<&mut SequentialGraphNetwork> {
        Some(self)
    }
}

fn check_compatible(upstream: &dyn GraphModule, irreps_in: &IrrepsDict, downstream: &str) -> Result<()> {
    if !compatible(upstream.irreps_out(), irreps_in) {
        return Err(Error::incompatible(
            upstream.type_name(),
            downstream,
            upstream.irreps_out(),
            irreps_in,
        ));
    }
    Ok(())
}

fn aggregate(modules: &[(String, Box<dyn GraphModule>)]) -> ModuleIrreps {
    let first = modules.first().map(|(_, m)| m.irreps_in().clone());
    let last = modules.last().map(|(_, m)| m.irreps_out().clone());
    ModuleIrreps::from_parts(first.unwrap_or_default(), last.unwrap_or_default())
}

fn build_layer(
    shared: &Config,
    name: &str,
    spec: &LayerSpec,
    irreps_in: Option<IrrepsDict>,
) -> Result<Box<dyn GraphModule>> {
    let mut positional = Arguments::new(spec.builder.name, name);
    if let Some(irreps_in) = irreps_in {
        positional.insert(IRREPS_IN_KEY, irreps_in);
    }
    let (module, _) = instantiate(&spec.builder, name, positional, &spec.params, shared)?;
    log::debug!("built layer `{}` as {}", name, module.type_name());
    Ok(module)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::FieldData;
    use crate::irreps::Irreps;
    use crate::nn::{IrrepsSpec, LayerBuilder};
    use crate::params::Param;
    use crate::ErrorKind;

    const TRACE: &str = "trace";

    #[derive(Debug)]
    struct Stub {
        tag: usize,
        irreps: ModuleIrreps,
    }

    impl GraphModule for Stub {
        fn type_name(&self) -> &'static str {
            "Stub"
        }

        fn irreps(&self) -> &ModuleIrreps {
            &self.irreps
        }

        fn irreps_mut(&mut self) -> &mut ModuleIrreps {
            &mut self.irreps
        }

        fn forward(&self, mut data: AtomicData) -> Result<AtomicData> {
            let mut trace = data.indices(TRACE).map(<[_]>::to_vec).unwrap_or_default();
            trace.push(self.tag);
            data.insert(TRACE, FieldData::Index(trace));
            Ok(data)
        }
    }

    fn irreps(text: &str) -> Option<Irreps> {
        Some(text.parse().unwrap())
    }

    fn sig(entries: &[(&str, &str)]) -> IrrepsDict {
        IrrepsDict::normalize(entries.iter().map(|(k, v)| (*k, *v))).unwrap()
    }

    fn stub(tag: usize, irreps_in: IrrepsDict, produces: &[(&str, &str)]) -> Box<dyn GraphModule> {
        let spec = produces
            .iter()
            .fold(IrrepsSpec::new(irreps_in), |spec, (field, text)| {
                spec.produces(field, irreps(text))
            });
        Box::new(Stub {
            tag,
            irreps: ModuleIrreps::init("Stub", spec).unwrap(),
        })
    }

    fn chain() -> SequentialGraphNetwork {
        let a = stub(0, IrrepsDict::new(), &[("a", "0e")]);
        let b = stub(1, a.irreps_out().clone(), &[("b", "1o")]);
        let c = stub(2, b.irreps_out().clone(), &[("f", "1e")]);
        SequentialGraphNetwork::new(vec![
            ("a".to_string(), a),
            ("b".to_string(), b),
            ("c".to_string(), c),
        ])
        .unwrap()
    }

    #[test]
    fn incompatible_pair_is_rejected() {
        let a = stub(0, IrrepsDict::new(), &[("node_features", "8x0e")]);
        let b = stub(1, sig(&[("node_features", "4x0e")]), &[]);
        let err = SequentialGraphNetwork::new(vec![("a".into(), a), ("b".into(), b)]).unwrap_err();
        assert!(matches!(err, Error::Incompatible { .. }));
        assert_eq!(err.kind(), ErrorKind::Incompatibility);
    }

    #[test]
    fn empty_sequence_is_rejected() {
        let err = SequentialGraphNetwork::new(Vec::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let a = stub(0, IrrepsDict::new(), &[]);
        let b = stub(1, IrrepsDict::new(), &[]);
        let err = SequentialGraphNetwork::new(vec![("x".into(), a), ("x".into(), b)]).unwrap_err();
        assert!(matches!(err, Error::DuplicateModule(ref name) if name == "x"));
    }

    #[test]
    fn aggregate_signatures_follow_ends() {
        let seq = chain();
        assert_eq!(seq.irreps_in(), seq.get("a").unwrap().irreps_in());
        assert_eq!(seq.irreps_out(), seq.get("c").unwrap().irreps_out());
        assert_eq!(seq.names().collect::<Vec<_>>(), vec!["a", "b", "c"]);
    }

    #[test]
    fn append_sets_irreps_out_to_new_tail() {
        let mut seq = chain();
        let m = stub(3, seq.irreps_out().clone(), &[("g", "2e")]);
        let expected = m.irreps_out().clone();
        seq.append("d", m).unwrap();
        assert_eq!(seq.irreps_out(), &expected);
        assert_eq!(seq.len(), 4);
    }

    #[test]
    fn append_incompatible_leaves_sequence_unchanged() {
        let mut seq = chain();
        let before = seq.irreps().clone();
        let m = stub(3, sig(&[("a", "1o")]), &[]);
        assert!(matches!(seq.append("d", m), Err(Error::Incompatible { .. })));
        assert_eq!(seq.irreps(), &before);
        assert_eq!(seq.len(), 3);
    }

    #[test]
    fn insert_propagates_new_fields_downstream() {
        let mut seq = chain();
        let left = seq.get("a").unwrap().irreps_out().clone();
        let m = stub(9, left, &[("f", "2e"), ("n", "3o")]);
        seq.insert("m", m, &Anchor::After("a".into())).unwrap();

        assert_eq!(seq.names().collect::<Vec<_>>(), vec!["a", "m", "b", "c"]);
        let b = seq.get("b").unwrap();
        assert_eq!(b.irreps_in().typed("n"), irreps("3o").as_ref());
        assert_eq!(b.irreps_out().typed("n"), irreps("3o").as_ref());
        assert_eq!(b.irreps_out().typed("f"), irreps("2e").as_ref());

        let c = seq.get("c").unwrap();
        assert_eq!(c.irreps_in().typed("f"), irreps("2e").as_ref());
        assert_eq!(c.irreps_out().typed("f"), irreps("1e").as_ref());
        assert_eq!(c.irreps_out().typed("b"), irreps("1o").as_ref());
        assert_eq!(seq.irreps_out(), c.irreps_out());
        assert!(seq.get("a").unwrap().irreps_out().get("n").is_none());
    }

    #[test]
    fn insert_before_first_updates_irreps_in() {
        let mut seq = chain();
        let m = stub(9, IrrepsDict::new(), &[("species", "0e")]);
        seq.insert("m", m, &Anchor::Before("a".into())).unwrap();
        assert_eq!(seq.names().next(), Some("m"));
        assert!(seq.irreps_in().get("species").is_none());
        assert_eq!(seq.get("a").unwrap().irreps_in().typed("species"), irreps("0e").as_ref());
    }

    #[test]
    fn insert_after_last_becomes_new_tail() {
        let mut seq = chain();
        let m = stub(9, seq.irreps_out().clone(), &[("z", "2o")]);
        let expected = m.irreps_out().clone();
        seq.insert("m", m, &Anchor::After("c".into())).unwrap();
        assert_eq!(seq.names().last(), Some("m"));
        assert_eq!(seq.irreps_out(), &expected);
        assert!(seq.get("c").unwrap().irreps_out().get("z").is_none());
    }

    #[test]
    fn insert_with_taken_name_leaves_sequence_unchanged() {
        let mut seq = chain();
        let before = seq.irreps().clone();
        let m = stub(9, IrrepsDict::new(), &[("z", "0e")]);
        let err = seq.insert("b", m, &Anchor::After("a".into())).unwrap_err();
        assert!(matches!(err, Error::DuplicateModule(ref name) if name == "b"));
        assert_eq!(seq.len(), 3);
        assert_eq!(seq.irreps(), &before);
        assert!(seq.get("c").unwrap().irreps_in().get("z").is_none());
    }

    #[test]
    fn insert_with_unknown_anchor_is_a_key_error() {
        let mut seq = chain();
        let m = stub(9, IrrepsDict::new(), &[]);
        let err = seq.insert("m", m, &Anchor::After("missing".into())).unwrap_err();
        assert!(matches!(err, Error::UnknownModule(ref name) if name == "missing"));
        assert_eq!(err.kind(), ErrorKind::Key);
    }

    #[test]
    fn insert_conflicting_with_right_neighbor_leaves_sequence_unchanged() {
        let mut seq = chain();
        let m = stub(9, IrrepsDict::new(), &[("a", "1o")]);
        let err = seq.insert("m", m, &Anchor::Before("b".into())).unwrap_err();
        assert!(matches!(err, Error::Incompatible { .. }));
        assert_eq!(seq.len(), 3);
        assert!(seq.get("m").is_none());
        assert_eq!(seq.get("b").unwrap().irreps_in().typed("a"), irreps("0e").as_ref());
    }

    #[test]
    fn insert_rejects_conflict_created_by_propagation() {
        let a = stub(0, IrrepsDict::new(), &[]);
        let b = stub(1, IrrepsDict::new(), &[]);
        let c = stub(2, sig(&[("f", "1o")]), &[]);
        let mut seq = SequentialGraphNetwork::new(vec![
            ("a".into(), a),
            ("b".into(), b),
            ("c".into(), c),
        ])
        .unwrap();

        let m = stub(9, IrrepsDict::new(), &[("f", "0e")]);
        let err = seq.insert("m", m, &Anchor::After("a".into())).unwrap_err();

        assert!(matches!(err, Error::Incompatible { .. }));
        assert!(seq.get("b").unwrap().irreps_out().get("f").is_none());
    }

    #[test]
    fn anchor_requires_exactly_one_name() {
        assert!(matches!(Anchor::from_options(Some("a"), Some("b")), Err(Error::Configuration(_))));
        assert!(matches!(Anchor::from_options(None, None), Err(Error::Configuration(_))));
        assert_eq!(Anchor::from_options(None, Some("b")).unwrap(), Anchor::Before("b".into()));
    }

    #[test]
    fn forward_applies_modules_in_order() {
        let mut seq = chain();
        let m = stub(9, seq.get("a").unwrap().irreps_out().clone(), &[]);
        seq.insert("m", m, &Anchor::After("a".into())).unwrap();

        let data = AtomicData::from_graph(&[[0.0; 3]], vec![0], vec![]);
        let out = seq.forward(data).unwrap();
        assert_eq!(out.indices(TRACE), Some(&[0, 9, 1, 2][..]));
        assert!(out.contains(crate::irreps::fields::POSITIONS_KEY));
    }

    fn build_emitter(args: Arguments) -> Result<Box<dyn GraphModule>> {
        let field: String = args.require("field")?;
        let spec = IrrepsSpec::new(args.irreps_in()?).produces(&field, args.irreps("irreps")?);
        Ok(Box::new(Stub {
            tag: 0,
            irreps: ModuleIrreps::init("Stub", spec)?,
        }))
    }

    static EMITTER: LayerBuilder = LayerBuilder {
        name: "Emitter",
        params: &[
            Param::optional("irreps_in"),
            Param::required("field"),
            Param::optional("irreps"),
        ],
        func: build_emitter,
    };

    #[test]
    fn from_parameters_threads_signatures_and_scopes() {
        let shared = Config::from_toml_str(
            r#"
            irreps = "0e"
            second_irreps = "2x1o"
            "#,
        )
        .unwrap();
        let layers = vec![
            ("first".to_string(), LayerSpec::new(EMITTER).with("field", "u")),
            ("second".to_string(), LayerSpec::new(EMITTER).with("field", "v")),
        ];

        let seq = SequentialGraphNetwork::from_parameters(&shared, layers, None).unwrap();

        assert_eq!(seq.irreps_out().typed("u"), irreps("0e").as_ref());
        assert_eq!(seq.irreps_out().typed("v"), irreps("2x1o").as_ref());
        assert!(seq.get("second").unwrap().irreps_in().contains("u"));
        assert!(shared.unused_keys().is_empty());
    }

    #[test]
    fn append_from_parameters_consumes_tail_signature() {
        let shared = Config::new();
        let mut seq = chain();
        seq.append_from_parameters(&shared, "d", LayerSpec::new(EMITTER).with("field", "w"))
            .unwrap();
        let d = seq.get("d").unwrap();
        assert!(d.irreps_in().contains("f"));
        assert_eq!(d.irreps_out().get("w"), Some(None));
    }

    #[test]
    fn insert_from_parameters_uses_left_neighbor() {
        let shared = Config::new();
        let mut seq = chain();
        let spec = LayerSpec::new(EMITTER).with("field", "w").with("irreps", "1e");
        seq.insert_from_parameters(&shared, "m", spec, &Anchor::Before("c".into()))
            .unwrap();
        let m = seq.get("m").unwrap();
        assert!(m.irreps_in().contains("b"));
        assert_eq!(seq.get("c").unwrap().irreps_out().typed("w"), irreps("1e").as_ref());
    }
}
