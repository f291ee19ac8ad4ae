use std::io::{self, Write};

use anyhow::Error;
use equiforge::Error as ModelError;

use crate::util::text::wrap;

#[rustfmt::skip]
pub fn print_error(err: &Error) {
    let mut stderr = io::stderr().lock();

    let _ = writeln!(stderr);
    let _ = writeln!(stderr, "   ╔══════════════════════════════════════════════════════════════╗");
    let _ = writeln!(stderr, "   ║  ✗ Error                                                     ║");
    let _ = writeln!(stderr, "   ╟──────────────────────────────────────────────────────────────╢");

    for line in wrap(&err.to_string(), 59) {
        let _ = writeln!(stderr, "   ║  {:<59} ║", line);
    }

    for cause in err.chain().skip(1) {
        let _ = writeln!(stderr, "   ╟──────────────────────────────────────────────────────────────╢");
        let _ = writeln!(stderr, "   ║  Caused by:                                                  ║");
        for line in wrap(&cause.to_string(), 57) {
            let _ = writeln!(stderr, "   ║    {:<57} ║", line);
        }
    }

    let hints = HintCollector::collect(err);
    if !hints.is_empty() {
        let _ = writeln!(stderr, "   ╟──────────────────────────────────────────────────────────────╢");
        let _ = writeln!(stderr, "   ║  Hints:                                                      ║");
        for hint in hints {
            let wrapped = wrap(&hint, 55);
            if let Some((first, rest)) = wrapped.split_first() {
                let _ = writeln!(stderr, "   ║    • {:<55} ║", first);
                for line in rest {
                    let _ = writeln!(stderr, "   ║      {:<55} ║", line);
                }
            }
        }
    }

    let _ = writeln!(stderr, "   ╚══════════════════════════════════════════════════════════════╝");
    let _ = writeln!(stderr);
}

#[derive(Default)]
struct HintCollector {
    hints: Vec<String>,
}

impl HintCollector {
    fn collect(err: &Error) -> Vec<String> {
        let mut collector = Self::default();

        if let Some(model_err) = err.downcast_ref::<ModelError>() {
            collector.collect_model_hints(model_err);
        } else if let Some(io_err) = err.downcast_ref::<io::Error>() {
            collector.collect_io_hints(io_err);
        }

        collector.hints
    }

    fn add(&mut self, hint: impl Into<String>) {
        self.hints.push(hint.into());
    }

    fn collect_model_hints(&mut self, err: &ModelError) {
        match err {
            ModelError::MissingParameter { parameter, prefix } => {
                self.add(format!("Set `{}` at the top level of the config", parameter));
                if !prefix.is_empty() {
                    self.add(format!(
                        "Or set `{}_{}` to apply it to this layer only",
                        prefix, parameter
                    ));
                }
            }

            ModelError::IrrepsMismatch { field, .. } => {
                self.add(format!(
                    "An earlier layer produces `{}` with different irreps",
                    field
                ));
                self.add("Check the `<layer>_irreps_out` overrides feeding this field");
            }

            ModelError::MissingField { field, .. } => {
                self.add(format!("No earlier layer produces the field `{}`", field));
                self.add("Reorder the layers or add one that produces it");
            }

            ModelError::Incompatible { .. } => {
                self.add("Adjacent layers disagree on the irreps of a shared field");
                self.add("Run with -v to see the signature of each layer");
            }

            ModelError::InconsistentConfig { key, .. } => {
                self.add(format!(
                    "Remove `{}` from the config and let it be derived",
                    key
                ));
                self.add("Or make it agree with the configured species");
            }

            ModelError::Unresolved { .. } => {
                self.add("Run `eqforge builders` to list the registered names");
                self.add("Names can be short (EnergyModel) or fully qualified");
            }

            ModelError::TypeMapperUnconfigured => {
                self.add("Set exactly one of type_names, chemical_symbols, chemical_symbol_to_type");
            }

            ModelError::ModelNotAvailable { .. }
            | ModelError::ModelNotAccepted { .. }
            | ModelError::ModelRequestedByFirst { .. } => {
                self.add("Check the order of `model_builders`");
                self.add("The first builder must create the model and every later one must take it");
            }

            ModelError::ConfigParse(_) => {
                self.add("The configuration file is not valid TOML");
                self.add("Check for missing quotes, brackets, or commas");
            }

            ModelError::IrrepsParse(_) => {
                self.add("Irreps are written like \"16x0e + 8x1o\"");
            }

            ModelError::Io(source) => self.collect_io_hints(source),

            ModelError::Configuration(_)
            | ModelError::ReservedField { .. }
            | ModelError::Type(_)
            | ModelError::UnknownModule(_)
            | ModelError::DuplicateModule(_)
            | ModelError::Forward { .. } => {
                self.add("Run with -v to see each builder and resolved parameter");
            }
        }
    }

    fn collect_io_hints(&mut self, source: &io::Error) {
        match source.kind() {
            io::ErrorKind::NotFound => {
                self.add("Configuration file not found");
                self.add("Check the path, or pass --example to use the bundled config");
            }

            io::ErrorKind::PermissionDenied => {
                self.add("Permission denied reading the configuration");
                self.add("Check file permissions with `ls -la`");
            }

            io::ErrorKind::InvalidData => {
                self.add("The configuration is not valid UTF-8 text");
            }

            _ => {
                self.add("Reading the configuration failed");
            }
        }
    }
}
