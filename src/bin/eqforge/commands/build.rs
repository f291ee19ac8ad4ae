use std::path::Path;

use anyhow::{Context, Result};
use equiforge::{Config, GraphModule, Registry, model_from_config};

use crate::cli::BuildArgs;
use crate::display::{
    Context as DisplayContext, Progress, print_config_summary, print_model, print_signature,
};

const TOTAL_STEPS: usize = 2;

const EXAMPLE_CONFIG: &str = include_str!("../../../../resources/example.config.toml");

pub fn run_build(args: BuildArgs, ctx: DisplayContext) -> Result<()> {
    let mut progress = Progress::new(ctx.interactive, TOTAL_STEPS);

    progress.step("Loading configuration");
    let (mut config, source) = load_config(&args)?;
    let builders = config
        .model_builders()
        .context("Invalid `model_builders` list")?;
    progress.complete_step("Loading configuration", &[format!("Read {}", source)]);

    if ctx.interactive {
        print_config_summary(&[
            ("Source", source.clone()),
            ("Builders", builders.len().to_string()),
            ("Keys", config.keys().count().to_string()),
            ("Initialize", args.initialize.to_string()),
            ("Deploy", args.deploy.to_string()),
        ]);
    }

    progress.step("Running model builders");
    let registry = Registry::with_defaults();
    let model = model_from_config(&mut config, &registry, args.initialize, args.deploy)
        .with_context(|| format!("Failed to build model from {}", source))?;
    let substeps: Vec<String> = builders.iter().map(|b| format!("Ran {}", b)).collect();
    progress.complete_step("Running model builders", &substeps);

    for key in config.unused_keys() {
        log::warn!("config key `{}` was not used by any builder or layer", key);
    }

    let Some(model) = model else {
        log::warn!("no builder returned a model");
        progress.finish("Configuration processed");
        return Ok(());
    };

    if ctx.interactive {
        print_model(model.as_ref());
        print_signature("Model Inputs", model.irreps_in());
        print_signature("Model Outputs", model.irreps_out());
    } else {
        print_plain(model.as_ref());
    }

    progress.finish("Model built");
    Ok(())
}

fn load_config(args: &BuildArgs) -> Result<(Config, String)> {
    match &args.config {
        Some(path) => {
            let config = Config::from_path(path)
                .with_context(|| format!("Failed to load configuration {}", path.display()))?;
            Ok((config, display_name(path)))
        }
        None => {
            let config = Config::from_toml_str(EXAMPLE_CONFIG)
                .context("Bundled example configuration is invalid")?;
            Ok((config, "example config".to_string()))
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// One `name<TAB>module` line per layer, for scripting.
fn print_plain(model: &dyn GraphModule) {
    match model.as_sequential() {
        Some(seq) => {
            for (name, module) in seq.iter() {
                println!("{}\t{}", name, module.type_name());
            }
        }
        None => println!("{}", model.type_name()),
    }
    println!("irreps_out\t{}", model.irreps_out());
}
