//! # oldies-cli
//!
//! Command-line front end for [`oldies_copasi`]: load an SBML-shaped
//! model, integrate it, and stream its trajectory as CSV.
//!
//! ```bash
//! # Run one of the bundled example models
//! oldies copasi exponential-decay --duration 20 --step-interval 0.5
//!
//! # Run a model loaded from a JSON-serialized SbmlModel
//! oldies copasi model.json --duration 100 --output species:A --output parameter:k
//!
//! # List what's available
//! oldies list
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use dialoguer::{theme::ColorfulTheme, FuzzySelect, Input};
use oldies_copasi::config::{FieldKind, OutputField, RunConfiguration};
use oldies_copasi::{CsvObserver, Driver, ModelView, SbmlModel};
use std::io;

/// A handful of models bundled with `oldies-copasi` so the CLI is useful
/// without an external SBML-to-JSON pipeline.
const BUILTIN_MODELS: &[&str] = &["exponential-decay", "michaelis-menten", "repressilator"];

#[derive(Parser)]
#[command(name = "oldies")]
#[command(author, version, about = "SBML reaction-network ODE trajectory simulator")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Integrate an SBML-shaped model and stream its trajectory as CSV.
    Copasi {
        /// A JSON-serialized SbmlModel file, or the name of a bundled
        /// example model (see `oldies list`).
        model: String,

        #[arg(long, default_value_t = 0.0)]
        start: f64,
        #[arg(long, default_value_t = 10.0)]
        duration: f64,
        #[arg(long, default_value_t = 0.1)]
        step_interval: f64,
        #[arg(long, default_value_t = 1e-6)]
        rtol: f64,
        #[arg(long, default_value_t = 1e-9)]
        atol: f64,
        /// A CSV column to emit, as `species:ID`, `compartment:ID`, or
        /// `parameter:ID`. Repeatable; defaults to every species.
        #[arg(long = "output", value_parser = parse_output_field)]
        output: Vec<OutputField>,
    },

    /// List the bundled example models.
    List,

    /// Prompt for a model and run configuration interactively.
    Interactive,
}

fn main() {
    tracing_subscriber::fmt().with_writer(io::stderr).without_time().init();

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Interactive);

    if let Err(err) = run(command) {
        tracing::error!("{err:#}");
        std::process::exit(1);
    }
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Copasi { model, start, duration, step_interval, rtol, atol, output } => {
            let model = load_model(&model)?;
            let config = RunConfiguration {
                start,
                duration,
                step_interval,
                relative_tolerance: rtol,
                absolute_tolerance: atol,
                output_fields: output,
            };
            run_copasi(model, &config)
        }
        Commands::List => {
            show_list();
            Ok(())
        }
        Commands::Interactive => run_interactive(),
    }
}

fn run_copasi(model: SbmlModel, config: &RunConfiguration) -> Result<()> {
    let view = ModelView::new(model).context("building model view")?;
    let stdout = io::stdout();
    let mut observer = CsvObserver::new(stdout.lock(), &view, config.output_fields.clone());
    Driver::new(&view).run(config, &mut observer).context("integrating model")?;
    Ok(())
}

/// Loads either a bundled example model by name or a JSON-serialized
/// `SbmlModel` from disk.
fn load_model(model: &str) -> Result<SbmlModel> {
    match model {
        "exponential-decay" => Ok(oldies_copasi::models::exponential_decay()),
        "michaelis-menten" => Ok(oldies_copasi::models::michaelis_menten()),
        "repressilator" => Ok(oldies_copasi::models::repressilator()),
        path => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading model file '{path}'"))?;
            serde_json::from_str(&text).with_context(|| format!("parsing model file '{path}'"))
        }
    }
}

fn parse_output_field(s: &str) -> std::result::Result<OutputField, String> {
    let (kind, id) = s
        .split_once(':')
        .ok_or_else(|| format!("expected 'kind:id' (e.g. 'species:A'), got '{s}'"))?;
    let kind = match kind.to_ascii_lowercase().as_str() {
        "species" | "s" => FieldKind::Species,
        "compartment" | "c" => FieldKind::Compartment,
        "parameter" | "p" => FieldKind::Parameter,
        other => return Err(format!("unknown output kind '{other}'")),
    };
    if id.is_empty() {
        return Err(format!("empty id in output field '{s}'"));
    }
    Ok(OutputField { kind, id: id.to_string() })
}

fn show_list() {
    println!("{}", style("oldies copasi").cyan().bold());
    println!("  SBML reaction-network ODE trajectory simulator (adaptive Dormand-Prince 5(4))");
    println!();
    println!("{}", style("Bundled example models:").bold());
    for name in BUILTIN_MODELS {
        println!("  {} {name}", style("•").dim());
    }
    println!();
    println!("Run one with: oldies copasi <name> --duration <seconds>");
}

fn run_interactive() -> Result<()> {
    let theme = ColorfulTheme::default();
    println!("{}", style("oldies copasi — interactive").cyan().bold());

    loop {
        let options = [
            "Run a bundled example model",
            "Run a model from a JSON file",
            "List bundled models",
            "Exit",
        ];
        let selection =
            FuzzySelect::with_theme(&theme).with_prompt("What next?").items(&options).default(0).interact()?;

        match selection {
            0 => {
                let model_idx = FuzzySelect::with_theme(&theme)
                    .with_prompt("Which model?")
                    .items(BUILTIN_MODELS)
                    .default(0)
                    .interact()?;
                let duration: f64 =
                    Input::with_theme(&theme).with_prompt("duration").default(10.0).interact_text()?;
                let model = load_model(BUILTIN_MODELS[model_idx])?;
                let config = RunConfiguration { duration, ..RunConfiguration::default() };
                run_copasi(model, &config)?;
            }
            1 => {
                let path: String =
                    Input::with_theme(&theme).with_prompt("Model JSON path").interact_text()?;
                let duration: f64 =
                    Input::with_theme(&theme).with_prompt("duration").default(10.0).interact_text()?;
                let model = load_model(&path)?;
                let config = RunConfiguration { duration, ..RunConfiguration::default() };
                run_copasi(model, &config)?;
            }
            2 => show_list(),
            3 => {
                println!("Goodbye!");
                break;
            }
            _ => unreachable!(),
        }
        println!();
    }

    Ok(())
}
