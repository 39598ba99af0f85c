use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use labplan::{
    about,
    config::{DEFAULT_CONFIG_PATH, PlannerConfig},
    project, table,
};
use labplan_engine::{Engine, OpResult, Operation, PlanState, PlanningEngine, Workflow};
use serde::Serialize;
use std::{fs, path::PathBuf};

const DEFAULT_STATE_PATH: &str = ".labplan_state.json";
const DEFAULT_UNITS_PATH: &str = "units.csv";
const DEFAULT_LIBRARIES_PATH: &str = "libraries.csv";

#[derive(Parser)]
#[command(name = "labplan_cli")]
#[command(about = "Sequencing chip and library layout planner")]
#[command(disable_version_flag = true)]
struct Cli {
    /// Planning state file
    #[arg(long, global = true, default_value = DEFAULT_STATE_PATH)]
    state: String,

    /// Site configuration (TOML)
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Print version and build
    #[arg(short = 'V', long)]
    version: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Read the input sheet and reference tables into a fresh state
    Init {
        /// Input sheet (CSV)
        input: PathBuf,
    },
    /// Plan chips and write the editable chip table
    PlanUnits {
        #[arg(short, long, default_value = DEFAULT_UNITS_PATH)]
        output: PathBuf,
    },
    /// Lay out samples and controls on the chips and write the library table
    PlanLibraries {
        /// Edited chip table to use instead of the planned one
        #[arg(long)]
        units: Option<PathBuf>,
        /// Seed for the rpm draws
        #[arg(long)]
        seed: Option<u64>,
        #[arg(short, long, default_value = DEFAULT_LIBRARIES_PATH)]
        output: PathBuf,
    },
    /// Apply one operation (JSON, or @file.json)
    Op { json: String },
    /// Apply a workflow (JSON, or @file.json)
    Workflow { json: String },
    StateSummary,
    Capabilities,
}

fn load_json_arg(value: &str) -> Result<String> {
    if let Some(path) = value.strip_prefix('@') {
        fs::read_to_string(path).with_context(|| format!("Could not read JSON file '{path}'"))
    } else {
        Ok(value.to_string())
    }
}

fn load_state(path: &str) -> Result<PlanState> {
    if std::path::Path::new(path).exists() {
        Ok(PlanState::load_from_path(path)?)
    } else {
        Ok(PlanState::default())
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text =
        serde_json::to_string_pretty(value).context("Could not serialize JSON output")?;
    println!("{text}");
    Ok(())
}

fn report(result: &OpResult) {
    for msg in &result.messages {
        println!("{msg}");
    }
    for warning in &result.warnings {
        eprintln!("warning: {warning}");
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(e) = run() {
        eprintln!("{e:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    if cli.version {
        println!("{}", about::version_cli_text());
        return Ok(());
    }
    let Some(command) = cli.command else {
        return Err(anyhow!("Missing command, see --help"));
    };
    let config = PlannerConfig::load_or_default(&cli.config)?;

    match command {
        Command::Capabilities => print_json(&PlanningEngine::capabilities()),
        Command::Init { input } => {
            let state = project::assemble_from_path(&input, &config)?;
            state.save_to_path(&cli.state)?;
            println!(
                "Read {} sample(s) and {} sequencer(s) from '{}' into '{}'",
                state.inputs.samples.len(),
                state.inputs.instruments.len(),
                input.display(),
                cli.state
            );
            Ok(())
        }
        Command::PlanUnits { output } => {
            let mut engine = PlanningEngine::from_state(load_state(&cli.state)?);
            let result = engine.apply(Operation::PlanUnits)?;
            report(&result);
            table::write_units(
                &output,
                &engine.state().units,
                config.templates.units.as_deref(),
            )?;
            engine.state().save_to_path(&cli.state)?;
            Ok(())
        }
        Command::PlanLibraries {
            units,
            seed,
            output,
        } => {
            let mut engine = PlanningEngine::from_state(load_state(&cli.state)?);
            if let Some(path) = units {
                let edited = table::read_units(&path)?;
                report(&engine.apply(Operation::ReplaceUnits { units: edited })?);
            }
            let result = engine.apply(Operation::PlanLibraries { seed })?;
            report(&result);
            table::write_libraries(
                &output,
                &engine.state().libraries,
                config.templates.libraries.as_deref(),
            )?;
            engine.state().save_to_path(&cli.state)?;
            Ok(())
        }
        Command::Op { json } => {
            let text = load_json_arg(&json)?;
            let op: Operation =
                serde_json::from_str(&text).context("Invalid operation JSON")?;
            let mut engine = PlanningEngine::from_state(load_state(&cli.state)?);
            let result = engine.apply(op)?;
            engine.state().save_to_path(&cli.state)?;
            print_json(&result)
        }
        Command::Workflow { json } => {
            let text = load_json_arg(&json)?;
            let wf: Workflow = serde_json::from_str(&text).context("Invalid workflow JSON")?;
            let mut engine = PlanningEngine::from_state(load_state(&cli.state)?);
            let results = engine.apply_workflow(wf)?;
            engine.state().save_to_path(&cli.state)?;
            print_json(&results)
        }
        Command::StateSummary => {
            let state = load_state(&cli.state)?;
            print_json(&state.summary())
        }
    }
}
