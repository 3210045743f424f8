//! propcalc CLI - evaluate formulas and run JSON models

mod model;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use model::{parse_scalar, Model};
use propcalc::prelude::*;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "propcalc")]
#[command(author, version, about = "Formula evaluation over object properties")]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a single formula and print the result
    Eval {
        /// Formula text
        formula: String,

        /// Model whose variables the formula may reference
        #[arg(short, long)]
        model: Option<PathBuf>,

        /// Variable that `.property` paths refer to
        #[arg(short, long)]
        relative: Option<String>,
    },

    /// Compute every formula of a model, apply changes, and recompute
    Run {
        /// Model file (JSON)
        model: PathBuf,

        /// Property change applied after the first pass (KEY=VALUE)
        #[arg(short, long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,

        /// Refresh formula sources before each read
        #[arg(long)]
        live: bool,
    },

    /// Show how the formulas of a model are scheduled
    Plan {
        /// Model file (JSON)
        model: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Eval {
            formula,
            model,
            relative,
        } => eval(&formula, model.as_deref(), relative.as_deref()),
        Commands::Run { model, set, live } => run(&model, &set, live),
        Commands::Plan { model } => show_plan(&model),
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "propcalc=debug,propcalc_formula=debug",
        _ => "propcalc=trace,propcalc_formula=trace",
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(fmt::layer().with_writer(io::stderr))
        .init();
}

fn eval(formula: &str, model: Option<&Path>, relative: Option<&str>) -> Result<()> {
    let calc = match model {
        Some(path) => {
            let model = Model::load(path)?;
            let (calc, _records) = model.build(model.options())?;
            calc
        }
        None => Calculator::new(),
    };

    let value = calc
        .compute(formula, relative)
        .with_context(|| format!("Failed to evaluate '{}'", formula))?;
    println!("{}", value);
    Ok(())
}

fn run(path: &Path, changes: &[String], live: bool) -> Result<()> {
    let model = Model::load(path)?;
    let mut options = model.options();
    options.live_update |= live;
    let (mut calc, _records) = model.build(options)?;

    calc.optimize();
    let initial = calc.recompute_all();
    tracing::info!(formulas = initial, "initial pass finished");

    for change in changes {
        let Some((key, raw)) = change.split_once('=') else {
            bail!("Expected KEY=VALUE, got '{}'", change);
        };
        let key = key.trim();
        calc.assign_value(key, parse_scalar(raw))
            .with_context(|| format!("Failed to set '{}'", key))?;
    }
    let recomputed = calc.recompute();

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for key in calc.expression_keys() {
        let value = read_property(&calc, &key)?;
        writeln!(out, "{} = {}", key, value)?;
    }
    writeln!(out, "recomputed: {}", recomputed)?;

    report_errors(&calc);
    Ok(())
}

fn show_plan(path: &Path) -> Result<()> {
    let model = Model::load(path)?;
    let (mut calc, _records) = model.build(model.options())?;
    let plan = calc.optimize();

    let stdout = io::stdout();
    let mut out = stdout.lock();

    writeln!(out, "Not optimizable:")?;
    for key in &plan.not_optimizable {
        writeln!(out, "  {}", key)?;
    }
    writeln!(out, "Object references:")?;
    for key in &plan.object_references {
        writeln!(out, "  {}", key)?;
    }
    writeln!(out, "Event graph:")?;
    for (key, formulas) in &plan.event_graph {
        let formulas: Vec<&str> = formulas.iter().map(String::as_str).collect();
        writeln!(out, "  {} -> {}", key, formulas.join(", "))?;
    }
    Ok(())
}

/// Read the property a formula writes to
fn read_property(calc: &Calculator, key: &str) -> Result<Value> {
    let separator = calc.options().separator;
    let (name, property) = key
        .split_once(separator)
        .with_context(|| format!("Key '{}' names no property", key))?;
    let variable = calc
        .variable(name)
        .with_context(|| format!("Variable '{}' not found", name))?;
    variable
        .get_property(property)
        .with_context(|| format!("Failed to read '{}'", key))
}

fn report_errors(calc: &Calculator) {
    let errors = calc.exceptions().take();
    if errors.is_empty() {
        return;
    }
    eprintln!("{} formula error(s):", errors.len());
    for error in errors {
        eprintln!("  {}", error);
    }
}
