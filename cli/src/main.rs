use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use colored::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use treesweeper::logging::{init_logging, LoggingConfig};
use treesweeper::sweeper::ChecksSection;
use treesweeper::tree::{Key, MemoryForest, NodeId, Value};
use treesweeper::{
    DetectionFamily, EnableOptions, IssueKind, IssueRenderer, Sweeper, SweeperConfig,
};

#[derive(Parser)]
#[command(name = "treesweeper")]
#[command(author, version, about = "Check JSON documents against reactive tree invariants")]
#[command(after_help = "Examples:
  treesweeper check doc.json                       Sweep a document with the default checks
  treesweeper check doc.json --ops edits.json      Replay edits and report what they broke
  treesweeper check doc.json --enable rootMismatch Add an on-demand check
  treesweeper config -c sweeper.toml               Show the checks a config file enables
  treesweeper kinds                                List every issue kind")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a JSON document as a tree and report issues
    Check(CheckArgs),
    /// Print the effective [checks] table as TOML
    Config(ConfigArgs),
    /// List the known issue kinds
    Kinds,
}

#[derive(clap::Args)]
struct ConfigArgs {
    /// TOML configuration with a [checks] table
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Start from every kind enabled, readable kinds reactively
    #[arg(long, conflicts_with = "config")]
    all_checks: bool,
}

/// Output layout of `treesweeper config`, readable back by `--config`.
#[derive(Serialize)]
struct ConfigDocument {
    checks: ChecksSection,
}

#[derive(clap::Args)]
struct CheckArgs {
    /// JSON document to load
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// JSON list of edits to apply after attaching
    #[arg(long, value_name = "FILE")]
    ops: Option<PathBuf>,

    /// TOML configuration with a [checks] table
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable a kind; suffix with :reactive or :on-demand for readable kinds
    #[arg(long, value_name = "KIND[:MODE]")]
    enable: Vec<String>,

    /// Disable a kind
    #[arg(long, value_name = "KIND")]
    disable: Vec<String>,

    /// Start from every kind enabled, readable kinds reactively
    #[arg(long, conflicts_with = "config")]
    all_checks: bool,

    /// Start from an empty configuration
    #[arg(long)]
    disable_all: bool,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// One edit applied to the loaded tree. `path` leads from the root to the
/// node being edited.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
enum Operation {
    Assign {
        #[serde(default)]
        path: Vec<Key>,
        value: serde_json::Value,
    },
    Set {
        #[serde(default)]
        path: Vec<Key>,
        key: Key,
        value: serde_json::Value,
    },
    Push {
        #[serde(default)]
        path: Vec<Key>,
        value: serde_json::Value,
    },
    Remove {
        #[serde(default)]
        path: Vec<Key>,
        key: Key,
    },
    InjectRaw {
        #[serde(default)]
        path: Vec<Key>,
        key: Key,
        value: serde_json::Value,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(LoggingConfig::from_verbosity(cli.verbose));

    let result = match cli.command {
        Commands::Check(args) => run_check(&args),
        Commands::Config(args) => show_config(&args).map(|()| true),
        Commands::Kinds => {
            list_kinds();
            Ok(true)
        }
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red(), e);
            ExitCode::from(2)
        }
    }
}

/// Returns whether the document came out clean.
fn run_check(args: &CheckArgs) -> Result<bool> {
    let document = read_json(&args.file)?;
    let mut forest = MemoryForest::new();
    let root = forest.conjure(Value::from(document));

    let config = base_config(args.config.as_deref(), args.all_checks)?;
    let mut sweeper = Sweeper::with_config(config)?;
    sweeper.attach(&mut forest, root);

    if args.disable_all {
        sweeper.disable_all(&mut forest);
    }
    for name in &args.disable {
        sweeper.disable_named(&mut forest, name)?;
    }
    for requested in &args.enable {
        let (name, options) = parse_enable(requested)?;
        sweeper
            .enable_named(&mut forest, name, options)
            .with_context(|| format!("Cannot enable {}", requested))?;
    }

    if let Some(ops_path) = &args.ops {
        let ops: Vec<Operation> = serde_json::from_value(read_json(ops_path)?)
            .with_context(|| format!("Invalid operations in {}", ops_path.display()))?;
        for (i, op) in ops.into_iter().enumerate() {
            apply(&mut forest, root, op).with_context(|| format!("Operation {} failed", i))?;
        }
    }

    let issues = sweeper.report(&forest, None);
    sweeper.detach_all(&mut forest);

    match args.format {
        OutputFormat::Text => {
            let renderer = IssueRenderer::new().with_color(!args.no_color);
            println!("{}", renderer.render_report(&issues));
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&issues)?);
        }
    }
    Ok(issues.is_empty())
}

fn base_config(path: Option<&Path>, all_checks: bool) -> Result<SweeperConfig> {
    match path {
        Some(path) => SweeperConfig::load(path)
            .with_context(|| format!("Failed to load config: {}", path.display())),
        None if all_checks => Ok(SweeperConfig::all()),
        None => Ok(SweeperConfig::default()),
    }
}

fn show_config(args: &ConfigArgs) -> Result<()> {
    let config = base_config(args.config.as_deref(), args.all_checks)?;
    let document = ConfigDocument {
        checks: config.to_checks(),
    };
    print!("{}", toml::to_string(&document)?);
    Ok(())
}

fn read_json(path: &Path) -> Result<serde_json::Value> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {}", path.display()))
}

fn parse_enable(requested: &str) -> Result<(&str, EnableOptions)> {
    match requested.split_once(':') {
        None => Ok((requested, EnableOptions::default())),
        Some((name, "reactive")) => Ok((name, EnableOptions::reactive())),
        Some((name, "on-demand")) => Ok((name, EnableOptions::on_demand())),
        Some((_, mode)) => anyhow::bail!("Unknown mode '{}' (expected reactive or on-demand)", mode),
    }
}

fn resolve(forest: &MemoryForest, root: NodeId, path: &[Key]) -> Result<NodeId> {
    forest.descend(root, path).with_context(|| {
        let shown: Vec<String> = path.iter().map(ToString::to_string).collect();
        format!("No node at path [{}]", shown.join(", "))
    })
}

fn apply(forest: &mut MemoryForest, root: NodeId, op: Operation) -> Result<()> {
    match op {
        Operation::Assign { path, value } => {
            let node = resolve(forest, root, &path)?;
            forest.assign(node, Value::from(value))?;
        }
        Operation::Set { path, key, value } => {
            let node = resolve(forest, root, &path)?;
            forest.set(node, key, Value::from(value))?;
        }
        Operation::Push { path, value } => {
            let node = resolve(forest, root, &path)?;
            forest.push(node, Value::from(value))?;
        }
        Operation::Remove { path, key } => {
            let node = resolve(forest, root, &path)?;
            forest.remove(node, key)?;
        }
        Operation::InjectRaw { path, key, value } => {
            let node = resolve(forest, root, &path)?;
            forest.inject_raw(node, key, Value::from(value))?;
        }
    }
    Ok(())
}

fn list_kinds() {
    let defaults = SweeperConfig::default();
    for kind in IssueKind::ALL {
        let mode = if defaults.type_change.contains(&kind) || defaults.readable.contains(&kind) {
            "reactive".green()
        } else if defaults.report.contains(&kind) {
            "on-demand".blue()
        } else {
            "off".dimmed()
        };
        let family = match kind.family() {
            DetectionFamily::TypeChange => "typeChange".yellow(),
            DetectionFamily::Readable => "readable".red(),
            DetectionFamily::Report => "report".blue(),
        };
        println!(
            "{:<30} {:<11} {:<10} {}",
            kind.name().bold(),
            family,
            mode,
            kind.summary()
        );
    }
}
