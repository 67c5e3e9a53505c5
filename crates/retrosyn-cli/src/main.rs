//! Retrosyn CLI
//!
//! Command-line interface for:
//! - Building a derivation tree for a target from extracted reaction records
//! - Enumerating the minimal reaction pathways stored in a tree snapshot
//! - Exporting trees as Graphviz DOT and reaction summaries
//! - Querying the substance availability oracle directly

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use retrosyn_core::{
    parse_extraction_results, parse_reaction_blocks, AvailabilityOracle, CachedOracle,
    DerivationTree, DotOptions, EnumerationLimits, ReactionKey, ReactionSet, TreeError,
};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod config;
#[cfg(feature = "pubchem")]
mod pubchem;

use config::RetrosynConfig;

#[derive(Parser)]
#[command(name = "retrosyn")]
#[command(author, version, about = "Retrosynthesis trees from extracted reaction records")]
struct Cli {
    /// Debug logging (overrides RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON configuration file; RETROSYN_* environment variables override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum RecordFormat {
    /// `{key: {reactants, products, conditions, source}}`
    Json,
    /// `Reaction idx: / Reactants: / Products: / Conditions: / Source:` blocks
    Text,
    /// `{source: [reactions_text, properties_text]}` extraction output
    Results,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the derivation tree for a target and save it.
    Build {
        /// Reaction records file
        records: PathBuf,
        /// Target substance
        #[arg(short, long)]
        target: String,
        #[arg(long, value_enum, default_value_t = RecordFormat::Json)]
        format: RecordFormat,
        /// Output tree file (`.json` for JSON, anything else binary)
        #[arg(short, long, default_value = "tree.rstr")]
        out: PathBuf,
    },

    /// Enumerate the minimal pathways of a saved tree.
    Paths {
        tree: PathBuf,
        /// Print pathways as a JSON array
        #[arg(long)]
        json: bool,
        /// Abort once this many partial pathways have been built
        #[arg(long)]
        max_partial: Option<usize>,
    },

    /// Export a saved tree as Graphviz DOT.
    Render {
        tree: PathBuf,
        /// Unlabeled nodes
        #[arg(long)]
        simple: bool,
        #[arg(long)]
        dpi: Option<u32>,
        /// Output file (stdout if omitted)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Print the reactions used by a saved tree.
    Reactions {
        tree: PathBuf,
        /// Only these reaction keys (comma separated)
        #[arg(long, value_delimiter = ',')]
        keys: Vec<String>,
    },

    /// Print tree statistics.
    Stats {
        tree: PathBuf,
        #[arg(long)]
        json: bool,
        #[arg(long)]
        max_partial: Option<usize>,
    },

    /// Ask the availability oracle about substances.
    Check {
        #[arg(required = true)]
        names: Vec<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Build {
            records,
            target,
            format,
            out,
        } => {
            let config = RetrosynConfig::load(cli.config.as_deref())?;
            cmd_build(&config, &records, &target, format, &out)?;
        }
        Commands::Paths {
            tree,
            json,
            max_partial,
        } => cmd_paths(&tree, json, limits(max_partial))?,
        Commands::Render {
            tree,
            simple,
            dpi,
            out,
        } => cmd_render(&tree, DotOptions { simple, dpi }, out.as_deref())?,
        Commands::Reactions { tree, keys } => cmd_reactions(&tree, &keys)?,
        Commands::Stats {
            tree,
            json,
            max_partial,
        } => cmd_stats(&tree, json, limits(max_partial))?,
        Commands::Check { names } => {
            let config = RetrosynConfig::load(cli.config.as_deref())?;
            cmd_check(&config, &names)?;
        }
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn limits(max_partial: Option<usize>) -> EnumerationLimits {
    match max_partial {
        Some(n) => EnumerationLimits::max_partial_pathways(n),
        None => EnumerationLimits::unlimited(),
    }
}

// ============================================================================
// Setup
// ============================================================================

fn load_records(path: &Path, format: RecordFormat) -> Result<ReactionSet> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read records {}", path.display()))?;
    let reactions = match format {
        RecordFormat::Json => ReactionSet::from_json_str(&text)
            .with_context(|| format!("failed to parse reaction records {}", path.display()))?,
        RecordFormat::Text => parse_reaction_blocks(&text),
        RecordFormat::Results => parse_extraction_results(&text)
            .with_context(|| format!("failed to parse extraction results {}", path.display()))?,
    };
    tracing::info!(path = %path.display(), reactions = reactions.len(), "loaded reaction records");
    Ok(reactions)
}

fn build_oracle(config: &RetrosynConfig) -> Result<CachedOracle> {
    let oracle = CachedOracle::new(config.cache()?, config.common_substances()?)
        .with_retry(config.retry_policy());
    if config.offline {
        tracing::debug!("offline: external substance lookup disabled");
        return Ok(oracle);
    }

    #[cfg(feature = "pubchem")]
    let oracle = oracle.with_lookup(pubchem::PubChemClient::new(
        &config.pubchem_url,
        config.timeout(),
    )?);
    #[cfg(not(feature = "pubchem"))]
    {
        tracing::warn!("built without the `pubchem` feature; using cache and curated substances only");
    }
    Ok(oracle)
}

fn load_tree(path: &Path) -> Result<DerivationTree> {
    retrosyn_storage::load_tree(path).with_context(|| format!("failed to load tree {}", path.display()))
}

// ============================================================================
// Commands
// ============================================================================

fn cmd_build(
    config: &RetrosynConfig,
    records: &Path,
    target: &str,
    format: RecordFormat,
    out: &Path,
) -> Result<()> {
    let reactions = load_records(records, format)?;
    let mut oracle = build_oracle(config)?;
    let mut tree = DerivationTree::new(target, reactions);

    eprintln!("{} derivation tree for {}", "Building".green().bold(), tree.target().bold());
    let expandable = tree.construct(&mut oracle)?;

    if expandable {
        eprintln!(
            "{} {} nodes, {} reactions used",
            "ok".green().bold(),
            tree.len(),
            tree.reaction_infos().len()
        );
    } else {
        eprintln!(
            "{} no route from available substances to {}",
            "info:".yellow().bold(),
            tree.target()
        );
    }
    if !tree.unexpandable_substances().is_empty() {
        let names: Vec<&str> = tree.unexpandable_substances().iter().map(String::as_str).collect();
        eprintln!("{} unexpandable: {}", "info:".yellow().bold(), names.join(", "));
    }

    retrosyn_storage::save_tree(&tree, out)
        .with_context(|| format!("failed to save tree {}", out.display()))?;
    eprintln!("{} {}", "wrote".green().bold(), out.display().to_string().bold());
    Ok(())
}

fn cmd_paths(path: &Path, json: bool, limits: EnumerationLimits) -> Result<()> {
    let tree = load_tree(path)?;
    let pathways = tree.find_all_paths_with(limits)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&pathways)?);
        return Ok(());
    }
    if pathways.is_empty() {
        eprintln!("{} no pathways for {}", "info:".yellow().bold(), tree.target());
        return Ok(());
    }
    for (i, pathway) in pathways.iter().enumerate() {
        println!("{:>3}. {}", i + 1, pathway);
    }
    eprintln!("{} {} pathways", "ok".green().bold(), pathways.len());
    Ok(())
}

fn cmd_render(path: &Path, options: DotOptions, out: Option<&Path>) -> Result<()> {
    let tree = load_tree(path)?;
    let dot = tree.to_dot(&options)?;
    match out {
        Some(out) => {
            fs::write(out, dot).with_context(|| format!("failed to write {}", out.display()))?;
            eprintln!("{} {}", "wrote".green().bold(), out.display().to_string().bold());
        }
        None => print!("{dot}"),
    }
    Ok(())
}

fn cmd_reactions(path: &Path, keys: &[String]) -> Result<()> {
    let tree = load_tree(path)?;
    let summary = if keys.is_empty() {
        tree.reactions_in_tree()
    } else {
        let keys: Vec<ReactionKey> = keys.iter().map(|k| ReactionKey::new(k.trim())).collect();
        for key in keys.iter().filter(|k| !tree.reactions().contains(k)) {
            eprintln!("{} unknown reaction {}", "warning:".yellow().bold(), key);
        }
        tree.reaction_summary(&keys)
    };
    print!("{summary}");
    Ok(())
}

#[derive(Serialize)]
struct StatsReport {
    target: String,
    #[serde(flatten)]
    tree: retrosyn_core::TreeStats,
    /// `None` when the enumeration budget was exceeded.
    pathways: Option<usize>,
}

fn cmd_stats(path: &Path, json: bool, limits: EnumerationLimits) -> Result<()> {
    let tree = load_tree(path)?;
    let pathways = match tree.find_all_paths_with(limits) {
        Ok(paths) => Some(paths.len()),
        Err(TreeError::PathwayBudgetExceeded { limit }) => {
            tracing::warn!(limit, "pathway budget exceeded; count omitted");
            None
        }
        Err(err) => return Err(err.into()),
    };
    let report = StatsReport {
        target: tree.target().to_string(),
        tree: tree.stats(),
        pathways,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    println!("{} {}", "target".bold(), report.target);
    println!("  nodes:                   {}", report.tree.nodes);
    println!("  leaves:                  {}", report.tree.leaves);
    println!("  max depth:               {}", report.tree.max_depth);
    println!("  reactions used:          {}", report.tree.reactions_used);
    println!("  unexpandable substances: {}", report.tree.unexpandable_substances);
    match report.pathways {
        Some(n) => println!("  pathways:                {n}"),
        None => println!("  pathways:                {}", "budget exceeded".yellow()),
    }
    Ok(())
}

fn cmd_check(config: &RetrosynConfig, names: &[String]) -> Result<()> {
    let mut oracle = build_oracle(config)?;
    for name in names {
        let name = retrosyn_core::normalize_name(name);
        if oracle.is_available(&name) {
            println!("{} {}", "available".green().bold(), name);
        } else {
            println!("{} {}", "unavailable".red().bold(), name);
        }
    }
    Ok(())
}
