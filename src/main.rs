//! Sumi-Compass main entry point
//!
//! Command-line interface for inspecting and seeding the planning store.

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use sumi_compass::config::{load_config_with_hash, Config};
use sumi_compass::learning::PatternTransfer;
use sumi_compass::model::{Action, Candidate, CrawlState, Goal, PlanContext};
use sumi_compass::storage::{HistoryStore, PatternStore, SimilarityBands, SqliteStore};
use sumi_compass::telemetry::TracingTelemetry;
use sumi_compass::HierarchicalPlanner;
use tracing_subscriber::EnvFilter;

/// Sumi-Compass: an adaptive crawl planner
///
/// Profiles domains, plans crawl actions, and manages the pattern store
/// that plans learn from.
#[derive(Parser, Debug)]
#[command(name = "sumi-compass")]
#[command(version)]
#[command(about = "An adaptive crawl planner", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a domain's profile
    Profile { domain: String },

    /// Plan over a set of candidates and print the plan as JSON
    Plan {
        domain: String,

        /// Articles the crawl should collect
        #[arg(long)]
        target: u64,

        /// JSON file holding an array of candidates or bare actions
        #[arg(long, value_name = "FILE")]
        candidates: Option<PathBuf>,

        /// Maximum requests the plan may spend
        #[arg(long)]
        budget: Option<u64>,
    },

    /// List a domain's good patterns
    Patterns {
        domain: String,

        /// Include patterns below the quality thresholds
        #[arg(long)]
        all: bool,
    },

    /// List domains with similar planning characteristics
    Similar { domain: String },

    /// Copy good patterns from one domain to another
    Share { from: String, to: String },

    /// Record a historically crawled page
    RecordPage {
        domain: String,
        url: String,

        /// Hub type, if the page is a hub
        #[arg(long)]
        hub_type: Option<String>,

        /// Number of outgoing links on the page
        #[arg(long, default_value_t = 0)]
        links: u32,
    },
}

/// Accepts either full candidates or bare actions in the candidates file
#[derive(Deserialize)]
#[serde(untagged)]
enum CandidateInput {
    Candidate(Candidate),
    Action(Action),
}

impl From<CandidateInput> for Candidate {
    fn from(input: CandidateInput) -> Self {
        match input {
            CandidateInput::Candidate(candidate) => candidate,
            CandidateInput::Action(action) => Candidate::new(action),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    let store = Arc::new(
        SqliteStore::open(&config.storage)
            .with_context(|| format!("failed to open {}", config.storage.database_path))?,
    );

    match cli.command {
        Command::Profile { domain } => handle_profile(&config, store, &domain),
        Command::Plan {
            domain,
            target,
            candidates,
            budget,
        } => handle_plan(&config, store, &domain, target, candidates.as_deref(), budget).await,
        Command::Patterns { domain, all } => handle_patterns(&config, &store, &domain, all),
        Command::Similar { domain } => handle_similar(&config, &store, &domain),
        Command::Share { from, to } => handle_share(&config, store, &from, &to),
        Command::RecordPage {
            domain,
            url,
            hub_type,
            links,
        } => {
            store
                .record_crawl_page(&domain, &url, hub_type.as_deref(), links)
                .context("failed to record page")?;
            println!("Recorded {} for {}", url, domain);
            Ok(())
        }
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_compass=info,warn"),
            1 => EnvFilter::new("sumi_compass=debug,info"),
            2 => EnvFilter::new("sumi_compass=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_writer(std::io::stderr)
        .init();
}

fn handle_profile(config: &Config, store: Arc<SqliteStore>, domain: &str) -> anyhow::Result<()> {
    let planner = HierarchicalPlanner::with_store(config, store);
    let profile = planner.profiler().profile(domain);

    println!("=== Profile: {} ===\n", profile.domain);
    println!("  Pages crawled: {}", profile.page_count);
    println!("  Hub types: {}", profile.hub_type_count);
    println!("  Links per page: {:.1}", profile.avg_links_per_page);
    println!("  Complexity: {}", profile.complexity);
    println!("  Branching: {}", planner.branching(&profile));

    Ok(())
}

async fn handle_plan(
    config: &Config,
    store: Arc<SqliteStore>,
    domain: &str,
    target: u64,
    candidates: Option<&Path>,
    budget: Option<u64>,
) -> anyhow::Result<()> {
    let candidates = match candidates {
        Some(path) => read_candidates(path)?,
        None => Vec::new(),
    };
    tracing::info!("Planning {} over {} candidates", domain, candidates.len());

    let mut goal = Goal::articles(target);
    if let Some(budget) = budget {
        goal = goal.with_request_budget(budget);
    }

    let planner = HierarchicalPlanner::with_store(config, store);
    let context = PlanContext::new(domain, candidates);
    let plan = tokio::task::spawn_blocking(move || {
        planner.generate_plan(&CrawlState::default(), &goal, &context)
    })
    .await
    .context("planner task failed")?;

    if plan.is_empty() {
        tracing::warn!("No actionable candidates for {}", domain);
    }
    println!("{}", serde_json::to_string_pretty(&plan)?);

    Ok(())
}

fn read_candidates(path: &Path) -> anyhow::Result<Vec<Candidate>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let inputs: Vec<CandidateInput> = serde_json::from_str(&content)
        .with_context(|| format!("invalid candidates in {}", path.display()))?;
    Ok(inputs.into_iter().map(Candidate::from).collect())
}

fn handle_patterns(
    config: &Config,
    store: &SqliteStore,
    domain: &str,
    all: bool,
) -> anyhow::Result<()> {
    let patterns = if all {
        store.list_patterns(domain)?
    } else {
        store.query_good_patterns(
            domain,
            config.planner.pattern_min_success_rate,
            config.planner.pattern_min_avg_value,
        )?
    };

    if patterns.is_empty() {
        println!("No patterns for {}", domain);
        return Ok(());
    }

    println!("=== Patterns: {} ({}) ===\n", domain, patterns.len());
    for pattern in &patterns {
        let origin = match &pattern.source_domain {
            Some(source) => format!(" (shared from {})", source),
            None => String::new(),
        };
        println!(
            "  {}  confidence {:.2}, {}/{} succeeded, avg {:.1}{}",
            pattern.signature,
            pattern.confidence,
            pattern.success_count,
            pattern.sample_size,
            pattern.avg_value,
            origin
        );
    }

    Ok(())
}

fn handle_similar(config: &Config, store: &SqliteStore, domain: &str) -> anyhow::Result<()> {
    let bands = SimilarityBands {
        lookahead: config.sharing.lookahead_tolerance,
        branching: config.sharing.branching_tolerance,
    };
    let similar = store.find_similar_domains(domain, config.sharing.max_similar_domains, bands)?;

    if similar.is_empty() {
        println!("No similar domains for {}", domain);
    }
    for other in &similar {
        println!("{}", other);
    }

    Ok(())
}

fn handle_share(
    config: &Config,
    store: Arc<SqliteStore>,
    from: &str,
    to: &str,
) -> anyhow::Result<()> {
    let transfer = PatternTransfer::new(
        store,
        Arc::new(TracingTelemetry),
        config.sharing.clone(),
        config.planner.pattern_min_success_rate,
        config.planner.pattern_min_avg_value,
    );
    let report = transfer
        .share_between(from, to)
        .with_context(|| format!("failed to share patterns from {} to {}", from, to))?;

    println!(
        "Shared {} -> {}: {} inserted, {} already shared, {} rejected",
        from, to, report.inserted, report.already_shared, report.rejected
    );

    Ok(())
}
