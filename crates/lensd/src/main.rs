//! `lensd`: maintenance daemon for a Lens graph store.
//!
//! # Usage
//!
//! ```text
//! lensd check                        # audit every stored invariant
//! lensd -c lens.toml stats           # record counts per key family
//! lensd -d ./data reindex            # recompute all ecosystems
//! lensd id payload.json              # content id of a JSON document
//! echo '{"a":1}' | lensd id          # ... or of stdin
//! lensd proposals --state open       # list proposals in a state
//! ```

mod config;
mod telemetry;

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use lens_graph::EntityGraph;
use lens_proposals::ProposalWorkflow;
use lens_store::{FjallGraphStore, GraphStore, MemoryGraphStore, TxExecutor};
use lens_types::ProposalState;
use tracing::{error, info, warn};

use config::{Backend, LensConfig};

// -----------------------------------------------------------------------
// CLI definition
// -----------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "lensd", version, about = "Lens graph store maintenance")]
struct Cli {
    /// Path to TOML config file.
    #[arg(short, long, global = true, env = "LENS_CONFIG")]
    config: Option<PathBuf>,

    /// Override the data directory.
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Audit identities, delegation roots, permission copies and ecosystems.
    Check,

    /// Print record counts per key family.
    Stats,

    /// Recompute every stored ecosystem from children edges.
    Reindex,

    /// Print the content id of a JSON document under the configured format.
    Id {
        /// JSON file to read. Reads stdin when omitted.
        file: Option<PathBuf>,
    },

    /// List proposals in one state.
    Proposals {
        /// One of open, executed, rejected, declined.
        #[arg(short, long, default_value = "open")]
        state: String,
    },
}

// -----------------------------------------------------------------------
// Entrypoint
// -----------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = match LensConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => bail!("failed to load config ({:?}): {e}", e.kind()),
    };

    // CLI args override config file values.
    if let Some(dir) = cli.data_dir {
        config.store.data_dir = dir;
    }

    telemetry::init(&config.log.level);

    match cli.command {
        Commands::Check => cmd_check(&config).await,
        Commands::Stats => cmd_stats(&config).await,
        Commands::Reindex => cmd_reindex(&config).await,
        Commands::Id { file } => cmd_id(&config, file.as_deref()),
        Commands::Proposals { state } => cmd_proposals(&config, &state).await,
    }
}

/// Open the configured backend and wrap it in an [`EntityGraph`].
fn open_graph(config: &LensConfig) -> Result<EntityGraph> {
    let store: Arc<dyn GraphStore> = match config.backend()? {
        Backend::Memory => {
            warn!("memory backend configured, the store starts empty");
            Arc::new(MemoryGraphStore::new())
        }
        Backend::Fjall => {
            let path = config.graph_path();
            std::fs::create_dir_all(&path).context("failed to create data directory")?;
            let store = FjallGraphStore::open(&path).map_err(|e| {
                error!(path = %path.display(), %e, "failed to open graph store");
                anyhow::anyhow!("cannot open graph store at {}: {e}", path.display())
            })?;
            Arc::new(store)
        }
    };
    info!(
        backend = %config.store.backend,
        data_dir = %config.store.data_dir.display(),
        max_attempts = config.retry.max_attempts,
        "graph store opened"
    );
    let executor = TxExecutor::new(store, config.retry_policy());
    Ok(EntityGraph::new(executor, config.cid))
}

// -----------------------------------------------------------------------
// Commands
// -----------------------------------------------------------------------

async fn cmd_check(config: &LensConfig) -> Result<()> {
    let graph = open_graph(config)?;
    let report = graph.audit().await?;

    println!("Elements:       {} ({} stubs)", report.elements, report.stubs);
    println!("Perspectives:   {}", report.perspectives);
    println!("Access configs: {}", report.access_configs);

    if report.is_clean() {
        println!("No violations.");
        return Ok(());
    }
    println!("Violations:     {}", report.violations.len());
    for violation in &report.violations {
        println!("  {violation}");
    }
    bail!("audit found {} violation(s)", report.violations.len())
}

async fn cmd_stats(config: &LensConfig) -> Result<()> {
    let graph = open_graph(config)?;
    let counts = graph.key_family_counts().await?;
    if counts.is_empty() {
        println!("Store is empty.");
    }
    for (family, count) in counts {
        println!("{family:<16} {count}");
    }
    Ok(())
}

async fn cmd_reindex(config: &LensConfig) -> Result<()> {
    let graph = open_graph(config)?;
    let rebuilt = graph.ecosystem().rebuild_all().await?;
    println!("Rebuilt {rebuilt} ecosystem(s).");
    Ok(())
}

fn cmd_id(config: &LensConfig, file: Option<&Path>) -> Result<()> {
    let text = match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read stdin")?;
            buf
        }
    };
    let value: serde_json::Value = serde_json::from_str(&text).context("input is not JSON")?;
    let id = lens_cid::compute_id(&value, &config.cid)?;
    println!("{id}");
    Ok(())
}

async fn cmd_proposals(config: &LensConfig, state: &str) -> Result<()> {
    let Some(state) = ProposalState::ALL
        .into_iter()
        .find(|candidate| candidate.as_str() == state)
    else {
        bail!("unknown proposal state {state:?}");
    };

    let workflow = ProposalWorkflow::new(open_graph(config)?);
    let proposals = workflow.proposals_in_state(state).await?;
    println!("{} proposal(s) {state}", proposals.len());
    for proposal in proposals {
        println!(
            "  {} {} -> {} by {} ({} update(s), {} new perspective(s))",
            proposal.id,
            proposal.from_perspective_id,
            proposal.to_perspective_id,
            proposal.creator_id,
            proposal.updates.len(),
            proposal.new_perspectives.len(),
        );
    }
    Ok(())
}
