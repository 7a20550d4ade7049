//! Topology Inspector
//!
//! Loads a YAML layout into a topology tree and runs capacity queries
//! against it: summary, single reservations and writable-volume listings.
//!
//! ```text
//! topology-inspect --layout cluster.yaml summary --json
//! topology-inspect --layout cluster.yaml reserve --volume-id 42
//! topology-inspect --layout cluster.yaml writable --size-limit-bytes 1048576
//! ```

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use volume_topology::topology::NodeStatus;
use volume_topology::{ClusterTopology, Layout, TopologyConfig, TopologyMetrics, VolumeId};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Inspect capacity and placement for a cluster layout
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML layout describing data centers, racks and storage nodes
    #[arg(long, env = "TOPOLOGY_LAYOUT")]
    layout: PathBuf,

    /// Optional YAML topology configuration
    #[arg(long, env = "TOPOLOGY_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print capacity per node
    Summary {
        /// Print the status tree as JSON
        #[arg(long)]
        json: bool,
    },

    /// Pick a storage node for a new volume
    Reserve {
        /// Volume id the slot is reserved for
        #[arg(long)]
        volume_id: u32,

        /// Fixed budget in [0, free space); drawn at random when omitted
        #[arg(long)]
        budget: Option<u64>,
    },

    /// List volumes that can still take writes
    Writable {
        /// Override the configured volume size limit
        #[arg(long)]
        size_limit_bytes: Option<u64>,
    },

    /// Print capacity gauges in Prometheus text format
    Metrics,
}

// =============================================================================
// Main
// =============================================================================

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    let mut config = match &args.config {
        Some(path) => {
            let yaml = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            TopologyConfig::from_yaml_str(&yaml)?
        }
        None => TopologyConfig::default(),
    };

    let layout = Layout::from_file(&args.layout)
        .with_context(|| format!("loading layout {}", args.layout.display()))?;
    config.root_id = layout.root.clone();
    if let Command::Writable {
        size_limit_bytes: Some(limit),
    } = &args.command
    {
        config.volume_size_limit_bytes = *limit;
    }
    config.validate()?;

    let now = Utc::now();
    let topology = layout.build(now)?;
    let cluster = ClusterTopology::from_topology(topology, config)
        .with_metrics(TopologyMetrics::new()?);

    info!(
        layout = %args.layout.display(),
        free_space = cluster.free_space()?,
        "Loaded topology"
    );

    match args.command {
        Command::Summary { json } => {
            let status = cluster.status()?;
            if json {
                println!("{}", status.to_json_pretty()?);
            } else {
                print_status(&status, 0);
            }
        }
        Command::Reserve { volume_id, budget } => {
            let volume_id = VolumeId(volume_id);
            let reservation = match budget {
                Some(budget) => cluster.reserve(budget, volume_id)?,
                None => cluster.reserve_random(volume_id, &mut rand::thread_rng())?,
            };
            match reservation {
                Some(r) => println!(
                    "volume {} -> {} ({})",
                    r.volume_id,
                    r.path,
                    r.public_url.as_deref().unwrap_or("-")
                ),
                None => println!("volume {}: no free slot", volume_id),
            }
        }
        Command::Writable { .. } => {
            for vid in cluster.writable_volumes(now)? {
                println!("{}", vid);
            }
        }
        Command::Metrics => {
            cluster.refresh_metrics()?;
            if let Some(metrics) = cluster.metrics() {
                print!("{}", metrics.encode()?);
            }
        }
    }

    Ok(())
}

fn print_status(status: &NodeStatus, depth: usize) {
    println!(
        "{:indent$}{} {} max={} free={} max_volume_id={}",
        "",
        status.kind,
        status.id,
        status.max,
        status.free,
        status.max_volume_id,
        indent = depth * 2
    );
    for child in &status.children {
        print_status(child, depth + 1);
    }
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    // Logs go to stderr so command output stays machine-readable.
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
