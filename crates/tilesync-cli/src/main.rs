//! tilesync — keeps rendered tile caches in step with the geodatabase.
//!
//! # Usage
//!
//! ```text
//! tilesync topology water
//! tilesync seed full water
//! tilesync seed delta water --format json
//! tilesync seed feature water --node 1001 --node 1002
//! tilesync status water --limit 20
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "tilesync",
    about = "Tile-cache seeding for partitioned geodatabases",
    version,
    propagate_version = true
)]
struct Cli {
    /// Directory holding `<catalog>.toml` files.
    #[arg(long, global = true, default_value = "/etc/tilesync")]
    config_dir: PathBuf,

    /// Directory holding per-catalog state stores.
    #[arg(long, global = true, default_value = "/var/lib/tilesync")]
    data_dir: PathBuf,

    /// Output format: text or json
    #[arg(long, global = true, default_value = "text")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Regenerate the topology document from the current partition.
    Topology {
        catalog: String,
    },
    /// Seed tile caches.
    Seed {
        #[command(subcommand)]
        action: SeedAction,
    },
    /// Show the watermark and recent retiling jobs.
    Status {
        catalog: String,
        /// Number of log entries to show.
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum SeedAction {
    /// Re-render every cluster over its full extent.
    Full { catalog: String },
    /// Re-render what changed since the last seed.
    Delta { catalog: String },
    /// Re-render the boundary of specific nodes.
    Feature {
        catalog: String,
        /// Node id; repeat for several.
        #[arg(long = "node", required = true)]
        nodes: Vec<i64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tilesync=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let ctx = commands::Context {
        config_dir: cli.config_dir,
        data_dir: cli.data_dir,
        format: cli.format,
    };

    match cli.command {
        Commands::Topology { catalog } => commands::topology::generate(&ctx, &catalog).await,
        Commands::Seed { action } => match action {
            SeedAction::Full { catalog } => commands::seed::full(&ctx, &catalog).await,
            SeedAction::Delta { catalog } => commands::seed::delta(&ctx, &catalog).await,
            SeedAction::Feature { catalog, nodes } => {
                commands::seed::feature(&ctx, &catalog, &nodes).await
            }
        },
        Commands::Status { catalog, limit } => commands::status::show(&ctx, &catalog, limit),
    }
}
