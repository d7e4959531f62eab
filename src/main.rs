mod cli;
mod server;
mod tools;

use anyhow::Result;
use cairn::search::hybrid::TimelineAnchor;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cairn", version, about = "Hybrid-search memory server for AI coding sessions")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the MCP server (transport from config: stdio or http)
    Serve,
    /// Manage the local embedding model
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },
    /// Search observations
    Search {
        query: String,
        /// Filter by type (decision, bugfix, feature, refactor, discovery)
        #[arg(short = 't', long = "type")]
        kind: Option<String>,
        #[arg(short, long)]
        limit: Option<usize>,
        #[arg(short, long)]
        project: Option<String>,
    },
    /// Show observations around an anchor
    Timeline {
        /// Anchor observation id
        #[arg(long, conflicts_with = "query", required_unless_present = "query")]
        id: Option<i64>,
        /// Use the best keyword match as the anchor
        #[arg(short, long)]
        query: Option<String>,
        /// Observations on each side of the anchor
        #[arg(short, long)]
        depth: Option<usize>,
        #[arg(short, long)]
        project: Option<String>,
    },
    /// Report keyword and vector search health
    Status {
        #[arg(short, long)]
        project: Option<String>,
    },
    /// Re-embed all observations of a project into the vector store
    Reindex {
        #[arg(short, long)]
        project: Option<String>,
    },
}

#[derive(Subcommand)]
enum ModelAction {
    /// Download the embedding model to the configured cache directory
    Download,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config (for log level)
    let config = cairn::config::CairnConfig::load()?;

    // Log to stderr so stdout stays clean for MCP JSON-RPC.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve => {
            server::serve(config).await?;
        }
        Command::Model { action } => match action {
            ModelAction::Download => {
                cli::model_download(&config.embedding).await?;
            }
        },
        Command::Search {
            query,
            kind,
            limit,
            project,
        } => {
            cli::search::search(&config, &query, kind, limit, project.as_deref()).await?;
        }
        Command::Timeline {
            id,
            query,
            depth,
            project,
        } => {
            let anchor = match (id, query) {
                (Some(id), _) => TimelineAnchor::Id(id),
                (None, Some(q)) => TimelineAnchor::Query(q),
                (None, None) => anyhow::bail!("give --id or --query"),
            };
            cli::timeline::timeline(&config, anchor, depth, project.as_deref()).await?;
        }
        Command::Status { project } => {
            cli::status::status(&config, project.as_deref()).await?;
        }
        Command::Reindex { project } => {
            cli::reindex::reindex(&config, project.as_deref()).await?;
        }
    }

    Ok(())
}
