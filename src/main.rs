use anyhow::Result;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;

mod brief;
mod cluster;
mod config;
mod evidence;
mod extraction;
mod fingerprint;
mod ingestion;
mod init;
mod model;
mod source;
mod store;
mod summary;
mod telemetry;
mod text;
mod util;

#[derive(Parser)]
#[command(name = "newsdesk", about = "News feed ingestion, event clustering and briefs")]
struct Cli {
    #[arg(global = true, short, long)]
    dsn: Option<String>,
    /// Emit a single JSON envelope to stdout; logs go to stderr
    #[arg(global = true, long, default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply database migrations
    Init,
    Source(source::SourceCmd),
    Ingest(ingestion::IngestCmd),
    Extract(extraction::ExtractCmd),
    Cluster(cluster::ClusterCmd),
    RebuildSummaries(summary::RebuildSummariesCmd),
    Brief(brief::BriefCmd),
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();
    telemetry::config::set_json_mode(cli.json);

    // stderr logging; respects RUST_LOG and NEWSDESK_LOG_FORMAT
    telemetry::config::init_tracing();
    let dsn = config::database_url(cli.dsn)?;
    let pool = init::connect(&dsn).await?;

    match cli.command {
        Commands::Init => init::run(&pool).await?,
        Commands::Source(args) => source::run(&pool, args).await?,
        Commands::Ingest(args) => ingestion::run(&pool, args).await?,
        Commands::Extract(args) => extraction::run(&pool, args).await?,
        Commands::Cluster(args) => cluster::run(&pool, args).await?,
        Commands::RebuildSummaries(args) => summary::run(&pool, args).await?,
        Commands::Brief(args) => brief::run(&pool, args).await?,
    }

    Ok(())
}
