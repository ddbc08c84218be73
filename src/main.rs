use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::error;

use ffid_ingest::config::Config;
use ffid_ingest::db::SqliteStorage;
use ffid_ingest::error::Result;
use ffid_ingest::ingest::IngestService;
use ffid_ingest::logging;
use ffid_ingest::storage::Storage;

#[derive(Parser)]
#[command(name = "ffid_ingest")]
#[command(about = "SAP firefighter session audit data ingestion and reconciliation")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a firefighter session for ingestion
    CreateSession {
        /// Session (analysis) identifier
        #[arg(long)]
        session: String,
    },
    /// Delete a session and all data it owns
    DeleteSession {
        #[arg(long)]
        session: String,
    },
    /// Ingest the CDHDR change-document header export (must run first)
    Headers {
        #[arg(long)]
        session: String,
        /// Path to the .xlsx/.xls export
        #[arg(long)]
        file: PathBuf,
    },
    /// Ingest the CDPOS change-document detail export and merge it
    Details {
        #[arg(long)]
        session: String,
        #[arg(long)]
        file: PathBuf,
    },
    /// Ingest the SM20 security audit log export
    ActivityLog {
        #[arg(long)]
        session: String,
        #[arg(long)]
        file: PathBuf,
    },
    /// Ingest the transaction usage log export
    UsageLog {
        #[arg(long)]
        session: String,
        #[arg(long)]
        file: PathBuf,
    },
    /// Show change-document upload statistics for a session
    Stats {
        #[arg(long)]
        session: String,
    },
    /// Show the canonical executed transaction-code set for a session
    Executed {
        #[arg(long)]
        session: String,
    },
}

async fn run(service: &IngestService, command: Commands) -> Result<()> {
    match command {
        Commands::CreateSession { session } => {
            service.create_session(&session).await?;
            println!("✅ Session created: {session}");
        }
        Commands::DeleteSession { session } => {
            service.delete_session(&session).await?;
            println!("✅ Session deleted: {session}");
        }
        Commands::Headers { session, file } => {
            let created = service.ingest_header_file(&session, &file).await?;
            println!("\n📊 CDHDR ingestion results for {session}:");
            println!("   Header records created: {created}");
            println!("   Next step: upload the CDPOS file to complete the merge");
        }
        Commands::Details { session, file } => {
            let matched = service.ingest_detail_file(&session, &file).await?;
            println!("\n📊 CDPOS merge results for {session}:");
            println!("   Rows matched and merged: {matched}");
        }
        Commands::ActivityLog { session, file } => {
            let stored = service.ingest_activity_file(&session, &file).await?;
            println!("\n📊 SM20 upload results for {session}:");
            println!("   Rows stored: {stored}");
        }
        Commands::UsageLog { session, file } => {
            let stored = service.ingest_usage_file(&session, &file).await?;
            println!("\n📊 Usage log upload results for {session}:");
            println!("   Rows stored: {stored}");
        }
        Commands::Stats { session } => {
            let stats = service.upload_stats(&session).await?;
            let phase = service.session_phase(&session).await?;
            println!("\n📊 Upload statistics for {session}:");
            println!("{}", serde_json::to_string_pretty(&stats).unwrap_or_default());
            println!("   Phase: {phase:?}");
        }
        Commands::Executed { session } => {
            let codes = service.executed_set(&session).await?;
            println!("\n📊 Canonical executed set for {session} ({} codes):", codes.len());
            println!("{}", serde_json::to_string_pretty(&codes).unwrap_or_default());
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let config = Config::load()?;
    logging::init_logging(&config.log_dir);

    let cli = Cli::parse();

    let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::open(&config.database_path)?);
    let service = IngestService::new(storage);

    if let Err(e) = run(&service, cli.command).await {
        error!("Command failed: {}", e);
        println!("❌ {e}");
        return Err(e.into());
    }
    Ok(())
}
