use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(name = "ledgerly", version, about = "OFX statement importer and transaction ledger")]
struct Cli {
    /// Ledger database path (defaults to the platform data directory).
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Owner whose ledger is being operated on.
    #[arg(long, global = true, default_value = "default")]
    owner: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Import an OFX statement file (SGML 1.x or XML 2.x).
    Import { file: PathBuf },
    /// List accounts.
    Accounts,
    /// List recent transactions, newest first.
    Transactions {
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Manage spending categories.
    Categories {
        #[command(subcommand)]
        command: CategoryCommand,
    },
}

#[derive(Subcommand)]
enum CategoryCommand {
    /// Create the default category set.
    Seed,
    /// List active categories.
    List,
    /// Load category definitions from a TOML file.
    Load { file: PathBuf },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let db_path = match &cli.db {
        Some(path) => path.clone(),
        None => {
            let dirs = directories::ProjectDirs::from("com", "ledgerly", "Ledgerly")
                .context("could not determine a data directory")?;
            let data_dir = dirs.data_dir();
            std::fs::create_dir_all(data_dir)
                .with_context(|| format!("creating {}", data_dir.display()))?;
            data_dir.join("ledger.db")
        }
    };

    let pool = ledgerly_storage::create_db(&db_path)
        .await
        .with_context(|| format!("opening ledger database at {}", db_path.display()))?;

    match cli.command {
        Command::Import { file } => commands::import(&pool, &cli.owner, &file).await,
        Command::Accounts => commands::list_accounts(&pool, &cli.owner).await,
        Command::Transactions { limit } => {
            commands::list_transactions(&pool, &cli.owner, limit).await
        }
        Command::Categories { command } => match command {
            CategoryCommand::Seed => commands::seed_categories(&pool).await,
            CategoryCommand::List => commands::list_categories(&pool).await,
            CategoryCommand::Load { file } => commands::load_categories(&pool, &file).await,
        },
    }
}
