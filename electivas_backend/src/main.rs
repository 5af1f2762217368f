use anyhow::Result;
use clap::{Parser, Subcommand};
use electivas_backend::bootstrap;
use electivas_backend::cli::{self, Operator};
use electivas_backend::config::ElectivasConfig;
use electivas_backend::telemetry;
use electivas_backend::utils;

#[derive(Parser)]
#[command(author, version, about = "Electivas review backend and operator CLI")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (Axum)
    Serve,
    /// Block an IP or a fingerprint
    Block {
        #[arg(long)]
        ip: Option<String>,
        #[arg(long)]
        fingerprint: Option<String>,
    },
    /// Lift a block on an IP or a fingerprint
    Unblock {
        #[arg(long)]
        ip: Option<String>,
        #[arg(long)]
        fingerprint: Option<String>,
    },
    /// Show whether an IP and/or fingerprint is blocked
    Status {
        #[arg(long)]
        ip: Option<String>,
        #[arg(long)]
        fingerprint: Option<String>,
    },
    /// Print comment analytics for a subject
    Analytics { subject_id: String },
    /// Zero the like/dislike counters of a subject
    ResetVotes { subject_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    utils::print_banner();
    telemetry::init_tracing();

    let args = Args::parse();

    let config = ElectivasConfig::from_env()?;
    let resources = bootstrap::initialize(&config).await?;
    tracing::info!(
        store = ?config.store,
        directories_created = ?resources.directories_created,
        store_initialized = resources.store_initialized,
        "bootstrap complete"
    );
    let kv = resources.kv;

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => cli::run_server(config, kv).await,
        command => {
            let operator = Operator::new(&config, kv);
            let output = run_operator(&operator, command).await?;
            println!("{output}");
            Ok(())
        }
    }
}

async fn run_operator(operator: &Operator, command: Command) -> Result<String> {
    match command {
        Command::Serve => anyhow::bail!("serve is not an operator command"),
        Command::Block { ip, fingerprint } => {
            operator.block(&cli::block_target(ip, fingerprint)?).await
        }
        Command::Unblock { ip, fingerprint } => {
            operator.unblock(&cli::block_target(ip, fingerprint)?).await
        }
        Command::Status { ip, fingerprint } => operator.status(ip, fingerprint).await,
        Command::Analytics { subject_id } => operator.analytics(&subject_id).await,
        Command::ResetVotes { subject_id } => operator.reset_votes(&subject_id).await,
    }
}
