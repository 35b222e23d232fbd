mod commands;

use clap::{Parser, Subcommand};
use commands::AppContext;
use rallypot_core::{IdentityManager, SqliteLedger, Storage};
use rallypot_settle::{MatchManager, SqliteMatchStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "rallypot")]
#[command(about = "Peer-to-peer wagered matches with escrowed settlement")]
#[command(version)]
struct Cli {
    /// Data directory for local state
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage local player identities
    Player {
        #[command(subcommand)]
        command: PlayerCommands,
    },
    /// Credit a player's account from the local faucet
    Fund {
        /// Player name
        player: String,
        /// Amount in ledger units
        amount: u64,
    },
    /// Show a player's ledger balance
    Balance {
        /// Player name
        player: String,
    },
    /// Create a new match and take a seat in it
    Create {
        /// Player name
        player: String,
        /// Seat to take (A1, A2, B1 or B2)
        #[arg(default_value = "A1")]
        slot: String,
    },
    /// Join an existing match
    Join {
        /// Player name
        player: String,
        /// Match code
        code: String,
        /// Seat to take (A1, A2, B1 or B2)
        slot: String,
    },
    /// Stake funds into a match's escrow
    Deposit {
        /// Player name
        player: String,
        /// Match code
        code: String,
        /// Amount in ledger units
        amount: u64,
    },
    /// Propose the match result everyone must sign
    Propose {
        /// Match code
        code: String,
        /// Winning seat (A1, A2, B1 or B2)
        winner: String,
        /// Final score, e.g. 11-9
        score: String,
    },
    /// Sign the proposed result
    Sign {
        /// Player name
        player: String,
        /// Match code
        code: String,
        /// Sign without the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Show a match in detail
    Status {
        /// Match code
        code: String,
    },
    /// List known matches
    List,
    /// Watch a match and settle it once everyone has signed
    Watch {
        /// Match code
        code: String,
        /// Reconciliation poll interval in seconds
        #[arg(long, default_value_t = 5)]
        poll_secs: u64,
    },
}

#[derive(Subcommand)]
enum PlayerCommands {
    /// Create a named signing identity
    Create {
        /// Player name
        name: String,
    },
    /// List local identities
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!(
            "rallypot={},rallypot_core={},rallypot_settle={}",
            log_level, log_level, log_level
        )))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let data_dir = cli.data_dir.unwrap_or_else(|| {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("rallypot")
    });
    tokio::fs::create_dir_all(&data_dir).await?;

    let storage = Arc::new(Storage::new(&data_dir.join("rallypot.db")).await?);
    let ledger = Arc::new(SqliteLedger::new(storage.clone()));
    let store = Arc::new(SqliteMatchStore::new(storage.clone()).await?);
    let ctx = AppContext {
        identities: IdentityManager::new(storage),
        ledger,
        store: store.clone(),
        matches: MatchManager::new(store),
    };

    let result = match cli.command {
        Commands::Player { command } => match command {
            PlayerCommands::Create { name } => commands::create_player(&ctx, &name).await,
            PlayerCommands::List => commands::list_players(&ctx).await,
        },
        Commands::Fund { player, amount } => commands::fund_player(&ctx, &player, amount).await,
        Commands::Balance { player } => commands::show_balance(&ctx, &player).await,
        Commands::Create { player, slot } => commands::create_match(&ctx, &player, &slot).await,
        Commands::Join { player, code, slot } => {
            commands::join_match(&ctx, &player, &code, &slot).await
        }
        Commands::Deposit {
            player,
            code,
            amount,
        } => commands::deposit(&ctx, &player, &code, amount).await,
        Commands::Propose {
            code,
            winner,
            score,
        } => commands::propose_result(&ctx, &code, &winner, &score).await,
        Commands::Sign { player, code, yes } => commands::sign_result(&ctx, &player, &code, yes).await,
        Commands::Status { code } => commands::show_status(&ctx, &code).await,
        Commands::List => commands::list_matches(&ctx).await,
        Commands::Watch { code, poll_secs } => commands::watch_match(&ctx, &code, poll_secs).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
