use anyhow::Result;
use clap::{Parser, Subcommand};
use spin_decide::{
    cleanup,
    config::StorageBackend,
    engine::{self, EngineError},
    models::room::RoomState,
    store::PgStore,
    AppConfig,
};
use std::process::exit;
use tracing::Level;

#[derive(Parser)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Delete rooms past retention and expired sessions
    Cleanup,
    /// Print the state of a room
    Room { code: String },
    /// List recently decided rooms
    Recent,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing/logging
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(Level::WARN)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    let cli = Cli::parse();

    let config_path = cli
        .config
        .ok_or_else(|| anyhow::anyhow!("Config file path required"))?;
    let cfg = AppConfig::new_from_file_and_env(&config_path).unwrap_or_else(|e| {
        eprintln!("error: {}", e);
        exit(1);
    });

    if cfg.storage == StorageBackend::Memory {
        eprintln!("warning: storage is \"memory\", commands see an empty store");
    }

    match &cli.command {
        Commands::Migrate => {
            let db = match cfg.connect_database().await {
                Ok(db) => db,
                Err(e) => {
                    eprintln!("error connecting to database: {}", e);
                    exit(1);
                }
            };
            PgStore::new(db).migrate().await?;
            println!("Migrations applied");
        }
        Commands::Cleanup => {
            let store = cfg.connect_store().await?;
            let retention = chrono::Duration::from_std(cfg.room_retention)?;
            let report = cleanup::run_once(store.as_ref(), retention).await?;
            println!("Deleted {} old room(s)", report.rooms_deleted);
            println!("Deleted {} expired session(s)", report.sessions_deleted);
        }
        Commands::Room { code } => {
            let store = cfg.connect_store().await?;
            match engine::get_room_state(store.as_ref(), &code.to_uppercase()).await {
                Ok(state) => print_room_state(&state),
                Err(EngineError::RoomNotFound) => {
                    println!("Room not found");
                }
                Err(e) => {
                    eprintln!("error: {}", e);
                    exit(1);
                }
            }
        }
        Commands::Recent => {
            let store = cfg.connect_store().await?;
            let decisions = engine::recent_decisions(store.as_ref()).await?;
            if decisions.is_empty() {
                println!("No decisions yet");
            }
            for decision in decisions {
                println!("Code: {}", decision.code);
                println!("Category: {}", decision.category);
                println!("Decided: {}", decision.winner_text);
                println!("Suggested by: {}", decision.winner_participant);
                println!("Participants: {}", decision.participant_count);
                println!("Created at: {}", decision.created_at);
                println!();
            }
        }
    }

    Ok(())
}

fn print_room_state(state: &RoomState) {
    let room = &state.room;
    println!("Code: {}", room.code);
    println!("Category: {}", room.category);
    println!("Status: {:?}", room.status);
    println!("Created at: {}", room.created_at);

    println!();
    println!("Participants:");
    for participant in &state.participants {
        println!(
            "  - {}{}{}",
            participant.name,
            if participant.is_host { " (host)" } else { "" },
            if participant.has_vetoed { " [vetoed]" } else { "" }
        );
    }

    println!();
    println!("Options:");
    for option in &state.options {
        let author = state
            .participants
            .iter()
            .find(|p| p.id == option.participant_id)
            .map(|p| p.name.as_str())
            .unwrap_or("Unknown");
        let marker = if room.winner_option_id == Some(option.id) {
            " <- winner"
        } else if option.is_vetoed {
            " (vetoed)"
        } else {
            ""
        };
        println!("  - {} by {}{}", option.text, author, marker);
    }
}
