use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;

use maville::app::{store_lock, CandidatureService, ProblemeService};
use maville::common::error::Result;
use maville::config::Config;
use maville::domain::{Priorite, TypeTravaux};
use maville::infra::montreal::MontrealApiClient;
use maville::logging;
use maville::notify::{ConnectionRegistry, NotificationDispatcher};
use maville::server::{start_server, AppState};
use maville::storage::{EntityStore, JsonStorage, MemoryStorage, SqliteStorage};

#[derive(Parser)]
#[command(name = "maville")]
#[command(about = "Suivi des travaux municipaux avec notifications en temps réel")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Override the configured port
        #[arg(long)]
        port: Option<u16>,
    },
    /// List ongoing city works from the Montréal open-data portal
    Travaux {
        /// Maximum number of rows to fetch
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Load a small demo dataset into the configured store
    Seed,
}

fn build_store(config: &Config) -> Result<Arc<dyn EntityStore>> {
    Ok(match config.storage.backend.as_str() {
        "sqlite" => Arc::new(SqliteStorage::open(&config.storage.db_path)?),
        "memory" => Arc::new(MemoryStorage::new()),
        _ => Arc::new(JsonStorage::open(&config.storage.data_dir)?),
    })
}

async fn seed(store: Arc<dyn EntityStore>) -> anyhow::Result<()> {
    let registry = Arc::new(ConnectionRegistry::new());
    let dispatcher = Arc::new(NotificationDispatcher::new(store.clone(), registry));
    let write_lock = store_lock();
    let problemes = ProblemeService::new(store.clone(), dispatcher.clone(), write_lock.clone());
    let candidatures = CandidatureService::new(store, dispatcher, write_lock);

    let p1 = problemes
        .signaler(
            "3030 rue Masson, Rosemont",
            TypeTravaux::TravauxRoutiers,
            "Nid de poule important devant le 3030",
            "alice@example.com",
        )
        .await?;
    let p2 = problemes
        .signaler(
            "4500 rue Wellington, Verdun",
            TypeTravaux::EntretienPaysager,
            "Arbre tombé sur le trottoir",
            "bob@example.com",
        )
        .await?;
    problemes.affecter_priorite(p1.id, Priorite::Elevee).await?;

    let c = candidatures
        .soumettre(
            "NEQ1234567890",
            vec![p1.id],
            "Réfection de la chaussée",
            15000.0,
            chrono::Utc::now().date_naive(),
            chrono::Utc::now().date_naive() + chrono::Duration::days(30),
        )
        .await?;
    candidatures.decider(c.id, true, None).await?;

    println!("Données de démonstration chargées:");
    println!("  problèmes: {}, {}", p1.id, p2.id);
    println!("  candidature approuvée: {}", c.id);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    let mut config = Config::load()?;
    logging::init_logging(&config.logging.dir);

    match cli.command {
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            let store = build_store(&config)?;
            info!(backend = %config.storage.backend, "Stockage initialisé");
            let state = AppState::new(store, &config);
            start_server(state, &config).await?;
        }
        Commands::Travaux { limit } => {
            let client = MontrealApiClient::default();
            let travaux = client.lister_travaux(limit).await;
            println!("{} travaux en cours:", travaux.len());
            for t in travaux {
                println!(
                    "  [{}] {} - {} ({})",
                    t.arrondissement.as_deref().unwrap_or("?"),
                    t.motif.as_deref().unwrap_or("motif inconnu"),
                    t.statut.as_deref().unwrap_or("?"),
                    t.organisation.as_deref().unwrap_or("?"),
                );
            }
        }
        Commands::Seed => {
            let store = build_store(&config)?;
            seed(store).await?;
        }
    }
    Ok(())
}
