use clap::{Parser, Subcommand};
use lynx_sync::catalog::{NordCatalog, ServerCatalog};
use lynx_sync::events::RedisCliPublisher;
use lynx_sync::platform::get_interface_driver;
use lynx_sync::profile::ProfileStore;
use lynx_sync::reconcile::EngineConfig;
use lynx_sync::{Config, Orchestrator, ReconciliationEngine, RunOptions};
use std::path::PathBuf;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "lynx-sync")]
#[command(about = "Keep WireGuard VPN profiles bound to lightly loaded servers")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (default: ./lynx-sync.toml, then ~/.lynx-sync/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile every configured profile once
    Sync,
    /// List countries known to the server directory
    Countries,
    /// Show persisted profiles
    Status,
    /// Generate default config file
    Init,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            init_logging(cli.verbose)?;
            let path = cli.config.unwrap_or_else(Config::default_path);
            info!("Generating default config...");
            Config::default().save(&path)?;
            println!("Created default config: {}", path.display());
            println!("Set private_key before running `lynx-sync sync`.");
        }
        Commands::Sync => {
            let config = setup(&cli)?;
            if !sync(&config).await? {
                std::process::exit(1);
            }
        }
        Commands::Countries => {
            let config = setup(&cli)?;
            let catalog = NordCatalog::new(&config.api)?;
            let mut countries = catalog.list_countries().await?;
            countries.sort_by(|a, b| a.name.cmp(&b.name));
            for country in countries {
                println!("{:>4}  {}", country.id, country.name);
            }
        }
        Commands::Status => {
            let config = setup(&cli)?;
            let store = ProfileStore::new(&config.profile_dir);
            let profiles = store.list(&config.interface_prefix)?;
            if profiles.is_empty() {
                println!("No profiles in {}", store.dir().display());
            }
            for settings in profiles {
                println!(
                    "{:<10} {:<28} {} ({}%)",
                    settings.profile_id, settings.display_name, settings.server_name, settings.load.percent
                );
            }
        }
    }

    Ok(())
}

/// Load config, then set up logging honoring its debug flag
fn setup(cli: &Cli) -> Result<Config, Box<dyn std::error::Error>> {
    let config = Config::discover(cli.config.as_deref())?;
    init_logging(cli.verbose || config.debug)?;
    Ok(config)
}

/// One reconciliation run; returns false when any profile failed
async fn sync(config: &Config) -> Result<bool, Box<dyn std::error::Error>> {
    config.validate()?;
    let catalog = NordCatalog::new(&config.api)?;
    let store = ProfileStore::new(&config.profile_dir);
    let driver = get_interface_driver()?;
    let publisher = RedisCliPublisher::new(config.events.channel.clone())
        .with_args(config.events.client_args.clone());
    let engine = ReconciliationEngine::new(EngineConfig::from(config));

    let orchestrator = Orchestrator {
        catalog: &catalog,
        store: &store,
        driver: driver.as_ref(),
        publisher: &publisher,
        engine: &engine,
        options: RunOptions::from(config),
    };

    info!(
        "Reconciling {} profile(s)...",
        config.countries.len() + usize::from(config.recommended)
    );
    let summary = orchestrator.run().await;

    for outcome in &summary.outcomes {
        println!(
            "{:<12} {:<10} {:?} -> {} ({}%)",
            outcome.target, outcome.profile_id, outcome.action, outcome.server_name, outcome.load
        );
    }
    for failure in &summary.failures {
        println!("FAILED {}", failure);
    }

    if !summary.is_success() {
        error!("{} profile(s) failed", summary.failures.len());
    }
    Ok(summary.is_success())
}

fn init_logging(verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
