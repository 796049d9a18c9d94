mod cli;

use clap::Parser;
use color_eyre::Result;
use std::sync::Arc;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use cli::args::{Args, Commands};
use tunblock::config::AppConfig;
use tunblock::core::{BlocklistStore, SessionController};
use tunblock::vpn::{PacketFilter, TunnelProvider};

fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tunblock=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = AppConfig::load(args.config.as_deref())?;
    debug!(?config, "Configuration loaded");

    let store = match args.blocklist.or_else(|| config.store.path.clone()) {
        Some(path) => BlocklistStore::new(path),
        None => BlocklistStore::open_default()?,
    };

    match args.command.unwrap_or(Commands::Run) {
        Commands::Run => run(&config, &store),
        Commands::Block { ip } => cli::commands::block(&store, &ip),
        Commands::Unblock { ip } => cli::commands::unblock(&store, &ip),
        Commands::List => cli::commands::list(&store),
    }
}

fn run(config: &AppConfig, store: &BlocklistStore) -> Result<()> {
    let blocklist = store.load()?;
    let engine = Arc::new(PacketFilter::new(&config.filter, config.tunnel.mtu));
    let provider = tunnel_provider(config)?;

    let controller = SessionController::new(provider, engine.clone(), blocklist);
    let outcome = cli::console::run(&controller, &engine, store);
    if let Err(e) = &outcome {
        warn!(error = %e, "Console exited with an error");
    }
    outcome
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn tunnel_provider(config: &AppConfig) -> Result<Arc<dyn TunnelProvider>> {
    Ok(Arc::new(tunblock::vpn::tun::TunProvider::new(
        config.tunnel.clone(),
    )))
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn tunnel_provider(_config: &AppConfig) -> Result<Arc<dyn TunnelProvider>> {
    color_eyre::eyre::bail!("TUN tunnels are only supported on Linux and Android")
}
