mod capital;
mod config;
mod engine;
mod gateway;
mod planner;
mod risk;
mod roles;
mod session;
mod signal;
mod sizing;
mod types;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use config::{EngineConfig, RuntimeConfigManager};
use engine::Engine;
use gateway::{BridgeClient, MarketGateway};

#[derive(Parser)]
#[command(name = "gold-portfolio-engine")]
#[command(version = "0.1.0")]
#[command(about = "Always-on capital-zone portfolio engine for spot gold", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the trading loop against the MT5 bridge
    Run,
    /// Scan the bridge for attachable terminals
    Terminals,
    /// Fetch one snapshot and print the engine view
    Status,
    /// Close every open position and exit
    CloseAll,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Gold Portfolio Engine v0.1.0");

    let config = load_config(&cli.config)?;
    let gateway = Arc::new(build_gateway(&config));

    match cli.command {
        Commands::Run => run_engine(config, gateway).await?,
        Commands::Terminals => list_terminals(gateway.as_ref()).await?,
        Commands::Status => show_status(config, gateway).await?,
        Commands::CloseAll => close_all(config, gateway).await?,
    }

    Ok(())
}

fn load_config(path: &str) -> Result<EngineConfig> {
    let path = Path::new(path);
    if path.exists() {
        let config = RuntimeConfigManager::load_from_file(path)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    } else {
        warn!("No config file at {}; using defaults", path.display());
        Ok(EngineConfig::default())
    }
}

fn build_gateway(config: &EngineConfig) -> BridgeClient {
    let api_key = std::env::var("BRIDGE_API_KEY").unwrap_or_default();
    let secret_key = std::env::var("BRIDGE_API_SECRET").unwrap_or_default();
    if api_key.is_empty() {
        warn!("BRIDGE_API_KEY not set; talking to the bridge unsigned");
        BridgeClient::unsigned(
            config.bridge.base_url.clone(),
            config.bridge.request_timeout_seconds,
        )
    } else {
        BridgeClient::new(
            config.bridge.base_url.clone(),
            api_key,
            secret_key,
            config.bridge.request_timeout_seconds,
        )
    }
}

async fn run_engine(config: EngineConfig, gateway: Arc<BridgeClient>) -> Result<()> {
    let symbol = config.trading.symbol.clone();
    let mut engine = Engine::new(config, gateway)?;
    let controller = engine.controller();

    // Ctrl+C drains: the in-flight tick finishes, then the loop exits.
    let stop_handle = controller.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Stop requested");
            let _ = stop_handle.request_stop();
        }
    });

    info!("Trading {} through the MT5 bridge", symbol);
    info!("Press Ctrl+C to stop");
    engine.run().await?;

    let state = controller.state().await;
    info!(
        "Engine stopped after {} ticks, {} orders",
        state.ticks_completed, state.orders_placed
    );
    Ok(())
}

async fn list_terminals(gateway: &dyn MarketGateway) -> Result<()> {
    let terminals = gateway.list_terminals().await?;
    if terminals.is_empty() {
        println!("No terminals reported by the bridge");
        return Ok(());
    }
    println!("{:<30} {:<12} {:<8} PATH", "BROKER", "KIND", "RUNNING");
    for terminal in terminals {
        println!(
            "{:<30} {:<12} {:<8} {}",
            terminal.broker_name,
            terminal.executable_kind,
            if terminal.is_running { "yes" } else { "no" },
            terminal.path
        );
    }
    Ok(())
}

async fn show_status(config: EngineConfig, gateway: Arc<BridgeClient>) -> Result<()> {
    let mut engine = Engine::new(config, gateway)?;
    engine.refresh_snapshots().await?;
    let observer = engine.observer();
    let Some(snapshot) = observer.read().await.clone() else {
        error!("No snapshot available");
        return Ok(());
    };

    let context = &snapshot.capital.context;
    println!("=== Engine Status ===");
    println!("Mode:           {}", context.mode);
    println!("Equity:         ${:.2}", context.current_equity);
    println!("Peak:           ${:.2}", context.peak_equity);
    println!("Drawdown:       {:.2}%", context.drawdown_pct);
    println!(
        "Zones:          safe ${:.2} | growth ${:.2} | aggressive ${:.2}",
        context.zones.safe, context.zones.growth, context.zones.aggressive
    );
    println!("Open positions: {}", snapshot.positions.len());
    println!(
        "Book:           {} buy / {} sell, imbalance {:.0}%",
        snapshot.stats.buy_count,
        snapshot.stats.sell_count,
        snapshot.stats.imbalance() * rust_decimal::Decimal::from(100)
    );
    println!("Health:         {:.2}", snapshot.health_score);
    Ok(())
}

async fn close_all(config: EngineConfig, gateway: Arc<BridgeClient>) -> Result<()> {
    let mut engine = Engine::new(config, gateway)?;
    let report = engine.close_all().await?;
    println!(
        "Close all: {}/{} closed, {} failed",
        report.closed, report.requested, report.failed
    );
    Ok(())
}
