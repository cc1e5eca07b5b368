//! gameshiftd Daemon
//!
//! Watches the foreground process and switches mouse DPI/report rate, display
//! vibrance, and OS pointer speed between a desktop profile and a game
//! profile based on the configured game list.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use gameshiftd::{
    config::{load_shared_config, spawn_config_watcher},
    engine::{new_shared_drivers, Engine, MouseBackend, VibranceBackend},
    focus::ForegroundResolver,
    mouse::MouseDriver,
    pointer::PointerSpeed,
    safety::SafetyProtocol,
    vibrance::NvapiVibrance,
};

/// gameshiftd - foreground-aware hardware profile switching
#[derive(Parser, Debug)]
#[command(name = "gameshiftd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (defaults to the platform config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Probe hardware availability and exit
    #[arg(long)]
    probe: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("gameshiftd starting...");

    if args.probe {
        probe_hardware();
        return Ok(());
    }

    // Load shared configuration; external edits are picked up by the watcher
    let shared_config = match load_shared_config(args.config.as_deref()) {
        Ok(config) => {
            info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            warn!("Failed to load config, using defaults: {}", e);
            gameshiftd::config::new_shared_config()
        }
    };

    let _watcher = match spawn_config_watcher(shared_config.clone()) {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            warn!("Config hot-reload unavailable: {}", e);
            None
        }
    };

    // Acquire driver handles; each degrades to a no-op when its hardware or
    // vendor runtime is absent
    let mut mouse = MouseDriver::new();
    if mouse.connect() {
        info!("Mouse command channel connected");
    } else {
        info!("No mouse command channel (DPI/rate switching disabled)");
    }

    let gpu = NvapiVibrance::load();
    let pointer = PointerSpeed::new();

    let drivers = new_shared_drivers(Box::new(mouse), Box::new(gpu), Box::new(pointer));
    let safety = Arc::new(SafetyProtocol::new());

    let mut engine = Engine::new(
        shared_config.clone(),
        drivers.clone(),
        Box::new(ForegroundResolver::new()),
        safety.clone(),
    );
    engine.set_status_sink(Box::new(|label, active| {
        info!(active, "Status: {}", label);
    }));

    let engine_handle = tokio::spawn(engine.run());

    info!("gameshiftd ready");

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, exiting...");
        }
        result = engine_handle => {
            if let Err(e) = result {
                error!("Engine task panicked: {:?}", e);
            }
        }
    }

    // Restore a safe desktop state on the way out. The latch makes this a
    // no-op if an automation stop already restored it.
    let desktop_vibrance = shared_config
        .read()
        .map(|c| c.desktop_vibrance)
        .unwrap_or(50);
    safety.execute(&drivers, desktop_vibrance).await;

    info!("gameshiftd stopped");
    Ok(())
}

/// Report hardware availability without starting the engine
fn probe_hardware() {
    println!("Probing hardware backends...\n");

    let mut mouse = MouseDriver::new();
    mouse.connect();
    println!(
        "Mouse ({:04X}:{:04X} command interface): {}",
        gameshiftd::mouse::VENDOR_ID,
        gameshiftd::mouse::PRODUCT_ID,
        if mouse.connected() {
            "connected"
        } else {
            "not found"
        }
    );

    let gpu = NvapiVibrance::load();
    if gpu.available() {
        println!("NVAPI vibrance: available ({} display(s))", gpu.display_count());
    } else {
        println!("NVAPI vibrance: unavailable");
    }

    let pointer = PointerSpeed::new();
    println!("OS pointer speed: current index {}", pointer.default_speed());
}
