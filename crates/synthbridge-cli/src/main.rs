//! synthbridge - OSC control surface for a USB-MIDI synthesizer
//!
//! Bridges the synthesizer's MIDI/SYSEX protocol to OSC: parameters, presets
//! and connection state go out as OSC messages, control requests come in the
//! same way.

mod config;
mod dispatch;
mod osc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use signal_hook::consts::{SIGINT, SIGTERM};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use config::Config;
use osc::OscEndpoint;
use synthbridge_core::preset::file;
use synthbridge_core::{Bridge, ConnectionManager, MidirDriver, Snapshot};

#[derive(Parser)]
#[command(name = "synthbridge")]
#[command(author, version, about = "OSC control surface for a USB-MIDI synthesizer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file path (default: ~/.config/synthbridge/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// OSC listen address (overrides the config file)
    #[arg(long)]
    listen: Option<String>,

    /// OSC reply address (overrides the config file)
    #[arg(long)]
    reply: Option<String>,

    /// MIDI channel of the synthesizer, 1-16 (overrides the config file)
    #[arg(long)]
    channel: Option<u8>,

    /// Name fragment of the synthesizer's ports (overrides the config file)
    #[arg(long)]
    device: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a default configuration file
    Init,
    /// Show the configuration file path
    ConfigPath,
    /// List MIDI ports and which of them belong to the synthesizer
    ListPorts,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Some(Commands::Init) => {
            let path = Config::create_default_config_file()?;
            println!("Created default config at: {}", path.display());
            return Ok(());
        }
        Some(Commands::ConfigPath) => {
            let path = Config::config_path()?;
            println!("{}", path.display());
            return Ok(());
        }
        Some(Commands::ListPorts) | None => {}
    }

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load_or_default(),
    };

    // Apply CLI overrides
    if let Some(listen) = cli.listen {
        config.osc.listen = listen;
    }
    if let Some(reply) = cli.reply {
        config.osc.reply = reply;
    }
    if let Some(channel) = cli.channel {
        config.midi.channel = channel;
    }
    if let Some(device) = cli.device {
        config.midi.device_match = device;
    }

    if matches!(cli.command, Some(Commands::ListPorts)) {
        return list_ports(&config);
    }
    run(config)
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();
}

fn list_ports(config: &Config) -> Result<()> {
    let driver = MidirDriver::new(&config.midi.client_name).context("Failed to initialise MIDI")?;
    let mut connections = ConnectionManager::new(Box::new(driver), &config.midi.device_match);
    connections.poll();

    let records: Vec<_> = connections.records().collect();
    if records.is_empty() {
        println!("No MIDI ports found");
        return Ok(());
    }
    println!("MIDI ports (synthesizer match: '{}'):", config.midi.device_match);
    for record in records {
        println!(
            "  {:<6} {}{}",
            record.direction,
            record.name,
            if record.is_target_device { "  [synthesizer]" } else { "" }
        );
    }
    Ok(())
}

fn run(config: Config) -> Result<()> {
    let initial = match &config.preset.init_file {
        Some(path) => file::load(path)
            .with_context(|| format!("Failed to load init preset {}", path.display()))?,
        None => Snapshot::default(),
    };

    let driver = MidirDriver::new(&config.midi.client_name).context("Failed to initialise MIDI")?;
    let (mut bridge, notifications) = Bridge::new(config.to_bridge_config(), Box::new(driver), initial);
    let osc = OscEndpoint::bind(&config.osc.listen, &config.osc.reply)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(SIGINT, Arc::clone(&shutdown))?;
    signal_hook::flag::register(SIGTERM, Arc::clone(&shutdown))?;

    log::info!(
        "[BRIDGE] Waiting for '{}' on channel {} (Ctrl+C to exit)",
        config.midi.device_match,
        bridge.config().channel
    );

    let tick = config.tick();
    while !shutdown.load(Ordering::Relaxed) {
        for msg in osc.drain() {
            if let Err(e) = dispatch::handle(&mut bridge, &msg) {
                log::warn!("[OSC] {} failed: {:#}", msg.addr, e);
                if let Err(e) = osc.send(dispatch::error_reply(&msg, &e)) {
                    log::debug!("[OSC] Failed to send error reply: {:#}", e);
                }
            }
        }

        bridge.update();

        for notification in notifications.try_iter() {
            if let Err(e) = osc.send(dispatch::notification_to_osc(&notification)) {
                log::debug!("[OSC] Failed to send notification: {:#}", e);
            }
        }

        std::thread::sleep(tick);
    }

    log::info!("[BRIDGE] Shutting down");
    Ok(())
}
