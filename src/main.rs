//! hidhost CLI
//!
//! Watches gamepads and Speed Editors come and go, or lists what is connected.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::Parser;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use hidhost::transport::{DeviceDescriptor, DeviceFamily, HidApiBackend};
use hidhost::{HostConfig, HostEvent, HostManager};

// CLI definitions
mod cli;
use cli::{Cli, Commands, Family};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    // Load config
    let config_path = cli.config.unwrap_or_else(HostConfig::default_path);
    debug!("Loading config from {:?}", config_path);
    let config = HostConfig::load(&config_path)?;

    match cli.command.unwrap_or(Commands::Watch { family: None }) {
        Commands::Watch { family } => watch(&config, family).await,
        Commands::List { family, json } => list(&config, family, json),
        Commands::Config { save } => show_config(&config, &config_path, save),
    }
}

/// Whether `family` is enabled in the config and picked by `--family`
fn watched(config: &HostConfig, family: Family, filter: Option<Family>) -> bool {
    let enabled = match family {
        Family::Gamepad => config.gamepad.enabled,
        Family::SpeedEditor => config.speed_editor.enabled,
    };
    enabled && family.selected(filter)
}

/// Run the enabled managers until Ctrl-C, printing every event
async fn watch(config: &HostConfig, filter: Option<Family>) -> Result<()> {
    let backend = Arc::new(HidApiBackend::new()?.with_poll_interval(config.poll_interval()));
    let (tx, mut rx) = mpsc::unbounded_channel::<HostEvent>();

    let gamepads = watched(config, Family::Gamepad, filter)
        .then(|| HostManager::new(config.gamepad_family(), Arc::clone(&backend)));
    let editors = watched(config, Family::SpeedEditor, filter)
        .then(|| HostManager::new(config.speed_editor_family(), Arc::clone(&backend)));

    let mut running = 0;
    if let Some(manager) = &gamepads {
        running += start_forwarding(manager, &tx) as usize;
    }
    if let Some(manager) = &editors {
        running += start_forwarding(manager, &tx) as usize;
    }
    // Only the managers' callbacks keep the channel open now
    drop(tx);

    if running == 0 {
        bail!("No device family could be started (check config and HID permissions)");
    }
    info!("Watching {} device families. Press Ctrl+C to exit.", running);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => print_event(&event),
                None => break,
            },
            result = &mut shutdown => {
                if let Err(e) = result {
                    warn!("Failed to listen for Ctrl-C: {}", e);
                }
                info!("Shutting down");
                break;
            }
        }
    }

    if let Some(manager) = &gamepads {
        manager.do_gc();
    }
    if let Some(manager) = &editors {
        manager.do_gc();
    }
    Ok(())
}

/// Hook a manager up to the event channel and start it
fn start_forwarding<F: DeviceFamily>(
    manager: &HostManager<F>,
    tx: &mpsc::UnboundedSender<HostEvent>,
) -> bool {
    let tx = tx.clone();
    manager.forward_events(move |event| {
        // Receiver is gone only during shutdown
        let _ = tx.send(event);
    });
    manager.start()
}

fn print_event(event: &HostEvent) {
    let device = &event.device;
    println!(
        "{:<12} {:<11} {} [{:04x}:{:04x}] {}",
        event.event.as_str(),
        event.family,
        device.display_name(),
        device.vendor_id,
        device.product_id,
        device.hardware_ref
    );
}

#[derive(Serialize)]
struct ListedDevice {
    family: &'static str,
    #[serde(flatten)]
    device: DeviceDescriptor,
}

fn enumerate_family<F: DeviceFamily>(
    backend: &HidApiBackend,
    family: &F,
    out: &mut Vec<ListedDevice>,
) -> Result<()> {
    for device in backend.enumerate(&family.match_criteria())? {
        out.push(ListedDevice {
            family: family.name(),
            device,
        });
    }
    Ok(())
}

fn list(config: &HostConfig, filter: Option<Family>, json: bool) -> Result<()> {
    let backend = HidApiBackend::new()?;
    let mut devices = Vec::new();

    if watched(config, Family::Gamepad, filter) {
        enumerate_family(&backend, &config.gamepad_family(), &mut devices)?;
    }
    if watched(config, Family::SpeedEditor, filter) {
        enumerate_family(&backend, &config.speed_editor_family(), &mut devices)?;
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }

    if devices.is_empty() {
        println!("No matching devices found");
        return Ok(());
    }

    println!(
        "{:<11} {:<9} {:<32} {:<16} PATH",
        "FAMILY", "VID:PID", "PRODUCT", "SERIAL"
    );
    for entry in &devices {
        let d = &entry.device;
        println!(
            "{:<11} {:04x}:{:04x} {:<32} {:<16} {}",
            entry.family,
            d.vendor_id,
            d.product_id,
            d.display_name(),
            d.serial.as_deref().unwrap_or("-"),
            d.hardware_ref
        );
    }
    Ok(())
}

fn show_config(config: &HostConfig, path: &Path, save: bool) -> Result<()> {
    if save {
        config.save(path)?;
        println!("Saved configuration to {}", path.display());
        return Ok(());
    }

    println!("# {}", path.display());
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_family_is_never_watched() {
        let mut config = HostConfig::default();
        config.speed_editor.enabled = false;

        assert!(watched(&config, Family::Gamepad, None));
        assert!(!watched(&config, Family::SpeedEditor, None));
        assert!(!watched(&config, Family::SpeedEditor, Some(Family::SpeedEditor)));
    }

    #[test]
    fn test_family_filter_narrows_enabled_families() {
        let config = HostConfig::default();
        assert!(watched(&config, Family::SpeedEditor, Some(Family::SpeedEditor)));
        assert!(!watched(&config, Family::Gamepad, Some(Family::SpeedEditor)));
    }
}
