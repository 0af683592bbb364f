use crate::audio::MicAudioSource;
use crate::config::Config;
use anyhow::{Context, Result};

pub mod args;

pub use args::{Cli, CliCommand, ConfigCliArgs, ConfigCommand, RunCliArgs};

pub fn handle_devices_command() -> Result<()> {
    let devices = MicAudioSource::list_devices().context("Failed to enumerate input devices")?;

    if devices.is_empty() {
        println!("No audio input devices found.");
        return Ok(());
    }

    println!("Found {} input device(s):\n", devices.len());
    for device in devices {
        let marker = if device.is_default { " (default)" } else { "" };
        println!("  {}{}", device.name, marker);
    }

    println!("\nTo capture from a specific device, use: sounddetect run --device <NAME>");
    Ok(())
}

pub fn handle_config_command(args: ConfigCliArgs) -> Result<()> {
    match args.command {
        ConfigCommand::Show { json } => {
            let config = Config::load()?;
            let rendered = if json {
                serde_json::to_string_pretty(&config)?
            } else {
                toml::to_string_pretty(&config)?
            };
            println!("{}", rendered);
        }
        ConfigCommand::Path => {
            println!("{}", Config::config_path()?.display());
        }
        ConfigCommand::Reset => {
            let config = Config::default();
            config.save()?;
            println!(
                "Configuration reset to defaults at {}",
                Config::config_path()?.display()
            );
        }
    }

    Ok(())
}
