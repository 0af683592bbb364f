use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Config;

#[derive(Parser, Debug)]
#[command(name = "sounddetect")]
#[command(about = "Windowed microphone loudness detector", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Run the detection cycle until interrupted (default)
    Run(RunCliArgs),
    /// List audio input devices
    Devices,
    /// Inspect or reset the configuration file
    Config(ConfigCliArgs),
    /// Print version information
    Version,
}

#[derive(ClapArgs, Debug, Default)]
pub struct RunCliArgs {
    /// Read configuration from this file instead of the user config
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Capture window length in milliseconds
    #[arg(long)]
    pub window_ms: Option<u64>,
    /// Pause between windows in milliseconds
    #[arg(long)]
    pub pause_ms: Option<u64>,
    /// Capture sample rate in Hz
    #[arg(long)]
    pub sample_rate: Option<u32>,
    /// Share of the loudest samples averaged per window
    #[arg(long)]
    pub top_fraction: Option<f64>,
    /// Loudness above which a window raises an alert
    #[arg(long)]
    pub threshold: Option<f64>,
    /// Input device name (see `sounddetect devices`)
    #[arg(short, long)]
    pub device: Option<String>,
}

impl RunCliArgs {
    /// Overlay command-line values on top of `config`.
    pub fn apply(&self, config: &mut Config) {
        if let Some(window_ms) = self.window_ms {
            config.capture.window_duration_ms = window_ms;
        }
        if let Some(pause_ms) = self.pause_ms {
            config.capture.pause_duration_ms = pause_ms;
        }
        if let Some(sample_rate) = self.sample_rate {
            config.capture.sample_rate = sample_rate;
        }
        if let Some(top_fraction) = self.top_fraction {
            config.capture.top_fraction = top_fraction;
        }
        if let Some(threshold) = self.threshold {
            config.alert.threshold = threshold;
        }
        if let Some(device) = &self.device {
            config.capture.device = Some(device.clone());
        }
    }
}

#[derive(ClapArgs, Debug)]
pub struct ConfigCliArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the active configuration
    Show {
        /// Print as JSON instead of TOML
        #[arg(long)]
        json: bool,
    },
    /// Print the configuration file location
    Path,
    /// Overwrite the configuration file with defaults
    Reset,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_subcommand() {
        let cli = Cli::parse_from(["sounddetect"]);
        assert!(cli.command.is_none());
        assert!(!cli.verbose);
    }

    #[test]
    fn test_run_overrides() {
        let cli = Cli::parse_from([
            "sounddetect",
            "-v",
            "run",
            "--window-ms",
            "2000",
            "--pause-ms",
            "500",
            "--threshold",
            "650",
            "--device",
            "USB Mic",
        ]);
        assert!(cli.verbose);

        let Some(CliCommand::Run(args)) = cli.command else {
            panic!("expected run command");
        };

        let mut config = Config::default();
        args.apply(&mut config);
        assert_eq!(config.capture.window_duration_ms, 2000);
        assert_eq!(config.capture.pause_duration_ms, 500);
        assert_eq!(config.capture.sample_rate, 48_000);
        assert_eq!(config.alert.threshold, 650.0);
        assert_eq!(config.capture.device.as_deref(), Some("USB Mic"));
    }

    #[test]
    fn test_config_show_json() {
        let cli = Cli::parse_from(["sounddetect", "config", "show", "--json"]);
        assert!(matches!(
            cli.command,
            Some(CliCommand::Config(ConfigCliArgs {
                command: ConfigCommand::Show { json: true }
            }))
        ));
    }
}
