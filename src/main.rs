use anyhow::Result;
use clap::Parser;
use sounddetect::{
    app,
    cli::{handle_config_command, handle_devices_command, Cli, CliCommand},
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = if cli.verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match cli.command {
        Some(CliCommand::Version) => {
            println!("sounddetect {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Some(CliCommand::Devices) => handle_devices_command(),
        Some(CliCommand::Config(args)) => handle_config_command(args),
        Some(CliCommand::Run(args)) => app::run_service(args).await,
        None => app::run_service(Default::default()).await,
    }
}
