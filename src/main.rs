//! Process entry point.
//!
//! Parses command-line arguments, loads and validates configuration, installs logging,
//! and runs the server until Ctrl-C, at which point acceptors stop, in-flight
//! connections are cancelled, and the worker thread is drained and joined before exit.

use anyhow::Result;
use clap::Parser;
use ils_aggregator::config::Settings;
use ils_aggregator::server::Server;
use log::info;
use std::path::PathBuf;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Multi-channel IQ-sample aggregation server for a phased-array / interferometric
/// receiver rig.
#[derive(Parser, Debug)]
#[command(name = "ils_aggregator", version, about)]
struct Cli {
    /// Path to a TOML configuration file. Omit to run entirely on built-in defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides `bind_address`.
    #[arg(long)]
    bind: Option<String>,

    /// Overrides `base_channel_port`.
    #[arg(long = "base-channel-port")]
    base_channel_port: Option<u16>,

    /// Overrides `controller_port`.
    #[arg(long = "controller-port")]
    controller_port: Option<u16>,

    /// Overrides `channel_amount`.
    #[arg(long = "channel-amount")]
    channel_amount: Option<u8>,
}

impl Cli {
    fn apply_overrides(&self, settings: &mut Settings) {
        if let Some(bind) = &self.bind {
            settings.bind_address = bind.clone();
        }
        if let Some(port) = self.base_channel_port {
            settings.base_channel_port = port;
        }
        if let Some(port) = self.controller_port {
            settings.controller_port = port;
        }
        if let Some(amount) = self.channel_amount {
            settings.channel_amount = amount;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref())?;
    cli.apply_overrides(&mut settings);
    settings.validate()?;

    init_logging(&settings.log_level);
    info!(
        "starting: bind={} channel_amount={} base_channel_port={} controller_port={}",
        settings.bind_address, settings.channel_amount, settings.base_channel_port, settings.controller_port
    );

    let server = Server::new(settings);
    server
        .run(async {
            tokio::signal::ctrl_c()
                .await
                .expect("failed to listen for ctrl-c");
            info!("ctrl-c received");
        })
        .await?;

    Ok(())
}

fn init_logging(default_level: &str) {
    let env = env_logger::Env::default().default_filter_or(default_level.to_string());
    env_logger::Builder::from_env(env).init();
}
