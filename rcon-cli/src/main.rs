//! rcon-cli entry point.
//!
//! ```text
//! rcon-cli status users          Run commands, print responses
//! rcon-cli < commands.txt        Run one command per stdin line
//! rcon-cli --config <path>       Load a custom config TOML
//! rcon-cli --gen-config          Write default config to stdout
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rcon_cli::config::{CliConfig, LoggingConfig, Overrides};
use rcon_cli::runner;
use rcon_core::RconClient;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "rcon-cli", about = "Run console commands on a Source RCON server")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "rcon-cli.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Server address (`host:port`), overrides the config file.
    #[arg(short, long)]
    address: Option<String>,

    /// RCON password, overrides the config file.
    #[arg(short, long, env = "RCON_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Connect + auth timeout in milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Commands to run. Read from stdin when none are given.
    commands: Vec<String>,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&CliConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let (mut config, source) = CliConfig::load(&cli.config);
    config.apply(Overrides {
        address: cli.address,
        password: cli.password,
        timeout_ms: cli.timeout_ms,
    });
    init_tracing(&config.logging)?;
    source.report(&cli.config);

    info!("rcon-cli v{}", env!("CARGO_PKG_VERSION"));
    info!("server: {}", config.server.address);

    let client = RconClient::connect(&config.server).await?;
    let mut stdout = std::io::stdout().lock();

    let run = async {
        if cli.commands.is_empty() {
            let stdin = BufReader::new(tokio::io::stdin());
            runner::run_lines(&client, stdin, &mut stdout).await
        } else {
            runner::run_commands(&client, &cli.commands, &mut stdout).await
        }
    };
    let result = tokio::select! {
        result = run => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, closing");
            Ok(0)
        }
    };

    client.dispose();
    let answered = result?;
    info!(answered, "done");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) -> std::io::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if logging.file.is_empty() {
        builder.with_writer(std::io::stderr).init();
    } else {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&logging.file)?;
        builder
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .init();
    }
    Ok(())
}
