//! agentctl entry point.

use clap::Parser;
use dotenvy::dotenv;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use agentctl::cli::{self, Cli};

#[tokio::main]
async fn main() {
    // Logs go to stderr so stdout stays clean for command output.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();

    // Load .env (if present)
    let _ = dotenv();

    let cli = Cli::parse();
    if let Err(err) = cli::run(cli).await {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
