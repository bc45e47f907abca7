use clap::Parser;
use tracing_subscriber::EnvFilter;
use voron_serials_cli::Cli;

/// Logs go to stderr so the prediction report on stdout stays clean.
fn init_logging() {
    let default_level = "info";
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(default_level))
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();
    voron_serials_cli::run(cli).await
}
