//! `voron-serials` command line.
//!
//! ## Commands
//!
//! - `voron-serials fetch --username <U> --client-id <ID> --secret <S>`
//! - `voron-serials predict --username <U> --client-id <ID> --secret <S> [--reject <ID>]...`

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use voron_serials_core::fetch::FetchSummary;
use voron_serials_core::predict::Predictor;
use voron_serials_core::{Fetcher, SerialsConfig};
use voron_serials_reddit::{Credentials, RedditClient, RedditConfig};

#[derive(Debug, Parser)]
#[command(name = "voron-serials", version, about = "Track and predict Voron serial numbers")]
pub struct Cli {
    /// Config file (defaults to $VORON_SERIALS_CONFIG, ./voron-serials.toml,
    /// then ~/.config/voron-serials/config.toml).
    #[arg(long = "config", short = 'c', global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Refresh the sidebar registry and bot comment caches.
    Fetch(AuthArgs),
    /// Print the request queue and the serials it will likely receive.
    Predict(PredictArgs),
}

/// Reddit application credentials.
#[derive(Debug, Args)]
pub struct AuthArgs {
    /// Reddit account that owns the app (used in the user agent).
    #[arg(long = "username")]
    pub username: String,

    /// OAuth client id.
    #[arg(long = "client-id")]
    pub client_id: String,

    /// OAuth client secret.
    #[arg(long = "secret")]
    pub secret: String,
}

#[derive(Debug, Args)]
pub struct PredictArgs {
    #[command(flatten)]
    pub auth: AuthArgs,

    /// Request post id expected to be rejected (repeatable, adds to config).
    #[arg(long = "reject", value_name = "POST_ID")]
    pub rejects: Vec<String>,

    /// Requests up to this epoch time have been checked for rejects.
    #[arg(long = "checked-through", value_name = "EPOCH")]
    pub checked_through: Option<f64>,
}

impl AuthArgs {
    fn client(&self, config: &SerialsConfig) -> anyhow::Result<RedditClient> {
        let credentials = Credentials::new(&self.client_id, &self.secret);
        let reddit = RedditConfig::new(config.user_agent_for(&self.username));
        RedditClient::new(credentials, reddit).context("failed to create Reddit client")
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = SerialsConfig::load(cli.config.as_deref()).context("failed to load config")?;
    match cli.command {
        Command::Fetch(auth) => run_fetch(&config, &auth).await,
        Command::Predict(args) => run_predict(config, &args).await,
    }
}

async fn run_fetch(config: &SerialsConfig, auth: &AuthArgs) -> anyhow::Result<()> {
    tracing::info!(
        subreddit = %config.subreddit,
        bot = %config.bot_username,
        "starting fetch"
    );
    let client = auth.client(config)?;
    client
        .authenticate()
        .await
        .context("failed to authenticate with Reddit")?;

    let store = config.cache_store();
    let fetcher = Fetcher::new(
        &client,
        &config.subreddit,
        &config.bot_username,
        config.fetch.clone(),
    );
    let summary = fetcher.run(&store).await?;
    print_fetch_summary(&summary)?;
    Ok(())
}

fn print_fetch_summary(summary: &FetchSummary) -> anyhow::Result<()> {
    let mut out = std::io::stdout().lock();
    writeln!(
        out,
        "registry: {} added, {} already cached, {} purged",
        summary.registry.added,
        summary.registry.already_known,
        summary.registry.purged.len()
    )?;
    writeln!(
        out,
        "comments: {} added over {} pages, {} without a serial",
        summary.comments.added, summary.comments.pages, summary.comments.unmatched
    )?;
    for (name, report) in [("registry", &summary.registry), ("comments", &summary.comments)] {
        if let Some(reason) = &report.stopped_early {
            writeln!(out, "warning: {name} sync stopped early: {reason}")?;
        }
    }
    Ok(())
}

async fn run_predict(mut config: SerialsConfig, args: &PredictArgs) -> anyhow::Result<()> {
    config.predict.rejects.extend(args.rejects.iter().cloned());
    if let Some(checked_through) = args.checked_through {
        config.predict.rejects_checked_through = checked_through;
    }

    let client = args.auth.client(&config)?;
    let store = config.cache_store();
    let predictor = Predictor::new(
        &client,
        &config.subreddit,
        config.predict.clone(),
        config.fetch.clone(),
    );

    tracing::info!(
        registry = %store.registry_path().display(),
        comments = %store.comments_path().display(),
        rejects = config.predict.rejects.len(),
        "reading caches"
    );
    // Fail on missing caches before touching the network.
    predictor.latest_from_cache(&store)?;
    client
        .authenticate()
        .await
        .context("failed to authenticate with Reddit")?;

    let report = predictor.run(&store).await?;
    write!(std::io::stdout().lock(), "{report}")?;
    Ok(())
}
