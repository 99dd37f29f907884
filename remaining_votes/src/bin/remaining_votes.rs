//! Show the votes left today on a Stack Exchange site.

#![allow(clippy::print_stdout)]

use std::{net::SocketAddr, num::NonZeroU64, path::PathBuf};

use clap::{Args, Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use remaining_votes::{
    activity::TotalVotesFetcher,
    config::{self, Config},
    fetcher::VoteFetcher,
    report::{self, Format},
    summary::Summary,
};
use remaining_votes_throttle::{FileStorage, Storage, Throttle, ThrottleStore, store};
use tokio::{
    runtime::Builder,
    signal,
    time::{self, Duration},
};
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, util::SubscriberInitExt};

#[derive(thiserror::Error, Debug)]
enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("Configuration error: {0}")]
    Config(#[from] config::Error),
    #[error("Failed to render summary: {0}")]
    Render(#[from] serde_json::Error),
    #[error("Failed to update throttle counter: {0}")]
    Store(#[from] store::Error),
    #[error("Failed to install prometheus recorder: {0}")]
    Prometheus(#[from] metrics_exporter_prometheus::BuildError),
}

#[derive(Parser)]
#[clap(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

// Arguments shared by every subcommand
#[derive(Args, Clone, Default)]
struct ConfigArgs {
    /// path on disk to the configuration file
    #[clap(long)]
    config_path: Option<PathBuf>,
    /// origin of the site to count votes on, overrides the configuration file
    #[clap(long)]
    origin: Option<String>,
    /// value of the Cookie header identifying the logged-in user, overrides
    /// the configuration file
    #[clap(long)]
    session_cookie: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Count today's votes and print how many are left
    Run(RunCommand),
    /// Validate configuration and exit
    ConfigCheck(ConfigArgs),
    /// Inspect or clear the throttle counter shared by all instances
    Throttle(ThrottleCommand),
}

#[derive(Args)]
struct RunCommand {
    #[command(flatten)]
    config: ConfigArgs,
    /// output format of the summary
    #[clap(long, value_enum, default_value_t = Format::Text)]
    format: Format,
    /// count again every this many seconds rather than exiting after one count
    #[clap(long)]
    interval_seconds: Option<NonZeroU64>,
    /// address to bind a prometheus exporter to
    #[clap(long)]
    prometheus_addr: Option<SocketAddr>,
}

#[derive(Args)]
struct ThrottleCommand {
    #[command(flatten)]
    config: ConfigArgs,
    #[command(subcommand)]
    action: ThrottleAction,
}

#[derive(Subcommand, Clone, Copy)]
enum ThrottleAction {
    /// Print the outstanding throttle debt in milliseconds
    Show,
    /// Drop all outstanding throttle debt
    Reset,
}

fn get_config(args: &ConfigArgs) -> Result<Config, Error> {
    let mut config = config::load(args.config_path.as_deref()).map_err(|err| {
        error!("Configuration validation failed: {err}");
        err
    })?;
    if let Some(origin) = &args.origin {
        config.origin.clone_from(origin);
    }
    if let Some(cookie) = &args.session_cookie {
        config.session_cookie = Some(cookie.clone());
    }
    Ok(config)
}

fn validate_config(args: &ConfigArgs) -> Result<Config, Error> {
    let config = get_config(args)?;
    config.validate()?;
    info!("Configuration is valid");
    Ok(config)
}

async fn report_loop<S>(
    votes: &VoteFetcher<S>,
    totals: &TotalVotesFetcher,
    daily_budget: u32,
    format: Format,
    interval: Option<Duration>,
) -> Result<(), Error>
where
    S: Storage + 'static,
{
    loop {
        info!("{}", report::LOADING);
        let summary = Summary::gather(votes, totals, daily_budget).await;
        println!("{}", report::render(&summary, format)?);

        let Some(interval) = interval else {
            return Ok(());
        };
        time::sleep(interval).await;
    }
}

async fn run(cmd: RunCommand, config: Config) -> Result<(), Error> {
    if let Some(addr) = cmd.prometheus_addr {
        PrometheusBuilder::new().with_http_listener(addr).install()?;
        info!("Prometheus exporter listening on {addr}");
    }

    let client = config.client()?;
    let endpoint = config.endpoint()?;
    let state_dir = config.state_dir();
    debug!("Throttle state kept in {}", state_dir.display());

    let throttle = Throttle::new(FileStorage::new(state_dir), &config.throttle);
    let votes = VoteFetcher::new(
        client.clone(),
        endpoint.clone(),
        throttle.clone(),
        config.pagination,
    );
    let totals = TotalVotesFetcher::new(client, endpoint);
    let interval = cmd
        .interval_seconds
        .map(|secs| Duration::from_secs(secs.get()));

    let work = report_loop(&votes, &totals, config.daily_budget, cmd.format, interval);
    tokio::select! {
        res = work => {
            throttle.drain().await;
            res
        }
        res = signal::ctrl_c() => {
            info!("Interrupt received, releasing throttle slots");
            throttle.teardown().await;
            res.map_err(Error::from)
        }
    }
}

async fn throttle(cmd: ThrottleCommand) -> Result<(), Error> {
    let config = get_config(&cmd.config)?;
    let store = ThrottleStore::new(FileStorage::new(config.state_dir()), config.throttle.key);
    match cmd.action {
        ThrottleAction::Show => println!("{}", store.get().await),
        ThrottleAction::Reset => {
            store.reset().await?;
            info!("Throttle counter {} reset", store.key());
        }
    }
    Ok(())
}

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .finish()
        .init();

    let cli = Cli::parse();

    let runtime = Builder::new_multi_thread()
        .enable_io()
        .enable_time()
        .build()?;

    match cli.command {
        Commands::Run(cmd) => {
            let version = env!("CARGO_PKG_VERSION");
            info!("Starting remaining-votes {version} run.");
            let config = get_config(&cmd.config)?;
            runtime.block_on(run(cmd, config))
        }
        Commands::ConfigCheck(args) => match validate_config(&args) {
            Ok(_) => std::process::exit(0),
            Err(err) => {
                error!("{err}");
                std::process::exit(1)
            }
        },
        Commands::Throttle(cmd) => runtime.block_on(throttle(cmd)),
    }
}
