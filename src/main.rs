use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Arg, ArgAction, ArgMatches, Command};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use flightcrawl_core::AppConfig;
use flightcrawl_domain::entities::DATE_FMT;
use flightcrawl_domain::{RequestCreate, SortOption};

mod app;
mod shutdown;

use app::{AppMode, Application};
use shutdown::{wait_for_shutdown_signal, ShutdownManager};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("flightcrawl")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Flight-search crawl pipeline")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Config file path (searches well-known locations when omitted)"),
        )
        .arg(
            Arg::new("mode")
                .short('m')
                .long("mode")
                .value_name("MODE")
                .help("Run mode")
                .value_parser(["submit", "worker"])
                .default_value("worker"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level")
                .value_parser(["trace", "debug", "info", "warn", "error"])
                .default_value("info"),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("Log format")
                .value_parser(["json", "pretty"])
                .default_value("pretty"),
        )
        .arg(
            Arg::new("from")
                .long("from")
                .value_name("IATA")
                .help("Departure port code (submit mode)")
                .required_if_eq("mode", "submit"),
        )
        .arg(
            Arg::new("to")
                .long("to")
                .value_name("IATA")
                .help("Arrival port code (submit mode)")
                .required_if_eq("mode", "submit"),
        )
        .arg(
            Arg::new("depart")
                .long("depart")
                .value_name("DATE")
                .help("Departure date, YYYY-MM-DD (submit mode)")
                .required_if_eq("mode", "submit"),
        )
        .arg(
            Arg::new("return")
                .long("return")
                .value_name("DATE")
                .help("Return date, YYYY-MM-DD"),
        )
        .arg(
            Arg::new("flex")
                .long("flex")
                .value_name("DAYS")
                .help("Date flexibility, 0-3 days either side")
                .value_parser(clap::value_parser!(i32))
                .default_value("0"),
        )
        .arg(
            Arg::new("sort")
                .long("sort")
                .value_name("SORT")
                .help("Result ordering: bestflight/price/duration or an index 0-2")
                .default_value("bestflight"),
        )
        .arg(
            Arg::new("direct")
                .long("direct")
                .help("Direct flights only")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("config");
    let mode_str = matches.get_one::<String>("mode").unwrap();
    let log_level = matches.get_one::<String>("log-level").unwrap();
    let log_format = matches.get_one::<String>("log-format").unwrap();

    init_logging(log_level, log_format);

    info!("starting flightcrawl");
    info!("run mode: {mode_str}");

    let config = AppConfig::load(config_path.map(String::as_str))
        .context("failed to load configuration")?;

    let mode = parse_app_mode(mode_str, &matches)?;
    let app = Application::new(config).await?;

    match mode {
        AppMode::Submit(_) => {
            // one-shot producer path, no signal handling needed
            let shutdown_manager = ShutdownManager::new();
            app.run(mode, shutdown_manager.subscribe()).await?;
        }
        AppMode::Worker => {
            let app = Arc::new(app);
            let shutdown_manager = ShutdownManager::new();

            let worker_handle = {
                let app = Arc::clone(&app);
                let shutdown_rx = shutdown_manager.subscribe();
                tokio::spawn(async move {
                    if let Err(e) = app.run(AppMode::Worker, shutdown_rx).await {
                        error!("worker failed: {e:#}");
                    }
                })
            };

            wait_for_shutdown_signal().await;
            info!("received interrupt, shutting down gracefully");
            shutdown_manager.shutdown().await;

            if tokio::time::timeout(Duration::from_secs(30), worker_handle)
                .await
                .is_err()
            {
                warn!("worker did not stop within 30s, exiting anyway");
            }
        }
    }

    info!("flightcrawl stopped");
    Ok(())
}

fn parse_app_mode(mode: &str, matches: &ArgMatches) -> Result<AppMode> {
    match mode {
        "submit" => {
            let parse_date = |value: &String| {
                NaiveDate::parse_from_str(value, DATE_FMT)
                    .with_context(|| format!("invalid date (expected YYYY-MM-DD): {value}"))
            };

            let dep_date = parse_date(matches.get_one::<String>("depart").unwrap())?;
            let ret_date = matches
                .get_one::<String>("return")
                .map(parse_date)
                .transpose()?;
            let sorted_by = SortOption::parse(matches.get_one::<String>("sort").unwrap())?;

            Ok(AppMode::Submit(RequestCreate {
                dep_port: matches.get_one::<String>("from").unwrap().to_uppercase(),
                arr_port: matches.get_one::<String>("to").unwrap().to_uppercase(),
                dep_date,
                ret_date,
                flex_option: *matches.get_one::<i32>("flex").unwrap(),
                sorted_by,
                direct: matches.get_flag("direct"),
            }))
        }
        "worker" => Ok(AppMode::Worker),
        _ => Err(anyhow::anyhow!("unknown run mode: {mode}")),
    }
}

fn init_logging(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        "json" => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        _ => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}
