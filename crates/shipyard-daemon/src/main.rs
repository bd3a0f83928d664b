//! `shipyardd`: the Shipyard check scheduler on the in-memory store
//!
//! - `run`: load settings and delivery configs, then check until Ctrl-C
//! - `validate`: parse delivery configs and report structural problems

mod manifest;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use shipyard_core::{DeliveryConfigRepository, Settings};
use shipyard_engine::{Engine, Repositories};
use shipyard_store_memory::InMemoryStore;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("shipyardd")
        .version(shipyard_core::VERSION)
        .about("Promotion approval and resource actuation for continuous delivery")
        .subcommand_required(true)
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Log as JSON lines"),
        )
        .subcommand(
            Command::new("run")
                .about("Run the check scheduler until interrupted")
                .arg(
                    Arg::new("settings")
                        .long("settings")
                        .value_parser(value_parser!(PathBuf))
                        .help("Settings file (TOML); defaults apply when omitted"),
                )
                .arg(
                    Arg::new("delivery-config")
                        .long("delivery-config")
                        .required(true)
                        .action(ArgAction::Append)
                        .value_parser(value_parser!(PathBuf))
                        .help("Delivery config file (YAML); repeat for several"),
                ),
        )
        .subcommand(
            Command::new("validate")
                .about("Check delivery config files")
                .arg(
                    Arg::new("files")
                        .required(true)
                        .num_args(1..)
                        .value_parser(value_parser!(PathBuf))
                        .help("Delivery config files (YAML)"),
                ),
        )
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("log-json"));

    match matches.subcommand() {
        Some(("run", args)) => run(args).await,
        Some(("validate", args)) => validate(args),
        _ => Ok(()),
    }
}

async fn run(args: &ArgMatches) -> Result<()> {
    let settings = match args.get_one::<PathBuf>("settings") {
        Some(path) => Settings::load(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => Settings::default(),
    };

    let store = Arc::new(InMemoryStore::new());
    for path in args.get_many::<PathBuf>("delivery-config").into_iter().flatten() {
        let config = manifest::load(path)?;
        let problems = manifest::problems(&config);
        if !problems.is_empty() {
            bail!("{} is invalid: {}", path.display(), problems.join("; "));
        }
        info!(
            "loaded delivery config {} for {} from {}",
            config.name,
            config.application,
            path.display()
        );
        DeliveryConfigRepository::store(store.as_ref(), config)
            .await
            .with_context(|| format!("failed to store {}", path.display()))?;
    }

    let engine = Engine::builder(Repositories::from_store(store), settings).build();
    if engine.actuator.handlers().is_empty() {
        warn!("no resource handlers registered, resource checks will report NoSupportedResourceHandler");
    }

    let scheduler = Arc::clone(&engine.scheduler);
    scheduler.on_application_up();
    tokio::select! {
        () = scheduler.run() => {}
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl-C")?;
            info!("interrupted");
        }
    }
    scheduler.on_application_down();
    Ok(())
}

fn validate(args: &ArgMatches) -> Result<()> {
    let mut invalid = 0;
    for path in args.get_many::<PathBuf>("files").into_iter().flatten() {
        let config = manifest::load(path)?;
        let problems = manifest::problems(&config);
        if problems.is_empty() {
            println!("{}: ok", path.display());
            continue;
        }
        invalid += 1;
        for problem in problems {
            println!("{}: {}", path.display(), problem);
        }
    }
    if invalid > 0 {
        bail!("{} delivery config(s) invalid", invalid);
    }
    Ok(())
}
