use hedge_runner::{Engine, EngineConfig};
use log::{error, info};
use std::time::Duration;

const DEMO_CONFIG: &str = include_str!("../config/demo.json");

fn print_help() {
    eprintln!(
        r#"Hedge Engine - multi-venue order execution with internal netting

USAGE:
    hedge-engine [OPTIONS]

OPTIONS:
    --config <PATH>     Load configuration from JSON file (default: built-in demo)
    --run-for <SECS>    Stop after this many seconds instead of waiting for Ctrl-C
    --help              Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG            Log level filter (default: info)

EXAMPLES:
    # Run the built-in two-venue simulator demo for 10 seconds
    hedge-engine --run-for 10

    # Run with config file
    hedge-engine --config engine.json
"#
    );
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();
    let mut config_path: Option<String> = None;
    let mut run_for: Option<Duration> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            "--config" | "-c" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("Error: --config requires a path argument");
                    std::process::exit(1);
                }
                config_path = Some(args[i].clone());
            }
            "--run-for" => {
                i += 1;
                let secs = args.get(i).and_then(|s| s.parse::<u64>().ok());
                match secs {
                    Some(secs) => run_for = Some(Duration::from_secs(secs)),
                    None => {
                        eprintln!("Error: --run-for requires a number of seconds");
                        std::process::exit(1);
                    }
                }
            }
            arg => {
                eprintln!("Unknown argument: {}", arg);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let config = match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path);
            EngineConfig::from_file(&path)?
        }
        None => {
            info!("Using built-in demo configuration");
            EngineConfig::from_json(DEMO_CONFIG)?
        }
    };
    info!("Engine: {}", config.name);
    info!("Venues: {}", config.venues.len());
    info!("Bindings: {}", config.instruments.len());
    info!("Strategies: {}", config.strategies.len());

    let engine = Engine::from_config(config)?;
    let report = engine.start().await?;
    if !report.all_ready() {
        error!(
            "Not every binding is ready: failed {:?}, not ready {:?}",
            report.failed_venues, report.not_ready
        );
    }

    match run_for {
        Some(duration) => {
            info!("Running for {:?}", duration);
            tokio::select! {
                _ = tokio::time::sleep(duration) => {}
                _ = tokio::signal::ctrl_c() => info!("Interrupted"),
            }
        }
        None => {
            info!("Running until Ctrl-C");
            tokio::signal::ctrl_c().await?;
        }
    }

    engine.stop().await;

    for name in engine.config().strategies.iter().map(|s| s.name.as_str()) {
        let plans = engine.store().plans_for_strategy(name);
        let executed: rust_decimal::Decimal = plans.iter().map(|p| p.executed_quantity()).sum();
        info!("{}: {} plans, {} executed", name, plans.len(), executed);
    }
    info!("Internal crosses: {}", engine.store().crosses().len());
    Ok(())
}
