//! # tickgraph
//!
//! Runs the reference scenario graphs from the command line.
//!
//! ```text
//! tickgraph run fan-in 3          # one run, prints "13"
//! tickgraph run loop 3 2 4        # batch, one line per input
//! tickgraph --config engine.toml config
//! ```

mod scenarios;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use scenarios::Scenario;
use std::path::{Path, PathBuf};
use tickgraph_core::{Engine, EngineConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tickgraph")]
#[command(about = "Run tick-scheduled dataflow graphs", long_about = None)]
#[command(version)]
struct Cli {
    /// Engine configuration file (TOML)
    #[arg(short, long, env = "TICKGRAPH_CONFIG")]
    config: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a scenario over one input, or a batch over several
    Run {
        /// Scenario to wire
        #[arg(value_enum)]
        scenario: Scenario,

        /// Inputs, one execution each
        #[arg(required = true)]
        inputs: Vec<String>,

        /// Log every run event
        #[arg(long)]
        events: bool,
    },

    /// List available scenarios
    Scenarios,

    /// Print the effective engine configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            scenario,
            inputs,
            events,
        } => run_scenario(scenario, inputs, events, config).await,
        Commands::Scenarios => {
            for scenario in Scenario::ALL {
                println!("{:<10} {}", scenario.name(), scenario.description());
            }
            Ok(())
        }
        Commands::Config => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => {
            let config = EngineConfig::from_file(path)
                .with_context(|| format!("loading engine config from {}", path.display()))?;
            tracing::info!(path = %path.display(), "Configuration loaded");
            Ok(config)
        }
        None => Ok(EngineConfig::default()),
    }
}

async fn run_scenario(
    scenario: Scenario,
    inputs: Vec<String>,
    events: bool,
    config: EngineConfig,
) -> Result<()> {
    let wired = scenario
        .build()
        .with_context(|| format!("wiring scenario '{}'", scenario.name()))?;
    let engine = Engine::with_config(wired.graph, config)?;

    if events {
        let mut receiver = engine.subscribe();
        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                tracing::info!(?event, "Run event");
            }
        });
    }

    let mut run = engine.typed::<String, String>();
    run.set_entry(wired.entry)?.set_result(wired.result)?;

    if let [input] = inputs.as_slice() {
        let report = run.execute(input.clone()).await?;
        tracing::info!(
            run_id = %report.run_id,
            status = %report.status,
            rounds = report.rounds,
            "Run complete"
        );
        println!("{}", report.results.join(", "));
        return Ok(());
    }

    let batch = run.run_batch(inputs.clone()).await?;
    for (input, results) in inputs.iter().zip(batch) {
        println!("{} => {}", input, results.join(", "));
    }
    Ok(())
}
