use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use herold_config::HeroldConfig;
use herold_core::Alert;
use herold_engine::{
    AlertDispatchEngine, BackendRegistry, BroadcastSink, DispatchError, FanoutSink, TracingSink,
};
use herold_simulator::{Scenario, Simulator, SimulatorConfig};
use herold_telemetry::{EventLogger, MetricsRecorder};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "herold", version, about = "Alert channel dispatch engine")]
pub struct Cli {
    /// Configuration file. Without it `config/herold.yaml`, `config/$HEROLD_ENV.yaml`
    /// and `HEROLD_*` variables are layered over the defaults.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate the configuration and list channels in dispatch order
    Validate,
    /// Dispatch JSON-lines alerts through the configured channels
    Dispatch(DispatchArgs),
    /// Run a seeded simulation against fault-injecting backends
    Simulate(SimulateArgs),
}

#[derive(Args, Debug, Clone)]
pub struct DispatchArgs {
    /// One JSON alert per line; stdin when omitted or `-`
    #[arg(short, long)]
    pub input: Option<PathBuf>,
    /// Print every published event as a JSON line on stdout
    #[arg(long, default_value_t = false)]
    pub events: bool,
    /// Print Prometheus metrics on stderr when done
    #[arg(long, default_value_t = false)]
    pub metrics: bool,
}

#[derive(Args, Debug, Clone)]
pub struct SimulateArgs {
    /// Simulation settings (YAML)
    #[arg(long)]
    pub settings: Option<PathBuf>,
    /// Scenario to replay; generated from the settings when omitted
    #[arg(short, long)]
    pub scenario: Option<PathBuf>,
    #[arg(long)]
    pub seed: Option<u64>,
    /// Number of alerts to generate
    #[arg(long)]
    pub alerts: Option<usize>,
    /// Probability of an injected transport failure per send
    #[arg(long)]
    pub failure_rate: Option<f64>,
    /// Write the scenario that was run to this file
    #[arg(long)]
    pub save_scenario: Option<PathBuf>,
    /// Fail unless the outcome digest matches
    #[arg(long)]
    pub validate_hash: Option<String>,
}

pub fn load_config(path: Option<&Path>) -> Result<HeroldConfig> {
    match path {
        Some(path) => HeroldConfig::load_from_path(path),
        None => HeroldConfig::load(),
    }
    .context("Failed to load configuration")
}

pub async fn run_command(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    EventLogger::init(&config.telemetry).map_err(|e| anyhow!(e))?;

    match cli.command {
        Commands::Validate => validate(&config),
        Commands::Dispatch(args) => dispatch(config, args).await,
        Commands::Simulate(args) => simulate(config, args).await,
    }
}

fn validate(config: &HeroldConfig) -> Result<()> {
    let channels = config.channels_in_dispatch_order();
    println!("Configuration valid: {} channel(s)", channels.len());
    for channel in channels {
        println!(
            "{:>5}  {:<24} {:<8} {}..{}{}{}",
            channel.priority,
            channel.name,
            channel.channel_type,
            channel.minimum_severity,
            channel.maximum_severity,
            if channel.is_emergency_channel { "  emergency" } else { "" },
            if channel.is_enabled { "" } else { "  disabled" },
        );
    }
    Ok(())
}

async fn dispatch(config: HeroldConfig, args: DispatchArgs) -> Result<()> {
    let metrics = Arc::new(MetricsRecorder::new(&config.telemetry.metrics.namespace)?);
    let broadcast = BroadcastSink::new(config.dispatch.event_buffer_capacity);
    let mut sink = FanoutSink::default().with(Arc::new(broadcast.clone()));
    if config.telemetry.log_events {
        sink = sink.with(Arc::new(TracingSink));
    }

    let printer = args.events.then(|| {
        let mut events = broadcast.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => match serde_json::to_string(&event) {
                        Ok(line) => println!("{line}"),
                        Err(error) => warn!("Failed to encode event: {error}"),
                    },
                    Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event printer lagged"),
                    Err(RecvError::Closed) => break,
                }
            }
        })
    });

    let engine = AlertDispatchEngine::new(
        config.dispatch.clone(),
        BackendRegistry::with_defaults(),
        Arc::new(sink),
        metrics.clone(),
    );
    for channel in config.channels_in_dispatch_order() {
        match engine.register_channel(channel.clone()) {
            Ok(()) => {}
            Err(DispatchError::MissingBackend(kind)) => {
                warn!(channel = %channel.name, %kind, "No backend for channel type, skipping");
            }
            Err(error) => return Err(error.into()),
        }
    }

    let reader: Box<dyn AsyncBufRead + Unpin + Send> = match args.input {
        Some(path) if path != Path::new("-") => {
            let file = tokio::fs::File::open(&path)
                .await
                .with_context(|| format!("Failed to open {}", path.display()))?;
            Box::new(BufReader::new(file))
        }
        _ => Box::new(BufReader::new(tokio::io::stdin())),
    };

    let mut lines = reader.lines();
    let (mut dispatched, mut skipped, mut line_number) = (0usize, 0usize, 0usize);
    while let Some(line) = lines.next_line().await? {
        line_number += 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match serde_json::from_str::<Alert>(line) {
            Ok(alert) => {
                engine.dispatch(alert).await?;
                dispatched += 1;
            }
            Err(error) => {
                skipped += 1;
                warn!(line = line_number, "Skipping malformed alert: {error}");
            }
        }
    }

    engine.flush().await;
    engine.wait_idle().await;
    engine.publish_filter_statistics();
    let discarded = engine.shutdown().await;
    info!(dispatched, skipped, discarded, "Dispatch finished");

    if args.metrics {
        eprintln!("{}", metrics.gather_metrics()?);
    }

    // The printer ends once every sender is gone.
    drop(engine);
    drop(broadcast);
    if let Some(printer) = printer {
        printer.await?;
    }
    Ok(())
}

async fn simulate(config: HeroldConfig, args: SimulateArgs) -> Result<()> {
    let scenario = match &args.scenario {
        Some(path) => Scenario::load(path)?,
        None => {
            let mut settings = match &args.settings {
                Some(path) => SimulatorConfig::load_from_path(path)?,
                None => SimulatorConfig::default(),
            };
            if let Some(seed) = args.seed {
                settings.seed = seed;
            }
            if let Some(alerts) = args.alerts {
                settings.alert_count = alerts;
            }
            if let Some(rate) = args.failure_rate {
                settings.chaos.failure_rate = rate.clamp(0.0, 1.0);
            }
            Scenario::generate(&settings)
        }
    };
    if let Some(path) = &args.save_scenario {
        scenario.save(path)?;
        info!(path = %path.display(), "Scenario saved");
    }

    let simulator = Simulator::new(config)?;
    let report = tokio::task::spawn_blocking(move || simulator.run_blocking(&scenario)).await??;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if let Some(expected) = &args.validate_hash {
        report.verify(expected)?;
        info!("Outcome digest verified");
    }
    Ok(())
}
