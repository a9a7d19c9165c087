mod validate;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use studio_core::config::{AppConfig, ExecutionMode};
use studio_core::event::EventBus;
use studio_core::traits::PortTemplates;
use studio_core::types::{PortDirection, RunState};
use studio_flow::{
    resolve_order, resolve_waves, Graph, RunHandle, RunLogger, RunOptions, SimulatedAction,
    TemplateRegistry,
};

#[derive(Parser)]
#[command(name = "studio", version, about = "Resolve and simulate Agent Studio workflows")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "studio.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Sequential,
    Wave,
}

impl From<ModeArg> for ExecutionMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Sequential => ExecutionMode::Sequential,
            ModeArg::Wave => ExecutionMode::Wave,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Check a flow document for structural problems
    Validate {
        /// Flow document (JSON with `nodes` and `edges`)
        flow: PathBuf,
    },
    /// Print the execution order of a flow
    Resolve {
        /// Flow document
        flow: PathBuf,
    },
    /// Print the dependency waves of a flow
    Waves {
        /// Flow document
        flow: PathBuf,
    },
    /// Simulate a run of a flow
    Run {
        /// Flow document
        flow: PathBuf,
        /// Node ids whose simulated action fails
        #[arg(long = "fail")]
        fail: Vec<String>,
        /// Simulated duration of each node (overrides engine.step_delay_ms)
        #[arg(long)]
        delay_ms: Option<u64>,
        /// Execution mode (overrides engine.mode)
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,
        /// Print the final run snapshot as JSON
        #[arg(long)]
        json: bool,
    },
    /// List known node kinds and their ports
    Templates,
    /// Show current configuration
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("studio=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    // Handle completions before config loading
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "studio", &mut std::io::stdout());
        return Ok(());
    }

    let config = AppConfig::load_or_default(&cli.config)?;
    let templates = TemplateRegistry::from_config(&config);

    match cli.command {
        Commands::Validate { flow } => {
            let graph = load_flow(&flow, &templates)?;
            if validate::run_validate(&graph) > 0 {
                anyhow::bail!("{} has structural issues", flow.display());
            }
        }
        Commands::Resolve { flow } => {
            let graph = load_flow(&flow, &templates)?;
            for (i, id) in resolve_order(&graph)?.iter().enumerate() {
                println!("{:>3}. {}", i + 1, id);
            }
        }
        Commands::Waves { flow } => {
            let graph = load_flow(&flow, &templates)?;
            for (i, wave) in resolve_waves(&graph)?.iter().enumerate() {
                println!("wave {}: {}", i + 1, wave.join(", "));
            }
        }
        Commands::Run {
            flow,
            fail,
            delay_ms,
            mode,
            json,
        } => {
            let graph = load_flow(&flow, &templates)?;
            run_flow(&config, &graph, fail, delay_ms, mode, json).await?;
        }
        Commands::Templates => print_templates(&templates),
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Completions { .. } => unreachable!(),
    }

    Ok(())
}

fn load_flow(path: &Path, templates: &dyn PortTemplates) -> anyhow::Result<Graph> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading flow {}", path.display()))?;
    let graph = Graph::from_json(&json).with_context(|| format!("loading flow {}", path.display()))?;
    for node in graph.nodes() {
        if templates.ports(&node.kind).is_none() {
            warn!(node_id = %node.id, kind = %node.kind, "Node kind has no template");
        }
    }
    Ok(graph)
}

async fn run_flow(
    config: &AppConfig,
    graph: &Graph,
    fail: Vec<String>,
    delay_ms: Option<u64>,
    mode: Option<ModeArg>,
    json: bool,
) -> anyhow::Result<()> {
    let mut options = RunOptions::from(&config.engine);
    if let Some(mode) = mode {
        options.mode = mode.into();
    }

    let delay = delay_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| config.engine.step_delay());
    let action = fail
        .into_iter()
        .fold(SimulatedAction::new(delay), |action, id| action.fail_on(id));

    let bus = Arc::new(EventBus::new(config.engine.event_capacity));
    let mut handle = RunHandle::start(graph, Arc::new(action), options)?.with_event_bus(bus.clone());

    let shutdown = CancellationToken::new();
    let logger = match &config.log {
        Some(log) if log.enabled => {
            let logger = RunLogger::new(log.dir());
            let path = logger.log_path(handle.run_id());
            let rx = bus.subscribe();
            let run_id = handle.run_id().clone();
            let cancel = shutdown.clone();
            let task = tokio::spawn(async move { logger.run(rx, run_id, cancel).await });
            Some((path, task))
        }
        _ => None,
    };

    // Ctrl-C stops the run, interrupting the node in flight.
    let canceller = handle.canceller();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            canceller.cancel();
        }
    });

    let state = handle.run_to_end().await;
    if !state.is_terminal() {
        shutdown.cancel();
    }
    if let Some((path, task)) = logger {
        task.await.ok();
        info!(path = %path.display(), "Run log written");
    }

    let snapshot = handle.observe();
    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        for entry in &snapshot.log {
            println!("{}  {}", entry.timestamp.format("%H:%M:%S%.3f"), entry.message);
        }
        println!();
        for (id, status) in &snapshot.node_statuses {
            println!("  {:<24} {}", id, status);
        }
        println!();
        println!("Run {}: {}", snapshot.run_id, snapshot.state);
    }

    if state != RunState::Completed {
        anyhow::bail!("run ended {}", state);
    }
    Ok(())
}

fn print_templates(templates: &TemplateRegistry) {
    for kind in templates.kinds() {
        let ports = templates.ports(&kind).unwrap_or_default();
        let describe = |direction: PortDirection| {
            ports
                .iter()
                .filter(|p| p.direction == direction)
                .map(|p| {
                    if p.required {
                        format!("{}*", p.id)
                    } else {
                        p.id.clone()
                    }
                })
                .collect::<Vec<_>>()
                .join(", ")
        };
        println!(
            "{:<12} in: [{}]  out: [{}]",
            kind,
            describe(PortDirection::Input),
            describe(PortDirection::Output)
        );
    }
}
