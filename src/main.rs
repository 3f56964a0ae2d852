//! Demo binary for interface-optimizer
//!
//! Spawns a handful of agents that share knowledge through one consensus
//! store and optimize their interfaces through one engine.
//!
//! ## Environment Variables
//!
//! - `LOG_FORMAT=json`: structured JSON output (overrides the config file)
//! - `RUST_LOG=info`: log level filter

use std::path::PathBuf;
use std::sync::Arc;

use interface_optimizer::config::{self, OptimizerConfig};
use interface_optimizer::{
    init_tracing, metrics, AgentId, ConsensusStore, Interface, OptimizationEngine,
    OptimizerError,
};
use tracing::{error, info};

struct Args {
    config: Option<PathBuf>,
    agents: usize,
    schema: bool,
}

fn parse_args() -> Result<Args, String> {
    let args: Vec<String> = std::env::args().collect();
    let mut config = None;
    let mut agents: usize = 4;
    let mut schema = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                i += 1;
                if i >= args.len() {
                    return Err("--config requires a value".to_string());
                }
                config = Some(PathBuf::from(&args[i]));
            }
            "--agents" | "-a" => {
                i += 1;
                if i >= args.len() {
                    return Err("--agents requires a value".to_string());
                }
                agents = args[i]
                    .parse()
                    .map_err(|_| format!("invalid agent count: {}", args[i]))?;
                if agents == 0 {
                    return Err("--agents must be at least 1".to_string());
                }
            }
            "--schema" => {
                schema = true;
            }
            "--help" | "-h" => {
                println!("{}", usage());
                std::process::exit(0);
            }
            other => {
                return Err(format!("unknown argument: {other}\n\n{}", usage()));
            }
        }
        i += 1;
    }

    Ok(Args {
        config,
        agents,
        schema,
    })
}

fn usage() -> String {
    [
        "Usage: interface-optimizer [OPTIONS]",
        "",
        "Options:",
        "  --config, -c <FILE>   Path to optimizer TOML file (default: built-in defaults)",
        "  --agents, -a <N>      Number of demo agents (default: 4)",
        "  --schema              Print the configuration JSON Schema and exit",
        "  --help, -h            Show this help message",
    ]
    .join("\n")
}

/// Knowledge and working interface for one demo agent.
fn agent_interfaces(index: usize) -> (Interface, Interface) {
    let i = index as f64;
    let knowledge = Interface::new()
        .with("param_a", 2.0 + i)
        .with("param_b", 0.5 * (i + 1.0))
        .with("mode", if index % 2 == 0 { "fast" } else { "safe" });
    let working = Interface::new()
        .with("param_a", 4.0)
        .with("param_b", 1.0 + i)
        .with("retries", 3.0)
        .with("compress", index % 2 == 1);
    (knowledge, working)
}

async fn run(args: Args, config: OptimizerConfig) -> Result<(), OptimizerError> {
    if config.observability.metrics_enabled {
        metrics::init_metrics()?;
    }

    let consensus = Arc::new(ConsensusStore::new(config.consensus.clone())?);
    let engine = Arc::new(OptimizationEngine::from_config(&config, Arc::clone(&consensus))?);
    info!(engine = %engine, transform = engine.transform().name(), "engine ready");

    let mut handles = Vec::with_capacity(args.agents);
    for index in 0..args.agents {
        let engine = Arc::clone(&engine);
        let consensus = Arc::clone(&consensus);
        handles.push(tokio::spawn(async move {
            let agent = AgentId::new(format!("agent-{index}"));
            let (knowledge, working) = agent_interfaces(index);
            consensus.update(&agent, &knowledge);
            let optimized = engine.optimize_async(working).await?;
            Ok::<_, OptimizerError>((agent, optimized))
        }));
    }

    for handle in handles {
        match handle.await {
            Ok(Ok((agent, optimized))) => {
                let fields: Vec<String> = optimized
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect();
                info!(agent = %agent, result = %fields.join(", "), "agent optimized");
            }
            Ok(Err(e)) => error!(error = %e, "agent failed"),
            Err(e) => error!(error = %e, "agent task panicked"),
        }
    }

    // Replaying the first interface must hit the cache.
    let (_, replay) = agent_interfaces(0);
    engine.optimize_async(replay).await?;

    info!(
        consensus = %consensus,
        entries = consensus.len(),
        history = engine.history_len(),
        cached = engine.cache_len(),
        "demo complete"
    );

    if config.observability.metrics_enabled {
        let summary = metrics::get_metrics_summary();
        info!(
            requests = ?summary.requests_total,
            errors = ?summary.errors_total,
            consensus_updates = summary.consensus_updates,
            "metrics summary"
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = match parse_args() {
        Ok(args) => args,
        Err(msg) => {
            eprintln!("{msg}");
            std::process::exit(1);
        }
    };

    if args.schema {
        match config::export_schema() {
            Ok(schema) => println!("{schema}"),
            Err(e) => {
                eprintln!("schema export failed: {e}");
                std::process::exit(1);
            }
        }
        return;
    }

    let config = match config::load_or_default(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    if std::env::var_os("LOG_FORMAT").is_none() {
        std::env::set_var("LOG_FORMAT", config.observability.log_format.as_env_value());
    }
    let _ = init_tracing();

    if let Err(e) = run(args, config).await {
        error!(error = %e, kind = e.kind(), "optimizer demo failed");
        std::process::exit(1);
    }
}
