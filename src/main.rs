//! Conductor 命令行入口
//!
//! 子命令：task（单次编排）、status（状态 / 健康 / 指标）、demo（经协调器并发跑演示任务）、
//! interactive（标准输入循环）。Ctrl+C 触发优雅关闭。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use conductor::config::load_config_or_default;
use conductor::core::shutdown::{CoordinationCleanup, ShutdownCoordinator};
use conductor::core::{Priority, ShutdownManager, ShutdownReason, TaskRequest};
use conductor::{observability, AgentSystem, DEMO_TASKS};
use serde_json::{json, Map, Value};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(name = "conductor")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Route tasks to specialist agents and coordinate them", long_about = None)]
struct Cli {
    /// Path to an extra TOML config file
    #[arg(global = true, long = "config", short = 'c')]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Route and run a single task
    Task {
        #[arg(value_name = "TEXT")]
        text: String,

        /// low / medium / high
        #[arg(long, default_value = "medium")]
        priority: Priority,

        /// JSON object passed to the handler as context
        #[arg(long)]
        context: Option<String>,
    },

    /// Print system status, health and performance metrics
    Status,

    /// Run the demo tasks through the coordination manager
    Demo,

    /// Read tasks from stdin
    Interactive,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let cli = Cli::parse();
    let config = load_config_or_default(cli.config);
    let system = Arc::new(AgentSystem::from_config(&config).context("Failed to build agent system")?);
    system.start();

    let shutdown = Arc::new(ShutdownManager::new());
    shutdown.install_signal_handlers();

    let result = match cli.command.unwrap_or(Commands::Interactive) {
        Commands::Task {
            text,
            priority,
            context,
        } => run_task(&system, text, priority, context.as_deref()).await,
        Commands::Status => print_status(&system),
        Commands::Demo => {
            tokio::select! {
                r = run_demo(&system) => r,
                _ = shutdown.wait_for_shutdown() => Ok(()),
            }
        }
        Commands::Interactive => run_interactive(&system, &shutdown).await,
    };

    if shutdown.is_shutdown() {
        tracing::info!("Shutdown signal received");
    }

    let mut cleanup = ShutdownCoordinator::new()
        .with_timeout(config.coordination.shutdown_grace_secs + 5);
    cleanup.register(CoordinationCleanup::new(Arc::clone(system.coordinator())));
    cleanup.run_cleanup().await;

    result
}

fn parse_context(raw: Option<&str>) -> anyhow::Result<Map<String, Value>> {
    let Some(raw) = raw else {
        return Ok(Map::new());
    };
    match serde_json::from_str::<Value>(raw).context("Invalid --context JSON")? {
        Value::Object(map) => Ok(map),
        _ => anyhow::bail!("--context must be a JSON object"),
    }
}

async fn run_task(
    system: &AgentSystem,
    text: String,
    priority: Priority,
    context: Option<&str>,
) -> anyhow::Result<()> {
    let context = parse_context(context)?;
    let run = system
        .run(
            TaskRequest::new(text)
                .with_priority(priority)
                .with_context(context),
        )
        .await;
    if let Some(handler) = &run.routing_decision {
        println!("[{}]", handler);
    }
    println!("{}", run.into_response());
    Ok(())
}

fn print_status(system: &AgentSystem) -> anyhow::Result<()> {
    let report = json!({
        "status": system.get_system_status(),
        "health": system.get_system_health(),
        "metrics": system.get_performance_metrics(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn run_demo(system: &AgentSystem) -> anyhow::Result<()> {
    let mut ids = Vec::with_capacity(DEMO_TASKS.len());
    for (i, (content, priority)) in DEMO_TASKS.iter().enumerate() {
        let id = format!("demo_task_{}", i + 1);
        system
            .coordinate_request(&id, TaskRequest::new(*content).with_priority(*priority))
            .with_context(|| format!("Failed to queue {id}"))?;
        ids.push((id, *content));
    }

    for (id, content) in ids {
        let Some(task) = system.wait_for(&id).await else {
            continue;
        };
        println!("== {} ({:?})", content, task.status);
        match (task.result, task.error) {
            (Some(result), _) => println!("{}\n", result),
            (None, Some(error)) => println!("{}\n", error),
            _ => println!(),
        }
    }

    println!("{}", serde_json::to_string_pretty(&system.get_system_health())?);
    Ok(())
}

async fn run_interactive(system: &AgentSystem, shutdown: &ShutdownManager) -> anyhow::Result<()> {
    println!("Conductor interactive mode. Commands: status, help, quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            _ = shutdown.wait_for_shutdown() => break,
        };
        let Some(line) = line else {
            break;
        };
        match line.trim() {
            "" => continue,
            "quit" | "exit" => {
                shutdown.shutdown(ShutdownReason::UserInitiated);
                break;
            }
            "help" => println!("Type a task, or one of: status, help, quit"),
            "status" => print_status(system)?,
            task => {
                let response = system.process_task(task, Priority::Medium, Map::new()).await;
                println!("{}\n", response);
            }
        }
    }
    Ok(())
}
