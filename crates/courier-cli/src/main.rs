use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use courier_core::app::{AppBuilder, ExecutionHandler};
use courier_core::config::{CourierConfig, WorkerConfig};
use courier_core::domain::{BranchId, ExecStatus, Execution, ExecutionId, MessageId};
use courier_core::impls::{InMemoryBranchTracker, RecordingEventSink};
use courier_core::observability::init_tracing;
use courier_core::ports::ExecutionCodec;

#[derive(Parser)]
#[command(name = "courier", about = "Courier execution-message queue")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an in-process pipeline: dispatch, poll, execute, route
    Demo {
        /// Number of executions to submit
        #[arg(long, default_value = "10")]
        executions: usize,

        /// How many of them run inside one split branch
        #[arg(long, default_value = "0")]
        branches: usize,

        /// Workers to start when the config declares none
        #[arg(long, default_value = "2")]
        workers: usize,

        /// Fail every n-th execution (0 = never)
        #[arg(long, default_value = "0")]
        fail_every: usize,

        /// Give up after this many seconds
        #[arg(long, default_value = "30")]
        timeout_secs: u64,

        /// TOML config file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

/// context に "fail" を持つ実行を失敗させる
struct DemoHandler;

#[async_trait]
impl ExecutionHandler for DemoHandler {
    async fn handle(&self, execution: &Execution) -> Result<(), String> {
        if execution.context.contains_key("fail") {
            return Err(format!("{} was told to fail", execution.execution_id));
        }
        tracing::info!(execution_id = %execution.execution_id, "executed");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Demo {
            executions,
            branches,
            workers,
            fail_every,
            timeout_secs,
            config,
        } => {
            run_demo(
                executions,
                branches,
                workers,
                fail_every,
                Duration::from_secs(timeout_secs),
                config,
            )
            .await
        }
    }
}

async fn run_demo(
    executions: usize,
    branches: usize,
    workers: usize,
    fail_every: usize,
    timeout: Duration,
    config_path: Option<PathBuf>,
) -> anyhow::Result<()> {
    if branches > executions {
        bail!("--branches ({branches}) cannot exceed --executions ({executions})");
    }

    let mut config = match &config_path {
        Some(path) => CourierConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => CourierConfig::default(),
    };
    if config.workers.is_empty() {
        let group = config.dispatcher.default_group.clone();
        config.workers = (0..workers)
            .map(|i| WorkerConfig {
                id: format!("worker-{i}"),
                groups: vec![group.clone()],
            })
            .collect();
    }
    let default_group = config.dispatcher.default_group.clone();

    let events = Arc::new(RecordingEventSink::new());
    let branch_tracker = Arc::new(InMemoryBranchTracker::new());
    let app = AppBuilder::new(config)
        .with_event_sink(events.clone())
        .with_branch_service(branch_tracker.clone())
        .expect_groups(&[default_group.as_str()])
        .build()?;

    let branch_id = BranchId::generate();
    for n in 0..executions {
        let mut execution = Execution::new(ExecutionId::generate(), 1).with_position(n as i64);
        if n < branches {
            execution = execution.with_branch(branch_id);
        }
        if fail_every > 0 && (n + 1) % fail_every == 0 {
            execution = execution.with_context("fail", "demo");
        }
        let payload = app.codec.encode(&execution)?;
        app.dispatcher
            .dispatch_one(
                MessageId::from(execution.execution_id).as_str(),
                "",
                Some(ExecStatus::Pending),
                payload,
            )
            .await?;
    }
    tracing::info!(executions, branches, "executions submitted");

    let group = app.spawn_workers(Arc::new(DemoHandler));
    let drained = tokio::select! {
        drained = wait_until_drained(&app.store, timeout) => drained,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("interrupted");
            false
        }
    };
    group.shutdown_and_join().await;

    let counts = app.store.counts_by_status().await;
    println!("{}", serde_json::to_string_pretty(&counts)?);
    for event in events.events().await {
        println!("{} {}", event.event_type, event.data);
    }
    println!("branch executions ended: {}", branch_tracker.ended().await);

    if !drained {
        bail!("{} messages still live", counts.live());
    }
    Ok(())
}

async fn wait_until_drained(
    store: &courier_core::impls::InMemoryQueueStore,
    timeout: Duration,
) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while store.counts_by_status().await.live() > 0 {
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    true
}
