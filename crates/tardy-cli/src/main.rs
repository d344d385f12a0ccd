use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use tardy_core::{
    HandlerError, QueueOptions, TaskContext, TaskId, TaskQueue, WorkerGroup, handler_fn,
};

#[derive(Parser, Debug)]
#[command(name = "tardy", version, about = "Delayed, retryable task queue over Redis")]
struct Cli {
    #[command(flatten)]
    queue: QueueArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct QueueArgs {
    /// JSON file with queue options; flags below override it
    #[arg(short = 'c', long = "config", global = true)]
    config: Option<PathBuf>,

    /// Redis address, host:port or redis://...
    #[arg(long, global = true)]
    address: Option<String>,

    #[arg(long, global = true)]
    queue: Option<String>,

    #[arg(long, global = true)]
    namespace: Option<String>,

    #[arg(long, global = true)]
    worker_id: Option<String>,

    /// Negative retries forever
    #[arg(long, global = true, allow_negative_numbers = true)]
    max_retries: Option<i64>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Schedule a numbered `{"body": "<n>"}` task at a fixed period
    Produce {
        /// Period between tasks, e.g. `1s`, `250ms`, `2m`
        #[arg(long, default_value = "1s", value_parser = parse_period)]
        every: Duration,

        /// Delay each task by this much after it is produced
        #[arg(long, default_value = "0s", value_parser = parse_period)]
        delay: Duration,
    },
    /// Consume tasks and log them
    Consume {
        /// Consumer loops in this process; each gets `<worker-id>-<i>`
        #[arg(long, default_value_t = 1)]
        workers: usize,

        /// Fail every task whose body is divisible by this, to exercise retries
        #[arg(long)]
        fail_every: Option<u64>,
    },
}

impl QueueArgs {
    fn options(&self) -> anyhow::Result<QueueOptions> {
        let mut options = match &self.config {
            Some(path) => QueueOptions::from_json_file(path)?,
            None => QueueOptions::default(),
        };
        if let Some(address) = &self.address {
            options.storage_address = address.clone();
        }
        if let Some(queue) = &self.queue {
            options.queue_name = queue.clone();
        }
        if let Some(namespace) = &self.namespace {
            options.namespace = namespace.clone();
        }
        if let Some(worker_id) = &self.worker_id {
            options.worker_id = worker_id.clone();
        }
        if let Some(max_retries) = self.max_retries {
            options.max_retries = max_retries;
        }
        Ok(options)
    }
}

/// Accepts `<n>ms`, `<n>s`, `<n>m`; a bare number is seconds.
fn parse_period(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    let (digits, unit) = match raw.find(|c: char| !c.is_ascii_digit()) {
        Some(at) => raw.split_at(at),
        None => (raw, "s"),
    };
    let n: u64 = digits
        .parse()
        .map_err(|_| format!("invalid period {raw:?}"))?;
    match unit {
        "ms" => Ok(Duration::from_millis(n)),
        "s" => Ok(Duration::from_secs(n)),
        "m" => Ok(Duration::from_secs(n.saturating_mul(60))),
        other => Err(format!("unknown unit {other:?} in {raw:?}")),
    }
}

/// Flip the shutdown signal on Ctrl-C.
fn shutdown_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "cannot listen for ctrl-c");
            return;
        }
        tracing::info!("ctrl-c received, shutting down");
        let _ = tx.send(true);
    });
    rx
}

async fn produce(
    options: QueueOptions,
    every: Duration,
    delay: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let queue = TaskQueue::builder(options)
        .build()
        .await
        .context("cannot build producer")?;

    let mut ticker = tokio::time::interval(every);
    let mut n: u64 = 0;
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {}
        }
        if *shutdown.borrow() {
            break;
        }
        n += 1;
        match queue.schedule_in(json!({ "body": n.to_string() }), delay).await {
            Ok(task_id) => tracing::info!(%task_id, body = n, "produced"),
            Err(err) => tracing::error!(error = %err, body = n, "failed to produce"),
        }
    }
    Ok(())
}

/// Demo handler: logs the task, or fails it when `fail_every` divides its body.
async fn log_task(
    fail_every: Option<u64>,
    ctx: TaskContext,
    task_id: TaskId,
    payload: serde_json::Value,
) -> Result<(), HandlerError> {
    let body: String = serde_json::from_value(payload["body"].clone())?;
    if let (Some(divisor), Ok(n)) = (fail_every, body.parse::<u64>()) {
        if divisor > 0 && n % divisor == 0 {
            return Err(HandlerError::new(format!("body {n} is divisible by {divisor}")));
        }
    }
    tracing::info!(
        %task_id,
        worker = %ctx.worker_id,
        retry_count = ctx.retry_count,
        %body,
        "consumed"
    );
    Ok(())
}

async fn consume(
    options: QueueOptions,
    workers: usize,
    fail_every: Option<u64>,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let mut queues = Vec::with_capacity(workers);
    for i in 0..workers.max(1) {
        let mut worker_options = options.clone();
        if workers > 1 {
            worker_options.worker_id = format!("{}-{i}", options.worker_id);
        }
        let queue = TaskQueue::builder(worker_options)
            .build()
            .await
            .context("cannot build consumer")?;
        queues.push(queue);
    }
    let watched = queues.clone();

    let handler = Arc::new(handler_fn(move |ctx, task_id, payload| {
        log_task(fail_every, ctx, task_id, payload)
    }));

    let group = WorkerGroup::spawn(queues, handler);
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            break;
        }
    }
    group.shutdown_and_join().await;

    for queue in &watched {
        let stats = serde_json::to_string(&queue.stats())?;
        tracing::info!(worker = %queue.worker_id(), %stats, "final counters");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let options = cli.queue.options()?;
    let shutdown = shutdown_on_ctrl_c();

    match cli.command {
        Command::Produce { every, delay } => produce(options, every, delay, shutdown).await,
        Command::Consume { workers, fail_every } => {
            consume(options, workers, fail_every, shutdown).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> TaskContext {
        TaskContext {
            worker_id: "w".to_string(),
            queue_name: "q".to_string(),
            retry_count: 0,
        }
    }

    #[tokio::test]
    async fn log_task_fails_divisible_bodies_and_bad_payloads() {
        let id: TaskId = "01ARZ3NDEKTSV4RRFFQ69G5FAV".parse().unwrap();

        assert!(log_task(Some(3), ctx(), id, json!({"body": "4"})).await.is_ok());
        assert!(log_task(None, ctx(), id, json!({"body": "6"})).await.is_ok());

        let err = log_task(Some(3), ctx(), id, json!({"body": "6"})).await.unwrap_err();
        assert!(err.message().contains("divisible by 3"));

        let err = log_task(None, ctx(), id, json!({"body": 6})).await.unwrap_err();
        assert!(err.message().starts_with("json decode"));
    }

    #[test]
    fn parses_periods() {
        assert_eq!(parse_period("1s"), Ok(Duration::from_secs(1)));
        assert_eq!(parse_period("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_period("2m"), Ok(Duration::from_secs(120)));
        assert_eq!(parse_period("3"), Ok(Duration::from_secs(3)));
        assert!(parse_period("1h").is_err());
        assert!(parse_period("fast").is_err());
    }

    #[test]
    fn flags_override_config_defaults() {
        let cli = Cli::parse_from([
            "tardy",
            "--queue",
            "emails",
            "--max-retries",
            "-1",
            "consume",
            "--workers",
            "2",
        ]);
        let options = cli.queue.options().unwrap();
        assert_eq!(options.queue_name, "emails");
        assert_eq!(options.namespace, "default");
        assert_eq!(options.max_retries, -1);
        assert!(matches!(cli.command, Command::Consume { workers: 2, .. }));
    }
}
