//! sandq CLI: operator interface to the analysis queue.

use clap::{Parser, Subcommand};
use sandq::config::Config;
use sandq::model::{SampleId, Status, Task, TaskId, TaskOptions};
use sandq::telemetry::{TelemetryConfig, init_telemetry};
use sandq::Store;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sandq", about = "Persistent analysis task queue")]
struct Cli {
    /// TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Connection string, overriding the configured one
    #[arg(long, global = true)]
    dsn: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Queue a file or URL for analysis
    Submit {
        #[command(subcommand)]
        target: SubmitTarget,
        #[command(flatten)]
        opts: SubmitOpts,
    },
    /// List tasks, newest first
    List {
        /// Filter by status
        #[arg(long)]
        status: Option<String>,
        /// Maximum tasks to show
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Show a task as JSON
    Show { id: i64 },
    /// Show a sample as JSON
    Sample { id: i64 },
    /// Claim the next pending task and print it
    Claim,
    /// Mark a processing task as finished
    Complete {
        id: i64,
        /// Record the task as failed instead of successful
        #[arg(long)]
        failed: bool,
    },
}

#[derive(Subcommand)]
enum SubmitTarget {
    /// A file on disk
    File { path: PathBuf },
    /// A URL
    Url { url: String },
}

#[derive(clap::Args)]
struct SubmitOpts {
    /// Analysis timeout in seconds (0 = executor default)
    #[arg(long, default_value_t = 0, global = true)]
    timeout: i64,
    /// Priority (higher = claimed first)
    #[arg(long, default_value_t = 1, global = true)]
    priority: i64,
    #[arg(long, global = true)]
    package: Option<String>,
    #[arg(long, global = true)]
    options: Option<String>,
    #[arg(long, global = true)]
    custom: Option<String>,
    /// Machine to run on
    #[arg(long, global = true)]
    machine: Option<String>,
    #[arg(long, global = true)]
    platform: Option<String>,
}

impl SubmitOpts {
    fn into_task_options(self) -> TaskOptions {
        let mut opts = TaskOptions::new()
            .timeout(self.timeout)
            .priority(self.priority);
        if let Some(package) = self.package {
            opts = opts.package(package);
        }
        if let Some(options) = self.options {
            opts = opts.options(options);
        }
        if let Some(custom) = self.custom {
            opts = opts.custom(custom);
        }
        if let Some(machine) = self.machine {
            opts = opts.machine(machine);
        }
        if let Some(platform) = self.platform {
            opts = opts.platform(platform);
        }
        opts
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;
    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "sandq".to_string(),
        log_level: config.log_level.clone(),
    })?;

    let store = Store::open(cli.dsn.as_deref(), &config.database).await?;

    let result = match cli.command {
        Command::Submit { target, opts } => cmd_submit(&store, target, opts).await,
        Command::List { status, limit } => cmd_list(&store, status, limit).await,
        Command::Show { id } => cmd_show(&store, id).await,
        Command::Sample { id } => cmd_sample(&store, id).await,
        Command::Claim => cmd_claim(&store).await,
        Command::Complete { id, failed } => cmd_complete(&store, id, failed).await,
    };

    store.close().await;
    result
}

async fn cmd_submit(store: &Store, target: SubmitTarget, opts: SubmitOpts) -> anyhow::Result<()> {
    let opts = opts.into_task_options();
    let id = match target {
        SubmitTarget::File { path } => store.enqueue_file(&path, &opts).await?,
        SubmitTarget::Url { url } => store.enqueue_url(&url, &opts).await?,
    };
    println!("Queued task {id}");
    Ok(())
}

async fn cmd_list(store: &Store, status: Option<String>, limit: i64) -> anyhow::Result<()> {
    let tasks = match status {
        Some(s) => {
            let status: Status = s
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid status: {s}"))?;
            store.list_tasks_by_status(status, Some(limit)).await?
        }
        None => store.list_tasks(Some(limit)).await?,
    };

    if tasks.is_empty() {
        println!("No tasks found.");
        return Ok(());
    }

    println!(
        "{:<6}  {:<5}  {:<10}  {:<4}  {:<40}  ADDED",
        "ID", "CAT", "STATUS", "PRI", "TARGET"
    );
    println!("{}", "-".repeat(90));
    for task in &tasks {
        print_row(task);
    }
    println!("\n{} task(s)", tasks.len());
    Ok(())
}

fn print_row(task: &Task) {
    let target: String = if task.target.chars().count() > 40 {
        task.target.chars().take(37).chain("...".chars()).collect()
    } else {
        task.target.clone()
    };
    println!(
        "{:<6}  {:<5}  {:<10}  {:<4}  {:<40}  {}",
        task.id,
        task.category,
        task.status,
        task.priority,
        target,
        task.added_on.format("%Y-%m-%d %H:%M:%S")
    );
}

async fn cmd_show(store: &Store, id: i64) -> anyhow::Result<()> {
    let Some(task) = store.get_task(TaskId(id)).await? else {
        anyhow::bail!("no task with id {id}");
    };
    println!("{}", serde_json::to_string_pretty(&task)?);
    if let Some(guest) = store.guest_for_task(task.id).await? {
        println!("{}", serde_json::to_string_pretty(&guest)?);
    }
    Ok(())
}

async fn cmd_sample(store: &Store, id: i64) -> anyhow::Result<()> {
    let Some(sample) = store.get_sample(SampleId(id)).await? else {
        anyhow::bail!("no sample with id {id}");
    };
    println!("{}", serde_json::to_string_pretty(&sample)?);
    Ok(())
}

async fn cmd_claim(store: &Store) -> anyhow::Result<()> {
    match store.claim_next().await? {
        Some(task) => println!("{}", serde_json::to_string_pretty(&task)?),
        None => println!("No pending tasks."),
    }
    Ok(())
}

async fn cmd_complete(store: &Store, id: i64, failed: bool) -> anyhow::Result<()> {
    let task = store.complete(TaskId(id), !failed).await?;
    println!("Task {} is now {}", task.id, task.status);
    Ok(())
}
