use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use coilyard::api::{ApiError, HttpBackend, YardBackend};
use coilyard::channel::{EventChannel, NEW_COIL_EVENT, Subscription};
use coilyard::coil::{Coil, timestamp_now};
use coilyard::config::{ConfigError, YardConfig};
use coilyard::dispatch::{AssignForm, CommandDispatcher, DispatchError};
use coilyard::location::DropLocation;
use coilyard::notify::{Notification, Notifier};
use coilyard::snapshot::load_snapshot;
use coilyard::store::SharedStore;
use coilyard::view::{self, YardStats};
use serde_json::Value;
use tokio::sync::broadcast;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error("timed out waiting for `{0}` event")]
    Timeout(String),
    #[error("realtime channel closed")]
    ChannelClosed,
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "coilyard-cli", about = "Coil yard backend and realtime CLI")]
struct Cli {
    #[arg(long, env = "COILYARD_BASE_URL")]
    base_url: Option<String>,

    #[arg(long, env = "COILYARD_CRANE_ID", help = "Crane credited on add-coil; assignments always use crane 1")]
    crane_id: Option<u32>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List coils in the yard.
    Coils {
        #[arg(long)]
        search: Option<String>,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Yard totals.
    Stats,
    /// List crane tasks.
    Tasks,
    /// Assign a crane task.
    Assign(AssignArgs),
    /// Register a coil at a saddle location.
    AddCoil(AddCoilArgs),
    /// Print realtime events as they arrive.
    Watch(WatchArgs),
}

#[derive(Args, Debug)]
struct AssignArgs {
    coil_id: String,

    #[arg(help = "Road-1, Road-2 or Road-3")]
    drop: DropLocation,

    #[arg(long, default_value_t = false)]
    urgent: bool,
}

#[derive(Args, Debug)]
struct AddCoilArgs {
    coil_id: String,

    #[arg(help = "Saddle location such as A-B3-2")]
    location: String,

    #[arg(long)]
    weight: Option<f64>,

    #[arg(long, help = "Defaults to the current local time")]
    timestamp: Option<String>,
}

#[derive(Args, Debug)]
struct WatchArgs {
    #[arg(long, default_value = NEW_COIL_EVENT)]
    event: String,

    #[arg(long, help = "Stop after this many events")]
    count: Option<usize>,

    #[arg(long, help = "Fail if no event arrives within this many seconds")]
    timeout_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Command::Coils { search, json } => run_coils(&config, search.as_deref(), json).await,
        Command::Stats => run_stats(&config).await,
        Command::Tasks => run_tasks(&config).await,
        Command::Assign(args) => run_assign(&config, args).await,
        Command::AddCoil(args) => run_add_coil(&config, args).await,
        Command::Watch(args) => run_watch(&config, args).await,
    }
}

/// Environment config with command-line overrides applied.
fn load_config(cli: &Cli) -> Result<YardConfig, CliError> {
    let mut config = YardConfig::from_lookup(|key| match key {
        "COILYARD_BASE_URL" => cli.base_url.clone(),
        _ => std::env::var(key).ok(),
    })?;
    if let Some(crane_id) = cli.crane_id {
        config.crane_id = crane_id;
    }
    Ok(config)
}

async fn fetch_coils(config: &YardConfig) -> Result<Vec<Coil>, CliError> {
    let backend = HttpBackend::new(config)?;
    let records = backend.fetch_coils().await?;
    Ok(records.into_iter().map(Coil::from).collect())
}

async fn run_coils(config: &YardConfig, search: Option<&str>, json: bool) -> Result<(), CliError> {
    let coils = fetch_coils(config).await?;
    let rows = view::filter(&coils, search.unwrap_or_default());
    if json {
        print_json(&serde_json::to_value(&rows)?)?;
    } else {
        print_lines(&view::render_table(&rows));
    }
    Ok(())
}

async fn run_stats(config: &YardConfig) -> Result<(), CliError> {
    let coils = fetch_coils(config).await?;
    let YardStats { in_yard, dispatched, total, total_weight } = YardStats::from_coils(&coils);
    println!("coils in yard: {in_yard}");
    println!("dispatched:    {dispatched}");
    println!("total:         {total}");
    println!("total weight:  {total_weight:.1}T");
    Ok(())
}

async fn run_tasks(config: &YardConfig) -> Result<(), CliError> {
    let backend = HttpBackend::new(config)?;
    let tasks = backend.fetch_tasks().await?;
    if tasks.is_empty() {
        println!("No tasks found");
        return Ok(());
    }
    for task in tasks {
        let urgency = if task.is_urgent() { " [urgent]" } else { "" };
        println!(
            "#{} {} {} -> {} crane={} status={}{urgency}",
            task.task_id,
            task.coil_id,
            task.pick_location.as_deref().unwrap_or("?"),
            task.drop_location.as_deref().unwrap_or("?"),
            task.crane_assigned.map_or_else(|| "-".to_owned(), |crane| crane.to_string()),
            task.status.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

/// Dispatcher over a freshly loaded store, so the task carries the coil's
/// current location.
async fn loaded_dispatcher(config: &YardConfig, notifier: &Notifier) -> Result<CommandDispatcher, CliError> {
    let backend: Arc<dyn YardBackend> = Arc::new(HttpBackend::new(config)?);
    let store = SharedStore::new(config.capacity);
    if let Err(error) = load_snapshot(backend.as_ref(), &store, notifier).await {
        eprintln!("warning: continuing without coil locations: {error}");
    }
    Ok(CommandDispatcher::new(backend, store, notifier.clone(), config.crane_id))
}

async fn run_assign(config: &YardConfig, args: AssignArgs) -> Result<(), CliError> {
    let notifier = Notifier::new(config.toast_ttl());
    let mut toasts = notifier.subscribe();
    let dispatcher = loaded_dispatcher(config, &notifier).await?;

    let mut form = AssignForm::new();
    form.set_coil_id(&args.coil_id);
    form.select_drop(Some(args.drop));
    form.set_urgent(args.urgent);

    let result = dispatcher.assign(&mut form).await;
    drain_toasts(&mut toasts);
    let assignment = result?;

    eprintln!("request id: {}", assignment.request_id);
    print_json(&assignment.ack)
}

async fn run_add_coil(config: &YardConfig, args: AddCoilArgs) -> Result<(), CliError> {
    let notifier = Notifier::new(config.toast_ttl());
    let mut toasts = notifier.subscribe();
    let backend: Arc<dyn YardBackend> = Arc::new(HttpBackend::new(config)?);
    let dispatcher = CommandDispatcher::new(backend, SharedStore::new(config.capacity), notifier, config.crane_id);

    let timestamp = args.timestamp.unwrap_or_else(timestamp_now);
    let result = dispatcher.register_coil(&args.coil_id, &args.location, timestamp, args.weight).await;
    drain_toasts(&mut toasts);
    print_json(&result?)
}

async fn run_watch(config: &YardConfig, args: WatchArgs) -> Result<(), CliError> {
    let channel = EventChannel::new(config);
    let mut subscription = channel.subscribe(&args.event);
    let timeout = args.timeout_secs.map(Duration::from_secs);
    eprintln!("watching `{}` on {}", args.event, config.ws_url());

    let mut seen = 0_usize;
    while args.count.is_none_or(|count| seen < count) {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            payload = next_event(&mut subscription, timeout) => {
                print_json(&payload?)?;
                seen += 1;
            }
        }
    }
    Ok(())
}

async fn next_event(subscription: &mut Subscription, timeout: Option<Duration>) -> Result<Value, CliError> {
    let payload = match timeout {
        Some(limit) => tokio::time::timeout(limit, subscription.recv())
            .await
            .map_err(|_| CliError::Timeout(subscription.event().to_owned()))?,
        None => subscription.recv().await,
    };
    payload.ok_or(CliError::ChannelClosed)
}

fn drain_toasts(toasts: &mut broadcast::Receiver<Notification>) {
    while let Ok(toast) = toasts.try_recv() {
        let marker = if toast.is_error() { "error" } else { "ok" };
        eprintln!("[{marker}] {}: {}", toast.title, toast.description);
    }
}

fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{line}");
    }
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
