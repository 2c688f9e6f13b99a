use std::sync::Arc;
use std::time::{Duration, Instant};

use coilyard::api::{ApiError, HttpBackend, YardBackend};
use coilyard::channel::EventChannel;
use coilyard::coil::timestamp_now;
use coilyard::config::{ConfigError, YardConfig};
use coilyard::dispatch::AssignForm;
use coilyard::location::DropLocation;
use coilyard::notify::{Notifier, ToastTray};
use coilyard::store::SharedStore;
use coilyard::surface::{CoilTable, Dashboard};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

const HELP: &str = "commands: assign <coil> <Road-N> [urgent] | add <coil> <saddle> [weight] | search [term] | show | stats | quit";

#[derive(Debug, thiserror::Error)]
enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("stdin failed: {0}")]
    Io(#[from] std::io::Error),
}

/// One line of operator input.
#[derive(Debug, PartialEq)]
enum Input {
    Assign { coil_id: String, drop: Option<DropLocation>, urgent: bool },
    Add { coil_id: String, location: String, weight: Option<f64> },
    Search(String),
    Show,
    Stats,
    Quit,
    Help,
}

impl Input {
    fn parse(line: &str) -> Self {
        let mut words = line.split_whitespace();
        match words.next().map(str::to_lowercase).as_deref() {
            Some("assign") => Self::Assign {
                coil_id: words.next().unwrap_or_default().to_owned(),
                drop: words.next().and_then(|raw| raw.parse().ok()),
                urgent: words.next().is_some_and(|flag| flag.eq_ignore_ascii_case("urgent")),
            },
            Some("add") => Self::Add {
                coil_id: words.next().unwrap_or_default().to_owned(),
                location: words.next().unwrap_or_default().to_owned(),
                weight: words.next().and_then(|raw| raw.trim_end_matches(['t', 'T']).parse().ok()),
            },
            Some("search") => Self::Search(words.collect::<Vec<_>>().join(" ")),
            Some("show") => Self::Show,
            Some("stats") => Self::Stats,
            Some("quit" | "exit") => Self::Quit,
            _ => Self::Help,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    tracing_subscriber::fmt::init();

    let config = YardConfig::from_env()?;
    let backend: Arc<dyn YardBackend> = Arc::new(HttpBackend::new(&config)?);
    let channel = EventChannel::new(&config);
    let store = SharedStore::new(config.capacity);
    let notifier = Notifier::new(config.toast_ttl());

    let mut toasts = notifier.subscribe();
    let mut changes = store.changes();
    let mut status = channel.status();

    let dashboard = Dashboard::mount(backend, &channel, store.clone(), notifier.clone(), config.crane_id);
    let mut table = CoilTable::mount(&channel, store.clone(), notifier);
    let mut form = AssignForm::new();
    let mut tray = ToastTray::default();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut sweep = tokio::time::interval(Duration::from_millis(500));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(base_url = %config.base_url, crane_id = config.crane_id, "coilyard console started");
    println!("{HELP}");

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match Input::parse(&line) {
                    Input::Assign { coil_id, drop, urgent } => {
                        form.set_coil_id(&coil_id);
                        form.select_drop(drop);
                        form.set_urgent(urgent);
                        if let Ok(assignment) = dashboard.dispatcher().assign(&mut form).await {
                            info!(request_id = %assignment.request_id, "task acknowledged");
                        }
                    }
                    Input::Add { coil_id, location, weight } => {
                        match dashboard.dispatcher().register_coil(&coil_id, &location, timestamp_now(), weight).await {
                            Ok(_) => info!(coil_id = %coil_id, "registration acknowledged"),
                            Err(e) => debug!(coil_id = %coil_id, error = %e, "registration not sent"),
                        }
                    }
                    Input::Search(term) => {
                        table.set_search(&term);
                        print_lines(&table.render().await);
                    }
                    Input::Show => print_lines(&table.render().await),
                    Input::Stats => {
                        let stats = dashboard.stats().await;
                        println!(
                            "in yard: {}  dispatched: {}  total: {}  weight: {:.1}T",
                            stats.in_yard, stats.dispatched, stats.total, stats.total_weight
                        );
                    }
                    Input::Quit => break,
                    Input::Help => println!("{HELP}"),
                }
            }
            Ok(toast) = toasts.recv() => {
                let marker = if toast.is_error() { "!" } else { "*" };
                println!("{marker} {}: {}", toast.title, toast.description);
                tray.push(Instant::now(), toast);
            }
            Ok(()) = changes.changed() => {
                let revision = *changes.borrow_and_update();
                info!(revision, rows = table.rows().await.len(), "store updated");
            }
            Ok(()) = status.changed() => {
                let current = *status.borrow_and_update();
                info!(status = ?current, "realtime connection");
            }
            _ = sweep.tick() => {
                let dismissed = tray.prune(Instant::now());
                if dismissed > 0 {
                    tracing::debug!(dismissed, "toasts expired");
                }
            }
        }
    }

    info!("shutting down");
    dashboard.unmount().await;
    table.unmount().await;
    if channel.is_running() {
        warn!("realtime connection still running after unmount");
    }
    Ok(())
}

fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{line}");
    }
}
