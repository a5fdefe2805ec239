use anyhow::Result;
use tokio::signal;
use tracing::{error, info, warn};

use status_watch::api;
use status_watch::config::{WatchConfig, DEFAULT_CONFIG_PATH};
use status_watch::engine::PollScheduler;
use status_watch::fetcher::StatusFetcher;
use status_watch::models::{Health, MonitorState, StatusSnapshot};
use status_watch::store::status_transitions;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::INFO.into()))
        .with_ansi(true)
        .init();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = WatchConfig::load(&config_path)?;
    info!(endpoint = %config.endpoint_url, interval_ms = config.poll_interval_ms, "Loaded {}", config_path);

    let fetcher = StatusFetcher::from_config(&config)?;
    let mut previous: Option<StatusSnapshot> = None;
    let handle = PollScheduler::new(fetcher)
        .with_interval(config.poll_interval())
        .start(move |state| report(&mut previous, &state));

    if let Some(port) = config.api_port {
        let reader = handle.reader();
        tokio::spawn(async move {
            if let Err(e) = api::start_server(port, reader).await {
                error!("Status view failed: {:#}", e);
            }
        });
    }

    signal::ctrl_c().await?;
    info!("Shutdown signal received. Stopping status watch...");
    handle.stop();

    Ok(())
}

fn report(previous: &mut Option<StatusSnapshot>, state: &MonitorState) {
    if let Some(err) = &state.last_error {
        warn!(kind = ?err.kind, "{}", err.message);
    }

    let Some(snapshot) = &state.snapshot else {
        return;
    };
    if state.last_error.is_none() {
        info!(servers = snapshot.len(), offline = state.offline_count(), "Server status updated");
    }

    let transitions = status_transitions(previous.as_ref(), snapshot);
    for change in &transitions {
        let msg = format!("[CHANGE] {} -> {:?}", change.server, change.to);
        let checked_at = change.checked_at.map(|ts| ts.to_rfc3339());
        if change.to == Health::Down { error!(?checked_at, "{}", msg); } else { warn!(?checked_at, "{}", msg); }
    }
    if !transitions.is_empty() {
        if let Some(alert) = state.alert_message() {
            error!(servers = ?state.offline_servers(), "Critical alert: {}", alert);
        }
    }

    *previous = Some(snapshot.clone());
}
