//! Development harness for the dashboard data layer.
//!
//! Wires every dashboard resource to the mock API, or to a live backend when
//! `API_BASE_URL` is set, keeps auto refresh running according to the saved
//! preferences, and logs each state transition.
//!
//! Environment variables can be set directly or loaded from a .env file:
//! - API_BASE_URL: backend address (optional, mock API when unset)
//! - API_TIMEOUT_MS: request timeout (default 10000)
//! - REFRESH_STATS_MS, REFRESH_CHARTS_MS, REFRESH_NOTIFICATIONS_MS:
//!   refresh periods (defaults 30000, 60000, 15000)
//! - PREFERENCES_PATH: preference file (default dashboard_preferences.json)
//! - RUST_LOG: log filter (default info)
//!
//! Usage: cargo run -p dev-server

mod config;

use std::sync::Arc;

use anyhow::Context;
use hooks::dashboard::{Dashboard, DashboardApi};
use hooks::preferences::{
    JsonFileStore, PreferenceStore, USER_PREFERENCES_KEY, load_or, save,
};
use hooks::telemetry::{get_subscriber, init_subscriber, log_error};
use hooks::theme::{resolve_effective_theme, stored_theme};
use hooks::{FetchState, RequestState, StateView};
use payloads::responses::Preferences;
use payloads::{APIClient, Period};
use rust_decimal::Decimal;
use test_helpers::mock::MockDashboardApi;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::WatchStream;
use tracing::info;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let subscriber = get_subscriber("info");
    init_subscriber(subscriber);

    let config = Config::from_env().context("Invalid configuration")?;

    let store = JsonFileStore::open(&config.preferences_path)?;
    let preferences: Preferences =
        load_or(&store, USER_PREFERENCES_KEY, Preferences::default());
    let theme = stored_theme(&store);
    info!(
        path = %store.path().display(),
        ?theme,
        effective = ?resolve_effective_theme(theme, false),
        auto_refresh = preferences.auto_refresh,
        "Loaded preferences"
    );

    match &config.api_base_url {
        Some(address) => {
            info!("Using backend at {address}");
            let api = APIClient::new(address.as_str(), config.api_timeout)?;
            run(Arc::new(api), &config, &store, &preferences).await
        }
        None => {
            info!("API_BASE_URL not set, using the mock API");
            let api = MockDashboardApi::new();
            run(Arc::new(api), &config, &store, &preferences).await
        }
    }
}

async fn run<Api: DashboardApi>(
    api: Arc<Api>,
    config: &Config,
    store: &dyn PreferenceStore,
    preferences: &Preferences,
) -> anyhow::Result<()> {
    let period = Period::default();
    let dashboard = Dashboard::new(
        api,
        period,
        config.intervals,
        preferences.auto_refresh,
    )?;
    info!(
        period = period.label(),
        stats_ms = config.intervals.stats.as_millis(),
        charts_ms = config.intervals.charts.as_millis(),
        notifications_ms = config.intervals.notifications.as_millis(),
        auto_refresh = dashboard.is_auto_refreshing(),
        "Dashboard ready"
    );

    let watchers = vec![
        log_states("stats", dashboard.stats.subscribe(), |stats| {
            let total = stats
                .iter()
                .map(|stat| stat.numeric_value)
                .sum::<Decimal>();
            format!("{} cards, {total} total", stats.len())
        }),
        log_states("revenue", dashboard.revenue.subscribe(), |points| {
            format!("{} points", points.len())
        }),
        log_states("sales", dashboard.sales.subscribe(), |points| {
            format!("{} points", points.len())
        }),
        log_states(
            "distribution",
            dashboard.distribution.subscribe(),
            |slices| format!("{} slices", slices.len()),
        ),
        log_states("area", dashboard.area.subscribe(), |points| {
            format!("{} points", points.len())
        }),
        log_states("notifications", dashboard.notifications.subscribe(), |all| {
            format!("{} notifications", all.len())
        }),
        log_states("user", dashboard.user.subscribe(), |user| {
            format!("{} ({})", user.name, user.role)
        }),
    ];

    // keep the local copy of the preferences in line with the server's
    let mut user = dashboard.user.subscribe();
    let profile = user.wait_for(|state| !state.loading).await?.data.clone();
    if let FetchState::Fetched(profile) = profile {
        let saved = save(store, USER_PREFERENCES_KEY, &profile.preferences);
        if let Err(e) = saved {
            log_error(e);
        }
    }

    info!(
        unread = dashboard.notifications.unread_count(),
        "Press Ctrl+C to shutdown"
    );
    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    drop(dashboard);
    for watcher in watchers {
        watcher.abort();
    }
    Ok(())
}

/// Log every state a resource goes through until its controller is gone.
fn log_states<T, F>(
    resource: &'static str,
    states: watch::Receiver<RequestState<T>>,
    summarize: F,
) -> JoinHandle<()>
where
    T: Clone + Send + Sync + 'static,
    F: Fn(&T) -> String + Send + 'static,
{
    tokio::spawn(async move {
        let mut states = WatchStream::new(states);
        while let Some(state) = states.next().await {
            match state.view() {
                StateView::Loading => info!(resource, "loading"),
                StateView::Empty => info!(resource, "idle"),
                StateView::Failed(error) => {
                    tracing::warn!(resource, "failed: {error}")
                }
                StateView::Ready {
                    data,
                    refreshing,
                    error,
                } => info!(resource, refreshing, error, "{}", summarize(data)),
            }
        }
    })
}
