//! ==============================================================================
//! server.rs - web dashboard
//! ==============================================================================
//!
//! purpose:
//!     the user-facing render sink. keeps one panel per pot and serves it as
//!     html and json, plus the start/stop monitoring toggle.
//!
//! relationships:
//!     - implements: sink.rs (RenderSink for DashboardSink)
//!     - uses: monitor.rs (start / stop / refresh)
//!     - used by: main.rs (spawned next to the polling session)
//!
//! routes:
//!
//! ```text
//!     GET  /                                  html dashboard (auto-refreshing)
//!     GET  /api                               panels + monitoring state as json
//!     POST /api/monitoring?action=start|stop|refresh
//! ```
//!
//! ==============================================================================

use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    response::{Html, Json},
    routing::{get, post},
    Router,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::domain::{now_ms, DeviceId, PollOutcome, TimeSeries};
use crate::monitor::Monitor;
use crate::scheduler::SchedulerState;
use crate::sink::RenderSink;

// ==============================================================================
// shared state
// ==============================================================================
// written by the polling tasks (one panel at a time), read by the handlers.
// a panel is replaced whole, so readers never see half an update.

#[derive(Clone, Default, Serialize)]
pub struct AppState {
    /// latest outcome per pot
    pub panels: BTreeMap<DeviceId, DevicePanel>,
    /// unix timestamp (ms) of the last render of any pot
    pub last_update: u64,
}

#[derive(Clone, Serialize)]
pub struct DevicePanel {
    pub outcome: PollOutcome,
    /// unix timestamp (ms) when this pot was last rendered
    pub updated_ms: u64,
}

/// render sink backing the web dashboard
#[derive(Clone, Default)]
pub struct DashboardSink {
    state: Arc<RwLock<AppState>>,
}

impl DashboardSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> AppState {
        self.state.read().clone()
    }
}

impl RenderSink for DashboardSink {
    fn render(&self, device: &DeviceId, outcome: &PollOutcome) {
        let now = now_ms();
        let mut state = self.state.write();
        state
            .panels
            .insert(device.clone(), DevicePanel { outcome: outcome.clone(), updated_ms: now });
        state.last_update = now;
    }
}

#[derive(Clone)]
struct ServerState {
    dashboard: DashboardSink,
    monitor: Monitor,
    metrics: Arc<[String]>,
}

// ==============================================================================
// web server
// ==============================================================================

pub fn router(dashboard: DashboardSink, monitor: Monitor, metrics: Vec<String>) -> Router {
    Router::new()
        .route("/", get(dashboard_handler))
        .route("/api", get(api_handler))
        .route("/api/monitoring", post(monitoring_handler))
        .layer(CorsLayer::permissive())
        .with_state(ServerState { dashboard, monitor, metrics: metrics.into() })
}

pub async fn run_server(
    bind: &str,
    dashboard: DashboardSink,
    monitor: Monitor,
    metrics: Vec<String>,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind dashboard to {bind}"))?;
    tracing::info!(addr = %listener.local_addr()?, "dashboard live");
    axum::serve(listener, router(dashboard, monitor, metrics)).await?;
    Ok(())
}

async fn dashboard_handler(State(state): State<ServerState>) -> Html<String> {
    let view = state.dashboard.snapshot();
    Html(render_page(&view, &state.monitor, &state.metrics))
}

#[derive(Serialize)]
struct ApiResponse {
    monitoring: SchedulerState,
    devices: Vec<DeviceId>,
    #[serde(flatten)]
    view: AppState,
}

/// json api endpoint for programmatic access
async fn api_handler(State(state): State<ServerState>) -> Json<ApiResponse> {
    Json(ApiResponse {
        monitoring: state.monitor.state(),
        devices: state.monitor.devices().to_vec(),
        view: state.dashboard.snapshot(),
    })
}

/// monitoring control params
#[derive(Deserialize)]
struct MonitoringParams {
    action: String,
}

/// monitoring control endpoint
/// POST /api/monitoring?action=start|stop|refresh
async fn monitoring_handler(
    State(state): State<ServerState>,
    Query(params): Query<MonitoringParams>,
) -> Json<serde_json::Value> {
    let result = match params.action.as_str() {
        "start" => state.monitor.start().await,
        "stop" => {
            state.monitor.stop().await;
            Ok(())
        }
        "refresh" => state.monitor.refresh().await.map(|_| ()),
        _ => {
            return Json(serde_json::json!({"status": "error", "message": "unknown action"}));
        }
    };

    match result {
        Ok(()) => Json(serde_json::json!({
            "status": "ok",
            "action": params.action,
            "monitoring": state.monitor.state(),
        })),
        Err(e) => Json(serde_json::json!({"status": "error", "message": e.to_string()})),
    }
}

// ==============================================================================
// html
// ==============================================================================

fn metric_title(metric: &str) -> String {
    match metric {
        "ph" => "pH Level".to_string(),
        "soil" => "Soil Level".to_string(),
        other => other.to_string(),
    }
}

fn render_page(view: &AppState, monitor: &Monitor, metrics: &[String]) -> String {
    let active = monitor.is_active();
    let mut html = String::new();
    let _ = write!(
        html,
        r#"<!doctype html>
<html>
<head>
<title>Dashboard</title>
<meta http-equiv="refresh" content="{refresh}">
<style>
body {{ font-family: system-ui; padding: 2rem; background: #1a1a2e; color: #eee; }}
.pots {{ display: flex; flex-wrap: wrap; gap: 1rem; }}
.pot {{ background: #16213e; padding: 1rem; border-radius: 8px; min-width: 260px; }}
.delta-up {{ color: #6bff95; }} .delta-down {{ color: #ff6b6b; }}
.error {{ color: #ff6b6b; }} .info {{ color: #888; }}
</style>
</head>
<body>
<h1>Dashboard Overview</h1>
<p>Monitoring {count} pot(s).</p>
<button onclick="fetch('/api/monitoring?action={toggle}', {{method: 'POST'}}).then(() => location.reload())">{label}</button>
"#,
        refresh = monitor.cadence().as_secs().max(1),
        count = monitor.devices().len(),
        toggle = if active { "stop" } else { "start" },
        label = if active { "Stop Monitoring" } else { "Start Monitoring" },
    );

    if !active {
        html.push_str(r#"<p class="info">Click 'Start Monitoring' to see live data.</p>"#);
    }

    html.push_str(r#"<div class="pots">"#);
    for device in monitor.devices() {
        let _ = write!(html, r#"<div class="pot"><h2>Pot: {}</h2>"#, html_escape(device.as_str()));
        match view.panels.get(device).map(|p| &p.outcome) {
            None => html.push_str(r#"<p class="info">Waiting for data.</p>"#),
            Some(PollOutcome::Ok(snapshot)) => {
                for metric in metrics {
                    if let Some(display) = snapshot.metrics.get(metric) {
                        let delta = display.delta_label();
                        let class = if delta.starts_with('+') {
                            "delta-up"
                        } else if delta.starts_with('-') {
                            "delta-down"
                        } else {
                            "info"
                        };
                        let _ = write!(
                            html,
                            r#"<p>{}: <strong>{}</strong> <span class="{class}">{}</span></p>"#,
                            html_escape(&metric_title(metric)),
                            html_escape(&display.current_label()),
                            html_escape(&delta),
                        );
                    }
                }
                let charted: Vec<(&String, &TimeSeries)> =
                    metrics.iter().filter_map(|m| snapshot.series.get(m).map(|s| (m, s))).collect();
                if charted.iter().all(|(_, s)| s.is_empty()) {
                    html.push_str(r#"<p class="info">No chart data available.</p>"#);
                } else {
                    for (metric, series) in charted {
                        html.push_str(&line_chart(&metric_title(metric), series));
                    }
                }
            }
            Some(PollOutcome::Empty) => {
                for metric in metrics {
                    let _ = write!(
                        html,
                        "<p>{}: <strong>N/A</strong> N/A</p>",
                        html_escape(&metric_title(metric))
                    );
                }
                html.push_str(r#"<p class="info">No data received for this pot.</p>"#);
            }
            Some(PollOutcome::Failed { message, .. }) => {
                let _ = write!(html, r#"<p class="error">{}</p>"#, html_escape(message));
            }
        }
        html.push_str("</div>");
    }
    html.push_str("</div>\n</body>\n</html>\n");
    html
}

const CHART_WIDTH: f64 = 240.0;
const CHART_HEIGHT: f64 = 60.0;

/// inline svg polyline, x by position in the series
fn line_chart(title: &str, series: &TimeSeries) -> String {
    let title = html_escape(title);
    if series.is_empty() {
        return format!(r#"<p class="info">{title}: no chart data.</p>"#);
    }

    let values = series.values();
    let (min, max) = values
        .iter()
        .fold((f64::MAX, f64::MIN), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
    let span = if max > min { max - min } else { 1.0 };
    let step = if values.len() > 1 { CHART_WIDTH / (values.len() - 1) as f64 } else { 0.0 };

    let points = values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let y = CHART_HEIGHT - (v - min) / span * CHART_HEIGHT;
            format!("{:.1},{:.1}", i as f64 * step, y)
        })
        .collect::<Vec<_>>()
        .join(" ");

    format!(
        r##"<figure><figcaption>{title}</figcaption><svg width="{CHART_WIDTH}" height="{CHART_HEIGHT}" viewBox="0 0 {CHART_WIDTH} {CHART_HEIGHT}"><polyline fill="none" stroke="#4fc3f7" stroke-width="2" points="{points}"/></svg></figure>"##
    )
}

/// escape html special characters to prevent xss
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
