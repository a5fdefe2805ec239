use anyhow::{Context, Result};
use axum::{
    extract::State,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use tracing::info;

use crate::models::MonitorState;
use crate::store::StatusReader;

/// Current monitor state plus the derived alert, as served to dashboards.
#[derive(Debug, Clone, Serialize)]
pub struct StatusView {
    #[serde(flatten)]
    pub state: MonitorState,
    pub offline_count: usize,
    pub critical_alert: bool,
    pub alert_message: Option<String>,
}

impl From<MonitorState> for StatusView {
    fn from(state: MonitorState) -> Self {
        Self {
            offline_count: state.offline_count(),
            critical_alert: state.has_critical_alert(),
            alert_message: state.alert_message(),
            state,
        }
    }
}

pub async fn get_status(State(reader): State<StatusReader>) -> Json<StatusView> {
    Json(StatusView::from(reader.current().await))
}

pub fn create_router(reader: StatusReader) -> Router {
    Router::new()
        .route("/api/status", get(get_status))
        .with_state(reader)
}

pub async fn start_server(port: u16, reader: StatusReader) -> Result<()> {
    let app = create_router(reader);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind status view port {}", port))?;
    info!("Status view: http://localhost:{}/api/status", addr.port());
    axum::serve(listener, app).await.context("Status view server failed")?;
    Ok(())
}
