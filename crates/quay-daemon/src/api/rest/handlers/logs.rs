//! Log handlers

use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures_util::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::time::Duration;

/// Get logs query params
#[derive(Debug, Deserialize)]
pub struct GetLogsQuery {
    #[serde(default = "default_tail")]
    pub tail: usize,
}

fn default_tail() -> usize {
    100
}

/// Buffered output, oldest first
#[derive(Debug, Serialize)]
pub struct LogsResponse {
    pub lines: Vec<String>,
}

/// Clear logs response
#[derive(Debug, Serialize)]
pub struct ClearLogsResponse {
    pub success: bool,
}

/// Get the last `tail` output lines
pub async fn get_logs(
    State(state): State<AppState>,
    Path(service): Path<String>,
    Query(query): Query<GetLogsQuery>,
) -> ApiResult<Json<LogsResponse>> {
    let lines = state
        .engine
        .recent_logs(&service, query.tail)?
        .iter()
        .map(ToString::to_string)
        .collect();
    Ok(Json(LogsResponse { lines }))
}

/// Drop buffered output
pub async fn clear_logs(
    State(state): State<AppState>,
    Path(service): Path<String>,
) -> ApiResult<Json<ClearLogsResponse>> {
    state.engine.clear_logs(&service)?;
    Ok(Json(ClearLogsResponse { success: true }))
}

/// Stream output lines via SSE
pub async fn stream_logs(
    State(state): State<AppState>,
    Path(service): Path<String>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let rx = state.engine.subscribe_logs(&service)?;

    let stream = stream::unfold(rx, |mut rx| async move {
        match rx.recv().await {
            Ok(line) => {
                let json = serde_json::to_string(&line).unwrap_or_default();
                let sse_event = Event::default().event(line.stream.to_string()).data(json);
                Some((Ok(sse_event), rx))
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {
                // Client lagged behind, continue
                Some((Ok(Event::default().comment("lagged")), rx))
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => None,
        }
    });

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    ))
}
