//! Event streaming handlers

use crate::api::rest::state::AppState;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures_util::stream::{self, Stream, StreamExt};
use quay_types::{InitialSnapshot, ServiceEvent};
use std::convert::Infallible;
use std::time::Duration;

/// Stream service events via SSE
///
/// The first event is an `initial` snapshot of every service; changes
/// follow as `status`, `env` and `release` events.
pub async fn stream_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // Subscribe before snapshotting so no change falls in between
    let rx = state.events.subscribe();

    let initial = ServiceEvent::Initial {
        data: InitialSnapshot {
            services: state.engine.services().await,
        },
    };

    let updates = stream::unfold(rx, |mut rx| async move {
        match rx.recv().await {
            Ok(event) => Some((Ok(to_sse(&event)), rx)),
            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {
                // Client lagged behind, continue
                Some((Ok(Event::default().comment("lagged")), rx))
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => None,
        }
    });

    let stream = stream::once(async move { Ok::<_, Infallible>(to_sse(&initial)) }).chain(updates);

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

fn to_sse(event: &ServiceEvent) -> Event {
    let json = serde_json::to_string(event).unwrap_or_default();
    Event::default().event(event.kind()).data(json)
}
