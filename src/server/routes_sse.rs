//! `GET /api/events`: conversion lifecycle as Server-Sent Events.
//!
//! A new client first receives up to `replay` retained events, then the live
//! feed. Each SSE message is named after the payload type and carries the
//! bus sequence number as its id.

use crate::server::AppContext;
use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use convertforge_engine::events::MAX_RECENT_EVENTS;
use convertforge_engine::ConversionEvent;
use futures::stream::{self, Stream};
use serde::Deserialize;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

const DEFAULT_REPLAY: usize = 20;

pub fn sse_routes() -> Router<AppContext> {
    Router::new().route("/events", get(events_handler))
}

#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    /// Retained events to send before the live feed (default 20).
    pub replay: Option<usize>,
}

pub async fn events_handler(
    State(ctx): State<AppContext>,
    Query(query): Query<EventsQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let replay = query
        .replay
        .unwrap_or(DEFAULT_REPLAY)
        .min(MAX_RECENT_EVENTS);
    let (backlog, rx) = ctx.events.subscribe_with_backlog(replay);

    let live = BroadcastStream::new(rx).map(|received| match received {
        Ok(event) => to_sse(&event),
        Err(BroadcastStreamRecvError::Lagged(missed)) => {
            tracing::debug!(missed, "event subscriber lagged");
            Event::default()
                .event("lagged")
                .data(format!(r#"{{"missed":{missed}}}"#))
        }
    });

    let events = stream::iter(backlog)
        .map(|event| to_sse(&event))
        .chain(live)
        .map(Ok);

    Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

fn to_sse(event: &ConversionEvent) -> Event {
    let base = Event::default()
        .event(event.payload.name())
        .id(event.seq.to_string());
    match serde_json::to_string(event) {
        Ok(json) => base.data(json),
        Err(e) => base.data(format!(r#"{{"error":"serialization failed: {e}"}}"#)),
    }
}
