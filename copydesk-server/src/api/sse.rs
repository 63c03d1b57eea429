//! Server-Sent Events stream of lifecycle events

use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;

use crate::AppState;

/// GET /api/events - live lifecycle event stream
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    copydesk_common::sse::create_event_sse_stream(&state.event_bus)
}
