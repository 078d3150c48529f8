//! Query API (C11): `GET /events` (paged snapshot) and `GET /events/stream`
//! (SSE, optionally resuming from `since`).

use super::response::{bad_request, internal_error, HttpResult};
use crate::repo;
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::response::sse::{Event as SseEvent, Sse};
use axum::response::IntoResponse;
use axum::Json;
use feed_protocol::{Kind, ListEventsQuery, Source, StreamQuery};
use futures_util::stream::{self, StreamExt};
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::IntervalStream;

const MAX_LIST_LIMIT: u32 = 200;

pub async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<ListEventsQuery>,
) -> HttpResult<impl IntoResponse> {
    if let Some(limit) = query.limit {
        if limit == 0 || limit > MAX_LIST_LIMIT {
            return Err(bad_request(format!("limit must be between 1 and {MAX_LIST_LIMIT}")));
        }
    }
    let kind = query
        .kind
        .map(Kind::try_from)
        .transpose()
        .map_err(|_| bad_request("unrecognized kind code"))?
        .map(i16::from);
    let source = query
        .source
        .map(Source::try_from)
        .transpose()
        .map_err(|_| bad_request("unrecognized source code"))?
        .map(i16::from);

    let events = repo::events::list(
        &state.pool,
        repo::events::ListFilter {
            limit: query.limit,
            kind,
            source,
        },
    )
    .await
    .map_err(internal_error)?;

    Ok(Json(events))
}

/// axum's built-in `KeepAlive` only emits an unnamed SSE comment, not the
/// named `ping` frame the wire contract promises, so the heartbeat is a
/// plain interval stream merged alongside the client's event stream instead.
fn heartbeat() -> impl futures_util::Stream<Item = Result<SseEvent, Infallible>> {
    IntervalStream::new(tokio::time::interval(Duration::from_secs(15)))
        .map(|_| Ok(SseEvent::default().event("ping").data("keep-alive")))
}

pub async fn stream_events(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
) -> impl IntoResponse {
    let events = state.hub.add_client(query.since).await;
    Sse::new(stream::select(events, heartbeat()))
}
