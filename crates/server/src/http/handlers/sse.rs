use adapter::ReplyListStream;
use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::{future, stream::Stream, StreamExt};

use super::{parse_full_name, ApiError};
use crate::state::AppState;

fn into_events(
    replies: ReplyListStream,
    event_type: &'static str,
) -> impl Stream<Item = Result<Event, axum::Error>> {
    replies.filter_map(move |result| {
        let event = match result {
            Ok(list) => Some(
                Event::default()
                    .event(event_type)
                    .json_data(list)
                    .map_err(|e| {
                        tracing::error!("SSE serialization error: {}", e);
                        axum::Error::new(e)
                    }),
            ),
            Err(e) => {
                tracing::error!("SSE query error: {}", e);
                None
            }
        };
        future::ready(event)
    })
}

pub async fn pending_replies_sse(
    State(state): State<AppState>,
    Path(submission_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    let submission_id = parse_full_name(submission_id)?;
    tracing::info!("SSE Connected: pending replies of {}", submission_id);

    let stream = into_events(
        state.outbox.stream_pending_or_posted(submission_id),
        "pending_replies",
    );
    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(std::time::Duration::from_secs(15))))
}

pub async fn failed_replies_sse(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    tracing::info!("SSE Connected: failed replies");

    let stream = into_events(state.outbox.stream_failed(), "failed_replies");
    Sse::new(stream).keep_alive(KeepAlive::new().interval(std::time::Duration::from_secs(15)))
}
