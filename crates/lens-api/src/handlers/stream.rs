//! Server-sent event stream of published batches.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::stream::{Stream, StreamExt};
use lens_models::DetectionBatch;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::metrics;
use crate::state::AppState;

/// Decrements the active-connection gauge when the client goes away.
struct ConnectionGuard {
    name: String,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        metrics::record_sse_disconnected();
        debug!(subscriber = %self.name, "SSE client disconnected");
    }
}

fn batch_event(batch: &DetectionBatch) -> Event {
    let event = Event::default().id(batch.frame_id.to_string());
    match event.json_data(batch) {
        Ok(event) => event,
        Err(e) => {
            warn!(frame_id = batch.frame_id, error = %e, "Failed to encode SSE event");
            Event::default().event("error").data(e.to_string())
        }
    }
}

/// `GET /stream`: one `data:` event per published batch, `id` = frame id.
///
/// Uses a bounded bus subscription, so a slow client loses its oldest
/// batches instead of slowing the pipeline. Ends when the bus closes.
pub async fn stream_detections(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let name = format!("sse-{}", Uuid::new_v4());
    let (_handle, batches) = state.pipeline.bus().subscribe_stream(&name);

    metrics::record_sse_connected();
    debug!(subscriber = %name, "SSE client connected");
    let guard = ConnectionGuard { name };

    let events = batches.map(move |batch| {
        let _connection = &guard;
        metrics::record_sse_event();
        Ok(batch_event(&batch))
    });

    Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
