use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use crate::{dao::models::RoomDocument, dao::room_store::RoomSubscription, dto::room::RoomView};

/// Convert a room subscription into an SSE response, forwarding snapshots until the client
/// disconnects.
pub fn to_sse_stream(
    subscription: RoomSubscription,
    room_id: String,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        let mut snapshots = Box::pin(subscription.into_stream());
        loop {
            tokio::select! {
                _ = tx.closed() => break,
                next = snapshots.next() => {
                    let Some(snapshot) = next else { break };
                    if tx.send(Ok(snapshot_event(snapshot.as_ref()))).await.is_err() {
                        break;
                    }
                }
            }
        }
        info!(room_id = %room_id, "room SSE stream disconnected");
    });

    Sse::new(ReceiverStream::new(rx)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// `room` event carrying the projected snapshot, or `room.deleted` once the document is gone.
pub fn snapshot_event(snapshot: Option<&RoomDocument>) -> Event {
    let Some(room) = snapshot else {
        return Event::default().event("room.deleted").data("{}");
    };
    match Event::default().event("room").json_data(RoomView::from(room)) {
        Ok(event) => event,
        Err(err) => {
            warn!(room_id = %room.room_id, error = %err, "failed to encode room snapshot");
            Event::default().event("error").data("snapshot encoding failed")
        }
    }
}
