use std::{
    convert::Infallible,
    pin::Pin,
    task::{Context, Poll},
};

use auxparty_collab::{HttpDatabase, RoomConnectionHandle, WebSpotifyApi};
use axum::response::sse::Event;
use futures_util::Stream;

/// Adapts a room's event stream to the SSE wire format.
///
/// The stream ends when the room is deleted, and dropping it removes the
/// member from the room.
pub struct EventStream(pub RoomConnectionHandle<HttpDatabase, WebSpotifyApi>);

impl Stream for EventStream {
    type Item = Result<Event, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match Pin::new(&mut self.0).poll_next(cx) {
            Poll::Ready(Some(event)) => {
                let data = serde_json::to_string(&event).expect("serializes properly");

                Poll::Ready(Some(Ok(Event::default().data(data))))
            }
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}
