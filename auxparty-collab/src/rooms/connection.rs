use std::{
    collections::VecDeque,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll, Waker},
};

use futures_util::Stream;
use parking_lot::Mutex;

use crate::{events::RoomEvent, CollabContext, Database, Id, PrimaryKey, SpotifyApi};

use super::RoomId;

pub type RoomConnectionId = Id<RoomConnection>;

/// What a connection is allowed to do in its room.
///
/// The role is decided once, when the connection joins, and never recomputed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionRole {
    /// The single connection authorized to issue playback commands and run
    /// reconciliation. Always one of the owner's connections.
    Driver,
    /// Receives all events but never drives playback
    Observer,
}

/// A user's presence in a room.
///
/// Each connection carries its own event buffer, so a slow member never
/// blocks delivery to the others.
#[derive(Debug)]
pub struct RoomConnection {
    pub id: RoomConnectionId,
    pub user_id: PrimaryKey,
    pub role: ConnectionRole,

    pending: Arc<Mutex<VecDeque<RoomEvent>>>,
    waker: Arc<Mutex<Option<Waker>>>,
}

/// A handle to a room's event stream, which when dropped removes the
/// [RoomConnection] from the room.
pub struct RoomConnectionHandle<Db, S>
where
    Db: Database,
    S: SpotifyApi,
{
    connection_id: RoomConnectionId,
    room_id: RoomId,
    role: ConnectionRole,
    context: CollabContext<Db, S>,

    /// A reference to [RoomConnection]'s event buffer
    pending: Arc<Mutex<VecDeque<RoomEvent>>>,
    /// A reference to [RoomConnection]'s stored [Waker]
    waker: Arc<Mutex<Option<Waker>>>,
}

impl RoomConnection {
    pub fn new(user_id: PrimaryKey, role: ConnectionRole) -> Self {
        Self {
            id: RoomConnectionId::new(),
            user_id,
            role,
            pending: Default::default(),
            waker: Default::default(),
        }
    }

    /// Queues an event for delivery. Fire-and-forget, at most once.
    pub fn send(&self, event: RoomEvent) {
        self.pending.lock().push_back(event);

        if let Some(waker) = self.waker.lock().take() {
            waker.wake()
        }
    }

    pub fn handle<Db, S>(
        &self,
        context: &CollabContext<Db, S>,
        room_id: RoomId,
    ) -> RoomConnectionHandle<Db, S>
    where
        Db: Database,
        S: SpotifyApi,
    {
        RoomConnectionHandle {
            connection_id: self.id,
            room_id,
            role: self.role,
            context: context.clone(),
            pending: self.pending.clone(),
            waker: self.waker.clone(),
        }
    }
}

impl<Db, S> RoomConnectionHandle<Db, S>
where
    Db: Database,
    S: SpotifyApi,
{
    pub fn id(&self) -> RoomConnectionId {
        self.connection_id
    }

    pub fn role(&self) -> ConnectionRole {
        self.role
    }
}

impl<Db, S> Stream for RoomConnectionHandle<Db, S>
where
    Db: Database,
    S: SpotifyApi,
{
    type Item = RoomEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut pending = self.pending.lock();

        // FIFO per room: events are observed in publish order
        if let Some(event) = pending.pop_front() {
            return Poll::Ready(Some(event));
        }

        // Once the room is gone and the buffer is drained, the stream ends
        if !self.context.rooms.contains_key(&self.room_id) {
            return Poll::Ready(None);
        }

        *self.waker.lock() = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl<Db, S> Drop for RoomConnectionHandle<Db, S>
where
    Db: Database,
    S: SpotifyApi,
{
    fn drop(&mut self) {
        if let Some(room) = self.context.rooms.get(&self.room_id) {
            room.remove_connection(self.connection_id)
        }
    }
}
