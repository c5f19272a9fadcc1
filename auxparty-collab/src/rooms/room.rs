use std::sync::{Arc, Weak};

use log::{info, warn};
use parking_lot::Mutex;

use crate::{
    events::{RoomEvent, RoomSnapshot},
    playback::{self, ReconciliationHandle},
    queue::VoteQueue,
    util::is_track_uri,
    AccessCredential, CollabContext, Database, PrimaryKey, RoomData, SerializedSong, SpotifyApi,
    SpotifyError, TrackHit,
};

use super::{ConnectionRole, RoomConnection, RoomConnectionHandle, RoomConnectionId, RoomError};

pub type RoomId = PrimaryKey;

/// An auxparty room: a queue, a vote tally, and the listeners connected to it.
///
/// All room state is owned here and mutated only through these methods, so
/// the serialization of mutations per room comes for free.
pub struct Room<Db, S>
where
    Db: Database,
    S: SpotifyApi,
{
    me: Weak<Self>,
    pub(crate) context: CollabContext<Db, S>,
    pub(crate) queue: VoteQueue,

    data: Mutex<RoomData>,
    state: Mutex<RoomState>,
    /// The users currently connected and listening in this room
    connections: Mutex<Vec<RoomConnection>>,
    /// Present only while the driver's reconciliation loop is running
    reconciliation: Mutex<Option<ReconciliationHandle>>,
    /// Held across the whole inactive-to-active transition, which spans
    /// several awaits
    activation: tokio::sync::Mutex<()>,
}

/// The lifecycle of a room. `Unloaded` is the absence of the room in memory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RoomState {
    /// Loaded, but playback has never been started
    #[default]
    Inactive,
    /// Playback was started. Rooms never go back to inactive, there is no
    /// pause in this design.
    Active,
    /// Terminal
    Deleted,
}

impl<Db, S> Room<Db, S>
where
    Db: Database,
    S: SpotifyApi,
{
    pub fn new(context: &CollabContext<Db, S>, data: RoomData) -> Arc<Self> {
        let state = if data.active {
            RoomState::Active
        } else {
            RoomState::Inactive
        };

        let queue = VoteQueue::from_data(data.queue.clone());

        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            context: context.clone(),
            queue,
            data: Mutex::new(data),
            state: Mutex::new(state),
            connections: Default::default(),
            reconciliation: Default::default(),
            activation: Default::default(),
        })
    }

    pub fn id(&self) -> RoomId {
        self.data.lock().auxparty_id.clone()
    }

    /// The owner's user id. A room's id is the id of the user that owns it.
    pub fn owner_id(&self) -> PrimaryKey {
        self.id()
    }

    pub fn name(&self) -> String {
        self.data.lock().name.clone()
    }

    pub fn data(&self) -> RoomData {
        self.data.lock().clone()
    }

    pub(crate) fn password_hash(&self) -> String {
        self.data.lock().password.clone()
    }

    pub fn is_active(&self) -> bool {
        *self.state.lock() == RoomState::Active
    }

    pub fn is_deleted(&self) -> bool {
        *self.state.lock() == RoomState::Deleted
    }

    /// The full current state, sent to every joining connection
    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            queue: self.queue.songs(),
            currently_playing: self.queue.currently_playing(),
            active: self.is_active(),
        }
    }

    /// Registers a connection and returns a handle to the room's event
    /// stream. The handle observes a snapshot before any incremental event.
    pub async fn connect(
        &self,
        user_id: PrimaryKey,
    ) -> Result<RoomConnectionHandle<Db, S>, RoomError> {
        if self.is_deleted() {
            return Err(RoomError::RoomNotFound(self.id()));
        }

        let (role, handle) = {
            let mut connections = self.connections.lock();

            let has_driver = connections
                .iter()
                .any(|c| c.role == ConnectionRole::Driver);

            // The driver is the first of the owner's connections. Another
            // owner tab is just a regular listener.
            let role = if user_id == self.owner_id() && !has_driver {
                ConnectionRole::Driver
            } else {
                ConnectionRole::Observer
            };

            let connection = RoomConnection::new(user_id.clone(), role);

            // Seed the snapshot while holding the connections lock, so no
            // broadcast can slip in between snapshot and registration
            connection.send(RoomEvent::Snapshot {
                snapshot: self.snapshot(),
            });

            let handle = connection.handle(&self.context, self.id());
            connections.push(connection);

            (role, handle)
        };

        info!("User {} connected to room {}", user_id, self.name());

        if role == ConnectionRole::Driver {
            self.try_activate().await;
        }

        Ok(handle)
    }

    /// Called when a [RoomConnectionHandle] is dropped
    pub(crate) fn remove_connection(&self, connection_id: RoomConnectionId) {
        let removed = {
            let mut connections = self.connections.lock();

            let removed = connections
                .iter()
                .find(|c| c.id == connection_id)
                .map(|c| (c.user_id.clone(), c.role));

            connections.retain(|c| c.id != connection_id);
            removed
        };

        let Some((user_id, role)) = removed else {
            return;
        };

        info!("User {} disconnected from room {}", user_id, self.name());

        // Playback authority never transfers, the loop waits for the owner
        // to come back
        if role == ConnectionRole::Driver {
            self.stop_reconciliation();
        }
    }

    /// Fans an event out to every current member, in publish order.
    /// Delivery is at most once, with no retries.
    pub fn broadcast(&self, event: RoomEvent) {
        let connections = self.connections.lock();

        for connection in connections.iter() {
            connection.send(event.clone())
        }
    }

    /// Sends an event to the driver connection only, if there is one
    pub(crate) fn notify_driver(&self, event: RoomEvent) {
        let connections = self.connections.lock();

        if let Some(driver) = connections
            .iter()
            .find(|c| c.role == ConnectionRole::Driver)
        {
            driver.send(event)
        }
    }

    /// Searches the music service on behalf of the room's owner
    pub async fn search(&self, query: &str) -> Result<Vec<TrackHit>, RoomError> {
        let owner = self.context.database.user_by_id(&self.owner_id()).await?;
        let credential = AccessCredential::from(&owner);

        let result = self.context.spotify.search(&credential, query).await?;
        self.propagate_refreshed_token(result.refreshed_token).await;

        Ok(result.value)
    }

    /// Adds a song to the queue and the backing playlist, then checks whether
    /// the room can start playing
    pub async fn add_song(&self, track: TrackHit) -> Result<Vec<SerializedSong>, RoomError> {
        if !is_track_uri(&track.uri) {
            return Err(RoomError::InvalidTrackUri(track.uri));
        }

        let uri = track.uri.clone();
        self.queue.add_song(uri.clone(), track.into());

        let songs = self.queue.songs();
        self.broadcast(RoomEvent::SongAdded {
            queue: songs.clone(),
        });

        self.persist_queue().await;

        // The playlist is what Spotify actually plays from, so keep it in
        // sync with the queue. Failing here is not fatal, reconciliation
        // will keep the pointer honest regardless.
        match self.context.database.user_by_id(&self.owner_id()).await {
            Ok(owner) => {
                let credential = AccessCredential::from(&owner);
                let playlist_id = self.data.lock().playlist_id.clone();

                match self
                    .context
                    .spotify
                    .add_track(&credential, &playlist_id, &uri)
                    .await
                {
                    Ok(result) => self.propagate_refreshed_token(result.refreshed_token).await,
                    Err(e) => warn!(
                        "Could not add {} to the playlist of room {}: {}",
                        uri,
                        self.name(),
                        e
                    ),
                }
            }
            Err(e) => warn!("Could not load the owner of room {}: {}", self.name(), e),
        }

        self.try_activate().await;

        Ok(songs)
    }

    /// Registers a vote and broadcasts the reordered queue
    pub async fn add_vote(
        &self,
        user_id: &str,
        uri: &str,
    ) -> Result<Vec<SerializedSong>, RoomError> {
        let songs = self.queue.add_vote(user_id, uri)?;

        self.broadcast(RoomEvent::VoteAdded {
            queue: songs.clone(),
        });

        self.persist_queue().await;

        Ok(songs)
    }

    /// Moves the reconciled playback pointer and tells everyone
    pub fn set_currently_playing(&self, index: usize) -> Result<(), RoomError> {
        self.queue.set_currently_playing(index)?;
        self.broadcast(RoomEvent::CurrentlyPlayingSet { index });

        Ok(())
    }

    /// Stores a refreshed access token reported by the driver and propagates
    /// it to every member
    pub async fn update_access_token(
        &self,
        user_id: &str,
        access_token: &str,
    ) -> Result<(), RoomError> {
        self.context
            .database
            .update_user_token(user_id, access_token)
            .await?;

        self.broadcast(RoomEvent::AccessTokenUpdated {
            user_id: user_id.to_string(),
            access_token: access_token.to_string(),
        });

        Ok(())
    }

    /// Stores a token Spotify handed back mid-call and propagates it, so no
    /// member keeps using the stale one
    pub(crate) async fn propagate_refreshed_token(&self, refreshed: Option<String>) {
        let Some(token) = refreshed else {
            return;
        };

        let owner_id = self.owner_id();

        match self
            .context
            .database
            .update_user_token(&owner_id, &token)
            .await
        {
            Ok(_) => self.broadcast(RoomEvent::AccessTokenUpdated {
                user_id: owner_id,
                access_token: token,
            }),
            Err(e) => warn!(
                "Could not store the refreshed token of room {}: {}",
                self.name(),
                e
            ),
        }
    }

    /// Starts playback if the room has songs, is not active yet, and the
    /// driver is here to issue the commands. Called whenever one of those
    /// conditions may have flipped.
    pub(crate) async fn try_activate(&self) {
        // Concurrent calls must not both observe an inactive room, or the
        // playback commands would be issued twice
        let _guard = self.activation.lock().await;

        if self.is_active() {
            self.ensure_reconciliation();
            return;
        }

        if self.is_deleted() || self.queue.is_empty() || !self.has_driver() {
            return;
        }

        match self.activate().await {
            Ok(()) => {}
            Err(RoomError::Spotify(SpotifyError::CredentialExpired)) => {
                warn!(
                    "Room {} could not start playback, the owner must re-authenticate",
                    self.name()
                );
                self.notify_driver(RoomEvent::ReauthorizationRequired);
            }
            Err(e) => warn!("Could not activate room {}: {}", self.name(), e),
        }
    }

    async fn activate(&self) -> Result<(), RoomError> {
        info!("Activating room {}...", self.name());

        let owner = self.context.database.user_by_id(&self.owner_id()).await?;
        let mut credential = AccessCredential::from(&owner);
        let uri = self.data.lock().uri.clone();

        let shuffled = self
            .context
            .spotify
            .shuffle(&credential, &owner.device_id, false)
            .await?;

        if let Some(token) = &shuffled.refreshed_token {
            credential.access_token = token.clone();
        }
        self.propagate_refreshed_token(shuffled.refreshed_token).await;

        let started = self
            .context
            .spotify
            .start_playback(&credential, &owner.device_id, &uri)
            .await?;

        self.propagate_refreshed_token(started.refreshed_token).await;

        self.context
            .database
            .update_room_active(&self.id(), true)
            .await?;

        self.data.lock().active = true;
        *self.state.lock() = RoomState::Active;

        // Playback begins at the head of the queue, reconciliation corrects
        // the pointer from the first poll onwards
        let _ = self.queue.set_currently_playing(0);
        self.broadcast(RoomEvent::CurrentlyPlayingSet { index: 0 });

        info!("Room {} is now active", self.name());
        self.ensure_reconciliation();

        Ok(())
    }

    /// Deletes the room: one terminal notice to every member, the loop
    /// cancelled, and the record removed
    pub async fn delete(&self, user_id: &str) -> Result<(), RoomError> {
        if user_id != self.owner_id() {
            return Err(RoomError::Unauthorized);
        }

        self.context.database.delete_room(&self.id()).await?;

        *self.state.lock() = RoomState::Deleted;
        self.stop_reconciliation();

        self.broadcast(RoomEvent::RoomDeleted);
        self.context.rooms.remove(&self.id());

        info!("Room {} deleted", self.name());

        Ok(())
    }

    fn has_driver(&self) -> bool {
        self.connections
            .lock()
            .iter()
            .any(|c| c.role == ConnectionRole::Driver)
    }

    /// Starts the reconciliation loop if the room is active, a driver is
    /// connected, and it isn't running already
    fn ensure_reconciliation(&self) {
        if !self.is_active() || !self.has_driver() {
            return;
        }

        let mut reconciliation = self.reconciliation.lock();

        if reconciliation.is_none() {
            let me = self.me.upgrade().expect("room is behind an arc");

            *reconciliation = Some(playback::spawn(me));
            info!("Reconciliation started for room {}", self.name());
        }
    }

    fn stop_reconciliation(&self) {
        if let Some(handle) = self.reconciliation.lock().take() {
            handle.stop();
            info!("Reconciliation stopped for room {}", self.name());
        }
    }

    async fn persist_queue(&self) {
        let queue = self.queue.to_data();

        if let Err(e) = self
            .context
            .database
            .update_room_queue(&self.id(), &queue)
            .await
        {
            warn!("Could not persist the queue of room {}: {}", self.name(), e);
        }
    }
}

#[cfg(test)]
mod test {
    use futures_util::FutureExt;

    use crate::{
        events::RoomEvent,
        testing::{drain, mock_room, mock_track, mock_user, FakeSpotify, MemoryDatabase},
        CollabContext, ConnectionRole,
    };

    use super::Room;

    type TestContext = CollabContext<MemoryDatabase, FakeSpotify>;

    async fn setup(active: bool) -> (TestContext, std::sync::Arc<Room<MemoryDatabase, FakeSpotify>>) {
        let context = crate::testing::context();
        context.database.insert_user(mock_user("owner"));
        context.database.insert_room(mock_room("owner", "den", active));

        let room = Room::new(&context, mock_room("owner", "den", active));
        context.rooms.insert(room.id(), room.clone());

        (context, room)
    }

    #[tokio::test]
    async fn test_driver_election() {
        let (_context, room) = setup(false).await;

        let first = room.connect("owner".to_string()).await.unwrap();
        let second = room.connect("owner".to_string()).await.unwrap();
        let listener = room.connect("listener".to_string()).await.unwrap();

        assert_eq!(first.role(), ConnectionRole::Driver);
        assert_eq!(second.role(), ConnectionRole::Observer);
        assert_eq!(listener.role(), ConnectionRole::Observer);

        // Once the driver leaves, a rejoining owner takes over again
        drop(first);
        let rejoined = room.connect("owner".to_string()).await.unwrap();
        assert_eq!(rejoined.role(), ConnectionRole::Driver);
    }

    #[tokio::test]
    async fn test_snapshot_arrives_before_any_delta() {
        let (_context, room) = setup(false).await;

        let mut member = room.connect("listener".to_string()).await.unwrap();
        room.add_song(mock_track("a", "a")).await.unwrap();

        let events = drain(&mut member);

        assert!(matches!(events[0], RoomEvent::Snapshot { .. }));
        assert!(matches!(events[1], RoomEvent::SongAdded { .. }));
    }

    #[tokio::test]
    async fn test_late_joiner_sees_equivalent_state() {
        let (_context, room) = setup(false).await;

        let mut early = room.connect("listener".to_string()).await.unwrap();

        room.add_song(mock_track("a", "a")).await.unwrap();
        room.add_song(mock_track("b", "b")).await.unwrap();
        room.add_vote("listener", &mock_track("b", "b").uri)
            .await
            .unwrap();

        // The queue as the early member observed it through deltas
        let early_queue = drain(&mut early)
            .into_iter()
            .filter_map(|e| match e {
                RoomEvent::SongAdded { queue } | RoomEvent::VoteAdded { queue } => Some(queue),
                _ => None,
            })
            .last()
            .unwrap();

        let mut late = room.connect("latecomer".to_string()).await.unwrap();
        let events = drain(&mut late);

        match &events[0] {
            RoomEvent::Snapshot { snapshot } => {
                assert_eq!(snapshot.queue, early_queue);
                assert_eq!(snapshot.currently_playing, room.queue.currently_playing());
            }
            other => panic!("expected a snapshot, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_vote_broadcasts_reordered_queue() {
        let (_context, room) = setup(false).await;

        room.add_song(mock_track("a", "a")).await.unwrap();
        room.add_song(mock_track("b", "b")).await.unwrap();
        room.add_song(mock_track("c", "c")).await.unwrap();

        let mut member = room.connect("listener".to_string()).await.unwrap();
        room.add_vote("u1", &mock_track("c", "c").uri).await.unwrap();
        room.add_vote("u2", &mock_track("c", "c").uri).await.unwrap();
        room.add_vote("u1", &mock_track("b", "b").uri).await.unwrap();

        let last_order: Vec<_> = drain(&mut member)
            .into_iter()
            .filter_map(|e| match e {
                RoomEvent::VoteAdded { queue } => Some(queue),
                _ => None,
            })
            .last()
            .unwrap()
            .into_iter()
            .map(|s| s.title)
            .collect();

        assert_eq!(last_order, vec!["a", "c", "b"]);
    }

    #[tokio::test]
    async fn test_delete_notifies_every_member_exactly_once() {
        let (_context, room) = setup(false).await;

        let mut members = Vec::new();
        for i in 0..3 {
            members.push(room.connect(format!("listener{}", i)).await.unwrap());
        }

        room.delete("owner").await.unwrap();

        for member in members.iter_mut() {
            let deletions = drain(member)
                .into_iter()
                .filter(|e| matches!(e, RoomEvent::RoomDeleted))
                .count();

            assert_eq!(deletions, 1);
        }

        // The room is gone, so the streams terminate
        for member in members.iter_mut() {
            use futures_util::StreamExt;
            assert_eq!(member.next().now_or_never(), Some(None));
        }
    }

    #[tokio::test]
    async fn test_delete_requires_the_owner() {
        let (context, room) = setup(false).await;

        let mut member = room.connect("listener".to_string()).await.unwrap();

        let result = room.delete("listener").await;
        assert!(matches!(result, Err(crate::RoomError::Unauthorized)));

        // Nothing happened: no event, room still registered
        assert!(!drain(&mut member)
            .iter()
            .any(|e| matches!(e, RoomEvent::RoomDeleted)));
        assert!(context.rooms.contains_key(&room.id()));
    }

    #[tokio::test]
    async fn test_duplicate_song_is_not_queued_twice() {
        let (_context, room) = setup(false).await;

        room.add_song(mock_track("a", "a")).await.unwrap();
        let songs = room.add_song(mock_track("a", "a")).await.unwrap();

        assert_eq!(songs.len(), 1);
    }
}
