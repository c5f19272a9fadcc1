//! The auxparty collaboration engine.
//!
//! Rooms, their vote-ordered queues, event fan-out to connected members, and
//! the reconciliation loop that keeps a room's playback pointer in step with
//! what the owner's Spotify device actually plays.
//!
//! The two external surfaces, the data store and the music service, are
//! behind the [Database] and [SpotifyApi] traits.

use std::sync::Arc;

use dashmap::DashMap;

mod config;
mod db;
mod events;
mod playback;
mod queue;
mod rooms;
mod spotify;
mod util;

#[cfg(test)]
mod testing;

pub use config::*;
pub use db::*;
pub use events::*;
pub use playback::ReconciliationHandle;
pub use queue::{QueueError, SerializedSong, SongMetadata, VoteQueue};
pub use rooms::*;
pub use spotify::*;
pub use util::*;

/// A concurrent map of shared entities
pub type Store<K, V> = Arc<DashMap<K, Arc<V>>>;

/// The combined state of everything, sharable across threads
pub struct Collab<Db, S>
where
    Db: Database,
    S: SpotifyApi,
{
    pub rooms: RoomManager<Db, S>,
    context: CollabContext<Db, S>,
}

/// A cheaply clonable reference to the shared state, passed around internally
pub struct CollabContext<Db, S>
where
    Db: Database,
    S: SpotifyApi,
{
    pub config: Config,
    pub database: Arc<Db>,
    pub spotify: Arc<S>,
    pub rooms: Store<RoomId, Room<Db, S>>,
}

impl<Db, S> Collab<Db, S>
where
    Db: Database,
    S: SpotifyApi,
{
    pub fn new(config: Config, database: Db, spotify: S) -> Self {
        let context = CollabContext {
            config,
            database: Arc::new(database),
            spotify: Arc::new(spotify),
            rooms: Default::default(),
        };

        Self {
            rooms: RoomManager::new(&context),
            context,
        }
    }

    /// Loads the persisted rooms back into memory. Call this once on boot.
    pub async fn restore(&self) -> db::Result<()> {
        self.rooms.restore().await
    }

    pub fn context(&self) -> &CollabContext<Db, S> {
        &self.context
    }
}

impl<Db, S> Clone for CollabContext<Db, S>
where
    Db: Database,
    S: SpotifyApi,
{
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            database: self.database.clone(),
            spotify: self.spotify.clone(),
            rooms: self.rooms.clone(),
        }
    }
}

#[cfg(test)]
mod test {
    use crate::testing::{mock_room, FakeSpotify, MemoryDatabase};

    use super::{Collab, Config};

    #[tokio::test]
    async fn test_restore_loads_persisted_rooms() {
        let database = MemoryDatabase::new();
        database.insert_room(mock_room("owner", "den", false));

        let collab = Collab::new(Config::default(), database, FakeSpotify::new());
        collab.restore().await.unwrap();

        let rooms = collab.rooms.list_all();
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].name(), "den");
    }
}
