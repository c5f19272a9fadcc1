//! In-memory stand-ins for the two external surfaces, plus small helpers
//! shared by the tests in this crate.

use std::{
    collections::VecDeque,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::{FutureExt, StreamExt};
use parking_lot::Mutex;

use crate::{
    db, events::RoomEvent, AccessCredential, CollabContext, Config, Database, DatabaseError,
    NewPlaylist, NewRoom, PrimaryKey, RoomConnectionHandle, RoomData, SongData, SpotifyApi,
    SpotifyError, SpotifyResponse, SpotifyResult, TrackHit, UserData,
};

pub fn context() -> CollabContext<MemoryDatabase, FakeSpotify> {
    CollabContext {
        config: Config::default(),
        database: std::sync::Arc::new(MemoryDatabase::new()),
        spotify: std::sync::Arc::new(FakeSpotify::new()),
        rooms: Default::default(),
    }
}

pub fn mock_user(id: &str) -> UserData {
    UserData {
        auxparty_id: id.to_string(),
        spotify_user_id: format!("spotify-{}", id),
        spotify_display_name: id.to_string(),
        access_token: "access-token".to_string(),
        refresh_token: "refresh-token".to_string(),
        device_id: "device".to_string(),
    }
}

pub fn mock_room(owner_id: &str, name: &str, active: bool) -> RoomData {
    RoomData {
        auxparty_id: owner_id.to_string(),
        name: name.to_string(),
        password: "unchecked".to_string(),
        active,
        playlist_id: "playlist".to_string(),
        uri: "spotify:playlist:mock".to_string(),
        queue: vec![],
    }
}

pub fn mock_track(id: &str, title: &str) -> TrackHit {
    TrackHit {
        uri: format!("spotify:track:{:0>22}", id),
        title: title.to_string(),
        artist: "artist".to_string(),
        artwork: None,
    }
}

/// Collects every event a handle can yield without waiting
pub fn drain<Db, S>(handle: &mut RoomConnectionHandle<Db, S>) -> Vec<RoomEvent>
where
    Db: Database,
    S: SpotifyApi,
{
    let mut events = Vec::new();

    while let Some(Some(event)) = handle.next().now_or_never() {
        events.push(event);
    }

    events
}

/// A [Database] over two in-process maps
pub struct MemoryDatabase {
    users: DashMap<PrimaryKey, UserData>,
    rooms: DashMap<PrimaryKey, RoomData>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self {
            users: Default::default(),
            rooms: Default::default(),
        }
    }

    pub fn insert_user(&self, user: UserData) {
        self.users.insert(user.auxparty_id.clone(), user);
    }

    pub fn insert_room(&self, room: RoomData) {
        self.rooms.insert(room.auxparty_id.clone(), room);
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn user_by_id(&self, auxparty_id: &str) -> db::Result<UserData> {
        self.users
            .get(auxparty_id)
            .map(|u| u.clone())
            .ok_or_else(|| DatabaseError::NotFound {
                resource: "user",
                identifier: auxparty_id.to_string(),
            })
    }

    async fn update_user_token(
        &self,
        auxparty_id: &str,
        access_token: &str,
    ) -> db::Result<UserData> {
        let mut user = self
            .users
            .get_mut(auxparty_id)
            .ok_or_else(|| DatabaseError::NotFound {
                resource: "user",
                identifier: auxparty_id.to_string(),
            })?;

        user.access_token = access_token.to_string();
        Ok(user.clone())
    }

    async fn room_by_id(&self, auxparty_id: &str) -> db::Result<RoomData> {
        self.rooms
            .get(auxparty_id)
            .map(|r| r.clone())
            .ok_or_else(|| DatabaseError::NotFound {
                resource: "room",
                identifier: auxparty_id.to_string(),
            })
    }

    async fn room_by_name(&self, name: &str) -> db::Result<RoomData> {
        self.rooms
            .iter()
            .find(|r| r.name == name)
            .map(|r| r.clone())
            .ok_or_else(|| DatabaseError::NotFound {
                resource: "room",
                identifier: name.to_string(),
            })
    }

    async fn list_rooms(&self) -> db::Result<Vec<RoomData>> {
        Ok(self.rooms.iter().map(|r| r.clone()).collect())
    }

    async fn create_room(&self, new_room: NewRoom) -> db::Result<RoomData> {
        let name_taken = self.rooms.iter().any(|r| r.name == new_room.name);

        if name_taken {
            return Err(DatabaseError::Conflict {
                resource: "room",
                field: "name",
                value: new_room.name,
            });
        }

        let room = RoomData {
            auxparty_id: new_room.auxparty_id,
            name: new_room.name,
            password: new_room.password,
            active: false,
            playlist_id: new_room.playlist_id,
            uri: new_room.uri,
            queue: vec![],
        };

        self.rooms.insert(room.auxparty_id.clone(), room.clone());
        Ok(room)
    }

    async fn update_room_active(&self, auxparty_id: &str, active: bool) -> db::Result<RoomData> {
        let mut room = self
            .rooms
            .get_mut(auxparty_id)
            .ok_or_else(|| DatabaseError::NotFound {
                resource: "room",
                identifier: auxparty_id.to_string(),
            })?;

        room.active = active;
        Ok(room.clone())
    }

    async fn update_room_queue(
        &self,
        auxparty_id: &str,
        queue: &[SongData],
    ) -> db::Result<RoomData> {
        let mut room = self
            .rooms
            .get_mut(auxparty_id)
            .ok_or_else(|| DatabaseError::NotFound {
                resource: "room",
                identifier: auxparty_id.to_string(),
            })?;

        room.queue = queue.to_vec();
        Ok(room.clone())
    }

    async fn delete_room(&self, auxparty_id: &str) -> db::Result<()> {
        self.rooms.remove(auxparty_id);
        Ok(())
    }
}

/// A scriptable [SpotifyApi] that records the commands issued to it
pub struct FakeSpotify {
    commands: Mutex<Vec<String>>,
    /// Queued answers for [SpotifyApi::currently_playing], consumed in order.
    /// Exhaustion means nothing is playing.
    playing: Mutex<VecDeque<Option<String>>>,
    /// A token the next call will hand back as refreshed, consumed once
    refreshed: Mutex<Option<String>>,
    expired: AtomicBool,
    polls: AtomicUsize,
}

impl FakeSpotify {
    pub fn new() -> Self {
        Self {
            commands: Default::default(),
            playing: Default::default(),
            refreshed: Default::default(),
            expired: AtomicBool::new(false),
            polls: AtomicUsize::new(0),
        }
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }

    pub fn poll_count(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn script_playing<I>(&self, answers: I)
    where
        I: IntoIterator<Item = Option<String>>,
    {
        self.playing.lock().extend(answers)
    }

    pub fn refresh_on_next_call(&self, token: &str) {
        *self.refreshed.lock() = Some(token.to_string())
    }

    /// Makes every following call fail with an unrefreshable token
    pub fn expire_credentials(&self) {
        self.expired.store(true, Ordering::SeqCst)
    }

    /// Yields once before answering, like any real request would, so
    /// concurrent callers interleave the way they do against the wire
    async fn respond<T>(&self, command: String, value: T) -> SpotifyResult<SpotifyResponse<T>> {
        tokio::task::yield_now().await;

        if self.expired.load(Ordering::SeqCst) {
            return Err(SpotifyError::CredentialExpired);
        }

        self.commands.lock().push(command);

        Ok(SpotifyResponse {
            value,
            refreshed_token: self.refreshed.lock().take(),
        })
    }
}

#[async_trait]
impl SpotifyApi for FakeSpotify {
    async fn search(
        &self,
        _credential: &AccessCredential,
        query: &str,
    ) -> SpotifyResult<SpotifyResponse<Vec<TrackHit>>> {
        let hit = mock_track("search", query);
        self.respond(format!("search {}", query), vec![hit]).await
    }

    async fn create_playlist(
        &self,
        _credential: &AccessCredential,
        _spotify_user_id: &str,
        name: &str,
    ) -> SpotifyResult<SpotifyResponse<NewPlaylist>> {
        self.respond(
            format!("create_playlist {}", name),
            NewPlaylist {
                playlist_id: "playlist".to_string(),
                uri: "spotify:playlist:mock".to_string(),
            },
        )
        .await
    }

    async fn add_track(
        &self,
        _credential: &AccessCredential,
        _playlist_id: &str,
        uri: &str,
    ) -> SpotifyResult<SpotifyResponse<()>> {
        self.respond(format!("add_track {}", uri), ()).await
    }

    async fn shuffle(
        &self,
        _credential: &AccessCredential,
        _device_id: &str,
        state: bool,
    ) -> SpotifyResult<SpotifyResponse<()>> {
        let state = if state { "on" } else { "off" };
        self.respond(format!("shuffle {}", state), ()).await
    }

    async fn start_playback(
        &self,
        _credential: &AccessCredential,
        _device_id: &str,
        context_uri: &str,
    ) -> SpotifyResult<SpotifyResponse<()>> {
        self.respond(format!("play {}", context_uri), ()).await
    }

    async fn currently_playing(
        &self,
        _credential: &AccessCredential,
    ) -> SpotifyResult<SpotifyResponse<Option<String>>> {
        self.polls.fetch_add(1, Ordering::SeqCst);

        let answer = self.playing.lock().pop_front().flatten();
        self.respond("currently_playing".to_string(), answer).await
    }
}
