use std::sync::Arc;

use log::{debug, warn};
use tokio::time::interval;
use tokio_util::sync::CancellationToken;

use crate::{events::RoomEvent, AccessCredential, Database, Room, SpotifyApi, SpotifyError};

/// Cancels a room's reconciliation loop when stopped or dropped
pub struct ReconciliationHandle {
    cancellation: CancellationToken,
}

impl ReconciliationHandle {
    pub fn stop(&self) {
        self.cancellation.cancel()
    }
}

impl Drop for ReconciliationHandle {
    fn drop(&mut self) {
        self.cancellation.cancel()
    }
}

/// Spawns the reconciliation loop for an active room.
///
/// The loop polls the owner's playback on a fixed interval and moves the
/// room's pointer to match what Spotify reports. It runs until cancelled,
/// which happens when the driver disconnects or the room is deleted.
pub(crate) fn spawn<Db, S>(room: Arc<Room<Db, S>>) -> ReconciliationHandle
where
    Db: Database,
    S: SpotifyApi,
{
    let cancellation = CancellationToken::new();
    let token = cancellation.clone();

    tokio::spawn(async move {
        let mut ticker = interval(room.context.config.poll_interval);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => tick(&room).await,
            }
        }
    });

    ReconciliationHandle { cancellation }
}

/// One reconciliation pass. Nothing here is fatal, a failed poll just means
/// the pointer catches up on a later tick.
async fn tick<Db, S>(room: &Arc<Room<Db, S>>)
where
    Db: Database,
    S: SpotifyApi,
{
    let owner = match room.context.database.user_by_id(&room.owner_id()).await {
        Ok(owner) => owner,
        Err(e) => {
            warn!("Could not load the owner of room {}: {}", room.name(), e);
            return;
        }
    };

    let credential = AccessCredential::from(&owner);

    let result = match room.context.spotify.currently_playing(&credential).await {
        Ok(result) => result,
        Err(SpotifyError::CredentialExpired) => {
            warn!(
                "Polling room {} failed, the owner must re-authenticate",
                room.name()
            );
            room.notify_driver(RoomEvent::ReauthorizationRequired);
            return;
        }
        Err(e) => {
            warn!("Could not poll playback for room {}: {}", room.name(), e);
            return;
        }
    };

    room.propagate_refreshed_token(result.refreshed_token).await;

    // Nothing playing on the owner's device, leave the pointer alone
    let Some(uri) = result.value else {
        return;
    };

    let Some(position) = room.queue.position_of_first(&uri) else {
        debug!(
            "Track {} plays in room {} but is not queued, ignoring",
            uri,
            room.name()
        );
        return;
    };

    // Publish only on change, so a steady state produces no events
    if room.queue.currently_playing() == Some(position) {
        return;
    }

    if let Err(e) = room.set_currently_playing(position) {
        warn!(
            "Could not move the pointer of room {}: {}",
            room.name(),
            e
        );
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use crate::{
        events::RoomEvent,
        testing::{drain, mock_room, mock_track, mock_user, FakeSpotify, MemoryDatabase},
        CollabContext, Database, Room, RoomConnectionHandle,
    };

    type TestContext = CollabContext<MemoryDatabase, FakeSpotify>;
    type TestHandle = RoomConnectionHandle<MemoryDatabase, FakeSpotify>;

    /// A room with two queued songs and no connections yet
    async fn setup() -> (TestContext, std::sync::Arc<Room<MemoryDatabase, FakeSpotify>>) {
        let context = crate::testing::context();
        context.database.insert_user(mock_user("owner"));
        context.database.insert_room(mock_room("owner", "den", false));

        let room = Room::new(&context, mock_room("owner", "den", false));
        context.rooms.insert(room.id(), room.clone());

        room.add_song(mock_track("a", "a")).await.unwrap();
        room.add_song(mock_track("b", "b")).await.unwrap();

        (context, room)
    }

    /// Lets the spawned loop run its pending ticks
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    async fn next_tick() {
        tokio::time::sleep(Duration::from_secs(11)).await;
    }

    fn pointer_events(handle: &mut TestHandle) -> Vec<usize> {
        drain(handle)
            .into_iter()
            .filter_map(|e| match e {
                RoomEvent::CurrentlyPlayingSet { index } => Some(index),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_activation_issues_shuffle_then_play() {
        let (context, room) = setup().await;

        let _driver = room.connect("owner".to_string()).await.unwrap();

        let commands: Vec<_> = context
            .spotify
            .commands()
            .into_iter()
            .filter(|c| c.starts_with("shuffle") || c.starts_with("play"))
            .collect();

        assert_eq!(
            commands,
            vec!["shuffle off", "play spotify:playlist:mock"]
        );
        assert!(room.is_active());
        assert_eq!(room.queue.currently_playing(), Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pointer_follows_the_playing_track_once() {
        let (context, room) = setup().await;
        let track_b = mock_track("b", "b").uri;

        // Two ticks report the same track, only one event should go out
        context.spotify.script_playing([Some(track_b.clone()), Some(track_b)]);

        let mut driver = room.connect("owner".to_string()).await.unwrap();
        settle().await;
        next_tick().await;

        assert_eq!(room.queue.currently_playing(), Some(1));

        let moves: Vec<_> = pointer_events(&mut driver)
            .into_iter()
            .filter(|i| *i == 1)
            .collect();
        assert_eq!(moves.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_track_is_ignored() {
        let (context, room) = setup().await;

        context
            .spotify
            .script_playing([Some("spotify:track:0000000000000000000x".to_string())]);

        let _driver = room.connect("owner".to_string()).await.unwrap();
        settle().await;

        // Activation set the pointer to the head, the poll must not move it
        assert_eq!(room.queue.currently_playing(), Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refreshed_token_is_stored_and_broadcast() {
        let (context, room) = setup().await;

        let mut driver = room.connect("owner".to_string()).await.unwrap();
        settle().await;

        context.spotify.refresh_on_next_call("fresh-token");
        next_tick().await;

        let owner = context.database.user_by_id("owner").await.unwrap();
        assert_eq!(owner.access_token, "fresh-token");

        assert!(drain(&mut driver).iter().any(|e| matches!(
            e,
            RoomEvent::AccessTokenUpdated { access_token, .. } if access_token == "fresh-token"
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_stops_when_the_driver_disconnects() {
        let (context, room) = setup().await;

        let driver = room.connect("owner".to_string()).await.unwrap();
        let _listener = room.connect("listener".to_string()).await.unwrap();
        settle().await;

        drop(driver);
        let polls_before = context.spotify.poll_count();

        next_tick().await;
        next_tick().await;

        assert_eq!(context.spotify.poll_count(), polls_before);
        assert!(room.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_resumes_when_the_owner_returns() {
        let (context, room) = setup().await;

        let driver = room.connect("owner".to_string()).await.unwrap();
        settle().await;
        drop(driver);

        let polls_before = context.spotify.poll_count();

        let _driver = room.connect("owner".to_string()).await.unwrap();
        settle().await;
        next_tick().await;

        assert!(context.spotify.poll_count() > polls_before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_additions_activate_once() {
        let context = crate::testing::context();
        context.database.insert_user(mock_user("owner"));
        context.database.insert_room(mock_room("owner", "den", false));

        let room = Room::new(&context, mock_room("owner", "den", false));
        context.rooms.insert(room.id(), room.clone());

        let _driver = room.connect("owner".to_string()).await.unwrap();

        // Both additions see an empty, inactive room when they start
        let (a, b) = tokio::join!(
            room.add_song(mock_track("a", "a")),
            room.add_song(mock_track("b", "b"))
        );
        a.unwrap();
        b.unwrap();

        let activations: Vec<_> = context
            .spotify
            .commands()
            .into_iter()
            .filter(|c| c.starts_with("shuffle") || c.starts_with("play"))
            .collect();

        assert_eq!(
            activations,
            vec!["shuffle off", "play spotify:playlist:mock"]
        );
        assert!(room.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deletion_stops_the_loop() {
        let (context, room) = setup().await;

        let _driver = room.connect("owner".to_string()).await.unwrap();
        settle().await;
        assert!(room.is_active());

        room.delete("owner").await.unwrap();
        let polls_before = context.spotify.poll_count();

        next_tick().await;
        next_tick().await;

        assert_eq!(context.spotify.poll_count(), polls_before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_credential_notifies_the_driver_only() {
        let (context, room) = setup().await;
        context.spotify.expire_credentials();

        let mut listener = room.connect("listener".to_string()).await.unwrap();
        let mut driver = room.connect("owner".to_string()).await.unwrap();

        // Activation failed, so the room stays inactive
        assert!(!room.is_active());

        assert!(drain(&mut driver)
            .iter()
            .any(|e| matches!(e, RoomEvent::ReauthorizationRequired)));
        assert!(!drain(&mut listener)
            .iter()
            .any(|e| matches!(e, RoomEvent::ReauthorizationRequired)));
    }
}
