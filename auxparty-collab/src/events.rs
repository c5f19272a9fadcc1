use serde::Serialize;

use crate::{PrimaryKey, SerializedSong};

/// The full state of a room, sent to a connection when it joins so incremental
/// events always apply onto a known base.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub queue: Vec<SerializedSong>,
    pub currently_playing: Option<usize>,
    pub active: bool,
}

/// Events delivered over a room's channel, in publish order, to every
/// connection currently in the room.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type")]
#[serde(rename_all = "kebab-case")]
pub enum RoomEvent {
    /// The first event a joining connection receives
    Snapshot { snapshot: RoomSnapshot },
    /// The queue changed by an addition
    SongAdded { queue: Vec<SerializedSong> },
    /// A vote changed the tally, and possibly the ordering
    VoteAdded { queue: Vec<SerializedSong> },
    /// The reconciled playback pointer moved
    CurrentlyPlayingSet { index: usize },
    /// The owner's access token was refreshed and every member should use the
    /// new one from now on
    #[serde(rename_all = "camelCase")]
    AccessTokenUpdated {
        user_id: PrimaryKey,
        access_token: String,
    },
    /// Playback commands stopped succeeding until the owner re-authenticates
    ReauthorizationRequired,
    /// Terminal notice, members must leave
    RoomDeleted,
}
