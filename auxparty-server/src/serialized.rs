use std::sync::Arc;

use auxparty_collab::{Database, Room, SerializedSong, SpotifyApi, TrackHit};
use serde::Serialize;

/// Convert a type into its serialized counterpart
pub trait ToSerialized<T>
where
    T: Serialize,
{
    fn to_serialized(&self) -> T;
}

/// A room as it appears in responses
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedRoom {
    pub auxparty_id: String,
    pub name: String,
    pub active: bool,
    pub currently_playing: Option<usize>,
    pub queue: Vec<SerializedSong>,
}

/// A search result as it appears in responses
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedTrack {
    pub uri: String,
    pub title: String,
    pub artist: String,
    pub artwork: Option<String>,
}

impl<Db, S> ToSerialized<SerializedRoom> for Arc<Room<Db, S>>
where
    Db: Database,
    S: SpotifyApi,
{
    fn to_serialized(&self) -> SerializedRoom {
        let snapshot = self.snapshot();

        SerializedRoom {
            auxparty_id: self.id(),
            name: self.name(),
            active: snapshot.active,
            currently_playing: snapshot.currently_playing,
            queue: snapshot.queue,
        }
    }
}

impl ToSerialized<SerializedTrack> for TrackHit {
    fn to_serialized(&self) -> SerializedTrack {
        SerializedTrack {
            uri: self.uri.clone(),
            title: self.title.clone(),
            artist: self.artist.clone(),
            artwork: self.artwork.clone(),
        }
    }
}

impl<T, U> ToSerialized<Vec<U>> for Vec<T>
where
    T: ToSerialized<U>,
    U: Serialize,
{
    fn to_serialized(&self) -> Vec<U> {
        self.iter().map(|x| x.to_serialized()).collect()
    }
}
