use serde::{Deserialize, Serialize};

/// The type used for primary keys in the core api.
/// These are the randomly generated "auxparty ids" assigned to users and rooms.
pub type PrimaryKey = String;

/// An auxparty account, linked to a Spotify account
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserData {
    pub auxparty_id: PrimaryKey,
    pub spotify_user_id: String,
    pub spotify_display_name: String,
    /// The current Spotify access token, updated in place when refreshed
    pub access_token: String,
    pub refresh_token: String,
    /// The Spotify Connect device playback commands are issued to
    pub device_id: String,
}

/// An auxparty room
///
/// Note: a room's auxparty id is the id of the user that owns it, so the
/// owner is looked up by the room's own id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomData {
    pub auxparty_id: PrimaryKey,
    /// The unique, human readable name of the room
    pub name: String,
    /// The argon2 hash of the room password
    pub password: String,
    /// Whether playback has been started for this room
    pub active: bool,
    /// The Spotify playlist backing this room
    pub playlist_id: String,
    /// The Spotify context uri of the playlist, used to start playback
    pub uri: String,
    /// The persisted queue, restored when the room is loaded
    #[serde(default)]
    pub queue: Vec<SongData>,
}

/// A song in a room's persisted queue
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongData {
    pub uri: String,
    pub title: String,
    pub artist: String,
    pub artwork: Option<String>,
    /// Users that voted for this song. The vote count is always derived from
    /// this, never stored on its own.
    #[serde(default)]
    pub voters: Vec<PrimaryKey>,
}
