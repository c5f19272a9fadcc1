use async_trait::async_trait;
use thiserror::Error;

use crate::UserData;

mod web;
pub use web::*;

pub type SpotifyResult<T> = Result<T, SpotifyError>;

#[derive(Debug, Error)]
pub enum SpotifyError {
    /// The request itself failed, or Spotify returned an unexpected status.
    /// Never fatal to a room, the caller logs and carries on.
    #[error("Spotify request failed: {0}")]
    Failure(String),
    /// The access token expired and no refresh could be obtained. Playback
    /// commands will keep failing until the owner re-authenticates.
    #[error("Access token expired and could not be refreshed")]
    CredentialExpired,
    #[error("{0} not found")]
    NotFound(&'static str),
}

/// The token pair used to call Spotify on behalf of a user
#[derive(Debug, Clone)]
pub struct AccessCredential {
    pub access_token: String,
    pub refresh_token: String,
}

impl From<&UserData> for AccessCredential {
    fn from(user: &UserData) -> Self {
        Self {
            access_token: user.access_token.clone(),
            refresh_token: user.refresh_token.clone(),
        }
    }
}

/// A value returned from Spotify, along with a refreshed access token if the
/// old one expired mid-call. Callers must propagate the new token so no one
/// keeps using the stale one.
#[derive(Debug, Clone)]
pub struct SpotifyResponse<T> {
    pub value: T,
    pub refreshed_token: Option<String>,
}

/// A track as returned from search
#[derive(Debug, Clone)]
pub struct TrackHit {
    pub uri: String,
    pub title: String,
    pub artist: String,
    pub artwork: Option<String>,
}

/// A playlist created to back a room
#[derive(Debug, Clone)]
pub struct NewPlaylist {
    pub playlist_id: String,
    pub uri: String,
}

/// The capabilities of the external music service, treated as a black box.
///
/// Every operation may come back with a refreshed token, see [SpotifyResponse].
#[async_trait]
pub trait SpotifyApi: Send + Sync + 'static {
    async fn search(
        &self,
        credential: &AccessCredential,
        query: &str,
    ) -> SpotifyResult<SpotifyResponse<Vec<TrackHit>>>;

    async fn create_playlist(
        &self,
        credential: &AccessCredential,
        spotify_user_id: &str,
        name: &str,
    ) -> SpotifyResult<SpotifyResponse<NewPlaylist>>;

    async fn add_track(
        &self,
        credential: &AccessCredential,
        playlist_id: &str,
        uri: &str,
    ) -> SpotifyResult<SpotifyResponse<()>>;

    async fn shuffle(
        &self,
        credential: &AccessCredential,
        device_id: &str,
        state: bool,
    ) -> SpotifyResult<SpotifyResponse<()>>;

    async fn start_playback(
        &self,
        credential: &AccessCredential,
        device_id: &str,
        context_uri: &str,
    ) -> SpotifyResult<SpotifyResponse<()>>;

    /// Returns the uri of the track currently playing on the user's device,
    /// if anything is playing at all
    async fn currently_playing(
        &self,
        credential: &AccessCredential,
    ) -> SpotifyResult<SpotifyResponse<Option<String>>>;
}
