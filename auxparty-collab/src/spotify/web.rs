use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;

use super::{
    AccessCredential, NewPlaylist, SpotifyApi, SpotifyError, SpotifyResponse, SpotifyResult,
    TrackHit,
};
use crate::Config;

/// A [SpotifyApi] implementation against the real Spotify Web API.
///
/// Expired tokens are refreshed through the accounts service and retried once,
/// with the new token carried back to the caller for propagation.
pub struct WebSpotifyApi {
    client: Client,
    api_base: String,
    accounts_base: String,
    client_id: String,
    client_secret: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    tracks: TrackPage,
}

#[derive(Debug, Deserialize)]
struct TrackPage {
    items: Vec<TrackItem>,
}

#[derive(Debug, Deserialize)]
struct TrackItem {
    uri: String,
    name: String,
    artists: Vec<Artist>,
    album: Option<Album>,
}

#[derive(Debug, Deserialize)]
struct Artist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Album {
    images: Vec<Image>,
}

#[derive(Debug, Deserialize)]
struct Image {
    url: String,
}

#[derive(Debug, Deserialize)]
struct CurrentlyPlayingResponse {
    item: Option<TrackItem>,
}

#[derive(Debug, Deserialize)]
struct CreatedPlaylist {
    id: String,
    uri: String,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
}

impl TrackItem {
    fn into_hit(self) -> TrackHit {
        let artist = self
            .artists
            .into_iter()
            .map(|a| a.name)
            .collect::<Vec<_>>()
            .join(", ");

        let artwork = self
            .album
            .and_then(|a| a.images.into_iter().next())
            .map(|i| i.url);

        TrackHit {
            uri: self.uri,
            title: self.name,
            artist,
            artwork,
        }
    }
}

impl WebSpotifyApi {
    pub fn new(config: &Config, client_id: &str, client_secret: &str) -> Self {
        Self {
            client: Client::new(),
            api_base: config.spotify_api_url.trim_end_matches('/').to_string(),
            accounts_base: config.spotify_accounts_url.trim_end_matches('/').to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    /// Exchanges the refresh token for a new access token
    async fn refresh(&self, credential: &AccessCredential) -> SpotifyResult<String> {
        let response = self
            .client
            .post(format!("{}/api/token", self.accounts_base))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", &credential.refresh_token),
            ])
            .send()
            .await
            .map_err(|e| SpotifyError::Failure(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SpotifyError::CredentialExpired);
        }

        let refreshed: RefreshResponse = response
            .json()
            .await
            .map_err(|e| SpotifyError::Failure(e.to_string()))?;

        Ok(refreshed.access_token)
    }

    /// Sends a request built with the current token, retrying once with a
    /// refreshed token if Spotify rejects it as expired
    async fn send_authorized<F>(
        &self,
        credential: &AccessCredential,
        build: F,
    ) -> SpotifyResult<(Response, Option<String>)>
    where
        F: Fn(&Client, &str) -> RequestBuilder,
    {
        let response = build(&self.client, &credential.access_token)
            .send()
            .await
            .map_err(|e| SpotifyError::Failure(e.to_string()))?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok((response, None));
        }

        let new_token = self.refresh(credential).await?;

        let response = build(&self.client, &new_token)
            .send()
            .await
            .map_err(|e| SpotifyError::Failure(e.to_string()))?;

        Ok((response, Some(new_token)))
    }
}

fn check_status(response: &Response) -> SpotifyResult<()> {
    let status = response.status();

    if status.as_u16() == 404 {
        return Err(SpotifyError::NotFound("resource"));
    }

    if !status.is_success() {
        return Err(SpotifyError::Failure(format!(
            "unexpected status {}",
            status
        )));
    }

    Ok(())
}

#[async_trait]
impl SpotifyApi for WebSpotifyApi {
    async fn search(
        &self,
        credential: &AccessCredential,
        query: &str,
    ) -> SpotifyResult<SpotifyResponse<Vec<TrackHit>>> {
        let url = self.url("/v1/search");
        let query = query.to_string();

        let (response, refreshed_token) = self
            .send_authorized(credential, |client, token| {
                client
                    .get(&url)
                    .bearer_auth(token)
                    .query(&[("q", query.as_str()), ("type", "track"), ("limit", "10")])
            })
            .await?;

        check_status(&response)?;

        let result: SearchResponse = response
            .json()
            .await
            .map_err(|e| SpotifyError::Failure(e.to_string()))?;

        let hits = result
            .tracks
            .items
            .into_iter()
            .map(TrackItem::into_hit)
            .collect();

        Ok(SpotifyResponse {
            value: hits,
            refreshed_token,
        })
    }

    async fn create_playlist(
        &self,
        credential: &AccessCredential,
        spotify_user_id: &str,
        name: &str,
    ) -> SpotifyResult<SpotifyResponse<NewPlaylist>> {
        let url = self.url(&format!("/v1/users/{}/playlists", spotify_user_id));
        let body = json!({ "name": name, "public": false });

        let (response, refreshed_token) = self
            .send_authorized(credential, |client, token| {
                client.post(&url).bearer_auth(token).json(&body)
            })
            .await?;

        check_status(&response)?;

        let created: CreatedPlaylist = response
            .json()
            .await
            .map_err(|e| SpotifyError::Failure(e.to_string()))?;

        Ok(SpotifyResponse {
            value: NewPlaylist {
                playlist_id: created.id,
                uri: created.uri,
            },
            refreshed_token,
        })
    }

    async fn add_track(
        &self,
        credential: &AccessCredential,
        playlist_id: &str,
        uri: &str,
    ) -> SpotifyResult<SpotifyResponse<()>> {
        let url = self.url(&format!("/v1/playlists/{}/tracks", playlist_id));
        let body = json!({ "uris": [uri] });

        let (response, refreshed_token) = self
            .send_authorized(credential, |client, token| {
                client.post(&url).bearer_auth(token).json(&body)
            })
            .await?;

        check_status(&response)?;

        Ok(SpotifyResponse {
            value: (),
            refreshed_token,
        })
    }

    async fn shuffle(
        &self,
        credential: &AccessCredential,
        device_id: &str,
        state: bool,
    ) -> SpotifyResult<SpotifyResponse<()>> {
        let url = self.url("/v1/me/player/shuffle");
        let state = state.to_string();

        let (response, refreshed_token) = self
            .send_authorized(credential, |client, token| {
                client
                    .put(&url)
                    .bearer_auth(token)
                    .query(&[("state", state.as_str()), ("device_id", device_id)])
            })
            .await?;

        check_status(&response)?;

        Ok(SpotifyResponse {
            value: (),
            refreshed_token,
        })
    }

    async fn start_playback(
        &self,
        credential: &AccessCredential,
        device_id: &str,
        context_uri: &str,
    ) -> SpotifyResult<SpotifyResponse<()>> {
        let url = self.url("/v1/me/player/play");
        let body = json!({ "context_uri": context_uri });

        let (response, refreshed_token) = self
            .send_authorized(credential, |client, token| {
                client
                    .put(&url)
                    .bearer_auth(token)
                    .query(&[("device_id", device_id)])
                    .json(&body)
            })
            .await?;

        check_status(&response)?;

        Ok(SpotifyResponse {
            value: (),
            refreshed_token,
        })
    }

    async fn currently_playing(
        &self,
        credential: &AccessCredential,
    ) -> SpotifyResult<SpotifyResponse<Option<String>>> {
        let url = self.url("/v1/me/player/currently-playing");

        let (response, refreshed_token) = self
            .send_authorized(credential, |client, token| {
                client.get(&url).bearer_auth(token)
            })
            .await?;

        // Spotify answers 204 when nothing is playing
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(SpotifyResponse {
                value: None,
                refreshed_token,
            });
        }

        check_status(&response)?;

        let playing: CurrentlyPlayingResponse = response
            .json()
            .await
            .map_err(|e| SpotifyError::Failure(e.to_string()))?;

        Ok(SpotifyResponse {
            value: playing.item.map(|i| i.uri),
            refreshed_token,
        })
    }
}
