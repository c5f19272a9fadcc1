use std::time::Duration;

/// The configuration of the collab system
#[derive(Debug, Clone)]
pub struct Config {
    /// How often the driver connection polls the music service for the
    /// currently playing track
    pub poll_interval: Duration,
    /// Base url of the core api, which stores rooms, users, and queues
    pub core_api_url: String,
    /// Base url of the Spotify Web API
    pub spotify_api_url: String,
    /// Base url of the Spotify accounts service, used for token refreshes
    pub spotify_accounts_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Spotify's playback state is slow to settle, anything faster
            // than this just burns rate limit
            poll_interval: Duration::from_secs(10),
            core_api_url: "http://localhost:8000".to_string(),
            spotify_api_url: "https://api.spotify.com".to_string(),
            spotify_accounts_url: "https://accounts.spotify.com".to_string(),
        }
    }
}
