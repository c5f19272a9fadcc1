use std::sync::Arc;

use auxparty_collab::{Collab, HttpDatabase, WebSpotifyApi};
use axum::extract::FromRef;

/// The engine as the server runs it, wired to the real external surfaces
pub type ServerCollab = Collab<HttpDatabase, WebSpotifyApi>;

#[derive(Clone, FromRef)]
pub struct ServerContext {
    pub collab: Arc<ServerCollab>,
}
