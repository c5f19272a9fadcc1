use std::{env, sync::Arc};

use auxparty_collab::{Collab, Config, HttpDatabase, WebSpotifyApi};
use auxparty_server::{init_logger, run_server};
use log::{error, info};

#[tokio::main]
async fn main() {
    init_logger();

    let client_id = required_env("SPOTIFY_CLIENT_ID");
    let client_secret = required_env("SPOTIFY_CLIENT_SECRET");

    let mut config = Config::default();

    if let Ok(url) = env::var("AUXPARTY_CORE_API_URL") {
        config.core_api_url = url;
    }

    let database = HttpDatabase::new(&config.core_api_url);
    let spotify = WebSpotifyApi::new(&config, &client_id, &client_secret);

    let collab = Arc::new(Collab::new(config, database, spotify));

    // Rooms live in memory, bring the persisted ones back before serving
    if let Err(e) = collab.restore().await {
        error!("Could not restore rooms: {}", e);
    }

    info!("auxparty is ready");
    run_server(collab).await
}

fn required_env(name: &str) -> String {
    env::var(name).unwrap_or_else(|_| panic!("{} must be set", name))
}
