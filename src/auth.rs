use std::path::Path;

use anyhow::Result;
use rspotify::{
    AuthCodeSpotify, Config, Credentials, OAuth,
    clients::OAuthClient,
    scopes,
};

const DEFAULT_REDIRECT_URI: &str = "http://127.0.0.1:8888/callback";

/// Build an authorized client. A token cached at `token_cache` is reused and refreshed by
/// rspotify; otherwise the user is asked once to open the authorize URL and paste the redirect.
pub async fn authorize(token_cache: &Path) -> Result<AuthCodeSpotify> {
    let credentials = Credentials::from_env().ok_or_else(|| {
        anyhow::anyhow!("RSPOTIFY_CLIENT_ID and RSPOTIFY_CLIENT_SECRET must be set")
    })?;

    let scopes = scopes!(
        "user-read-playback-state",
        "playlist-modify-public",
        "playlist-modify-private",
        "playlist-read-private"
    );
    let oauth = OAuth::from_env(scopes.clone()).unwrap_or_else(|| OAuth {
        redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
        scopes,
        ..Default::default()
    });

    let spotify = AuthCodeSpotify::with_config(
        credentials,
        oauth,
        Config {
            token_cached: true,
            token_refreshing: true,
            cache_path: token_cache.to_path_buf(),
            ..Default::default()
        },
    );
    tracing::debug!(cache = %token_cache.display(), "rspotify client initialized");

    let url = spotify.get_authorize_url(false)?;
    spotify.prompt_for_token(&url).await?;
    tracing::debug!("rspotify token ready");

    match spotify.me().await {
        Ok(user) => tracing::info!(user_id = %user.id, "rspotify authorized successfully"),
        Err(e) => {
            tracing::error!(error = %e, "rspotify authentication failed");
            return Err(anyhow::anyhow!("rspotify init failed: {e}"));
        }
    }

    Ok(spotify)
}
