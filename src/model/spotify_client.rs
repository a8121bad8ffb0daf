//! Spotify API client wrapper and the service seam used by the controller

use std::sync::Arc;

use async_trait::async_trait;
use rspotify::{
    model::{PlayableId, PlayableItem, PlaylistId, TrackId},
    prelude::*,
    AuthCodeSpotify,
};

use super::types::{PageCursor, PlaybackSnapshot, PlaylistPage};
use crate::error::RemoteError;
use crate::{log_api_request, log_api_result};

/// Operations the add-track core needs from the music service.
#[async_trait]
pub trait MusicService: Send + Sync {
    async fn current_playback(&self) -> Result<Option<PlaybackSnapshot>, RemoteError>;

    async fn playlist_page(
        &self,
        playlist_id: &str,
        cursor: Option<PageCursor>,
    ) -> Result<PlaylistPage, RemoteError>;

    async fn add_track(&self, playlist_id: &str, track_id: &str) -> Result<(), RemoteError>;

    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, RemoteError>;
}

/// Spotify Web API client
#[derive(Clone)]
pub struct SpotifyClient {
    client: Arc<AuthCodeSpotify>,
    http: reqwest::Client,
}

impl SpotifyClient {
    pub const PLAYLIST_PAGE_SIZE: u32 = 100;

    pub fn new(client: AuthCodeSpotify) -> Self {
        Self {
            client: Arc::new(client),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl MusicService for SpotifyClient {
    async fn current_playback(&self) -> Result<Option<PlaybackSnapshot>, RemoteError> {
        log_api_request!("current_playback");
        let result = self.client.current_playback(None, None::<Vec<_>>).await;
        log_api_result!("current_playback", result);

        let snapshot = result?.as_ref().and_then(PlaybackSnapshot::from_playback);
        if let Some(ref snapshot) = snapshot {
            tracing::trace!(
                track_id = %snapshot.track_id,
                is_playing = snapshot.is_playing,
                "Got playback state"
            );
        }
        Ok(snapshot)
    }

    async fn playlist_page(
        &self,
        playlist_id: &str,
        cursor: Option<PageCursor>,
    ) -> Result<PlaylistPage, RemoteError> {
        let id = PlaylistId::from_id(playlist_id)?;
        let offset = cursor.unwrap_or(0);

        log_api_request!("playlist_items", playlist_id, offset);
        let result = self
            .client
            .playlist_items_manual(id, None, None, Some(Self::PLAYLIST_PAGE_SIZE), Some(offset))
            .await;
        log_api_result!("playlist_items", result);
        let page = result?;

        let items: Vec<Option<String>> = page
            .items
            .iter()
            .map(|item| match &item.track {
                Some(PlayableItem::Track(track)) => track.id.as_ref().map(|id| id.id().to_string()),
                _ => None,
            })
            .collect();

        // An empty page cannot advance the offset, so it ends the listing
        let next = match page.next {
            Some(_) if !items.is_empty() => Some(offset + items.len() as u32),
            _ => None,
        };

        Ok(PlaylistPage { items, next })
    }

    async fn add_track(&self, playlist_id: &str, track_id: &str) -> Result<(), RemoteError> {
        if track_id.is_empty() {
            return Err(RemoteError::Rejected("Track ID is empty".to_string()));
        }

        let playlist = PlaylistId::from_id(playlist_id)?;
        let track = TrackId::from_id(track_id)?;

        log_api_request!("playlist_add_items", playlist_id, track_id);
        let result = self
            .client
            .playlist_add_items(playlist, [PlayableId::Track(track)], None)
            .await;
        log_api_result!("playlist_add_items", result);
        result?;
        Ok(())
    }

    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, RemoteError> {
        tracing::debug!(url, "Fetching album art");
        let response = self.http.get(url).send().await?.error_for_status()?;
        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }
}
