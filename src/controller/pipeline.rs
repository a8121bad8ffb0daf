//! Add the currently playing track to the target playlist

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, mpsc};

use crate::config::AppConfig;
use crate::error::{AppError, with_timeout};
use crate::model::{Claim, MembershipCache, MusicService, Notification, PlaybackSnapshot};

/// What a single trigger ended up doing
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    Duplicate,
    /// The same track is being added by an earlier trigger
    AlreadyInFlight,
    /// The target playlist was being switched; nothing was added
    PlaylistChanged,
}

#[derive(Clone)]
pub struct AddTrackPipeline {
    service: Arc<dyn MusicService>,
    cache: MembershipCache,
    settings: Arc<RwLock<AppConfig>>,
    notifications: mpsc::UnboundedSender<Notification>,
}

impl AddTrackPipeline {
    pub fn new(
        service: Arc<dyn MusicService>,
        cache: MembershipCache,
        settings: Arc<RwLock<AppConfig>>,
        notifications: mpsc::UnboundedSender<Notification>,
    ) -> Self {
        Self {
            service,
            cache,
            settings,
            notifications,
        }
    }

    /// Run one add attempt. Failures are logged here; the returned error is for callers
    /// that want to inspect it.
    pub async fn trigger(&self) -> Result<AddOutcome, AppError> {
        tracing::debug!("Add current track triggered");
        let result = self.add_current_track().await;

        match &result {
            Ok(outcome) => tracing::debug!(outcome = ?outcome, "Add current track finished"),
            Err(AppError::ConfigMissing) => {
                tracing::debug!("No target playlist configured, ignoring trigger")
            }
            Err(AppError::NotPlaying) => tracing::info!("No track currently playing"),
            Err(e) => tracing::error!(error = %e, "Failed to add track to playlist"),
        }
        result
    }

    async fn add_current_track(&self) -> Result<AddOutcome, AppError> {
        let (playlist_id, timeout) = {
            let settings = self.settings.read().await;
            (settings.playlist_id(), settings.remote_timeout())
        };
        let playlist_id = playlist_id.ok_or(AppError::ConfigMissing)?;

        let playback = with_timeout("current_playback", timeout, self.service.current_playback())
            .await?
            .filter(|playback| playback.is_playing)
            .ok_or(AppError::NotPlaying)?;
        let track_id = playback.track_id.as_str();

        match self.cache.claim(&playlist_id, track_id).await {
            Claim::Member => {
                tracing::info!(track_id, track = %playback.display_text(), "Already in playlist");
                self.notify(Notification::Duplicate);
                return Ok(AddOutcome::Duplicate);
            }
            Claim::InFlight => {
                tracing::debug!(track_id, "Add of this track already in progress");
                return Ok(AddOutcome::AlreadyInFlight);
            }
            Claim::OtherPlaylist => {
                tracing::info!(playlist_id = %playlist_id, "Target playlist changed during add, ignoring trigger");
                return Ok(AddOutcome::PlaylistChanged);
            }
            Claim::Claimed => {}
        }

        let added = with_timeout(
            "add_track",
            timeout,
            self.service.add_track(&playlist_id, track_id),
        )
        .await;
        if let Err(e) = added {
            self.cache.release(&playlist_id, track_id).await;
            return Err(e.into());
        }

        self.cache.insert(&playlist_id, track_id).await;
        self.cache.release(&playlist_id, track_id).await;
        self.cache.persist_or_log().await;

        let display_text = playback.display_text();
        tracing::info!(track_id, track = %display_text, playlist_id = %playlist_id, "Added track to playlist");

        let image = self.fetch_album_art(&playback, timeout).await;
        self.notify(Notification::Success { display_text, image });
        Ok(AddOutcome::Added)
    }

    /// Album art is decoration; any failure just means no image.
    async fn fetch_album_art(&self, playback: &PlaybackSnapshot, timeout: Duration) -> Option<Vec<u8>> {
        let url = playback.album_art_url.as_deref()?;
        match with_timeout("fetch_image", timeout, self.service.fetch_image(url)).await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::debug!(error = %e, "Failed to load album art");
                None
            }
        }
    }

    fn notify(&self, notification: Notification) {
        if self.notifications.send(notification).is_err() {
            tracing::debug!("Notification receiver dropped");
        }
    }
}
