//! Core type definitions shared by the model and controller

use rspotify::model::{CurrentPlaybackContext, PlayableItem};
use rspotify::prelude::Id;

/// Offset of the next playlist page to request
pub type PageCursor = u32;

/// Point-in-time read of what is currently playing
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlaybackSnapshot {
    pub track_id: String,
    pub name: String,
    pub artists: Vec<String>,
    pub is_playing: bool,
    pub album_art_url: Option<String>,
}

impl PlaybackSnapshot {
    /// Build a snapshot from the playback context. Episodes, unknown items and
    /// local tracks without an id have nothing that could be added to a playlist.
    pub fn from_playback(playback: &CurrentPlaybackContext) -> Option<Self> {
        match playback.item.as_ref()? {
            PlayableItem::Track(track) => {
                let track_id = track.id.as_ref()?.id().to_string();
                Some(Self {
                    track_id,
                    name: track.name.clone(),
                    artists: track.artists.iter().map(|a| a.name.clone()).collect(),
                    is_playing: playback.is_playing,
                    // Spotify lists album images largest first
                    album_art_url: track.album.images.first().map(|image| image.url.clone()),
                })
            }
            _ => None,
        }
    }

    /// "Artist A, Artist B - Track"
    pub fn display_text(&self) -> String {
        if self.artists.is_empty() {
            self.name.clone()
        } else {
            format!("{} - {}", self.artists.join(", "), self.name)
        }
    }
}

/// One page of a playlist's track listing
#[derive(Clone, Debug, Default)]
pub struct PlaylistPage {
    /// `None` for entries without a track id (episodes, local files, removed tracks)
    pub items: Vec<Option<String>>,
    pub next: Option<PageCursor>,
}

/// Feedback published to the presentation layer
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notification {
    Success {
        display_text: String,
        image: Option<Vec<u8>>,
    },
    Duplicate,
}
