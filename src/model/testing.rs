//! Scripted music service for controller tests

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::spotify_client::MusicService;
use super::types::{PageCursor, PlaybackSnapshot, PlaylistPage};
use crate::error::RemoteError;

#[derive(Default)]
pub struct ScriptedService {
    pub playback: Mutex<Option<PlaybackSnapshot>>,
    /// Track ids per page; the cursor is the page index
    pub pages: Mutex<Vec<Vec<Option<String>>>>,
    pub fail_on_page: Mutex<Option<usize>>,
    pub fail_add: Mutex<bool>,
    pub add_delay: Mutex<Option<Duration>>,
    pub page_delay: Mutex<Option<Duration>>,
    pub image: Mutex<Option<Vec<u8>>>,
    pub added: Mutex<Vec<(String, String)>>,
    pub page_calls: AtomicUsize,
    pub image_calls: AtomicUsize,
}

impl ScriptedService {
    pub fn playing(track_id: &str, name: &str, artists: &[&str]) -> Self {
        let service = Self::default();
        service.set_playback(Some(PlaybackSnapshot {
            track_id: track_id.to_string(),
            name: name.to_string(),
            artists: artists.iter().map(|a| a.to_string()).collect(),
            is_playing: true,
            album_art_url: Some(format!("https://i.scdn.co/image/{track_id}")),
        }));
        service
    }

    pub fn with_pages(pages: Vec<Vec<&str>>) -> Self {
        let service = Self::default();
        *service.pages.lock().unwrap() = pages
            .into_iter()
            .map(|page| page.into_iter().map(|id| Some(id.to_string())).collect())
            .collect();
        service
    }

    pub fn set_playback(&self, playback: Option<PlaybackSnapshot>) {
        *self.playback.lock().unwrap() = playback;
    }

    pub fn added(&self) -> Vec<(String, String)> {
        self.added.lock().unwrap().clone()
    }
}

#[async_trait]
impl MusicService for ScriptedService {
    async fn current_playback(&self) -> Result<Option<PlaybackSnapshot>, RemoteError> {
        Ok(self.playback.lock().unwrap().clone())
    }

    async fn playlist_page(
        &self,
        _playlist_id: &str,
        cursor: Option<PageCursor>,
    ) -> Result<PlaylistPage, RemoteError> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.page_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let index = cursor.unwrap_or(0) as usize;
        if *self.fail_on_page.lock().unwrap() == Some(index) {
            return Err(RemoteError::Rejected(format!("page {index} unavailable")));
        }

        let pages = self.pages.lock().unwrap();
        let items = pages.get(index).cloned().unwrap_or_default();
        let next = (index + 1 < pages.len()).then_some(index as PageCursor + 1);
        Ok(PlaylistPage { items, next })
    }

    async fn add_track(&self, playlist_id: &str, track_id: &str) -> Result<(), RemoteError> {
        let delay = *self.add_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if *self.fail_add.lock().unwrap() {
            return Err(RemoteError::Rejected("rate limited".to_string()));
        }
        self.added
            .lock()
            .unwrap()
            .push((playlist_id.to_string(), track_id.to_string()));
        Ok(())
    }

    async fn fetch_image(&self, _url: &str) -> Result<Vec<u8>, RemoteError> {
        self.image_calls.fetch_add(1, Ordering::SeqCst);
        self.image
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| RemoteError::Rejected("no image".to_string()))
    }
}
