//! Controller module - Application logic
//!
//! Coordinates the membership cache, the remote playlist and the global hotkey.
//! It is organized into submodules by responsibility:
//!
//! - `hotkey`: Key listener lifecycle
//! - `pipeline`: Adding the current track to the playlist
//! - `sync`: Rebuilding the membership cache from the remote playlist

mod hotkey;
mod pipeline;
mod sync;

use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, mpsc};

use crate::config::AppConfig;
use crate::keys::KeySource;
use crate::model::{MembershipCache, MusicService, Notification};

pub use hotkey::{HotkeyController, MatchCallback};
pub use pipeline::AddTrackPipeline;
pub use sync::PlaylistSynchronizer;

pub struct AppController<S: KeySource> {
    settings: Arc<RwLock<AppConfig>>,
    cache: MembershipCache,
    pipeline: AddTrackPipeline,
    synchronizer: PlaylistSynchronizer,
    hotkeys: Arc<Mutex<HotkeyController<S>>>,
}

impl<S: KeySource> AppController<S> {
    pub fn new(
        service: Arc<dyn MusicService>,
        cache: MembershipCache,
        key_source: S,
        notifications: mpsc::UnboundedSender<Notification>,
    ) -> Self {
        let settings = Arc::new(RwLock::new(AppConfig::default()));
        let pipeline = AddTrackPipeline::new(
            service.clone(),
            cache.clone(),
            settings.clone(),
            notifications,
        );
        let synchronizer = PlaylistSynchronizer::new(service, cache.clone(), settings.clone());
        let hotkeys = HotkeyController::new(key_source, match_callback(pipeline.clone()));

        Self {
            settings,
            cache,
            pipeline,
            synchronizer,
            hotkeys: Arc::new(Mutex::new(hotkeys)),
        }
    }

    pub fn pipeline(&self) -> &AddTrackPipeline {
        &self.pipeline
    }

    /// Make `config` the active configuration. A new playlist id drops the cache
    /// contents and starts a sync; a new hotkey replaces the listener.
    pub async fn apply_config(&self, config: AppConfig) {
        let playlist_id = config.playlist_id();
        let hotkey = config.hotkey.trim().to_string();

        // Bind first: a trigger in between still sees the old playlist id and is refused
        let playlist_changed = self.cache.bind_playlist(playlist_id.as_deref()).await;
        *self.settings.write().await = config;

        if playlist_changed {
            match playlist_id {
                Some(playlist_id) => {
                    tracing::info!(playlist_id = %playlist_id, "Target playlist changed");
                    // Only restores a snapshot that was written for this playlist
                    self.cache.load_from_disk().await;
                    self.synchronizer.refresh(playlist_id).await;
                }
                None => {
                    tracing::info!("Target playlist cleared");
                    self.synchronizer.cancel().await;
                }
            }
        }

        self.with_hotkeys(move |hotkeys| {
            if hotkeys.combo() != hotkey {
                hotkeys.rebind(&hotkey);
            }
        })
        .await;
    }

    /// Re-sync the cache with the configured playlist.
    pub async fn refresh(&self) {
        match self.settings.read().await.playlist_id() {
            Some(playlist_id) => {
                self.synchronizer.refresh(playlist_id).await;
            }
            None => tracing::debug!("Refresh requested without a configured playlist"),
        }
    }

    pub async fn shutdown(&self) {
        self.with_hotkeys(HotkeyController::unbind).await;
        self.synchronizer.cancel().await;
        self.cache.persist_or_log().await;
        tracing::info!("Controller stopped");
    }

    /// Starting and stopping a listener joins threads, so it runs on the blocking pool.
    async fn with_hotkeys<F>(&self, change: F)
    where
        F: FnOnce(&mut HotkeyController<S>) + Send + 'static,
    {
        let mut hotkeys = self.hotkeys.clone().lock_owned().await;
        if let Err(e) = tokio::task::spawn_blocking(move || change(&mut *hotkeys)).await {
            tracing::error!(error = %e, "Hotkey update task failed");
        }
    }
}

/// Each match runs the pipeline as its own task, off the listener thread.
/// A rebind never waits for or cancels those tasks. Must be called inside the runtime.
fn match_callback(pipeline: AddTrackPipeline) -> MatchCallback {
    let runtime = tokio::runtime::Handle::current();
    Arc::new(move || {
        let pipeline = pipeline.clone();
        runtime.spawn(async move {
            let _ = pipeline.trigger().await;
        });
    })
}
