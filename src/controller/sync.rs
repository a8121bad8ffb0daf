//! Background rebuild of the membership cache from the remote playlist

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::{TryStreamExt, stream};
use tokio::sync::{Mutex, RwLock};
use tokio::task::{AbortHandle, JoinHandle};

use crate::config::AppConfig;
use crate::error::{AppError, RemoteError, with_timeout};
use crate::model::{MembershipCache, MusicService, PageCursor};

#[derive(Clone)]
pub struct PlaylistSynchronizer {
    service: Arc<dyn MusicService>,
    cache: MembershipCache,
    settings: Arc<RwLock<AppConfig>>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl PlaylistSynchronizer {
    pub fn new(
        service: Arc<dyn MusicService>,
        cache: MembershipCache,
        settings: Arc<RwLock<AppConfig>>,
    ) -> Self {
        Self {
            service,
            cache,
            settings,
            task: Arc::new(Mutex::new(None)),
        }
    }

    /// Start a rebuild in the background, abandoning one still running for an older request.
    pub async fn refresh(&self, playlist_id: String) -> AbortHandle {
        let mut task = self.task.lock().await;
        if let Some(previous) = task.take() {
            if !previous.is_finished() {
                tracing::debug!("Cancelling superseded playlist sync");
                previous.abort();
            }
        }

        let synchronizer = self.clone();
        let handle = tokio::spawn(async move {
            // Failures are already logged by rebuild
            let _ = synchronizer.rebuild(&playlist_id).await;
        });
        let abort = handle.abort_handle();
        *task = Some(handle);
        abort
    }

    pub async fn cancel(&self) {
        if let Some(task) = self.task.lock().await.take() {
            task.abort();
        }
    }

    /// Fetch the whole playlist and replace the cache contents with it.
    /// On failure the previous contents stay in place.
    pub async fn rebuild(&self, playlist_id: &str) -> Result<usize, AppError> {
        let timeout = self.settings.read().await.remote_timeout();
        tracing::info!(playlist_id, "Starting cache update for playlist");

        let track_ids = match self.fetch_track_ids(playlist_id, timeout).await {
            Ok(track_ids) => track_ids,
            Err(source) => {
                let error = AppError::SyncAborted {
                    playlist_id: playlist_id.to_string(),
                    source,
                };
                tracing::warn!(error = %error, "Playlist sync aborted, keeping previous cache");
                return Err(error);
            }
        };

        let count = track_ids.len();
        if self.cache.rebuild(playlist_id, track_ids).await {
            self.cache.persist_or_log().await;
            tracing::info!(playlist_id, count, "Cache updated");
        }
        Ok(count)
    }

    async fn fetch_track_ids(
        &self,
        playlist_id: &str,
        timeout: Duration,
    ) -> Result<HashSet<String>, RemoteError> {
        let service = self.service.clone();
        let playlist_id = playlist_id.to_string();

        // State is the cursor of the next page to fetch, `None` once the last page is in
        let pages = stream::try_unfold(Some(None::<PageCursor>), move |cursor| {
            let service = service.clone();
            let playlist_id = playlist_id.clone();
            async move {
                let Some(cursor) = cursor else {
                    return Ok(None);
                };
                let page = with_timeout(
                    "playlist_page",
                    timeout,
                    service.playlist_page(&playlist_id, cursor),
                )
                .await?;
                tracing::trace!(items = page.items.len(), next = ?page.next, "Fetched playlist page");
                Ok::<_, RemoteError>(Some((page.items, page.next.map(Some))))
            }
        });

        pages
            .try_fold(HashSet::new(), |mut track_ids, items| async move {
                track_ids.extend(items.into_iter().flatten());
                Ok(track_ids)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::atomic::Ordering;

    use crate::model::CacheState;
    use crate::model::testing::ScriptedService;

    fn settings() -> Arc<RwLock<AppConfig>> {
        Arc::new(RwLock::new(AppConfig {
            playlist_id: Some("p1".to_string()),
            hotkey: String::new(),
            remote_timeout_secs: 5,
        }))
    }

    async fn synchronizer(dir: &Path, service: Arc<ScriptedService>) -> (PlaylistSynchronizer, MembershipCache) {
        let cache = MembershipCache::new(dir.join("cache.json"));
        cache.bind_playlist(Some("p1")).await;
        (PlaylistSynchronizer::new(service, cache.clone(), settings()), cache)
    }

    fn ids(items: &[&str]) -> HashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn rebuild_collects_every_page_and_skips_missing_ids() {
        let dir = tempfile::tempdir().unwrap();
        let service = Arc::new(ScriptedService::with_pages(vec![vec!["a", "b"], vec!["c"], vec!["d"]]));
        service.pages.lock().unwrap()[1].push(None);
        let (sync, cache) = synchronizer(dir.path(), service.clone()).await;

        assert_eq!(sync.rebuild("p1").await.unwrap(), 4);

        assert_eq!(service.page_calls.load(Ordering::SeqCst), 3);
        assert_eq!(cache.snapshot().await, ids(&["a", "b", "c", "d"]));
        assert_eq!(cache.state().await, CacheState::Current);

        let reopened = MembershipCache::new(dir.path().join("cache.json"));
        reopened.bind_playlist(Some("p1")).await;
        assert_eq!(reopened.load_from_disk().await, ids(&["a", "b", "c", "d"]));
    }

    #[tokio::test]
    async fn failure_mid_pagination_keeps_previous_contents() {
        let dir = tempfile::tempdir().unwrap();
        let service = Arc::new(ScriptedService::with_pages(vec![vec!["a"], vec!["b"], vec!["c"]]));
        *service.fail_on_page.lock().unwrap() = Some(1);
        let (sync, cache) = synchronizer(dir.path(), service.clone()).await;
        cache.rebuild("p1", ids(&["old1", "old2"])).await;

        let result = sync.rebuild("p1").await;

        assert!(matches!(result, Err(AppError::SyncAborted { .. })));
        assert_eq!(service.page_calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.snapshot().await, ids(&["old1", "old2"]));
    }

    #[tokio::test]
    async fn result_for_a_replaced_playlist_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let service = Arc::new(ScriptedService::with_pages(vec![vec!["a"]]));
        let (sync, cache) = synchronizer(dir.path(), service).await;
        cache.bind_playlist(Some("p2")).await;

        sync.rebuild("p1").await.unwrap();

        assert!(!cache.contains("a").await);
        assert_eq!(cache.state().await, CacheState::Stale);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_page_aborts_with_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let service = Arc::new(ScriptedService::with_pages(vec![vec!["a"]]));
        *service.page_delay.lock().unwrap() = Some(Duration::from_secs(30));
        let (sync, cache) = synchronizer(dir.path(), service).await;

        let result = sync.rebuild("p1").await;

        assert!(matches!(
            result,
            Err(AppError::SyncAborted { source: RemoteError::Timeout { .. }, .. })
        ));
        assert_eq!(cache.state().await, CacheState::Stale);
    }

    #[tokio::test]
    async fn refresh_runs_in_background() {
        let dir = tempfile::tempdir().unwrap();
        let service = Arc::new(ScriptedService::with_pages(vec![vec!["a", "b"]]));
        let (sync, cache) = synchronizer(dir.path(), service).await;

        sync.refresh("p1".to_string()).await;

        for _ in 0..200 {
            if cache.state().await == CacheState::Current {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(cache.snapshot().await, ids(&["a", "b"]));
    }

    #[tokio::test(start_paused = true)]
    async fn newer_refresh_cancels_the_stale_one() {
        let dir = tempfile::tempdir().unwrap();
        let service = Arc::new(ScriptedService::with_pages(vec![vec!["a"]]));
        *service.page_delay.lock().unwrap() = Some(Duration::from_secs(2));
        let (sync, cache) = synchronizer(dir.path(), service.clone()).await;

        let first = sync.refresh("p1".to_string()).await;
        while service.page_calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        let second = sync.refresh("p1".to_string()).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        // The clock has not moved, so the first task can only have ended by cancellation
        assert!(first.is_finished());
        assert!(!second.is_finished());

        let surviving = sync.task.lock().await.take().unwrap();
        surviving.await.unwrap();
        assert!(cache.contains("a").await);
    }
}
