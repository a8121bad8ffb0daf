//! Cache of track ids already in the target playlist, for duplicate checks without API calls

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

use crate::error::AppError;

/// Whether the contents reflect a completed sync of the bound playlist
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheState {
    Stale,
    Current,
}

/// Result of trying to reserve a track id for an add
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Claim {
    /// Already a member, nothing to add
    Member,
    /// Another add of the same track has not finished yet
    InFlight,
    /// Reserved for the caller until `release` is called
    Claimed,
    /// The cache is bound to a different playlist than the caller's
    OtherPlaylist,
}

struct Membership {
    playlist_id: Option<String>,
    track_ids: HashSet<String>,
    in_flight: HashSet<String>,
    state: CacheState,
    synced_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    playlist_id: String,
    synced_at: Option<DateTime<Utc>>,
    track_ids: Vec<String>,
}

/// Cache for the target playlist's track ids. Cloning shares the same state.
#[derive(Clone)]
pub struct MembershipCache {
    membership: Arc<RwLock<Membership>>,
    // Serializes snapshot writes so an older snapshot never lands after a newer one
    write_lock: Arc<Mutex<()>>,
    path: Arc<PathBuf>,
}

impl MembershipCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            membership: Arc::new(RwLock::new(Membership {
                playlist_id: None,
                track_ids: HashSet::new(),
                in_flight: HashSet::new(),
                state: CacheState::Stale,
                synced_at: None,
            })),
            write_lock: Arc::new(Mutex::new(())),
            path: Arc::new(path.into()),
        }
    }

    #[cfg(test)]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Point the cache at a playlist. Switching playlists discards the contents.
    /// Returns `true` if the bound playlist changed.
    pub async fn bind_playlist(&self, playlist_id: Option<&str>) -> bool {
        let mut membership = self.membership.write().await;
        if membership.playlist_id.as_deref() == playlist_id {
            return false;
        }
        membership.playlist_id = playlist_id.map(str::to_string);
        membership.track_ids.clear();
        // Claims made for the old playlist must not block adds to the new one
        membership.in_flight.clear();
        membership.state = CacheState::Stale;
        membership.synced_at = None;
        tracing::debug!(playlist_id = ?playlist_id, "Membership cache bound to playlist");
        true
    }

    #[cfg(test)]
    pub async fn playlist_id(&self) -> Option<String> {
        self.membership.read().await.playlist_id.clone()
    }

    #[cfg(test)]
    pub async fn state(&self) -> CacheState {
        self.membership.read().await.state
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.membership.read().await.track_ids.len()
    }

    pub async fn contains(&self, track_id: &str) -> bool {
        self.membership.read().await.track_ids.contains(track_id)
    }

    #[cfg(test)]
    pub async fn snapshot(&self) -> HashSet<String> {
        self.membership.read().await.track_ids.clone()
    }

    /// Replace the contents with a full listing of `playlist_id`.
    /// Discarded if the cache has since been bound to another playlist.
    pub async fn rebuild(&self, playlist_id: &str, track_ids: HashSet<String>) -> bool {
        let mut membership = self.membership.write().await;
        if membership.playlist_id.as_deref() != Some(playlist_id) {
            tracing::debug!(playlist_id, "Dropping rebuild for a playlist no longer configured");
            return false;
        }
        membership.track_ids = track_ids;
        membership.state = CacheState::Current;
        membership.synced_at = Some(Utc::now());
        true
    }

    /// Record one track as added to `playlist_id`. Returns `true` if it was new.
    pub async fn insert(&self, playlist_id: &str, track_id: &str) -> bool {
        let mut membership = self.membership.write().await;
        if membership.playlist_id.as_deref() != Some(playlist_id) {
            return false;
        }
        membership.track_ids.insert(track_id.to_string())
    }

    /// Check membership in `playlist_id` and reserve the track id in one step.
    pub async fn claim(&self, playlist_id: &str, track_id: &str) -> Claim {
        let mut membership = self.membership.write().await;
        if membership.playlist_id.as_deref() != Some(playlist_id) {
            Claim::OtherPlaylist
        } else if membership.track_ids.contains(track_id) {
            Claim::Member
        } else if !membership.in_flight.insert(track_id.to_string()) {
            Claim::InFlight
        } else {
            Claim::Claimed
        }
    }

    /// Drop a reservation. Ignored once the cache has moved to another playlist.
    pub async fn release(&self, playlist_id: &str, track_id: &str) {
        let mut membership = self.membership.write().await;
        if membership.playlist_id.as_deref() == Some(playlist_id) {
            membership.in_flight.remove(track_id);
        }
    }

    /// Write the current contents to disk, replacing the previous snapshot.
    pub async fn persist(&self) -> Result<(), AppError> {
        let _write = self.write_lock.lock().await;

        let snapshot = {
            let membership = self.membership.read().await;
            let Some(playlist_id) = membership.playlist_id.clone() else {
                return Ok(());
            };
            let mut track_ids: Vec<String> = membership.track_ids.iter().cloned().collect();
            track_ids.sort();
            Snapshot {
                playlist_id,
                synced_at: membership.synced_at,
                track_ids,
            }
        };

        let content = serde_json::to_vec(&snapshot)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, self.path.as_ref()).await?;

        tracing::trace!(count = snapshot.track_ids.len(), "Membership cache persisted");
        Ok(())
    }

    /// Persist, logging instead of returning a failure. The in-memory set stays authoritative.
    pub async fn persist_or_log(&self) {
        if let Err(e) = self.persist().await {
            tracing::warn!(error = %e, path = %self.path.display(), "Could not persist membership cache");
        }
    }

    /// Restore the snapshot written for the currently bound playlist.
    ///
    /// A missing, corrupt or foreign snapshot gives an empty set. Restored ids are only
    /// installed while the cache is still stale and empty, so a finished sync is never
    /// overwritten by older data.
    pub async fn load_from_disk(&self) -> HashSet<String> {
        let content = match tokio::fs::read(self.path.as_ref()).await {
            Ok(content) => content,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(error = %e, "Could not read membership cache");
                }
                return HashSet::new();
            }
        };

        let snapshot: Snapshot = match serde_json::from_slice(&content) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(error = %e, "Membership cache file is corrupted, ignoring it");
                return HashSet::new();
            }
        };

        let mut membership = self.membership.write().await;
        if membership.playlist_id.as_deref() != Some(snapshot.playlist_id.as_str()) {
            tracing::debug!(
                cached_playlist = %snapshot.playlist_id,
                "Membership cache belongs to another playlist, ignoring it"
            );
            return HashSet::new();
        }

        let restored: HashSet<String> = snapshot.track_ids.into_iter().collect();
        if membership.state == CacheState::Stale && membership.track_ids.is_empty() {
            membership.track_ids = restored.clone();
            membership.synced_at = snapshot.synced_at;
        }
        tracing::info!(count = restored.len(), "Membership cache restored from disk");
        restored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn ids(items: &[&str]) -> HashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    async fn bound_cache(dir: &Path) -> MembershipCache {
        let cache = MembershipCache::new(dir.join("cache.json"));
        cache.bind_playlist(Some("p1")).await;
        cache
    }

    #[tokio::test]
    async fn rebuild_makes_contains_match_exactly() {
        let dir = tempfile::tempdir().unwrap();
        let cache = bound_cache(dir.path()).await;
        cache.insert("p1", "old").await;

        assert!(cache.rebuild("p1", ids(&["a", "b", "c"])).await);

        assert_eq!(cache.state().await, CacheState::Current);
        for id in ["a", "b", "c"] {
            assert!(cache.contains(id).await);
        }
        assert!(!cache.contains("old").await);
        assert!(!cache.contains("d").await);
        assert_eq!(cache.len().await, 3);
    }

    #[tokio::test]
    async fn insert_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let cache = bound_cache(dir.path()).await;

        assert!(cache.insert("p1", "t1").await);
        let once = cache.snapshot().await;
        assert!(!cache.insert("p1", "t1").await);

        assert_eq!(cache.snapshot().await, once);
    }

    #[tokio::test]
    async fn mutations_for_another_playlist_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let cache = bound_cache(dir.path()).await;

        assert!(!cache.rebuild("p2", ids(&["x"])).await);
        assert!(!cache.insert("p2", "y").await);
        assert_eq!(cache.len().await, 0);
        assert_eq!(cache.state().await, CacheState::Stale);
    }

    #[tokio::test]
    async fn switching_playlist_clears_contents() {
        let dir = tempfile::tempdir().unwrap();
        let cache = bound_cache(dir.path()).await;
        cache.rebuild("p1", ids(&["a"])).await;

        assert!(!cache.bind_playlist(Some("p1")).await);
        assert!(cache.contains("a").await);

        assert!(cache.bind_playlist(Some("p2")).await);
        assert!(!cache.contains("a").await);
        assert_eq!(cache.state().await, CacheState::Stale);
    }

    #[tokio::test]
    async fn persist_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let cache = bound_cache(dir.path()).await;
        cache.rebuild("p1", ids(&["a", "b"])).await;
        cache.insert("p1", "c").await;
        cache.persist().await.unwrap();

        let reopened = bound_cache(dir.path()).await;
        let loaded = reopened.load_from_disk().await;

        assert_eq!(loaded, ids(&["a", "b", "c"]));
        assert!(reopened.contains("c").await);
    }

    #[tokio::test]
    async fn corrupt_or_missing_snapshot_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = bound_cache(dir.path()).await;
        assert!(cache.load_from_disk().await.is_empty());

        std::fs::write(cache.path(), b"[\"truncated").unwrap();
        assert!(cache.load_from_disk().await.is_empty());
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn snapshot_of_another_playlist_is_not_reused() {
        let dir = tempfile::tempdir().unwrap();
        let cache = bound_cache(dir.path()).await;
        cache.rebuild("p1", ids(&["a"])).await;
        cache.persist().await.unwrap();

        let other = MembershipCache::new(dir.path().join("cache.json"));
        other.bind_playlist(Some("p2")).await;

        assert!(other.load_from_disk().await.is_empty());
        assert!(!other.contains("a").await);
    }

    #[tokio::test]
    async fn restore_does_not_overwrite_a_finished_sync() {
        let dir = tempfile::tempdir().unwrap();
        let cache = bound_cache(dir.path()).await;
        cache.rebuild("p1", ids(&["old"])).await;
        cache.persist().await.unwrap();

        let fresh = bound_cache(dir.path()).await;
        fresh.rebuild("p1", ids(&["new"])).await;
        fresh.load_from_disk().await;

        assert!(fresh.contains("new").await);
        assert!(!fresh.contains("old").await);
    }

    #[tokio::test]
    async fn persist_failure_keeps_memory_state() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the snapshot file should be makes the rename fail
        let path = dir.path().join("cache.json");
        std::fs::create_dir_all(path.join("occupied")).unwrap();
        let cache = MembershipCache::new(&path);
        cache.bind_playlist(Some("p1")).await;
        cache.insert("p1", "t1").await;

        assert!(matches!(cache.persist().await, Err(AppError::CacheIo(_))));
        cache.persist_or_log().await;
        assert!(cache.contains("t1").await);
    }

    #[tokio::test]
    async fn claim_guards_concurrent_adds() {
        let dir = tempfile::tempdir().unwrap();
        let cache = bound_cache(dir.path()).await;
        cache.insert("p1", "member").await;

        assert_eq!(cache.claim("p1", "member").await, Claim::Member);
        assert_eq!(cache.claim("p1", "t1").await, Claim::Claimed);
        assert_eq!(cache.claim("p1", "t1").await, Claim::InFlight);

        cache.release("p1", "t1").await;
        assert_eq!(cache.claim("p1", "t1").await, Claim::Claimed);
    }

    #[tokio::test]
    async fn switching_playlist_drops_pending_claims() {
        let dir = tempfile::tempdir().unwrap();
        let cache = bound_cache(dir.path()).await;
        assert_eq!(cache.claim("p1", "t1").await, Claim::Claimed);

        cache.bind_playlist(Some("p2")).await;
        assert_eq!(cache.claim("p2", "t1").await, Claim::Claimed);

        // The add started for p1 finishing late must not free the p2 claim
        cache.release("p1", "t1").await;
        assert_eq!(cache.claim("p2", "t1").await, Claim::InFlight);
    }

    #[tokio::test]
    async fn claim_for_an_unbound_playlist_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let cache = bound_cache(dir.path()).await;
        cache.insert("p1", "t1").await;

        assert_eq!(cache.claim("p2", "t1").await, Claim::OtherPlaylist);
        assert_eq!(cache.claim("p2", "t2").await, Claim::OtherPlaylist);
        // Refusal reserves nothing
        assert_eq!(cache.claim("p1", "t2").await, Claim::Claimed);
    }
}
