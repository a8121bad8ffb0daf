//! Model module - State and remote data access
//!
//! - `types`: Playback snapshots, playlist pages and notifications
//! - `cache`: Membership cache of the target playlist
//! - `spotify_client`: Music service seam and its Spotify implementation

mod types;
mod cache;
mod spotify_client;

#[cfg(test)]
pub mod testing;

pub use types::{Notification, PageCursor, PlaybackSnapshot};

pub use cache::{Claim, MembershipCache};
#[cfg(test)]
pub use cache::CacheState;

pub use spotify_client::{MusicService, SpotifyClient};
