//! # Sources
//!
//! Metadata resolution for queued URLs. The player only needs two lookups:
//! a single track, and a playlist expanded into its entries. Anything that
//! can answer those (yt-dlp, a remote API, a test double) implements
//! [`MetadataResolver`].

pub mod ytdlp;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ResolveError;

pub use ytdlp::YtDlpResolver;

/// Resolves URLs into playable metadata.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataResolver: Send + Sync {
    /// Obtiene la metadata de un único track
    async fn resolve_track(&self, url: &str) -> Result<TrackMetadata, ResolveError>;

    /// Obtiene las entradas de una playlist.
    ///
    /// `Ok(None)` means the URL is not a playlist, which is not an error.
    async fn resolve_playlist(&self, url: &str) -> Result<Option<PlaylistMetadata>, ResolveError>;
}

/// Fully resolved information about one track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub video_id: String,
    pub title: String,
    pub url: String,
    pub uploader: Option<String>,
    pub duration: Option<Duration>,
    pub thumbnail: Option<String>,
}

/// One entry of a playlist, before its track metadata is resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistEntry {
    pub video_id: String,
    pub url: String,
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistMetadata {
    pub title: Option<String>,
    pub entries: Vec<PlaylistEntry>,
}
