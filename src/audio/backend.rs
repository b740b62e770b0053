//! Contract for the service that actually streams audio.
//!
//! The backend plays one track at a time. Completion is reported on a
//! separate channel, at most once per track, tagged with the [`TrackToken`]
//! returned by the `play` call that started it.

use async_trait::async_trait;
use serenity::model::id::GuildId;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::error::BackendError;

/// Identifica una llamada concreta a [`AudioBackend::play`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackToken(pub u64);

/// Notification that a track finished on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackEnded {
    pub token: TrackToken,
    pub url: String,
    pub reason: EndReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    Finished,
    /// El backend no pudo seguir reproduciendo el track
    Errored,
}

pub type TrackEvents = mpsc::UnboundedReceiver<TrackEnded>;

#[async_trait]
pub trait AudioBackend: Send + Sync {
    /// Starts streaming `url`, replacing whatever was playing.
    async fn play(&self, url: &str) -> Result<TrackToken, BackendError>;

    /// Corta el track actual. No end event is reported for it.
    async fn stop(&self) -> Result<(), BackendError>;

    async fn pause(&self, paused: bool) -> Result<(), BackendError>;

    async fn seek(&self, position: Duration) -> Result<(), BackendError>;
}

/// A connected backend plus the stream of its completion events.
pub struct BackendSession {
    pub backend: Arc<dyn AudioBackend>,
    pub events: TrackEvents,
}

/// Establishes the backend connection for one guild.
#[async_trait]
pub trait BackendConnector: Send + Sync {
    async fn connect(&self, guild_id: GuildId) -> Result<BackendSession, BackendError>;
}
