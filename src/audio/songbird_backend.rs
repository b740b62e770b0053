//! Songbird-backed implementations of the voice and audio-backend contracts.
//!
//! The guild's [`Call`] is the audio backend: tracks are streamed through
//! `yt-dlp` inputs and the driver's track events are turned into
//! [`TrackEnded`] notifications.

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    input::{Input, YoutubeDl},
    tracks::TrackHandle,
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

use crate::{
    audio::{
        backend::{AudioBackend, BackendConnector, BackendSession, EndReason, TrackEnded, TrackToken},
        voice::{VoiceConnection, VoiceGateway},
    },
    error::{BackendError, VoiceError},
};

/// Acceso de voz vía Songbird
#[derive(Clone)]
pub struct SongbirdVoice {
    manager: Arc<Songbird>,
    http: reqwest::Client,
}

impl SongbirdVoice {
    pub fn new(manager: Arc<Songbird>, http: reqwest::Client) -> Self {
        Self { manager, http }
    }
}

#[async_trait]
impl BackendConnector for SongbirdVoice {
    async fn connect(&self, guild_id: GuildId) -> Result<BackendSession, BackendError> {
        let call = self.manager.get_or_insert(guild_id);
        let (events_tx, events) = mpsc::unbounded_channel();

        let backend = SongbirdBackend {
            call,
            http: self.http.clone(),
            current: parking_lot::Mutex::new(None),
            generation: Arc::new(AtomicU64::new(0)),
            events: events_tx,
        };

        debug!("🎛️ Backend Songbird preparado para guild {}", guild_id);
        Ok(BackendSession {
            backend: Arc::new(backend),
            events,
        })
    }
}

#[async_trait]
impl VoiceGateway for SongbirdVoice {
    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<Box<dyn VoiceConnection>, VoiceError> {
        self.manager
            .join(guild_id, channel_id)
            .await
            .map_err(|e| VoiceError::Join(e.to_string()))?;

        info!("🔗 Conectado al canal {} en guild {}", channel_id, guild_id);
        Ok(Box::new(SongbirdConnection {
            manager: self.manager.clone(),
            guild_id,
        }))
    }
}

struct SongbirdConnection {
    manager: Arc<Songbird>,
    guild_id: GuildId,
}

#[async_trait]
impl VoiceConnection for SongbirdConnection {
    async fn disconnect(&self) -> Result<(), VoiceError> {
        self.manager
            .remove(self.guild_id)
            .await
            .map_err(|e| VoiceError::Leave(e.to_string()))?;

        info!("👋 Desconectado del canal de voz en guild {}", self.guild_id);
        Ok(())
    }
}

pub struct SongbirdBackend {
    call: Arc<Mutex<Call>>,
    http: reqwest::Client,
    current: parking_lot::Mutex<Option<TrackHandle>>,
    // Cada play incrementa la generación; los eventos de tracks reemplazados se descartan
    generation: Arc<AtomicU64>,
    events: mpsc::UnboundedSender<TrackEnded>,
}

impl SongbirdBackend {
    fn current_track(&self) -> Option<TrackHandle> {
        self.current.lock().clone()
    }
}

#[async_trait]
impl AudioBackend for SongbirdBackend {
    async fn play(&self, url: &str) -> Result<TrackToken, BackendError> {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let input: Input = YoutubeDl::new(self.http.clone(), url.to_string()).into();

        let handle = {
            let mut call = self.call.lock().await;
            call.play_only_input(input)
        };

        let fired = Arc::new(AtomicBool::new(false));
        for (event, reason) in [
            (TrackEvent::End, EndReason::Finished),
            (TrackEvent::Error, EndReason::Errored),
        ] {
            let notifier = TrackEndNotifier {
                url: url.to_string(),
                reason,
                generation,
                current: self.generation.clone(),
                fired: fired.clone(),
                events: self.events.clone(),
            };
            handle
                .add_event(Event::Track(event), notifier)
                .map_err(|e| BackendError::Play {
                    url: url.to_string(),
                    reason: e.to_string(),
                })?;
        }

        *self.current.lock() = Some(handle);
        Ok(TrackToken(generation))
    }

    async fn stop(&self) -> Result<(), BackendError> {
        // El End que dispara el stop queda con una generación vieja
        self.generation.fetch_add(1, Ordering::AcqRel);

        let Some(track) = self.current.lock().take() else {
            debug!("Nada que detener");
            return Ok(());
        };

        track.stop().map_err(|e| BackendError::Control(e.to_string()))
    }

    async fn pause(&self, paused: bool) -> Result<(), BackendError> {
        let Some(track) = self.current_track() else {
            debug!("Nada que pausar");
            return Ok(());
        };

        let result = if paused { track.pause() } else { track.play() };
        result.map_err(|e| BackendError::Control(e.to_string()))
    }

    async fn seek(&self, position: Duration) -> Result<(), BackendError> {
        let Some(track) = self.current_track() else {
            debug!("Nada que adelantar");
            return Ok(());
        };

        track
            .seek_async(position)
            .await
            .map(|_| ())
            .map_err(|e| BackendError::Control(e.to_string()))
    }
}

/// Forwards the end of one specific track to the playback loop.
struct TrackEndNotifier {
    url: String,
    reason: EndReason,
    generation: u64,
    current: Arc<AtomicU64>,
    fired: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<TrackEnded>,
}

#[async_trait]
impl VoiceEventHandler for TrackEndNotifier {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        if self.current.load(Ordering::Acquire) != self.generation {
            debug!("Evento de track reemplazado ignorado: {}", self.url);
            return None;
        }

        // End y Error pueden llegar juntos; solo se notifica uno
        if self.fired.swap(true, Ordering::AcqRel) {
            return None;
        }

        let _ = self.events.send(TrackEnded {
            token: TrackToken(self.generation),
            url: self.url.clone(),
            reason: self.reason,
        });

        None
    }
}
