//! Error types for the playback core.
//!
//! Each external collaborator has its own error enum; [`PlayerError`] wraps
//! them for callers of the player. The binary and the bot glue keep using
//! `anyhow`, these types exist so the player can be matched on.

use std::time::Duration;
use thiserror::Error;

use crate::audio::signal::Signal;

/// Failure while turning a URL into track or playlist metadata.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("URL inválida: {0}")]
    InvalidUrl(String),

    #[error("no se pudo ejecutar el resolvedor: {0}")]
    Process(#[from] std::io::Error),

    #[error("el resolvedor falló para {url}: {stderr}")]
    Failed { url: String, stderr: String },

    #[error("respuesta del resolvedor ilegible: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("el resolvedor no respondió en {0:?}")]
    Timeout(Duration),
}

/// Failure reported by the audio backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend de audio no disponible: {0}")]
    Unavailable(String),

    #[error("no se pudo reproducir {url}: {reason}")]
    Play { url: String, reason: String },

    #[error("comando de control rechazado: {0}")]
    Control(String),

    #[error("el canal de eventos del backend se cerró")]
    EventsClosed,
}

/// Failure on the voice connection.
#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("no se pudo unir al canal de voz: {0}")]
    Join(String),

    #[error("no se pudo salir del canal de voz: {0}")]
    Leave(String),
}

/// Errors surfaced by [`crate::audio::player::MusicPlayer`].
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The audio backend could not be reached while building the player.
    #[error("conexión con el backend de audio fallida: {0}")]
    BackendConnect(#[source] BackendError),

    #[error(transparent)]
    VoiceJoin(VoiceError),

    #[error(transparent)]
    VoiceLeave(VoiceError),

    /// A skip or replay was already pending and the loop did not pick it up in time.
    #[error("la señal {0:?} no fue atendida en {1:?}")]
    SignalTimeout(Signal, Duration),

    #[error("la cola está llena (máximo {0} canciones)")]
    QueueFull(usize),

    #[error("el reproductor ya salió del canal")]
    Exited,
}

pub type Result<T> = std::result::Result<T, PlayerError>;
