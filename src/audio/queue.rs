use chrono::{DateTime, Utc};
use rand::{seq::SliceRandom, Rng};
use std::collections::{HashSet, VecDeque};
use std::time::Duration;
use tracing::{debug, info};

use crate::sources::{PlaylistEntry, TrackMetadata};

/// Resolution state of a queued track.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackState {
    /// Only the identity and URL are known; metadata is fetched right before playing.
    Pending,
    Resolved(TrackMetadata),
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueueItem {
    video_id: String,
    pub url: String,
    pub requested_by: String,
    pub track: TrackState,
    pub added_at: DateTime<Utc>,
}

impl QueueItem {
    pub fn pending(video_id: impl Into<String>, url: impl Into<String>, requested_by: impl Into<String>) -> Self {
        Self {
            video_id: video_id.into(),
            url: url.into(),
            requested_by: requested_by.into(),
            track: TrackState::Pending,
            added_at: Utc::now(),
        }
    }

    pub fn resolved(metadata: TrackMetadata, requested_by: impl Into<String>) -> Self {
        Self {
            video_id: metadata.video_id.clone(),
            url: metadata.url.clone(),
            requested_by: requested_by.into(),
            track: TrackState::Resolved(metadata),
            added_at: Utc::now(),
        }
    }

    pub fn from_entry(entry: PlaylistEntry, requested_by: impl Into<String>) -> Self {
        Self::pending(entry.video_id, entry.url, requested_by)
    }

    /// Identidad estable del item
    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    pub fn metadata(&self) -> Option<&TrackMetadata> {
        match &self.track {
            TrackState::Resolved(metadata) => Some(metadata),
            TrackState::Pending => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self.track, TrackState::Resolved(_))
    }

    pub fn title(&self) -> &str {
        self.metadata()
            .map(|m| m.title.as_str())
            .unwrap_or(self.url.as_str())
    }

    pub fn duration(&self) -> Option<Duration> {
        self.metadata().and_then(|m| m.duration)
    }

    /// Transición Pending -> Resolved. The identity is kept even if the
    /// resolver reports a different id for the same URL.
    fn resolve(&mut self, metadata: TrackMetadata) {
        self.url = metadata.url.clone();
        self.track = TrackState::Resolved(metadata);
    }
}

/// A resolved playlist, already expanded into queue items.
#[derive(Debug, Clone)]
pub struct PlaylistInfo {
    pub title: Option<String>,
    pub requested_by: String,
    pub items: Vec<QueueItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopMode {
    Off,
    Track,
    Queue,
}

/// Ordered queue of items; the head is the item playing (or about to play).
#[derive(Debug, Default, Clone)]
pub struct MusicQueue {
    items: VecDeque<QueueItem>,
}

impl MusicQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Agrega un item al final de la cola
    pub fn add_item(&mut self, item: QueueItem) {
        debug!("➕ Agregado a la cola: {}", item.title());
        self.items.push_back(item);
    }

    /// Agrega los items de una playlist respetando su orden
    pub fn add_playlist(&mut self, items: impl IntoIterator<Item = QueueItem>) -> usize {
        let before = self.items.len();
        self.items.extend(items);
        let added = self.items.len() - before;
        info!("➕ Agregadas {} canciones a la cola", added);
        added
    }

    /// Elimina duplicados por `video_id`, conservando la primera aparición.
    pub fn remove_duplicates(&mut self) -> usize {
        let mut seen = HashSet::new();
        let original_len = self.items.len();

        self.items.retain(|item| seen.insert(item.video_id.clone()));

        let removed = original_len - self.items.len();
        if removed > 0 {
            info!("🗑️ Eliminados {} duplicados", removed);
        }
        removed
    }

    /// Mezcla toda la cola (Fisher-Yates)
    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.items.make_contiguous().shuffle(rng);
        info!("🔀 Cola mezclada");
    }

    /// Mezcla todo menos la cabeza
    pub fn shuffle_upcoming<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        if self.items.len() > 2 {
            self.items.make_contiguous()[1..].shuffle(rng);
        }
        info!("🔀 Próximas canciones mezcladas");
    }

    /// Deja solo la cabeza de la cola
    pub fn clear_queue(&mut self) {
        self.items.truncate(1);
        info!("🗑️ Cola limpiada");
    }

    /// Elimina la primera aparición de `video_id`. No-op si no existe.
    pub fn remove_item(&mut self, video_id: &str) -> Option<QueueItem> {
        self.remove_item_from(video_id, 0)
    }

    /// Like [`remove_item`](Self::remove_item) but only looks at positions `>= start`.
    pub fn remove_item_from(&mut self, video_id: &str, start: usize) -> Option<QueueItem> {
        let index = self.find_index_from(video_id, start)?;
        let removed = self.items.remove(index);
        debug!("❌ Track {} eliminado en posición {}", video_id, index);
        removed
    }

    pub fn find_index(&self, video_id: &str) -> Option<usize> {
        self.find_index_from(video_id, 0)
    }

    fn find_index_from(&self, video_id: &str, start: usize) -> Option<usize> {
        self.items
            .iter()
            .skip(start)
            .position(|item| item.video_id == video_id)
            .map(|offset| offset + start)
    }

    /// Mueve la primera aparición de `video_id` al final.
    pub fn rotate_to_back(&mut self, video_id: &str) -> bool {
        match self.find_index(video_id).and_then(|i| self.items.remove(i)) {
            Some(item) => {
                debug!("🔁 Track agregado al final por loop de cola: {}", item.title());
                self.items.push_back(item);
                true
            }
            None => false,
        }
    }

    /// Marca como resuelto el primer item pendiente con ese `video_id`.
    pub fn resolve(&mut self, video_id: &str, metadata: TrackMetadata) -> Option<&QueueItem> {
        let item = self.items.iter_mut().find(|item| item.video_id == video_id)?;
        if !item.is_resolved() {
            item.resolve(metadata);
        }
        Some(&*item)
    }

    pub fn head(&self) -> Option<&QueueItem> {
        self.items.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueueItem> {
        self.items.iter()
    }

    /// Copia de la cola para la capa de presentación
    pub fn snapshot(&self) -> Vec<QueueItem> {
        self.items.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Suma de las duraciones conocidas
    pub fn total_duration(&self) -> Duration {
        self.items.iter().filter_map(QueueItem::duration).sum()
    }
}
