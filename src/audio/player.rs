use parking_lot::Mutex;
use rand::Rng;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        backend::{AudioBackend, BackendConnector, EndReason, TrackEvents},
        queue::{LoopMode, MusicQueue, PlaylistInfo, QueueItem},
        signal::{signal_channel, Signal, SignalReceiver, SignalSender},
        voice::{VoiceConnection, VoiceGateway},
    },
    config::Config,
    error::{BackendError, PlayerError, Result},
    sources::MetadataResolver,
};

/// Límites del reproductor
#[derive(Debug, Clone)]
pub struct PlayerSettings {
    pub signal_timeout: Duration,
    pub max_queue_size: usize,
    pub max_playlist_size: usize,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            signal_timeout: Duration::from_secs(5),
            max_queue_size: 1000,
            max_playlist_size: 100,
        }
    }
}

impl From<&Config> for PlayerSettings {
    fn from(config: &Config) -> Self {
        Self {
            signal_timeout: config.signal_timeout,
            max_queue_size: config.max_queue_size,
            max_playlist_size: config.max_playlist_size,
        }
    }
}

#[derive(Debug, Default)]
struct PlayerState {
    queue: MusicQueue,
    active_song: Option<QueueItem>,
    loop_queue: bool,
    loop_song: bool,
}

/// Receiving ends owned by whichever task runs the playback loop.
struct Inbox {
    signals: SignalReceiver,
    track_events: TrackEvents,
}

enum TrackOutcome {
    Finished(QueueItem),
    Skipped(QueueItem),
    /// The head changed before playback started; pick the new head.
    Vanished,
}

/// Playback controller for one voice session.
///
/// Queue, loop flags and the active song live behind one lock that is only
/// held for a single mutation. The playback loop is the only consumer of the
/// backend's track events and of the skip/replay mailboxes.
pub struct MusicPlayer {
    guild_id: GuildId,
    channel_id: ChannelId,
    settings: PlayerSettings,
    state: Mutex<PlayerState>,
    backend: Arc<dyn AudioBackend>,
    resolver: Arc<dyn MetadataResolver>,
    voice: tokio::sync::Mutex<Option<Box<dyn VoiceConnection>>>,
    signals: SignalSender,
    inbox: tokio::sync::Mutex<Inbox>,
    running: AtomicBool,
    exited: AtomicBool,
}

/// Resets the loop state even if the `play` future is dropped mid-track.
struct RunningGuard<'a>(&'a MusicPlayer);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.state.lock().active_song = None;
        self.0.running.store(false, Ordering::Release);
    }
}

impl MusicPlayer {
    /// Conecta el backend de audio y se une al canal de voz.
    ///
    /// Either failure aborts construction; no half-built player is returned.
    pub async fn connect(
        connector: &dyn BackendConnector,
        gateway: &dyn VoiceGateway,
        guild_id: GuildId,
        channel_id: ChannelId,
        resolver: Arc<dyn MetadataResolver>,
        settings: PlayerSettings,
    ) -> Result<Self> {
        let session = connector
            .connect(guild_id)
            .await
            .map_err(PlayerError::BackendConnect)?;

        let voice = gateway
            .join(guild_id, channel_id)
            .await
            .map_err(PlayerError::VoiceJoin)?;

        info!("🔊 Reproductor listo en canal {} de guild {}", channel_id, guild_id);

        let (signals, receiver) = signal_channel(settings.signal_timeout);

        Ok(Self {
            guild_id,
            channel_id,
            settings,
            state: Mutex::new(PlayerState::default()),
            backend: session.backend,
            resolver,
            voice: tokio::sync::Mutex::new(Some(voice)),
            signals,
            inbox: tokio::sync::Mutex::new(Inbox {
                signals: receiver,
                track_events: session.events,
            }),
            running: AtomicBool::new(false),
            exited: AtomicBool::new(false),
        })
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    /// Resuelve una canción y la agrega al final de la cola
    pub async fn add_song(&self, url: &str, requested_by: &str) -> Result<QueueItem> {
        self.ensure_open()?;
        self.ensure_room()?;

        let metadata = self.resolver.resolve_track(url).await?;
        let item = QueueItem::resolved(metadata, requested_by);

        let mut state = self.state.lock();
        if state.queue.len() >= self.settings.max_queue_size {
            return Err(PlayerError::QueueFull(self.settings.max_queue_size));
        }
        state.queue.add_item(item.clone());
        info!("➕ {} agregado por {}", item.title(), requested_by);

        Ok(item)
    }

    /// Resuelve una playlist y agrega todas sus entradas.
    ///
    /// Returns `Ok(None)` when the URL is not a playlist. Entries are queued
    /// unresolved and get their metadata right before they play.
    pub async fn add_playlist(&self, url: &str, requested_by: &str) -> Result<Option<PlaylistInfo>> {
        self.ensure_open()?;
        self.ensure_room()?;

        let Some(playlist) = self.resolver.resolve_playlist(url).await? else {
            return Ok(None);
        };

        let mut state = self.state.lock();
        let room = self.settings.max_queue_size.saturating_sub(state.queue.len());
        if room == 0 {
            return Err(PlayerError::QueueFull(self.settings.max_queue_size));
        }

        let total = playlist.entries.len();
        let items: Vec<QueueItem> = playlist
            .entries
            .into_iter()
            .take(self.settings.max_playlist_size.min(room))
            .map(|entry| QueueItem::from_entry(entry, requested_by))
            .collect();

        if items.len() < total {
            warn!("✂️ Playlist truncada: {} de {} entradas", items.len(), total);
        }
        state.queue.add_playlist(items.iter().cloned());

        Ok(Some(PlaylistInfo {
            title: playlist.title,
            requested_by: requested_by.to_string(),
            items,
        }))
    }

    /// Reproduce la cola hasta vaciarla.
    ///
    /// Returns immediately if a loop is already running. The first
    /// resolution or backend error stops the loop and is returned here; the
    /// queue is left as it was.
    pub async fn play(&self) -> Result<()> {
        self.ensure_open()?;

        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Ya hay un loop de reproducción en guild {}", self.guild_id);
            return Ok(());
        }
        let _running = RunningGuard(self);

        let mut inbox = self.inbox.lock().await;
        let mut stale = inbox.signals.drain();
        while inbox.track_events.try_recv().is_ok() {
            stale += 1;
        }
        if stale > 0 {
            debug!("🧹 Descartados {} eventos viejos", stale);
        }

        info!("▶️ Iniciando reproducción en guild {}", self.guild_id);
        let result = self.run_queue(&mut inbox).await;

        match &result {
            Ok(()) => info!("📭 Cola terminada en guild {}", self.guild_id),
            Err(e) => error!("❌ Reproducción detenida en guild {}: {}", self.guild_id, e),
        }

        result
    }

    async fn run_queue(&self, inbox: &mut Inbox) -> Result<()> {
        while !self.exited.load(Ordering::Acquire) {
            let head = {
                let state = self.state.lock();
                state.queue.head().cloned()
            };
            let Some(head) = head else {
                break;
            };

            match self.play_current_song(head, inbox).await? {
                TrackOutcome::Finished(item) | TrackOutcome::Skipped(item) => {
                    self.post_song_handling(&item);

                    // Señales que llegaron junto con el fin del track eran para ese track
                    let stale = inbox.signals.drain();
                    if stale > 0 {
                        debug!("🧹 Descartadas {} señales del track anterior", stale);
                    }
                }
                TrackOutcome::Vanished => continue,
            }
        }

        Ok(())
    }

    async fn play_current_song(&self, head: QueueItem, inbox: &mut Inbox) -> Result<TrackOutcome> {
        let item = if head.is_resolved() {
            head
        } else {
            debug!("🔍 Resolviendo metadata pendiente: {}", head.url);
            let metadata = self.resolver.resolve_track(&head.url).await?;

            let mut state = self.state.lock();
            state.queue.resolve(head.video_id(), metadata);
            match state.queue.head() {
                Some(current) if current.video_id() == head.video_id() => current.clone(),
                _ => return Ok(TrackOutcome::Vanished),
            }
        };

        if self.exited.load(Ordering::Acquire) {
            return Ok(TrackOutcome::Vanished);
        }

        {
            let mut state = self.state.lock();
            state.active_song = Some(item.clone());
        }

        info!("🎵 Reproduciendo: {}", item.title());
        let token = self.backend.play(&item.url).await?;

        loop {
            tokio::select! {
                biased;

                event = inbox.track_events.recv() => {
                    let event = event.ok_or(BackendError::EventsClosed)?;
                    if event.token != token {
                        debug!("Fin de un track anterior ignorado: {}", event.url);
                        continue;
                    }

                    if event.reason == EndReason::Errored {
                        warn!("⚠️ El backend cortó el track: {}", event.url);
                    } else {
                        debug!("⏹️ Track terminado: {}", event.url);
                    }
                    return Ok(TrackOutcome::Finished(item));
                }
                Some(signal) = inbox.signals.recv() => match signal {
                    Signal::Skip => {
                        self.state.lock().loop_song = false;
                        info!("⏭️ Saltando: {}", item.title());
                        self.backend.stop().await?;
                        return Ok(TrackOutcome::Skipped(item));
                    }
                    Signal::Replay => {
                        info!("🔄 Reiniciando: {}", item.title());
                        self.backend.seek(Duration::ZERO).await?;
                    }
                },
            }
        }
    }

    fn post_song_handling(&self, item: &QueueItem) {
        let mut state = self.state.lock();
        state.active_song = None;

        if state.loop_queue {
            state.queue.rotate_to_back(item.video_id());
            return;
        }

        if !state.loop_song {
            state.queue.remove_item(item.video_id());
        }
    }

    /// Pausa el track actual
    pub async fn stop(&self) -> Result<()> {
        self.backend.pause(true).await?;
        info!("⏸️ Reproducción pausada");
        Ok(())
    }

    pub async fn resume(&self) -> Result<()> {
        self.backend.pause(false).await?;
        info!("▶️ Reproducción reanudada");
        Ok(())
    }

    /// Termina el track actual. No-op si no hay loop corriendo.
    pub async fn skip(&self) -> Result<()> {
        self.send_signal(Signal::Skip).await
    }

    /// Vuelve al inicio del track actual. No-op si no hay loop corriendo.
    pub async fn replay(&self) -> Result<()> {
        self.send_signal(Signal::Replay).await
    }

    async fn send_signal(&self, signal: Signal) -> Result<()> {
        if !self.is_playing() {
            debug!("Señal {:?} ignorada: no hay reproducción", signal);
            return Ok(());
        }
        self.signals.send(signal).await
    }

    /// Corta todo después del track actual y sale del canal de voz.
    pub async fn exit(&self) -> Result<()> {
        if self.exited.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.clear_queue();
        if let Err(e) = self.skip().await {
            warn!("No se pudo saltar el track al salir: {}", e);
        }

        let voice = self.voice.lock().await.take();
        if let Some(voice) = voice {
            voice.disconnect().await.map_err(PlayerError::VoiceLeave)?;
        }

        info!("👋 Reproductor cerrado en guild {}", self.guild_id);
        Ok(())
    }

    /// Mezcla la cola. While a loop is running the head (now playing) stays put.
    pub fn shuffle(&self) {
        self.shuffle_with(&mut rand::thread_rng());
    }

    pub fn shuffle_with<R: Rng + ?Sized>(&self, rng: &mut R) {
        let running = self.is_playing();
        let mut state = self.state.lock();
        if running {
            state.queue.shuffle_upcoming(rng);
        } else {
            state.queue.shuffle(rng);
        }
    }

    /// Deja solo la cabeza de la cola
    pub fn clear_queue(&self) {
        self.state.lock().queue.clear_queue();
    }

    pub fn remove_duplicates(&self) -> usize {
        self.state.lock().queue.remove_duplicates()
    }

    /// Quita la primera aparición de `video_id`. While a loop is running the
    /// head is never removed here; use [`skip`](Self::skip) for that.
    pub fn remove_item(&self, video_id: &str) -> Option<QueueItem> {
        let start = usize::from(self.is_playing());
        self.state.lock().queue.remove_item_from(video_id, start)
    }

    pub fn set_loop_song(&self, enabled: bool) {
        self.state.lock().loop_song = enabled;
        info!("🔂 Repetir canción: {}", enabled);
    }

    pub fn set_loop_queue(&self, enabled: bool) {
        self.state.lock().loop_queue = enabled;
        info!("🔁 Repetir cola: {}", enabled);
    }

    pub fn set_loop_mode(&self, mode: LoopMode) {
        let mut state = self.state.lock();
        state.loop_song = mode == LoopMode::Track;
        state.loop_queue = mode == LoopMode::Queue;
        info!("🔁 Modo de repetición: {:?}", mode);
    }

    /// Loop-queue takes precedence, matching how completion is routed.
    pub fn loop_mode(&self) -> LoopMode {
        let state = self.state.lock();
        if state.loop_queue {
            LoopMode::Queue
        } else if state.loop_song {
            LoopMode::Track
        } else {
            LoopMode::Off
        }
    }

    pub fn loop_song(&self) -> bool {
        self.state.lock().loop_song
    }

    pub fn loop_queue(&self) -> bool {
        self.state.lock().loop_queue
    }

    /// Copia de la cola; the head is the track playing now, if any.
    pub fn queue(&self) -> Vec<QueueItem> {
        self.state.lock().queue.snapshot()
    }

    pub fn total_duration(&self) -> Duration {
        self.state.lock().queue.total_duration()
    }

    pub fn now_playing(&self) -> Option<QueueItem> {
        self.state.lock().active_song.clone()
    }

    pub fn is_playing(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.has_exited() {
            return Err(PlayerError::Exited);
        }
        Ok(())
    }

    fn ensure_room(&self) -> Result<()> {
        if self.state.lock().queue.len() >= self.settings.max_queue_size {
            return Err(PlayerError::QueueFull(self.settings.max_queue_size));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::backend::{BackendSession, TrackEnded, TrackToken};
    use crate::error::{ResolveError, VoiceError};
    use crate::sources::{MockMetadataResolver, PlaylistEntry, PlaylistMetadata, TrackMetadata};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicU64;
    use tokio::sync::mpsc;

    #[derive(Debug, Clone, PartialEq)]
    enum BackendCall {
        Play(String),
        Pause(bool),
        Seek(Duration),
        Stop,
    }

    /// Último token entregado por cada URL
    type Tokens = Arc<parking_lot::Mutex<HashMap<String, TrackToken>>>;

    struct FakeBackend {
        calls: mpsc::UnboundedSender<BackendCall>,
        fail_play: bool,
        next_token: AtomicU64,
        tokens: Tokens,
    }

    impl FakeBackend {
        fn new(calls: mpsc::UnboundedSender<BackendCall>, fail_play: bool, tokens: Tokens) -> Self {
            Self {
                calls,
                fail_play,
                next_token: AtomicU64::new(1),
                tokens,
            }
        }
    }

    #[async_trait]
    impl AudioBackend for FakeBackend {
        async fn play(&self, url: &str) -> std::result::Result<TrackToken, BackendError> {
            let _ = self.calls.send(BackendCall::Play(url.to_string()));
            if self.fail_play {
                return Err(BackendError::Play {
                    url: url.to_string(),
                    reason: "rechazado".to_string(),
                });
            }
            let token = TrackToken(self.next_token.fetch_add(1, Ordering::SeqCst));
            self.tokens.lock().insert(url.to_string(), token);
            Ok(token)
        }

        async fn stop(&self) -> std::result::Result<(), BackendError> {
            let _ = self.calls.send(BackendCall::Stop);
            Ok(())
        }

        async fn pause(&self, paused: bool) -> std::result::Result<(), BackendError> {
            let _ = self.calls.send(BackendCall::Pause(paused));
            Ok(())
        }

        async fn seek(&self, position: Duration) -> std::result::Result<(), BackendError> {
            let _ = self.calls.send(BackendCall::Seek(position));
            Ok(())
        }
    }

    struct FakeConnector {
        session: parking_lot::Mutex<Option<BackendSession>>,
    }

    #[async_trait]
    impl BackendConnector for FakeConnector {
        async fn connect(&self, _guild_id: GuildId) -> std::result::Result<BackendSession, BackendError> {
            self.session
                .lock()
                .take()
                .ok_or_else(|| BackendError::Unavailable("sin nodo".to_string()))
        }
    }

    struct FakeGateway {
        fail_join: bool,
        disconnected: Arc<AtomicBool>,
    }

    struct FakeConnection {
        disconnected: Arc<AtomicBool>,
    }

    #[async_trait]
    impl VoiceGateway for FakeGateway {
        async fn join(
            &self,
            _guild_id: GuildId,
            _channel_id: ChannelId,
        ) -> std::result::Result<Box<dyn VoiceConnection>, VoiceError> {
            if self.fail_join {
                return Err(VoiceError::Join("sin permisos".to_string()));
            }
            Ok(Box::new(FakeConnection {
                disconnected: self.disconnected.clone(),
            }))
        }
    }

    #[async_trait]
    impl VoiceConnection for FakeConnection {
        async fn disconnect(&self) -> std::result::Result<(), VoiceError> {
            self.disconnected.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Harness {
        player: Arc<MusicPlayer>,
        calls: mpsc::UnboundedReceiver<BackendCall>,
        ended: mpsc::UnboundedSender<TrackEnded>,
        tokens: Tokens,
        disconnected: Arc<AtomicBool>,
    }

    impl Harness {
        async fn next_call(&mut self) -> BackendCall {
            tokio::time::timeout(Duration::from_secs(2), self.calls.recv())
                .await
                .expect("el backend no recibió ninguna llamada")
                .expect("canal de llamadas cerrado")
        }

        async fn assert_idle(&mut self) {
            let call = tokio::time::timeout(Duration::from_millis(100), self.calls.recv()).await;
            assert!(call.is_err(), "llamada inesperada: {:?}", call);
        }

        /// Termina la última reproducción de `url`
        fn end_track(&self, url: &str) {
            let token = self.tokens.lock().get(url).copied().unwrap_or(TrackToken(0));
            self.ended
                .send(TrackEnded {
                    token,
                    url: url.to_string(),
                    reason: EndReason::Finished,
                })
                .unwrap();
        }

        fn ids(&self) -> Vec<String> {
            self.player
                .queue()
                .iter()
                .map(|item| item.video_id().to_string())
                .collect()
        }

        fn spawn_play(&self) -> tokio::task::JoinHandle<Result<()>> {
            let player = self.player.clone();
            tokio::spawn(async move { player.play().await })
        }
    }

    fn url(id: &str) -> String {
        format!("https://example.com/{}", id)
    }

    fn metadata_for(url: &str) -> TrackMetadata {
        let id = url.rsplit('/').next().unwrap_or(url).to_string();
        TrackMetadata {
            title: format!("Song {}", id),
            video_id: id,
            url: url.to_string(),
            uploader: None,
            duration: Some(Duration::from_secs(180)),
            thumbnail: None,
        }
    }

    fn resolving_mock() -> MockMetadataResolver {
        let mut resolver = MockMetadataResolver::new();
        resolver
            .expect_resolve_track()
            .returning(|url| Ok(metadata_for(url)));
        resolver
    }

    async fn harness_with(
        resolver: MockMetadataResolver,
        settings: PlayerSettings,
        fail_play: bool,
    ) -> Harness {
        let (calls_tx, calls) = mpsc::unbounded_channel();
        let (ended, events) = mpsc::unbounded_channel();
        let tokens = Tokens::default();
        let backend = Arc::new(FakeBackend::new(calls_tx, fail_play, tokens.clone()));
        let connector = FakeConnector {
            session: parking_lot::Mutex::new(Some(BackendSession { backend, events })),
        };
        let disconnected = Arc::new(AtomicBool::new(false));
        let gateway = FakeGateway {
            fail_join: false,
            disconnected: disconnected.clone(),
        };

        let player = MusicPlayer::connect(
            &connector,
            &gateway,
            GuildId::new(1),
            ChannelId::new(2),
            Arc::new(resolver),
            settings,
        )
        .await
        .unwrap();

        Harness {
            player: Arc::new(player),
            calls,
            ended,
            tokens,
            disconnected,
        }
    }

    async fn harness() -> Harness {
        harness_with(resolving_mock(), PlayerSettings::default(), false).await
    }

    async fn add_songs(h: &Harness, ids: &[&str]) {
        for id in ids {
            h.player.add_song(&url(id), "tester").await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_two_songs_play_in_order_and_drain_queue() {
        let mut h = harness().await;
        add_songs(&h, &["S1", "S2"]).await;

        let play = h.spawn_play();
        assert_eq!(h.next_call().await, BackendCall::Play(url("S1")));
        assert_eq!(h.player.now_playing().unwrap().video_id(), "S1");

        h.end_track(&url("S1"));
        assert_eq!(h.next_call().await, BackendCall::Play(url("S2")));
        assert_eq!(h.ids(), vec!["S2"]);

        h.end_track(&url("S2"));
        play.await.unwrap().unwrap();

        assert!(h.player.queue().is_empty());
        assert!(h.player.now_playing().is_none());
        assert!(!h.player.is_playing());
    }

    #[tokio::test]
    async fn test_loop_queue_moves_finished_track_to_tail() {
        let mut h = harness().await;
        add_songs(&h, &["A", "B"]).await;
        h.player.set_loop_queue(true);

        let play = h.spawn_play();
        assert_eq!(h.next_call().await, BackendCall::Play(url("A")));

        h.end_track(&url("A"));
        assert_eq!(h.next_call().await, BackendCall::Play(url("B")));
        assert_eq!(h.ids(), vec!["B", "A"]);

        h.player.exit().await.unwrap();
        play.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_loop_song_replays_same_item() {
        let mut h = harness().await;
        add_songs(&h, &["A"]).await;
        h.player.set_loop_song(true);

        let play = h.spawn_play();
        assert_eq!(h.next_call().await, BackendCall::Play(url("A")));

        h.end_track(&url("A"));
        assert_eq!(h.next_call().await, BackendCall::Play(url("A")));
        assert_eq!(h.ids(), vec!["A"]);

        // Saltar apaga el loop y la cola se vacía
        h.player.skip().await.unwrap();
        play.await.unwrap().unwrap();
        assert_eq!(h.next_call().await, BackendCall::Stop);
        assert!(!h.player.loop_song());
        assert!(h.player.queue().is_empty());
    }

    #[tokio::test]
    async fn test_skip_with_loop_song_advances_exactly_one_track() {
        let mut h = harness().await;
        add_songs(&h, &["A", "B", "C"]).await;
        h.player.set_loop_song(true);

        let play = h.spawn_play();
        assert_eq!(h.next_call().await, BackendCall::Play(url("A")));

        h.player.skip().await.unwrap();
        assert_eq!(h.next_call().await, BackendCall::Stop);
        assert_eq!(h.next_call().await, BackendCall::Play(url("B")));
        h.assert_idle().await;

        assert!(!h.player.loop_song());
        assert_eq!(h.ids(), vec!["B", "C"]);
        assert_eq!(h.player.now_playing().unwrap().video_id(), "B");

        play.abort();
    }

    #[tokio::test]
    async fn test_skip_racing_track_end_advances_one_track() {
        let mut h = harness().await;
        add_songs(&h, &["A", "B", "C"]).await;

        let play = h.spawn_play();
        assert_eq!(h.next_call().await, BackendCall::Play(url("A")));

        // A termina sola justo cuando llega el skip
        h.end_track(&url("A"));
        h.player.skip().await.unwrap();

        assert_eq!(h.next_call().await, BackendCall::Play(url("B")));
        h.assert_idle().await;
        assert_eq!(h.ids(), vec!["B", "C"]);
        assert_eq!(h.player.now_playing().unwrap().video_id(), "B");

        play.abort();
    }

    #[tokio::test]
    async fn test_late_end_of_skipped_track_is_ignored() {
        let mut h = harness().await;
        add_songs(&h, &["A", "B", "C"]).await;

        let play = h.spawn_play();
        assert_eq!(h.next_call().await, BackendCall::Play(url("A")));

        h.player.skip().await.unwrap();
        assert_eq!(h.next_call().await, BackendCall::Stop);
        assert_eq!(h.next_call().await, BackendCall::Play(url("B")));

        h.end_track(&url("A"));
        h.assert_idle().await;
        assert_eq!(h.ids(), vec!["B", "C"]);
        assert_eq!(h.player.now_playing().unwrap().video_id(), "B");

        h.end_track(&url("B"));
        assert_eq!(h.next_call().await, BackendCall::Play(url("C")));

        play.abort();
    }

    #[tokio::test]
    async fn test_skipping_last_track_stops_backend() {
        let mut h = harness().await;
        add_songs(&h, &["A"]).await;

        let play = h.spawn_play();
        assert_eq!(h.next_call().await, BackendCall::Play(url("A")));

        h.player.skip().await.unwrap();
        play.await.unwrap().unwrap();

        assert_eq!(h.next_call().await, BackendCall::Stop);
        h.assert_idle().await;
        assert!(h.player.queue().is_empty());
        assert!(h.player.now_playing().is_none());
    }

    #[tokio::test]
    async fn test_replay_seeks_and_keeps_waiting() {
        let mut h = harness().await;
        add_songs(&h, &["A"]).await;

        let play = h.spawn_play();
        assert_eq!(h.next_call().await, BackendCall::Play(url("A")));

        h.player.replay().await.unwrap();
        assert_eq!(h.next_call().await, BackendCall::Seek(Duration::ZERO));
        assert_eq!(h.player.now_playing().unwrap().video_id(), "A");
        assert_eq!(h.ids(), vec!["A"]);

        h.end_track(&url("A"));
        play.await.unwrap().unwrap();
        assert!(h.player.queue().is_empty());
    }

    #[tokio::test]
    async fn test_second_play_is_noop() {
        let mut h = harness().await;
        add_songs(&h, &["A"]).await;

        let play = h.spawn_play();
        assert_eq!(h.next_call().await, BackendCall::Play(url("A")));

        h.player.play().await.unwrap();
        h.assert_idle().await;

        h.end_track(&url("A"));
        play.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_play_on_empty_queue_returns_immediately() {
        let mut h = harness().await;
        h.player.play().await.unwrap();
        h.assert_idle().await;
        assert!(!h.player.is_playing());
    }

    #[tokio::test]
    async fn test_pending_items_resolve_before_playing() {
        let mut resolver = resolving_mock();
        resolver.expect_resolve_playlist().returning(|_| {
            Ok(Some(PlaylistMetadata {
                title: Some("Mix".to_string()),
                entries: vec![
                    PlaylistEntry {
                        video_id: "P1".to_string(),
                        url: url("P1"),
                        title: None,
                    },
                    PlaylistEntry {
                        video_id: "P2".to_string(),
                        url: url("P2"),
                        title: None,
                    },
                ],
            }))
        });
        let mut h = harness_with(resolver, PlayerSettings::default(), false).await;

        let info = h
            .player
            .add_playlist("https://example.com/list", "tester")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(info.items.len(), 2);
        assert!(h.player.queue().iter().all(|item| !item.is_resolved()));

        let play = h.spawn_play();
        assert_eq!(h.next_call().await, BackendCall::Play(url("P1")));
        let queue = h.player.queue();
        assert!(queue[0].is_resolved());
        assert!(!queue[1].is_resolved());

        play.abort();
    }

    #[tokio::test]
    async fn test_resolution_failure_stops_loop_and_keeps_queue() {
        let mut resolver = MockMetadataResolver::new();
        resolver.expect_resolve_playlist().returning(|_| {
            Ok(Some(PlaylistMetadata {
                title: None,
                entries: vec![
                    PlaylistEntry {
                        video_id: "P1".to_string(),
                        url: url("P1"),
                        title: None,
                    },
                    PlaylistEntry {
                        video_id: "P2".to_string(),
                        url: url("P2"),
                        title: None,
                    },
                ],
            }))
        });
        resolver.expect_resolve_track().returning(|url| {
            Err(ResolveError::Failed {
                url: url.to_string(),
                stderr: "video no disponible".to_string(),
            })
        });
        let mut h = harness_with(resolver, PlayerSettings::default(), false).await;
        h.player
            .add_playlist("https://example.com/list", "tester")
            .await
            .unwrap();

        let err = h.player.play().await.unwrap_err();
        assert!(matches!(err, PlayerError::Resolve(_)));
        assert_eq!(h.ids(), vec!["P1", "P2"]);
        assert!(!h.player.is_playing());
        h.assert_idle().await;
    }

    #[tokio::test]
    async fn test_backend_failure_stops_loop() {
        let mut h = harness_with(resolving_mock(), PlayerSettings::default(), true).await;
        add_songs(&h, &["A", "B"]).await;

        let err = h.player.play().await.unwrap_err();
        assert!(matches!(err, PlayerError::Backend(BackendError::Play { .. })));
        assert_eq!(h.next_call().await, BackendCall::Play(url("A")));
        assert_eq!(h.ids(), vec!["A", "B"]);
        assert!(h.player.now_playing().is_none());
    }

    #[tokio::test]
    async fn test_closed_event_stream_is_backend_error() {
        let mut h = harness().await;
        add_songs(&h, &["A"]).await;

        let play = h.spawn_play();
        assert_eq!(h.next_call().await, BackendCall::Play(url("A")));
        drop(h.ended);

        let err = play.await.unwrap().unwrap_err();
        assert!(matches!(err, PlayerError::Backend(BackendError::EventsClosed)));
        assert_eq!(h.player.queue().len(), 1);
    }

    #[tokio::test]
    async fn test_exit_finishes_current_track_and_disconnects() {
        let mut h = harness().await;
        add_songs(&h, &["A", "B", "C"]).await;

        let play = h.spawn_play();
        assert_eq!(h.next_call().await, BackendCall::Play(url("A")));

        h.player.exit().await.unwrap();
        play.await.unwrap().unwrap();
        assert_eq!(h.next_call().await, BackendCall::Stop);

        assert!(h.player.queue().is_empty());
        assert!(h.disconnected.load(Ordering::SeqCst));
        assert!(matches!(h.player.play().await, Err(PlayerError::Exited)));
        assert!(matches!(
            h.player.add_song(&url("D"), "tester").await,
            Err(PlayerError::Exited)
        ));
        h.assert_idle().await;
    }

    #[tokio::test]
    async fn test_skip_without_loop_is_dropped() {
        let mut h = harness().await;
        add_songs(&h, &["A", "B"]).await;

        h.player.skip().await.unwrap();
        h.player.replay().await.unwrap();

        let play = h.spawn_play();
        assert_eq!(h.next_call().await, BackendCall::Play(url("A")));
        h.assert_idle().await;

        play.abort();
    }

    #[tokio::test]
    async fn test_stale_track_end_is_ignored() {
        let mut h = harness().await;
        add_songs(&h, &["A", "B"]).await;
        h.end_track("https://example.com/old");

        let play = h.spawn_play();
        assert_eq!(h.next_call().await, BackendCall::Play(url("A")));
        h.assert_idle().await;
        assert_eq!(h.ids(), vec!["A", "B"]);

        play.abort();
    }

    #[tokio::test]
    async fn test_stop_and_resume_forward_pause() {
        let mut h = harness().await;
        h.player.stop().await.unwrap();
        h.player.resume().await.unwrap();
        assert_eq!(h.next_call().await, BackendCall::Pause(true));
        assert_eq!(h.next_call().await, BackendCall::Pause(false));
    }

    #[tokio::test]
    async fn test_queue_mutations_keep_now_playing_at_head() {
        let mut h = harness().await;
        add_songs(&h, &["A", "B", "C", "A", "D"]).await;

        let play = h.spawn_play();
        assert_eq!(h.next_call().await, BackendCall::Play(url("A")));

        assert_eq!(h.player.remove_duplicates(), 1);
        assert_eq!(h.ids(), vec!["A", "B", "C", "D"]);

        // El head no se toca mientras suena
        assert!(h.player.remove_item("A").is_none());
        assert!(h.player.remove_item("Z").is_none());
        assert_eq!(h.player.remove_item("C").unwrap().video_id(), "C");

        for _ in 0..10 {
            h.player.shuffle();
            assert_eq!(h.ids()[0], "A");
        }

        h.player.clear_queue();
        assert_eq!(h.ids(), vec!["A"]);

        h.end_track(&url("A"));
        play.await.unwrap().unwrap();
        assert!(h.player.queue().is_empty());
    }

    #[tokio::test]
    async fn test_loop_mode_maps_to_flags() {
        let h = harness().await;
        assert_eq!(h.player.loop_mode(), LoopMode::Off);

        h.player.set_loop_mode(LoopMode::Track);
        assert!(h.player.loop_song());
        assert!(!h.player.loop_queue());

        h.player.set_loop_mode(LoopMode::Queue);
        assert_eq!(h.player.loop_mode(), LoopMode::Queue);
        assert!(!h.player.loop_song());

        h.player.set_loop_song(true);
        assert_eq!(h.player.loop_mode(), LoopMode::Queue);

        h.player.set_loop_mode(LoopMode::Off);
        assert!(!h.player.loop_song() && !h.player.loop_queue());
    }

    #[tokio::test]
    async fn test_queue_capacity_limits() {
        let mut resolver = resolving_mock();
        resolver.expect_resolve_playlist().returning(|_| {
            Ok(Some(PlaylistMetadata {
                title: None,
                entries: ["P1", "P2", "P3"]
                    .iter()
                    .map(|id| PlaylistEntry {
                        video_id: id.to_string(),
                        url: url(id),
                        title: None,
                    })
                    .collect(),
            }))
        });
        let settings = PlayerSettings {
            max_queue_size: 3,
            max_playlist_size: 2,
            ..PlayerSettings::default()
        };
        let h = harness_with(resolver, settings, false).await;

        let info = h
            .player
            .add_playlist("https://example.com/list", "tester")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(info.items.len(), 2);

        add_songs(&h, &["A"]).await;
        assert!(matches!(
            h.player.add_song(&url("B"), "tester").await,
            Err(PlayerError::QueueFull(3))
        ));
        assert_eq!(h.ids(), vec!["P1", "P2", "A"]);
    }

    #[tokio::test]
    async fn test_non_playlist_url_returns_none() {
        let mut resolver = MockMetadataResolver::new();
        resolver.expect_resolve_playlist().returning(|_| Ok(None));
        let h = harness_with(resolver, PlayerSettings::default(), false).await;

        let result = h
            .player
            .add_playlist(&url("A"), "tester")
            .await
            .unwrap();
        assert!(result.is_none());
        assert!(h.player.queue().is_empty());
    }

    #[tokio::test]
    async fn test_construction_failures() {
        let disconnected = Arc::new(AtomicBool::new(false));
        let gateway = FakeGateway {
            fail_join: false,
            disconnected: disconnected.clone(),
        };
        let empty_connector = FakeConnector {
            session: parking_lot::Mutex::new(None),
        };
        let result = MusicPlayer::connect(
            &empty_connector,
            &gateway,
            GuildId::new(1),
            ChannelId::new(2),
            Arc::new(MockMetadataResolver::new()),
            PlayerSettings::default(),
        )
        .await;
        assert!(matches!(result, Err(PlayerError::BackendConnect(_))));

        let (calls, _calls_rx) = mpsc::unbounded_channel();
        let (_ended, events) = mpsc::unbounded_channel();
        let connector = FakeConnector {
            session: parking_lot::Mutex::new(Some(BackendSession {
                backend: Arc::new(FakeBackend::new(calls, false, Tokens::default())),
                events,
            })),
        };
        let failing_gateway = FakeGateway {
            fail_join: true,
            disconnected,
        };
        let result = MusicPlayer::connect(
            &connector,
            &failing_gateway,
            GuildId::new(1),
            ChannelId::new(2),
            Arc::new(MockMetadataResolver::new()),
            PlayerSettings::default(),
        )
        .await;
        assert!(matches!(result, Err(PlayerError::VoiceJoin(_))));
    }
}
