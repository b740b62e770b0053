//! # Bot Module
//!
//! Discord glue for Ramiel Music.
//!
//! - Command registration and dispatch ([`commands`], [`handlers`])
//! - One [`MusicPlayer`] per guild, created on the first `/play`
//! - Event handling (ready, interactions, voice state updates)
//!
//! Playback loops run as background tasks; a loop that stops with an error
//! reports it as a plain text message in the channel where playback was
//! requested.

use anyhow::Result;
use dashmap::DashMap;
use serenity::{
    all::{ChannelId, Context, EventHandler, GuildId, Http, Interaction, Ready, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{error, info, warn};

pub mod commands;
pub mod handlers;

use crate::{
    audio::{
        player::{MusicPlayer, PlayerSettings},
        songbird_backend::SongbirdVoice,
    },
    config::Config,
    sources::{MetadataResolver, YtDlpResolver},
};

/// Main Discord event handler.
///
/// Players are kept per guild in a [`DashMap`]; a player that has exited is
/// replaced on the next `/play`.
pub struct MusicBot {
    config: Arc<Config>,
    resolver: Arc<dyn MetadataResolver>,
    players: DashMap<GuildId, Arc<MusicPlayer>>,
    /// Cliente HTTP compartido por los inputs de Songbird
    http_client: reqwest::Client,
}

impl MusicBot {
    pub fn new(config: Config) -> Self {
        let resolver = Arc::new(YtDlpResolver::new(
            config.ytdlp_path.clone(),
            config.resolve_timeout,
            config.max_playlist_size,
        ));

        Self {
            config: Arc::new(config),
            resolver,
            players: DashMap::new(),
            http_client: reqwest::Client::new(),
        }
    }

    /// Registers slash commands with Discord.
    ///
    /// With `GUILD_ID` set, commands are registered for that guild only
    /// (instant propagation, for development); otherwise globally.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");
        info!("🔧 Application ID: {}", self.config.application_id);

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);

                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ El bot no está en la guild especificada: {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id).await.map_err(|e| {
                    error!("❌ Error registrando comandos de guild: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica el permiso 'applications.commands'.")
                })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica el permiso 'applications.commands'.")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }

    pub fn player(&self, guild_id: GuildId) -> Option<Arc<MusicPlayer>> {
        self.players.get(&guild_id).map(|entry| entry.value().clone())
    }

    /// Devuelve el reproductor de la guild, conectándolo al canal si no existe.
    pub async fn player_or_connect(
        &self,
        ctx: &Context,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<MusicPlayer>> {
        if let Some(player) = self.player(guild_id) {
            if !player.has_exited() {
                return Ok(player);
            }
            self.players.remove(&guild_id);
        }

        let manager = songbird::get(ctx)
            .await
            .ok_or_else(|| anyhow::anyhow!("Songbird no inicializado"))?;
        let voice = SongbirdVoice::new(manager, self.http_client.clone());

        let player = Arc::new(
            MusicPlayer::connect(
                &voice,
                &voice,
                guild_id,
                channel_id,
                self.resolver.clone(),
                PlayerSettings::from(self.config.as_ref()),
            )
            .await?,
        );

        self.players.insert(guild_id, player.clone());
        Ok(player)
    }

    /// Arranca el loop de reproducción en segundo plano si no está corriendo.
    pub fn spawn_playback(&self, http: Arc<Http>, player: Arc<MusicPlayer>, text_channel: ChannelId) {
        if player.is_playing() {
            return;
        }

        tokio::spawn(async move {
            if let Err(e) = player.play().await {
                error!("❌ Error de reproducción en guild {}: {}", player.guild_id(), e);

                if let Err(why) = text_channel
                    .say(&http, format!("❌ Error de reproducción: {}", e))
                    .await
                {
                    warn!("No se pudo avisar el error en el canal {}: {:?}", text_channel, why);
                }
            }
        });
    }

    /// Cierra el reproductor de la guild. Devuelve `false` si no había uno.
    pub async fn exit(&self, guild_id: GuildId) -> Result<bool> {
        let Some((_, player)) = self.players.remove(&guild_id) else {
            return Ok(false);
        };

        player.exit().await?;
        Ok(true)
    }
}

#[async_trait]
impl EventHandler for MusicBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command_interaction) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                error!("Error manejando comando: {:?}", e);
            }
        }
    }

    /// Cierra el reproductor cuando el bot es desconectado del canal de voz.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || old.is_none() || new.channel_id.is_some() {
            return;
        }

        let Some(guild_id) = new.guild_id else {
            return;
        };

        info!("🔌 Bot desconectado en guild {}", guild_id);
        if let Err(e) = self.exit(guild_id).await {
            // El canal ya no existe para Songbird; solo se registra
            warn!("Error al cerrar el reproductor: {:?}", e);
        }
    }
}
