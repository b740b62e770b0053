use anyhow::Result;
use serenity::{
    builder::{CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage, EditInteractionResponse},
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{
    audio::{
        player::MusicPlayer,
        queue::{LoopMode, QueueItem},
    },
    bot::MusicBot,
    ui::embeds,
};

/// Maneja comandos slash
pub async fn handle_command(ctx: &Context, command: CommandInteraction, bot: &MusicBot) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    let result = match command.data.name.as_str() {
        "play" => handle_play(ctx, &command, bot, guild_id).await,
        "pause" => handle_pause(ctx, &command, bot, guild_id).await,
        "resume" => handle_resume(ctx, &command, bot, guild_id).await,
        "skip" => handle_skip(ctx, &command, bot, guild_id).await,
        "replay" => handle_replay(ctx, &command, bot, guild_id).await,
        "shuffle" => handle_shuffle(ctx, &command, bot, guild_id).await,
        "clear" => handle_clear(ctx, &command, bot, guild_id).await,
        "dedup" => handle_dedup(ctx, &command, bot, guild_id).await,
        "remove" => handle_remove(ctx, &command, bot, guild_id).await,
        "loop" => handle_loop(ctx, &command, bot, guild_id).await,
        "queue" => handle_queue(ctx, &command, bot, guild_id).await,
        "nowplaying" => handle_nowplaying(ctx, &command, bot, guild_id).await,
        "leave" => handle_leave(ctx, &command, bot, guild_id).await,
        _ => respond_ephemeral(ctx, &command, "❌ Comando no reconocido").await,
    };

    if let Err(e) = &result {
        // Falla si la interacción ya fue respondida
        if let Err(why) = respond_ephemeral(ctx, &command, format!("❌ {}", e)).await {
            debug!("No se pudo responder el error de /{}: {:?}", command.data.name, why);
        }
    }

    result
}

async fn handle_play(ctx: &Context, command: &CommandInteraction, bot: &MusicBot, guild_id: GuildId) -> Result<()> {
    let url = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "url")
        .and_then(|opt| opt.value.as_str())
        .ok_or_else(|| anyhow::anyhow!("URL no proporcionada"))?
        .to_string();

    // Defer la respuesta ya que yt-dlp puede tardar
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let embed = match enqueue(ctx, command, bot, guild_id, &url).await {
        Ok(embed) => embed,
        Err(e) => {
            warn!("No se pudo agregar {}: {}", url, e);
            embeds::create_error_embed("No se pudo reproducir", &e.to_string())
        }
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;

    Ok(())
}

/// Conecta el reproductor si hace falta, agrega la URL y arranca la reproducción
async fn enqueue(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
    url: &str,
) -> Result<CreateEmbed> {
    let voice_channel_id = get_user_voice_channel(ctx, guild_id, command.user.id)?;
    let player = bot.player_or_connect(ctx, guild_id, voice_channel_id).await?;

    let requested_by = requester_label(
        command.member.as_ref().and_then(|m| m.nick.as_deref()),
        &command.user.name,
        command.user.id,
    );

    let embed = match player.add_playlist(url, &requested_by).await? {
        Some(playlist) => embeds::create_playlist_added_embed(&playlist),
        None => {
            let item = player.add_song(url, &requested_by).await?;
            embeds::create_track_added_embed(&item, player.queue().len())
        }
    };

    bot.spawn_playback(ctx.http.clone(), player, command.channel_id);
    Ok(embed)
}

async fn handle_pause(ctx: &Context, command: &CommandInteraction, bot: &MusicBot, guild_id: GuildId) -> Result<()> {
    let Some(player) = require_player(ctx, command, bot, guild_id).await? else {
        return Ok(());
    };

    player.stop().await?;
    respond(ctx, command, "⏸️ Reproducción pausada").await
}

async fn handle_resume(ctx: &Context, command: &CommandInteraction, bot: &MusicBot, guild_id: GuildId) -> Result<()> {
    let Some(player) = require_player(ctx, command, bot, guild_id).await? else {
        return Ok(());
    };

    player.resume().await?;
    respond(ctx, command, "▶️ Reproducción reanudada").await
}

async fn handle_skip(ctx: &Context, command: &CommandInteraction, bot: &MusicBot, guild_id: GuildId) -> Result<()> {
    let Some(player) = require_player(ctx, command, bot, guild_id).await? else {
        return Ok(());
    };

    if !player.is_playing() {
        return respond_ephemeral(ctx, command, "❌ No hay nada reproduciéndose").await;
    }

    player.skip().await?;
    respond(ctx, command, "⏭️ Canción saltada").await
}

async fn handle_replay(ctx: &Context, command: &CommandInteraction, bot: &MusicBot, guild_id: GuildId) -> Result<()> {
    let Some(player) = require_player(ctx, command, bot, guild_id).await? else {
        return Ok(());
    };

    if !player.is_playing() {
        return respond_ephemeral(ctx, command, "❌ No hay nada reproduciéndose").await;
    }

    player.replay().await?;
    respond(ctx, command, "⏮️ Canción reiniciada").await
}

async fn handle_shuffle(ctx: &Context, command: &CommandInteraction, bot: &MusicBot, guild_id: GuildId) -> Result<()> {
    let Some(player) = require_player(ctx, command, bot, guild_id).await? else {
        return Ok(());
    };

    player.shuffle();
    let embed = embeds::create_success_embed("Cola mezclada", "🔀 Las próximas canciones se mezclaron");
    respond_embed(ctx, command, embed).await
}

async fn handle_clear(ctx: &Context, command: &CommandInteraction, bot: &MusicBot, guild_id: GuildId) -> Result<()> {
    let Some(player) = require_player(ctx, command, bot, guild_id).await? else {
        return Ok(());
    };

    player.clear_queue();
    let embed = embeds::create_success_embed("Cola limpiada", "🗑️ Solo queda la canción actual");
    respond_embed(ctx, command, embed).await
}

async fn handle_dedup(ctx: &Context, command: &CommandInteraction, bot: &MusicBot, guild_id: GuildId) -> Result<()> {
    let Some(player) = require_player(ctx, command, bot, guild_id).await? else {
        return Ok(());
    };

    let removed = player.remove_duplicates();
    let description = format!("🧹 {} duplicados eliminados", removed);
    respond_embed(ctx, command, embeds::create_success_embed("Duplicados eliminados", &description)).await
}

async fn handle_remove(ctx: &Context, command: &CommandInteraction, bot: &MusicBot, guild_id: GuildId) -> Result<()> {
    let Some(player) = require_player(ctx, command, bot, guild_id).await? else {
        return Ok(());
    };

    let position = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "position")
        .and_then(|opt| opt.value.as_i64())
        .and_then(|p| usize::try_from(p).ok())
        .ok_or_else(|| anyhow::anyhow!("Posición inválida"))?;

    let queue = player.queue();
    let removed = upcoming_video_id(&queue, player.is_playing(), position)
        .and_then(|video_id| player.remove_item(&video_id));

    match removed {
        Some(item) => respond(ctx, command, format!("🗑️ Eliminado: **{}**", item.title())).await,
        None => respond_ephemeral(ctx, command, format!("❌ No hay canción en la posición {}", position)).await,
    }
}

async fn handle_loop(ctx: &Context, command: &CommandInteraction, bot: &MusicBot, guild_id: GuildId) -> Result<()> {
    let Some(player) = require_player(ctx, command, bot, guild_id).await? else {
        return Ok(());
    };

    let mode = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "mode")
        .and_then(|opt| opt.value.as_str())
        .and_then(parse_loop_mode)
        .ok_or_else(|| anyhow::anyhow!("Modo de repetición inválido"))?;

    player.set_loop_mode(mode);
    let description = format!("🔁 Repetición: {}", embeds::loop_label(mode));
    respond_embed(ctx, command, embeds::create_info_embed("Modo de repetición", &description)).await
}

async fn handle_queue(ctx: &Context, command: &CommandInteraction, bot: &MusicBot, guild_id: GuildId) -> Result<()> {
    let Some(player) = require_player(ctx, command, bot, guild_id).await? else {
        return Ok(());
    };

    let queue = player.queue();
    let now_playing = player.now_playing();
    let embed = embeds::create_queue_embed(
        &queue,
        now_playing.as_ref(),
        player.loop_mode(),
        player.total_duration(),
    );

    respond_embed(ctx, command, embed).await
}

async fn handle_nowplaying(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(player) = require_player(ctx, command, bot, guild_id).await? else {
        return Ok(());
    };

    match player.now_playing() {
        Some(current) => respond_embed(ctx, command, embeds::create_now_playing_embed(&current)).await,
        None => respond_ephemeral(ctx, command, "❌ No hay nada reproduciéndose").await,
    }
}

async fn handle_leave(ctx: &Context, command: &CommandInteraction, bot: &MusicBot, guild_id: GuildId) -> Result<()> {
    if bot.exit(guild_id).await? {
        respond(ctx, command, "👋 Desconectado del canal de voz").await
    } else {
        respond_ephemeral(ctx, command, "❌ No estoy en un canal de voz").await
    }
}

/// Reproductor de la guild, o una respuesta de error si no existe
async fn require_player(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<Option<Arc<MusicPlayer>>> {
    let player = bot.player(guild_id);
    if player.is_none() {
        respond_ephemeral(ctx, command, "❌ No estoy reproduciendo nada en este servidor").await?;
    }
    Ok(player)
}

async fn respond(ctx: &Context, command: &CommandInteraction, content: impl Into<String>) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(CreateInteractionResponseMessage::new().content(content)),
        )
        .await?;
    Ok(())
}

async fn respond_ephemeral(ctx: &Context, command: &CommandInteraction, content: impl Into<String>) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(content)
                    .ephemeral(true),
            ),
        )
        .await?;
    Ok(())
}

async fn respond_embed(ctx: &Context, command: &CommandInteraction, embed: CreateEmbed) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(CreateInteractionResponseMessage::new().embed(embed)),
        )
        .await?;
    Ok(())
}

/// Nombre con el que se registra quién pidió una canción: `Nick (usuario#id)`
pub fn requester_label(nick: Option<&str>, username: &str, user_id: UserId) -> String {
    format!("{} ({}#{})", nick.unwrap_or(username), username, user_id)
}

pub fn parse_loop_mode(value: &str) -> Option<LoopMode> {
    match value {
        "off" => Some(LoopMode::Off),
        "track" => Some(LoopMode::Track),
        "queue" => Some(LoopMode::Queue),
        _ => None,
    }
}

/// Id del item en la posición `position` (desde 1) de las próximas canciones.
///
/// While a loop is running the head is the song playing now and is not
/// counted.
fn upcoming_video_id(queue: &[QueueItem], playing: bool, position: usize) -> Option<String> {
    let offset = usize::from(playing);
    position
        .checked_sub(1)
        .and_then(|index| queue.get(index + offset))
        .map(|item| item.video_id().to_string())
}

fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Result<ChannelId> {
    let guild = guild_id
        .to_guild_cached(&ctx.cache)
        .ok_or_else(|| anyhow::anyhow!("Guild no encontrada en caché"))?;

    let channel_id = guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
        .ok_or_else(|| anyhow::anyhow!("Debes estar en un canal de voz"))?;

    Ok(channel_id)
}
