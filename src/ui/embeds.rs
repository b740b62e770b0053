use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::fmt::Write as _;
use std::time::Duration;

use crate::audio::queue::{LoopMode, PlaylistInfo, QueueItem};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Ramiel Music";

/// Máximo de canciones listadas en el embed de la cola
const QUEUE_PREVIEW: usize = 10;

pub fn create_now_playing_embed(item: &QueueItem) -> CreateEmbed {
    let artist = item
        .metadata()
        .and_then(|m| m.uploader.clone())
        .unwrap_or_else(|| "Desconocido".to_string());

    let mut embed = CreateEmbed::default()
        .title("🎵 Reproduciendo Ahora")
        .description(format!("**{}**", item.title()))
        .color(colors::SUCCESS_GREEN)
        .field("🎤 Artista", artist, true);

    embed = match item.duration() {
        Some(duration) => embed.field("⏱️ Duración", format_duration(duration), true),
        None => embed.field("⏱️ Duración", "🔴 En vivo", true),
    };

    embed = embed.field("👤 Solicitado por", &item.requested_by, true);

    if let Some(thumbnail) = item.metadata().and_then(|m| m.thumbnail.as_deref()) {
        embed = embed.thumbnail(thumbnail);
    }

    embed
        .url(&item.url)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para una canción agregada a la cola
pub fn create_track_added_embed(item: &QueueItem, position: usize) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("➕ Agregado a la Cola")
        .description(format!("**{}**", item.title()))
        .color(colors::INFO_BLUE)
        .field("📍 Posición", position.to_string(), true);

    if let Some(duration) = item.duration() {
        embed = embed.field("⏱️ Duración", format_duration(duration), true);
    }

    if let Some(thumbnail) = item.metadata().and_then(|m| m.thumbnail.as_deref()) {
        embed = embed.thumbnail(thumbnail);
    }

    embed
        .url(&item.url)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para una playlist agregada
pub fn create_playlist_added_embed(playlist: &PlaylistInfo) -> CreateEmbed {
    let title = playlist.title.as_deref().unwrap_or("Playlist");

    CreateEmbed::default()
        .title("📋 Playlist Agregada")
        .description(format!("**{}**\n{} canciones agregadas", title, playlist.items.len()))
        .color(colors::MUSIC_PURPLE)
        .field("👤 Solicitado por", &playlist.requested_by, true)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn create_queue_embed(
    queue: &[QueueItem],
    now_playing: Option<&QueueItem>,
    loop_mode: LoopMode,
    total: Duration,
) -> CreateEmbed {
    CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .description(queue_description(queue, now_playing, loop_mode, total))
        .color(colors::MUSIC_PURPLE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Texto de la cola: canción actual, próximas canciones y resumen.
///
/// While something is playing it sits at the head of `queue`, so the
/// upcoming list starts after it.
pub fn queue_description(
    queue: &[QueueItem],
    now_playing: Option<&QueueItem>,
    loop_mode: LoopMode,
    total: Duration,
) -> String {
    if queue.is_empty() {
        return "La cola está vacía".to_string();
    }

    let mut text = String::new();

    let upcoming = match now_playing {
        Some(current) => {
            let _ = writeln!(text, "**🎵 Reproduciendo:**\n{}\n", describe_item(current));
            &queue[1..]
        }
        None => queue,
    };

    if !upcoming.is_empty() {
        text.push_str("**📝 Próximas canciones:**\n");
        for (index, item) in upcoming.iter().take(QUEUE_PREVIEW).enumerate() {
            let _ = writeln!(text, "`{}.` {}", index + 1, describe_item(item));
        }
        if upcoming.len() > QUEUE_PREVIEW {
            let _ = writeln!(text, "... y {} más", upcoming.len() - QUEUE_PREVIEW);
        }
        text.push('\n');
    }

    let _ = write!(
        text,
        "**Total:** {} canciones • {} • 🔁 {}",
        queue.len(),
        format_duration(total),
        loop_label(loop_mode)
    );

    text
}

fn describe_item(item: &QueueItem) -> String {
    match item.duration() {
        Some(duration) => format!("{} [{}] - {}", item.title(), format_duration(duration), item.requested_by),
        None => format!("{} - {}", item.title(), item.requested_by),
    }
}

pub fn loop_label(mode: LoopMode) -> &'static str {
    match mode {
        LoopMode::Off => "Desactivado",
        LoopMode::Track => "Canción",
        LoopMode::Queue => "Cola",
    }
}

pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn create_success_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("✅ {}", title))
        .description(description)
        .color(colors::SUCCESS_GREEN)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn create_info_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("ℹ️ {}", title))
        .description(description)
        .color(colors::INFO_BLUE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Formatea una duración como `H:MM:SS` o `M:SS`
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}
