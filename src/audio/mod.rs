//! # Audio Module
//!
//! Queue and playback orchestration for one voice session.
//!
//! ## Architecture
//!
//! ### [`queue`] - Queue Management
//! - Ordered queue of [`queue::QueueItem`]s, FIFO unless explicitly reordered
//! - Dedup by video id, shuffle with an injected random source
//! - Explicit `Pending -> Resolved` metadata transition
//!
//! ### [`player`] - Playback Controller
//! - One playback loop per player, started by [`player::MusicPlayer::play`]
//! - Waits on track-ended, skip and replay; routes finished tracks through
//!   the loop-queue / loop-song flags
//! - Pause, resume, exit and read-only queue snapshots
//!
//! ### [`signal`] - Skip/Replay Mailboxes
//! - Capacity-one mailboxes with a send timeout instead of a blocking hand-off
//!
//! ### [`backend`] / [`voice`] - External Contracts
//! - The audio backend (play, pause, seek, track-ended events)
//! - Voice channel join/leave
//! - [`songbird_backend`] implements both on top of Songbird
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use ramiel_music::audio::{player::{MusicPlayer, PlayerSettings}, songbird_backend::SongbirdVoice};
//! use ramiel_music::sources::YtDlpResolver;
//! use serenity::all::{ChannelId, GuildId};
//! use std::sync::Arc;
//!
//! # async fn example(manager: Arc<songbird::Songbird>) -> anyhow::Result<()> {
//! let voice = SongbirdVoice::new(manager, reqwest::Client::new());
//! let player = MusicPlayer::connect(
//!     &voice,
//!     &voice,
//!     GuildId::new(123456789),
//!     ChannelId::new(987654321),
//!     Arc::new(YtDlpResolver::default()),
//!     PlayerSettings::default(),
//! )
//! .await?;
//!
//! player.add_song("https://www.youtube.com/watch?v=dQw4w9WgXcQ", "alguien").await?;
//! player.play().await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod player;
pub mod queue;
pub mod signal;
pub mod songbird_backend;
pub mod voice;
