use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};

use crate::error::VoiceError;

/// The gateway capability the player needs: joining a voice channel.
#[async_trait]
pub trait VoiceGateway: Send + Sync {
    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<Box<dyn VoiceConnection>, VoiceError>;
}

/// Handle on a joined voice channel.
#[async_trait]
pub trait VoiceConnection: Send + Sync {
    async fn disconnect(&self) -> Result<(), VoiceError>;
}
