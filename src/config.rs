use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Cola
    pub max_queue_size: usize,
    pub max_playlist_size: usize,

    // Reproducción
    pub signal_timeout: Duration,

    // Resolvedor de metadata
    pub ytdlp_path: String,
    pub resolve_timeout: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_lookup(|key| std::env::var(key).ok())?;

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Builds the configuration from any key lookup (the environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let var = |key: &str, default: String| lookup(key).filter(|v| !v.trim().is_empty()).unwrap_or(default);

        Ok(Self {
            // Discord
            discord_token: lookup("DISCORD_TOKEN").context("DISCORD_TOKEN no definido")?,
            application_id: lookup("APPLICATION_ID")
                .context("APPLICATION_ID no definido")?
                .parse()
                .context("APPLICATION_ID inválido")?,
            guild_id: lookup("GUILD_ID").and_then(|s| s.parse().ok()),

            // Cola
            max_queue_size: var("MAX_QUEUE_SIZE", defaults.max_queue_size.to_string())
                .parse()
                .context("MAX_QUEUE_SIZE inválido")?,
            max_playlist_size: var("MAX_PLAYLIST_SIZE", defaults.max_playlist_size.to_string())
                .parse()
                .context("MAX_PLAYLIST_SIZE inválido")?,

            // Reproducción
            signal_timeout: Duration::from_millis(
                var("SIGNAL_TIMEOUT_MS", defaults.signal_timeout.as_millis().to_string())
                    .parse()
                    .context("SIGNAL_TIMEOUT_MS inválido")?,
            ),

            // Resolvedor
            ytdlp_path: var("YTDLP_PATH", defaults.ytdlp_path),
            resolve_timeout: Duration::from_secs(
                var("RESOLVE_TIMEOUT_SECS", defaults.resolve_timeout.as_secs().to_string())
                    .parse()
                    .context("RESOLVE_TIMEOUT_SECS inválido")?,
            ),
        })
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Queue and playlist limits must be greater than 0
    /// - A playlist can never be larger than the whole queue
    /// - Timeouts must be non-zero
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("DISCORD_TOKEN está vacío");
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.max_playlist_size == 0 {
            anyhow::bail!("Max playlist size must be greater than 0");
        }

        if self.max_playlist_size > self.max_queue_size {
            anyhow::bail!(
                "Max playlist size ({}) cannot exceed max queue size ({})",
                self.max_playlist_size,
                self.max_queue_size
            );
        }

        if self.signal_timeout.is_zero() {
            anyhow::bail!("Signal timeout must be greater than 0");
        }

        if self.resolve_timeout.is_zero() {
            anyhow::bail!("Resolve timeout must be greater than 0");
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// The Discord token is never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Limits: {} queue, {} per playlist\n  \
            Timeouts: {}ms signals, {}s resolver ({})",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            self.max_queue_size,
            self.max_playlist_size,
            self.signal_timeout.as_millis(),
            self.resolve_timeout.as_secs(),
            self.ytdlp_path,
        )
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            max_queue_size: 1000,
            max_playlist_size: 100,

            signal_timeout: Duration::from_secs(5),

            ytdlp_path: "yt-dlp".to_string(),
            resolve_timeout: Duration::from_secs(30),
        }
    }
}
