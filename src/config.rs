use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Registers commands on a single guild when set

    // Playback
    pub default_volume: f32,
    pub max_queue_size: usize,
    pub queue_preview_limit: usize,

    // Extraction
    pub ytdlp_path: String,
    pub allow_playlists: bool,
    pub max_playlist_size: usize,
    #[serde(with = "humantime_serde_compat")]
    pub extraction_timeout: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN")?,
            application_id: std::env::var("APPLICATION_ID")?.parse()?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            // Playback
            default_volume: std::env::var("DEFAULT_VOLUME")
                .unwrap_or_else(|_| "0.5".to_string())
                .parse()?,
            max_queue_size: std::env::var("MAX_QUEUE_SIZE")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()?,
            queue_preview_limit: std::env::var("QUEUE_PREVIEW_LIMIT")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,

            // Extraction
            ytdlp_path: std::env::var("YTDLP_PATH").unwrap_or_else(|_| "yt-dlp".to_string()),
            allow_playlists: std::env::var("ALLOW_PLAYLISTS")
                .unwrap_or_else(|_| "false".to_string())
                .parse()?,
            max_playlist_size: std::env::var("MAX_PLAYLIST_SIZE")
                .unwrap_or_else(|_| "100".to_string())
                .parse()?,
            extraction_timeout: humantime::parse_duration(
                &std::env::var("EXTRACTION_TIMEOUT").unwrap_or_else(|_| "60s".to_string()),
            )?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Volume must be between 0.0 and 2.0
    /// - Queue and playlist limits must be greater than 0
    /// - The queue preview must fit in one embed (1 to 25 entries)
    /// - The extraction timeout must be non-zero
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.default_volume) {
            anyhow::bail!("Default volume must be between 0.0 and 2.0, got: {}", self.default_volume);
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.max_playlist_size == 0 {
            anyhow::bail!("Max playlist size must be greater than 0");
        }

        if !(1..=25).contains(&self.queue_preview_limit) {
            anyhow::bail!(
                "Queue preview limit must be between 1 and 25, got: {}",
                self.queue_preview_limit
            );
        }

        if self.extraction_timeout.is_zero() {
            anyhow::bail!("Extraction timeout must be greater than 0");
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    /// The token is never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Playback: {}% vol, {} max queue, {} preview\n  \
            Extraction: {} (playlists={}, max {}), {} timeout",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            (self.default_volume * 100.0) as u32,
            self.max_queue_size,
            self.queue_preview_limit,
            self.ytdlp_path,
            self.allow_playlists,
            self.max_playlist_size,
            humantime::format_duration(self.extraction_timeout),
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

            default_volume: 0.5,
            max_queue_size: 1000,
            queue_preview_limit: 10,

            ytdlp_path: "yt-dlp".to_string(),
            allow_playlists: false,
            max_playlist_size: 100,
            extraction_timeout: Duration::from_secs(60),
        }
    }
}

/// Serializes durations in humantime form ("1m 30s").
mod humantime_serde_compat {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}
