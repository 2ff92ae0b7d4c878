use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr, time::Duration};

use crate::audio::{engine::EngineOptions, repeat::RepeatPolicy};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    #[serde(skip_serializing, default)]
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Audio
    pub default_volume: f32,
    /// `0` means unbounded.
    pub max_queue_size: usize,
    pub now_playing_interval: Duration,

    // Reproducción
    pub skip_suppresses_track_repeat: bool,
    pub max_start_failures: u32,

    // yt-dlp
    pub resolver_concurrency: usize,
    pub ytdlp_path: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup (the environment in
    /// production, a map in tests) and validates it.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let now_playing_interval = match var("NOW_PLAYING_INTERVAL") {
            Some(raw) => humantime::parse_duration(raw.trim())
                .map_err(|e| anyhow!("NOW_PLAYING_INTERVAL inválido ('{}'): {}", raw, e))?,
            None => defaults.now_playing_interval,
        };

        let config = Self {
            // Discord
            discord_token: var("DISCORD_TOKEN").ok_or_else(|| anyhow!("DISCORD_TOKEN no definido"))?,
            application_id: parse(
                "APPLICATION_ID",
                var("APPLICATION_ID").ok_or_else(|| anyhow!("APPLICATION_ID no definido"))?,
            )?,
            guild_id: var("GUILD_ID").map(|raw| parse("GUILD_ID", raw)).transpose()?,

            // Audio
            default_volume: parse_or(var("DEFAULT_VOLUME"), "DEFAULT_VOLUME", defaults.default_volume)?,
            max_queue_size: parse_or(var("MAX_QUEUE_SIZE"), "MAX_QUEUE_SIZE", defaults.max_queue_size)?,
            now_playing_interval,

            // Reproducción
            skip_suppresses_track_repeat: parse_or(
                var("SKIP_SUPPRESSES_TRACK_REPEAT"),
                "SKIP_SUPPRESSES_TRACK_REPEAT",
                defaults.skip_suppresses_track_repeat,
            )?,
            max_start_failures: parse_or(
                var("MAX_START_FAILURES"),
                "MAX_START_FAILURES",
                defaults.max_start_failures,
            )?,

            // yt-dlp
            resolver_concurrency: parse_or(
                var("RESOLVER_CONCURRENCY"),
                "RESOLVER_CONCURRENCY",
                defaults.resolver_concurrency,
            )?,
            ytdlp_path: var("YTDLP_PATH").unwrap_or(defaults.ytdlp_path),
        };

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Volume must be between 0.0 and 2.0
    /// - The now-playing interval must be at least one second
    /// - At least one start attempt and one concurrent resolution
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("DISCORD_TOKEN no puede estar vacío");
        }

        if !(0.0..=2.0).contains(&self.default_volume) {
            anyhow::bail!("Default volume must be between 0.0 and 2.0, got: {}", self.default_volume);
        }

        if self.now_playing_interval < Duration::from_secs(1) {
            anyhow::bail!(
                "Now playing interval must be at least 1s, got: {}",
                humantime::format_duration(self.now_playing_interval)
            );
        }

        if self.max_start_failures == 0 {
            anyhow::bail!("Max start failures must be greater than 0");
        }

        if self.resolver_concurrency == 0 {
            anyhow::bail!("Resolver concurrency must be greater than 0");
        }

        Ok(())
    }

    /// `None` when the queue is unbounded.
    pub fn queue_limit(&self) -> Option<usize> {
        (self.max_queue_size > 0).then_some(self.max_queue_size)
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            repeat: RepeatPolicy {
                skip_suppresses_track_repeat: self.skip_suppresses_track_repeat,
            },
            max_start_failures: self.max_start_failures,
        }
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Excludes the token.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Audio: {}% vol, now playing cada {}\n  \
            Limits: {} queue, {} start failures\n  \
            Repeat: skip suppresses track repeat={}\n  \
            yt-dlp: {} ({} concurrent)",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            (self.default_volume * 100.0) as u32,
            humantime::format_duration(self.now_playing_interval),
            self.queue_limit().map_or("unbounded".to_string(), |max| max.to_string()),
            self.max_start_failures,
            self.skip_suppresses_track_repeat,
            self.ytdlp_path,
            self.resolver_concurrency
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

            // Audio defaults
            default_volume: 0.5,
            max_queue_size: 1000,
            now_playing_interval: Duration::from_secs(5),

            // Playback defaults
            skip_suppresses_track_repeat: true,
            max_start_failures: 2,

            // yt-dlp defaults
            resolver_concurrency: 3,
            ytdlp_path: "yt-dlp".to_string(),
        }
    }
}

fn parse<T>(key: &str, raw: String) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim()
        .parse()
        .map_err(|e| anyhow!("{} inválido ('{}'): {}", key, raw, e))
}

fn parse_or<T>(raw: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    raw.map_or(Ok(default), |raw| parse(key, raw))
}
