use anyhow::Result;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // YouTube Data API v3
    pub youtube_api_key: String,
    pub max_results: usize,

    // Cola
    pub max_queue_size: usize,

    // Pipeline de audio
    pub fetch_program: String,
    pub transcode_program: String,
    pub opus_bitrate: u32,
    pub frame_buffer: usize,
    pub startup_timeout: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN")?,
            application_id: std::env::var("APPLICATION_ID")?.parse()?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            // YouTube
            youtube_api_key: std::env::var("YOUTUBE_API_KEY")?,
            max_results: std::env::var("MAX_RESULTS")
                .unwrap_or_else(|_| "25".to_string()) // Límite del menú de selección de Discord
                .parse()?,

            max_queue_size: std::env::var("MAX_QUEUE_SIZE")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()?,

            // Pipeline
            fetch_program: std::env::var("FETCH_PROGRAM").unwrap_or_else(|_| "yt-dlp".to_string()),
            transcode_program: std::env::var("TRANSCODE_PROGRAM")
                .unwrap_or_else(|_| "ffmpeg".to_string()),
            opus_bitrate: std::env::var("OPUS_BITRATE")
                .unwrap_or_else(|_| "96000".to_string()) // 96kbps (Discord default)
                .parse()?,
            frame_buffer: std::env::var("FRAME_BUFFER")
                .unwrap_or_else(|_| "16".to_string()) // ~320ms a 20ms por frame
                .parse()?,
            startup_timeout: Duration::from_secs(
                std::env::var("STARTUP_TIMEOUT")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()?,
            ),
        };

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Opus bitrate must be between 8kbps and 510kbps (Discord limits)
    /// - `max_results` must fit a Discord select menu (1..=25)
    /// - Queue size and frame buffer must be greater than 0
    /// - Program names must not be empty
    pub fn validate(&self) -> Result<()> {
        if self.opus_bitrate > 510000 {
            anyhow::bail!("Opus bitrate cannot exceed 510kbps, got: {}", self.opus_bitrate);
        }

        if self.opus_bitrate < 8000 {
            anyhow::bail!("Opus bitrate too low, minimum 8kbps, got: {}", self.opus_bitrate);
        }

        if self.max_results == 0 || self.max_results > 25 {
            anyhow::bail!("Max results must be between 1 and 25, got: {}", self.max_results);
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.frame_buffer == 0 {
            anyhow::bail!("Frame buffer must be greater than 0");
        }

        if self.startup_timeout.is_zero() {
            anyhow::bail!("Startup timeout must be greater than 0");
        }

        if self.fetch_program.trim().is_empty() || self.transcode_program.trim().is_empty() {
            anyhow::bail!("Fetch and transcode programs must be set");
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Excludes tokens and API keys.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Search: {} results\n  \
            Queue: {} max items\n  \
            Pipeline: {} | {} @ {}kbps, {} frames buffered, {} startup timeout",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            self.max_results,
            self.max_queue_size,
            self.fetch_program,
            self.transcode_program,
            self.opus_bitrate / 1000,
            self.frame_buffer,
            humantime::format_duration(self.startup_timeout),
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            youtube_api_key: String::new(),
            max_results: 25,

            max_queue_size: 1000,

            fetch_program: "yt-dlp".to_string(),
            transcode_program: "ffmpeg".to_string(),
            opus_bitrate: 96000,
            frame_buffer: 16,
            startup_timeout: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_values() {
        let config = Config { opus_bitrate: 600_000, ..Config::default() };
        assert!(config.validate().is_err());

        let config = Config { max_results: 26, ..Config::default() };
        assert!(config.validate().is_err());

        let config = Config { frame_buffer: 0, ..Config::default() };
        assert!(config.validate().is_err());

        let config = Config { fetch_program: "  ".to_string(), ..Config::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn summary_hides_secrets() {
        let config = Config {
            discord_token: "super-secret-token".to_string(),
            youtube_api_key: "super-secret-key".to_string(),
            ..Config::default()
        };
        let summary = config.summary();

        assert!(!summary.contains("super-secret"));
        assert!(summary.contains("yt-dlp | ffmpeg @ 96kbps"));
        assert!(summary.contains("30s startup timeout"));
    }
}
