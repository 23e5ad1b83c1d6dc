//! Centralized configuration for Clipforge.
//!
//! All tunable parameters live here to avoid hard-coded values scattered
//! throughout the codebase. Environment variables override the defaults at
//! runtime.

use std::path::PathBuf;
use std::time::Duration;

/// Central configuration for all Clipforge components.
#[derive(Debug, Clone, Default)]
pub struct ClipforgeConfig {
    pub tools: ToolsConfig,
    pub storage: StorageConfig,
    pub server: ServerConfig,
}

/// External tool invocation settings.
///
/// Controls which binaries are invoked, the wall-clock budget each invocation
/// gets, and the fixed request headers passed to the fetch tool.
#[derive(Debug, Clone)]
pub struct ToolsConfig {
    /// Fetch tool binary (resolves and downloads remote streams)
    pub fetch_bin: String,
    /// Transcode tool binary (re-encodes audio)
    pub transcode_bin: String,
    /// Wall-clock limit for a single fetch invocation
    pub fetch_timeout: Duration,
    /// Wall-clock limit for a single metadata query
    pub metadata_timeout: Duration,
    /// Wall-clock limit for a single transcode invocation
    pub transcode_timeout: Duration,
    /// URL prefix the source id is appended to
    pub watch_url_base: String,
    /// Referer header override for fetch requests
    pub referer_header: String,
    /// User-agent header override for fetch requests
    pub user_agent_header: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            fetch_bin: "yt-dlp".to_string(),
            transcode_bin: "ffmpeg".to_string(),
            fetch_timeout: Duration::from_secs(300),
            metadata_timeout: Duration::from_secs(60),
            transcode_timeout: Duration::from_secs(180),
            watch_url_base: "https://www.youtube.com/watch?v=".to_string(),
            referer_header: "referer:youtube.com".to_string(),
            user_agent_header: "user-agent:Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
                                AppleWebKit/537.36"
                .to_string(),
        }
    }
}

/// Scratch directory and artifact retention settings.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Shared scratch directory for in-flight and completed artifacts.
    ///
    /// A dedicated subdirectory of the system temp location, so sweeps never
    /// touch other applications' files.
    pub scratch_dir: PathBuf,
    /// How long an unclaimed artifact is kept before automatic deletion
    pub retention: Duration,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            scratch_dir: std::env::temp_dir().join("clipforge"),
            retention: Duration::from_secs(300), // 5 minutes
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind
    pub host: String,
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl ClipforgeConfig {
    /// Creates configuration with environment variable overrides.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(bin) = std::env::var("CLIPFORGE_FETCH_BIN") {
            config.tools.fetch_bin = bin;
        }

        if let Ok(bin) = std::env::var("CLIPFORGE_TRANSCODE_BIN") {
            config.tools.transcode_bin = bin;
        }

        if let Ok(timeout) = std::env::var("CLIPFORGE_FETCH_TIMEOUT") {
            if let Ok(seconds) = timeout.parse::<u64>() {
                config.tools.fetch_timeout = Duration::from_secs(seconds);
            }
        }

        if let Ok(dir) = std::env::var("CLIPFORGE_SCRATCH_DIR") {
            config.storage.scratch_dir = PathBuf::from(dir);
        }

        if let Ok(retention) = std::env::var("CLIPFORGE_RETENTION_SECS") {
            if let Ok(seconds) = retention.parse::<u64>() {
                config.storage.retention = Duration::from_secs(seconds);
            }
        }

        if let Ok(port) = std::env::var("CLIPFORGE_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                config.server.port = port;
            }
        }

        config
    }

    /// Creates a configuration suited for tests: short timeouts and a short
    /// retention window so expiry races can be exercised quickly.
    pub fn for_testing() -> Self {
        let mut config = Self::default();
        config.tools.fetch_timeout = Duration::from_secs(5);
        config.tools.metadata_timeout = Duration::from_secs(5);
        config.tools.transcode_timeout = Duration::from_secs(5);
        config.storage.retention = Duration::from_millis(200);
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = ClipforgeConfig::default();

        assert_eq!(config.tools.fetch_bin, "yt-dlp");
        assert_eq!(config.tools.transcode_bin, "ffmpeg");
        assert_eq!(config.storage.retention, Duration::from_secs(300));
        assert_eq!(config.server.port, 3000);
        assert!(config.storage.scratch_dir.ends_with("clipforge"));
    }

    #[test]
    fn test_testing_preset_shortens_retention() {
        let config = ClipforgeConfig::for_testing();

        assert!(config.storage.retention < Duration::from_secs(1));
        assert_eq!(config.tools.fetch_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_env_override() {
        unsafe {
            std::env::set_var("CLIPFORGE_FETCH_BIN", "yt-dlp-nightly");
            std::env::set_var("CLIPFORGE_RETENTION_SECS", "60");
            std::env::set_var("CLIPFORGE_PORT", "8080");
        }

        let config = ClipforgeConfig::from_env();

        assert_eq!(config.tools.fetch_bin, "yt-dlp-nightly");
        assert_eq!(config.storage.retention, Duration::from_secs(60));
        assert_eq!(config.server.port, 8080);

        // Cleanup
        unsafe {
            std::env::remove_var("CLIPFORGE_FETCH_BIN");
            std::env::remove_var("CLIPFORGE_RETENTION_SECS");
            std::env::remove_var("CLIPFORGE_PORT");
        }
    }
}
