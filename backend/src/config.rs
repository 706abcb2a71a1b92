//! Configuration management.

use crate::cast::manager::ManagerSettings;
use crate::cast::playback::PlaybackSettings;
use crate::cast::pool::PoolSettings;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration structure that matches the TOML file format.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    server: ServerSection,
    #[serde(default)]
    media: MediaSection,
    #[serde(default)]
    device: DeviceSection,
    #[serde(default)]
    discovery: DiscoverySection,
    #[serde(default)]
    connection: ConnectionSection,
    #[serde(default)]
    playback: PlaybackSection,
    #[serde(default)]
    broadcast: BroadcastSection,
    #[serde(default)]
    breaker: BreakerSection,
    #[serde(default)]
    logging: LoggingSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct ServerSection {
    port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        ServerSection {
            port: minaret_types::DEFAULT_PORT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct MediaSection {
    /// Directory the announcement files are served from.
    path: Option<PathBuf>,
    /// Overrides the derived `http://<local-ip>:<port>` media base URL.
    base_url: Option<String>,
    regular_file: String,
    fajr_file: String,
    content_type: String,
}

impl Default for MediaSection {
    fn default() -> Self {
        MediaSection {
            path: None,
            base_url: None,
            regular_file: "azan.mp3".to_string(),
            fajr_file: "azan_fajr.mp3".to_string(),
            content_type: "audio/mpeg".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct DeviceSection {
    primary_name: String,
    /// Model names tried in order when the primary device is absent.
    fallback_models: Vec<String>,
}

impl Default for DeviceSection {
    fn default() -> Self {
        DeviceSection {
            primary_name: "Adahn".to_string(),
            fallback_models: vec![
                "Google Nest Mini".to_string(),
                "Google Nest Hub".to_string(),
                "Google Home".to_string(),
                "Google Home Mini".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoverySection {
    pub cooldown_secs: u64,
    pub timeout_secs: u64,
    /// Background refresh interval; 0 disables the refresh loop.
    pub refresh_interval_secs: u64,
    /// `host[:port]` entries probed when mDNS finds nothing.
    pub static_hosts: Vec<String>,
}

impl Default for DiscoverySection {
    fn default() -> Self {
        DiscoverySection {
            cooldown_secs: 30,
            timeout_secs: 8,
            refresh_interval_secs: 0,
            static_hosts: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSection {
    pub cache_ttl_secs: u64,
    pub probe_timeout_secs: u64,
    pub handshake_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_delay_secs: u64,
    pub health_check_interval_secs: u64,
}

impl Default for ConnectionSection {
    fn default() -> Self {
        ConnectionSection {
            cache_ttl_secs: 300,
            probe_timeout_secs: 3,
            handshake_timeout_secs: 10,
            max_retries: 3,
            retry_delay_secs: 2,
            health_check_interval_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackSection {
    pub max_retries: u32,
    pub retry_delay_secs: u64,
    pub load_max_attempts: u32,
    pub initial_wait_ms: u64,
    pub short_wait_secs: u64,
    pub medium_wait_secs: u64,
    pub long_wait_secs: u64,
    pub stop_wait_ms: u64,
    pub restart_wait_secs: u64,
    pub consecutive_threshold: u32,
    pub idle_concern_threshold: u32,
}

impl Default for PlaybackSection {
    fn default() -> Self {
        PlaybackSection {
            max_retries: 2,
            retry_delay_secs: 2,
            load_max_attempts: 15,
            initial_wait_ms: 500,
            short_wait_secs: 1,
            medium_wait_secs: 2,
            long_wait_secs: 3,
            stop_wait_ms: 1500,
            restart_wait_secs: 1,
            consecutive_threshold: 2,
            idle_concern_threshold: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct BroadcastSection {
    ttl_secs: u64,
}

impl Default for BroadcastSection {
    fn default() -> Self {
        BroadcastSection { ttl_secs: 480 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerSection {
    pub failure_threshold: u32,
    pub recovery_timeout_secs: u64,
}

impl Default for BreakerSection {
    fn default() -> Self {
        BreakerSection {
            failure_threshold: 5,
            recovery_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct LoggingSection {
    /// Path to log file (if set, logs will be written to file in addition to stdout)
    log_file: Option<PathBuf>,
    /// Log level (trace, debug, info, warn, error)
    /// If not set, uses RUST_LOG environment variable or defaults to "info"
    log_level: Option<String>,
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port the HTTP server (API + media files) listens on
    pub port: u16,
    /// Directory the announcement media files are served from
    pub media_path: PathBuf,
    pub media_base_url: Option<String>,
    pub regular_media: String,
    pub fajr_media: String,
    pub content_type: String,
    pub primary_device: String,
    pub fallback_models: Vec<String>,
    pub discovery: DiscoverySection,
    pub connection: ConnectionSection,
    pub playback: PlaybackSection,
    pub broadcast_ttl_secs: u64,
    pub breaker: BreakerSection,
    /// Path to log file (if set, logs will be written to file in addition to stdout)
    pub log_file: Option<PathBuf>,
    /// Log level (if set, overrides RUST_LOG environment variable)
    pub log_level: Option<String>,
}

impl Config {
    /// Load configuration with full priority chain: CLI args > env vars > config files > defaults.
    ///
    /// Config files are searched in this order:
    /// 1. `.minaret.toml` in current directory
    /// 2. `config.toml` in user config directory (~/.config/minaret/ on Linux)
    pub fn from_figment(
        port: Option<u16>,
        media_path: Option<PathBuf>,
        primary_device: Option<String>,
        media_base_url: Option<String>,
    ) -> anyhow::Result<Self> {
        // Find config file paths
        let local_config = std::env::current_dir()
            .ok()
            .map(|d| d.join(".minaret.toml"));
        let user_config = directories::ProjectDirs::from("", "", "minaret")
            .map(|dirs| dirs.config_dir().join("config.toml"));

        // Build figment with priority: defaults < user config < local config < env vars < CLI args
        let mut figment = Figment::new();

        // 1. Start with defaults
        figment = figment.merge(Serialized::defaults(ConfigFile::default()));

        // 2. Merge user config file if it exists
        if let Some(ref path) = user_config {
            if path.exists() {
                figment = figment.merge(Toml::file(path));
            }
        }

        // 3. Merge local config file if it exists
        if let Some(ref path) = local_config {
            if path.exists() {
                figment = figment.merge(Toml::file(path));
            }
        }

        // 4. Merge environment variables (MINARET_* prefix)
        figment = figment.merge(
            Env::prefixed("MINARET_")
                .map(|key| key.as_str().replace("__", ".").into())
                .split("_"),
        );

        // 5. Merge CLI arguments (highest priority)
        if let Some(p) = port {
            figment = figment.merge(Serialized::default("server.port", p));
        }
        if let Some(ref mp) = media_path {
            figment = figment.merge(Serialized::default("media.path", mp));
        }
        if let Some(ref name) = primary_device {
            figment = figment.merge(Serialized::default("device.primary_name", name));
        }
        if let Some(ref base) = media_base_url {
            figment = figment.merge(Serialized::default("media.base_url", base));
        }

        let config_file: ConfigFile = figment.extract()?;
        Ok(Self::from_file(config_file))
    }

    fn from_file(file: ConfigFile) -> Self {
        let media_path = file
            .media
            .path
            .or_else(|| {
                directories::ProjectDirs::from("", "", "minaret")
                    .map(|dirs| dirs.data_dir().join("media"))
            })
            .unwrap_or_else(|| PathBuf::from("media"));

        Self {
            port: file.server.port,
            media_path,
            media_base_url: file.media.base_url,
            regular_media: file.media.regular_file,
            fajr_media: file.media.fajr_file,
            content_type: file.media.content_type,
            primary_device: file.device.primary_name,
            fallback_models: file.device.fallback_models,
            discovery: file.discovery,
            connection: file.connection,
            playback: file.playback,
            broadcast_ttl_secs: file.broadcast.ttl_secs,
            breaker: file.breaker,
            log_file: file.logging.log_file,
            log_level: file.logging.log_level,
        }
    }

    pub fn discovery_cooldown(&self) -> Duration {
        Duration::from_secs(self.discovery.cooldown_secs)
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_secs(self.discovery.timeout_secs)
    }

    pub fn broadcast_ttl(&self) -> Duration {
        Duration::from_secs(self.broadcast_ttl_secs)
    }

    pub fn breaker_recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.breaker.recovery_timeout_secs)
    }

    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            cache_ttl: Duration::from_secs(self.connection.cache_ttl_secs),
            probe_timeout: Duration::from_secs(self.connection.probe_timeout_secs),
            handshake_timeout: Duration::from_secs(self.connection.handshake_timeout_secs),
            max_retries: self.connection.max_retries,
            retry_delay: Duration::from_secs(self.connection.retry_delay_secs),
            health_check_interval: Duration::from_secs(
                self.connection.health_check_interval_secs,
            ),
        }
    }

    pub fn playback_settings(&self) -> PlaybackSettings {
        PlaybackSettings {
            retry_delay: Duration::from_secs(self.playback.retry_delay_secs),
            load_max_attempts: self.playback.load_max_attempts,
            initial_wait: Duration::from_millis(self.playback.initial_wait_ms),
            short_wait: Duration::from_secs(self.playback.short_wait_secs),
            medium_wait: Duration::from_secs(self.playback.medium_wait_secs),
            long_wait: Duration::from_secs(self.playback.long_wait_secs),
            stop_wait: Duration::from_millis(self.playback.stop_wait_ms),
            restart_wait: Duration::from_secs(self.playback.restart_wait_secs),
            consecutive_threshold: self.playback.consecutive_threshold,
            idle_concern_threshold: self.playback.idle_concern_threshold,
        }
    }

    pub fn manager_settings(&self) -> ManagerSettings {
        ManagerSettings {
            primary_device: self.primary_device.clone(),
            fallback_models: self.fallback_models.clone(),
            playback_max_retries: self.playback.max_retries,
            media_base_url: self.media_base_url.clone(),
            media_port: self.port,
            regular_media: self.regular_media.clone(),
            fajr_media: self.fajr_media.clone(),
            content_type: self.content_type.clone(),
            refresh_interval: match self.discovery.refresh_interval_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_file(ConfigFile::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    #[serial]
    fn test_from_figment_defaults() {
        // Clear any env vars that might have been set by other tests
        std::env::remove_var("MINARET_SERVER_PORT");

        // Run in a temp directory to avoid picking up a project .minaret.toml
        let temp_dir = TempDir::new().unwrap();
        let original_dir = std::env::current_dir().unwrap();
        std::env::set_current_dir(&temp_dir).unwrap();

        let config = Config::from_figment(None, None, None, None).unwrap();

        // Restore (ignore errors)
        let _ = std::env::set_current_dir(original_dir);

        assert_eq!(config.port, minaret_types::DEFAULT_PORT);
        assert_eq!(config.primary_device, "Adahn");
        assert_eq!(config.fallback_models.len(), 4);
        assert_eq!(config.broadcast_ttl(), Duration::from_secs(480));
        assert_eq!(config.discovery_cooldown(), Duration::from_secs(30));
        assert_eq!(config.breaker.failure_threshold, 5);
        assert!(config.media_base_url.is_none());
    }

    #[test]
    fn test_settings_conversion() {
        let config = Config::default();

        let pool = config.pool_settings();
        assert_eq!(pool.cache_ttl, Duration::from_secs(300));
        assert_eq!(pool.max_retries, 3);
        assert_eq!(pool.handshake_timeout, Duration::from_secs(10));

        let playback = config.playback_settings();
        assert_eq!(playback.initial_wait, Duration::from_millis(500));
        assert_eq!(playback.stop_wait, Duration::from_millis(1500));
        assert_eq!(playback.consecutive_threshold, 2);

        let manager = config.manager_settings();
        assert_eq!(manager.playback_max_retries, 2);
        assert_eq!(manager.regular_media, "azan.mp3");
        assert_eq!(manager.fajr_media, "azan_fajr.mp3");
        // refresh_interval_secs = 0 disables the refresh loop
        assert!(manager.refresh_interval.is_none());
    }

    #[test]
    fn test_from_figment_cli_args_override() {
        let temp_dir = TempDir::new().unwrap();
        let media = temp_dir.path().join("media");

        let config = Config::from_figment(
            Some(9000),
            Some(media.clone()),
            Some("Kitchen speaker".to_string()),
            Some("http://example.test:9000".to_string()),
        )
        .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.media_path, media);
        assert_eq!(config.primary_device, "Kitchen speaker");
        assert_eq!(
            config.media_base_url,
            Some("http://example.test:9000".to_string())
        );
    }

    #[test]
    #[serial]
    fn test_from_figment_config_file() {
        // Clear any env vars that might interfere
        std::env::remove_var("MINARET_SERVER_PORT");

        let temp_dir = TempDir::new().unwrap();
        let config_file = temp_dir.path().join(".minaret.toml");

        // Create a test config file
        let config_content = r#"
[server]
port = 7777

[device]
primary_name = "Hallway"
fallback_models = ["Google Home"]

[playback]
load_max_attempts = 20
consecutive_threshold = 3

[broadcast]
ttl_secs = 600
"#;
        fs::write(&config_file, config_content).unwrap();

        // Change to temp directory to make config file discoverable
        let original_dir = std::env::current_dir().unwrap();
        std::env::set_current_dir(&temp_dir).unwrap();

        let config = Config::from_figment(None, None, None, None).unwrap();

        // Restore original directory (ignore errors if it fails)
        let _ = std::env::set_current_dir(original_dir);

        assert_eq!(config.port, 7777);
        assert_eq!(config.primary_device, "Hallway");
        assert_eq!(config.fallback_models, vec!["Google Home".to_string()]);
        assert_eq!(config.playback.load_max_attempts, 20);
        assert_eq!(config.playback.consecutive_threshold, 3);
        // Unset sections keep their defaults
        assert_eq!(config.connection.max_retries, 3);
        assert_eq!(config.broadcast_ttl(), Duration::from_secs(600));
    }

    #[test]
    #[serial]
    fn test_from_figment_env_vars_override_config_file() {
        // Save and clear any existing env vars
        let original_port = std::env::var("MINARET_SERVER_PORT").ok();

        let temp_dir = TempDir::new().unwrap();
        let config_file = temp_dir.path().join(".minaret.toml");

        // Create a test config file with port 7777
        fs::write(&config_file, "[server]\nport = 7777").unwrap();

        // Set environment variable to override
        std::env::set_var("MINARET_SERVER_PORT", "8888");

        // Change to temp directory
        let original_dir = std::env::current_dir().unwrap();
        std::env::set_current_dir(&temp_dir).unwrap();

        let config = Config::from_figment(None, None, None, None).unwrap();

        // Restore (restore dir before temp_dir is dropped, ignore errors)
        let _ = std::env::set_current_dir(&original_dir);

        // Restore env vars
        if let Some(port) = original_port {
            std::env::set_var("MINARET_SERVER_PORT", port);
        } else {
            std::env::remove_var("MINARET_SERVER_PORT");
        }

        // Env var should override config file
        assert_eq!(config.port, 8888);
    }

    #[test]
    #[serial]
    fn test_from_figment_cli_overrides_env_and_config() {
        // Save any existing env vars
        let original_port = std::env::var("MINARET_SERVER_PORT").ok();

        let temp_dir = TempDir::new().unwrap();
        let config_file = temp_dir.path().join(".minaret.toml");

        // Create config file with port 7777
        fs::write(&config_file, "[server]\nport = 7777").unwrap();

        // Set env var to 8888
        std::env::set_var("MINARET_SERVER_PORT", "8888");

        // Change to temp directory
        let original_dir = std::env::current_dir().unwrap();
        std::env::set_current_dir(&temp_dir).unwrap();

        // Pass CLI arg 9999
        let config = Config::from_figment(Some(9999), None, None, None).unwrap();

        // Restore (restore dir before temp_dir is dropped, ignore errors)
        let _ = std::env::set_current_dir(&original_dir);

        // Restore env vars
        if let Some(port) = original_port {
            std::env::set_var("MINARET_SERVER_PORT", port);
        } else {
            std::env::remove_var("MINARET_SERVER_PORT");
        }

        // CLI should have highest priority
        assert_eq!(config.port, 9999);
    }

    #[test]
    #[serial]
    fn test_refresh_interval_enabled_via_config() {
        std::env::remove_var("MINARET_SERVER_PORT");

        let temp_dir = TempDir::new().unwrap();
        let config_file = temp_dir.path().join(".minaret.toml");
        fs::write(&config_file, "[discovery]\nrefresh_interval_secs = 120").unwrap();

        let original_dir = std::env::current_dir().unwrap();
        std::env::set_current_dir(&temp_dir).unwrap();

        let config = Config::from_figment(None, None, None, None).unwrap();

        let _ = std::env::set_current_dir(original_dir);

        assert_eq!(
            config.manager_settings().refresh_interval,
            Some(Duration::from_secs(120))
        );
    }
}
