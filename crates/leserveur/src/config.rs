//! Server configuration from environment variables

use std::collections::HashMap;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Default host address
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default port number
pub const DEFAULT_PORT: u16 = 47311;

/// Default CORS origins (localhost for development)
pub const DEFAULT_CORS_ORIGINS: &[&str] = &[
    "http://localhost:3000",
    "http://127.0.0.1:3000",
    "http://localhost:5173",
    "http://127.0.0.1:5173",
];

/// Default upload size cap in bytes (25 MB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Server configuration loaded from the environment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServeurConfig {
    /// Server host address
    pub host: String,

    /// Server port
    pub port: u16,

    /// Allowed CORS origins
    pub cors_origins: Vec<String>,

    /// Directory holding persisted session records
    pub data_dir: String,

    /// Directory holding uploaded and generated media
    pub media_dir: String,

    /// Bearer token -> user id map for the static verifier
    pub api_tokens: HashMap<String, String>,

    /// Daily video-generation admissions per user
    pub video_daily_limit: u32,

    /// Daily voice-clone admissions per user
    pub voice_daily_limit: u32,

    /// Upload size cap in bytes
    pub max_upload_bytes: usize,

    /// Log level for tracing
    pub log_level: String,
}

impl Default for ServeurConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            cors_origins: DEFAULT_CORS_ORIGINS.iter().map(|s| s.to_string()).collect(),
            data_dir: "lementor_data/sessions".to_string(),
            media_dir: "lementor_data/media".to_string(),
            api_tokens: HashMap::new(),
            video_daily_limit: 3,
            voice_daily_limit: 10,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            log_level: "info".to_string(),
        }
    }
}

impl ServeurConfig {
    /// Load config from environment variables with fallback to defaults
    ///
    /// Environment variables:
    /// - `LEMENTOR_HOST` - Server host
    /// - `LEMENTOR_PORT` - Server port
    /// - `LEMENTOR_DATA_DIR` - Session record directory
    /// - `LEMENTOR_MEDIA_DIR` - Media artifact directory
    /// - `LEMENTOR_API_TOKENS` - `token:user` pairs, comma separated
    /// - `LEMENTOR_CORS_ORIGINS` - Allowed origins, comma separated
    /// - `LEMENTOR_VIDEO_DAILY_LIMIT` / `LEMENTOR_VOICE_DAILY_LIMIT`
    /// - `LEMENTOR_LOG_LEVEL` - Log level (trace, debug, info, warn, error)
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(host) = std::env::var("LEMENTOR_HOST") {
            config.host = host;
        }
        if let Ok(port_str) = std::env::var("LEMENTOR_PORT") {
            if let Ok(port) = port_str.parse::<u16>() {
                config.port = port;
            }
        }
        if let Ok(data_dir) = std::env::var("LEMENTOR_DATA_DIR") {
            config.data_dir = data_dir;
        }
        if let Ok(media_dir) = std::env::var("LEMENTOR_MEDIA_DIR") {
            config.media_dir = media_dir;
        }
        if let Ok(raw) = std::env::var("LEMENTOR_API_TOKENS") {
            config.api_tokens = parse_api_tokens(&raw);
        }
        if let Ok(raw) = std::env::var("LEMENTOR_CORS_ORIGINS") {
            config.cors_origins = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Ok(raw) = std::env::var("LEMENTOR_VIDEO_DAILY_LIMIT") {
            if let Ok(limit) = raw.parse() {
                config.video_daily_limit = limit;
            }
        }
        if let Ok(raw) = std::env::var("LEMENTOR_VOICE_DAILY_LIMIT") {
            if let Ok(limit) = raw.parse() {
                config.voice_daily_limit = limit;
            }
        }
        if let Ok(log_level) = std::env::var("LEMENTOR_LOG_LEVEL") {
            config.log_level = log_level;
        }

        config
    }

    /// Get the socket address for the server
    pub fn socket_addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| format!("Invalid address: {e}"))
    }

    /// Get the full server URL
    #[must_use]
    pub fn server_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Get the base WebSocket URL for live session streams
    #[must_use]
    pub fn websocket_url(&self) -> String {
        format!("ws://{}:{}/live", self.host, self.port)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.port == 0 {
            return Err("Port cannot be zero".to_string());
        }
        if self.host.is_empty() {
            return Err("Host cannot be empty".to_string());
        }
        if self.max_upload_bytes == 0 {
            return Err("Upload size cap must be greater than zero".to_string());
        }
        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(format!(
                    "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                    self.log_level
                ));
            }
        }
        Ok(())
    }
}

/// Parse `token:user` pairs, skipping malformed entries.
fn parse_api_tokens(raw: &str) -> HashMap<String, String> {
    let mut tokens = HashMap::new();
    for pair in raw.split(',') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        match pair.split_once(':') {
            Some((token, user)) if !token.is_empty() && !user.is_empty() => {
                tokens.insert(token.to_string(), user.to_string());
            }
            _ => warn!(entry = pair, "skipping malformed api token entry"),
        }
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServeurConfig::default();
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.port, DEFAULT_PORT);
        assert!(config.cors_origins.len() > 0);
        assert_eq!(config.video_daily_limit, 3);
        assert_eq!(config.voice_daily_limit, 10);
        assert!(config.api_tokens.is_empty());
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_config_socket_addr() {
        let config = ServeurConfig::default();
        let addr = config.socket_addr().expect("default address is valid");
        assert_eq!(addr.ip(), std::net::Ipv4Addr::new(127, 0, 0, 1));
        assert_eq!(addr.port(), DEFAULT_PORT);
    }

    #[test]
    fn test_config_urls() {
        let config = ServeurConfig {
            host: "localhost".to_string(),
            port: 3000,
            ..Default::default()
        };
        assert_eq!(config.server_url(), "http://localhost:3000");
        assert_eq!(config.websocket_url(), "ws://localhost:3000/live");
    }

    #[test]
    fn test_config_validate_success() {
        let config = ServeurConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validate_port_zero() {
        let config = ServeurConfig {
            port: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validate_invalid_log_level() {
        let config = ServeurConfig {
            log_level: "chatty".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_api_tokens() {
        let tokens = parse_api_tokens("tok-a:alice, tok-b:bob, broken, :noname,");
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens.get("tok-a").map(String::as_str), Some("alice"));
        assert_eq!(tokens.get("tok-b").map(String::as_str), Some("bob"));
    }

    #[test]
    fn test_config_from_env() {
        std::env::set_var("LEMENTOR_HOST", "0.0.0.0");
        std::env::set_var("LEMENTOR_PORT", "8080");
        std::env::set_var("LEMENTOR_API_TOKENS", "tok:me");
        std::env::set_var("LEMENTOR_VIDEO_DAILY_LIMIT", "7");

        let config = ServeurConfig::from_env();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.api_tokens.get("tok").map(String::as_str), Some("me"));
        assert_eq!(config.video_daily_limit, 7);

        // Clean up
        std::env::remove_var("LEMENTOR_HOST");
        std::env::remove_var("LEMENTOR_PORT");
        std::env::remove_var("LEMENTOR_API_TOKENS");
        std::env::remove_var("LEMENTOR_VIDEO_DAILY_LIMIT");
    }
}
