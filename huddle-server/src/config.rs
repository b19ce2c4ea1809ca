//! Server configuration.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "huddle-server", about = "Project chat rooms with an embedded code assistant")]
pub struct ServerConfig {
    /// Address to listen on for HTTP and WebSocket connections
    #[arg(long, env = "HUDDLE_LISTEN_ADDR", default_value = "127.0.0.1:3000")]
    pub listen_addr: String,

    /// HS256 secret used to verify session tokens.
    /// Without it every credential is refused.
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// TOML file listing the channels and their members
    #[arg(long, env = "HUDDLE_CHANNELS_FILE", default_value = "channels.toml")]
    pub channels_file: PathBuf,

    /// Google AI API key for the generation service
    #[arg(long, env = "GOOGLE_AI_KEY")]
    pub google_ai_key: Option<String>,

    /// Generation model
    #[arg(long, env = "HUDDLE_MODEL", default_value = "gemini-2.5-flash")]
    pub model: String,

    /// Per-attempt generation deadline in seconds
    #[arg(long, default_value_t = 60)]
    pub generation_deadline_secs: u64,

    /// Total generation attempts for transient failures
    #[arg(long, default_value_t = 3)]
    pub max_attempts: u32,

    /// Backoff before retry N is N × this many milliseconds
    #[arg(long, default_value_t = 1000)]
    pub backoff_base_ms: u64,

    /// Outbound frames queued per member before it is disconnected
    #[arg(long, default_value_t = 256)]
    pub member_queue_depth: usize,

    /// Comma-separated CORS origins
    #[arg(
        long,
        env = "HUDDLE_ALLOWED_ORIGINS",
        value_delimiter = ',',
        default_value = "http://localhost:5173,http://localhost:3000"
    )]
    pub allowed_origins: Vec<String>,

    /// Largest inbound WebSocket frame accepted, in bytes
    #[arg(long, default_value_t = 10 * 1024 * 1024)]
    pub max_frame_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:3000".to_string(),
            jwt_secret: None,
            channels_file: PathBuf::from("channels.toml"),
            google_ai_key: None,
            model: crate::generation::gemini::DEFAULT_MODEL.to_string(),
            generation_deadline_secs: 60,
            max_attempts: 3,
            backoff_base_ms: 1000,
            member_queue_depth: crate::router::DEFAULT_QUEUE_DEPTH,
            allowed_origins: vec![
                "http://localhost:5173".to_string(),
                "http://localhost:3000".to_string(),
            ],
            max_frame_bytes: 10 * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    pub fn generation_deadline(&self) -> Duration {
        Duration::from_secs(self.generation_deadline_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags() {
        let config = ServerConfig::parse_from([
            "huddle-server",
            "--listen-addr",
            "0.0.0.0:8080",
            "--allowed-origins",
            "https://a.example,https://b.example",
            "--max-attempts",
            "5",
        ]);
        assert_eq!(config.listen_addr, "0.0.0.0:8080");
        assert_eq!(
            config.allowed_origins,
            vec!["https://a.example", "https://b.example"]
        );
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.backoff_base(), Duration::from_secs(1));
    }

    #[test]
    fn default_matches_cli_defaults() {
        let d = ServerConfig::default();
        assert_eq!(d.generation_deadline(), Duration::from_secs(60));
        assert_eq!(d.max_attempts, 3);
        assert_eq!(d.member_queue_depth, 256);
        assert_eq!(d.model, "gemini-2.5-flash");
    }
}
