/// Configuration management
use crate::error::{AmoraError, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_API_URL: &str = "http://127.0.0.1:8000/api/v1";
const DEFAULT_DATA_DIR: &str = ".amora";

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Realtime backend address
    pub server_addr: SocketAddr,

    /// Base URL of the REST collaborators
    pub api_base_url: String,

    /// Transport connect timeout
    pub connect_timeout: Duration,

    /// Base delay for reconnect backoff (doubled per attempt)
    pub backoff_base: Duration,

    /// Upper bound on a single backoff delay
    pub backoff_cap: Duration,

    /// Max connection attempts before the terminal offline signal
    pub max_connect_attempts: u32,

    /// Quiet period after the last keystroke before `typing(false)` is emitted
    pub typing_debounce: Duration,

    /// Safety-net window after which a remote peer's typing flag expires
    /// (must be longer than the emit window)
    pub typing_expiry: Duration,

    /// How long a toast stays visible unless dismissed
    pub toast_ttl: Duration,

    /// Default discovery search radius in kilometers
    pub default_radius_km: f64,

    /// Optional data directory for the local profile store (defaults to `.amora`)
    pub data_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:7420".parse().unwrap(),
            api_base_url: DEFAULT_API_URL.to_string(),
            connect_timeout: Duration::from_secs(10),
            backoff_base: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(30),
            max_connect_attempts: 5,
            typing_debounce: Duration::from_millis(1500),
            typing_expiry: Duration::from_secs(6),
            toast_ttl: Duration::from_secs(4),
            default_radius_km: 50.0,
            data_dir: None,
        }
    }
}

impl Config {
    /// Create config from command line arguments
    pub fn from_args(args: &[String]) -> Result<Self> {
        if args.len() < 2 {
            return Err(AmoraError::Config(format!(
                "Usage: {} <server_addr> [--api-url <url>] [--data-dir <path>] [--radius-km <km>]",
                args.first().unwrap_or(&"amora".to_string())
            )));
        }

        let server_addr = args[1]
            .parse::<SocketAddr>()
            .map_err(|_| AmoraError::Config("Invalid server address (expected host:port)".to_string()))?;

        let mut api_base_url: Option<String> = None;
        let mut data_dir: Option<PathBuf> = None;
        let mut radius_km: Option<f64> = None;

        let mut i = 2;
        while i < args.len() {
            match args[i].as_str() {
                "--api-url" => {
                    let url = args.get(i + 1).ok_or_else(|| {
                        AmoraError::Config("--api-url requires a URL argument".to_string())
                    })?;
                    api_base_url = Some(url.clone());
                    i += 2;
                }
                "--data-dir" => {
                    let path = args.get(i + 1).ok_or_else(|| {
                        AmoraError::Config("--data-dir requires a path argument".to_string())
                    })?;
                    data_dir = Some(PathBuf::from(path));
                    i += 2;
                }
                "--radius-km" => {
                    let km = args.get(i + 1).ok_or_else(|| {
                        AmoraError::Config("--radius-km requires a number argument".to_string())
                    })?;
                    radius_km = Some(km.parse::<f64>().map_err(|_| {
                        AmoraError::Config("--radius-km must be a valid number".to_string())
                    })?);
                    i += 2;
                }
                other => {
                    return Err(AmoraError::Config(format!("Unknown argument: {}", other)));
                }
            }
        }

        // Env overrides (nice for scripts)
        if let Ok(url) = std::env::var("AMORA_API_URL") {
            api_base_url = Some(url);
        }
        if let Ok(dir) = std::env::var("AMORA_DATA_DIR") {
            data_dir = Some(PathBuf::from(dir));
        }

        Ok(Self {
            server_addr,
            api_base_url: api_base_url.unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            data_dir,
            default_radius_km: radius_km.unwrap_or(Config::default().default_radius_km),
            ..Default::default()
        })
    }

    /// Resolved data directory for the local profile store
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_from_args_defaults() {
        let config = Config::from_args(&args(&["amora", "10.0.0.1:7420"])).unwrap();
        assert_eq!(config.server_addr, "10.0.0.1:7420".parse().unwrap());
        assert_eq!(config.api_base_url, DEFAULT_API_URL);
        assert_eq!(config.max_connect_attempts, 5);
    }

    #[test]
    fn test_from_args_flags() {
        let config = Config::from_args(&args(&[
            "amora",
            "10.0.0.1:7420",
            "--api-url",
            "https://api.example.com/v1",
            "--radius-km",
            "25",
        ]))
        .unwrap();
        assert_eq!(config.api_base_url, "https://api.example.com/v1");
        assert_eq!(config.default_radius_km, 25.0);
    }

    #[test]
    fn test_from_args_rejects_bad_addr() {
        assert!(Config::from_args(&args(&["amora", "not-an-addr"])).is_err());
    }
}
