//! Configuration handling for the messaging service.
//!
//! Settings come from the shared YAML config file, then environment
//! variables, then command-line flags (applied in `main`).

use anyhow::Result;
use gogoc_session::{default_pipe_path, ManagerConfig, MessengerConfig};
use gogoc_wire::Broker;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Messaging service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagingConfig {
    /// Rendezvous socket path
    pub pipe_path: String,
    /// Failed initializations tolerated before giving up
    pub failure_threshold: u32,
    /// Pause after a failed initialization (milliseconds)
    pub reconnect_cooldown_ms: u64,
    /// Supervising loop tick (milliseconds)
    pub poll_interval_ms: u64,
    /// How long the GUI waits for the daemon's pipe (milliseconds)
    pub connect_timeout_ms: u64,
    /// Send queue capacity
    pub queue_capacity: usize,
    /// Brokers the daemon reports
    pub brokers: Vec<Broker>,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        let manager = ManagerConfig::default();
        Self {
            pipe_path: default_pipe_path().to_string_lossy().into_owned(),
            failure_threshold: manager.failure_threshold,
            reconnect_cooldown_ms: manager.reconnect_cooldown.as_millis() as u64,
            poll_interval_ms: manager.poll_interval.as_millis() as u64,
            connect_timeout_ms: 5_000,
            queue_capacity: manager.queue_capacity,
            brokers: Vec::new(),
        }
    }
}

/// Root configuration structure (matches the YAML structure)
#[derive(Debug, Deserialize)]
struct RootConfig {
    services: Option<ServicesConfig>,
}

#[derive(Debug, Deserialize)]
struct ServicesConfig {
    messaging: Option<ServiceConfig>,
}

#[derive(Debug, Deserialize)]
struct ServiceConfig {
    args: Option<Vec<String>>,
    config: Option<HashMap<String, String>>,
}

/// Parse a duration given either as plain milliseconds or in humantime form
fn parse_millis(value: &str) -> Option<u64> {
    if let Ok(ms) = value.parse::<u64>() {
        return Some(ms);
    }
    humantime::parse_duration(value)
        .ok()
        .map(|d| d.as_millis() as u64)
}

/// Parse `host:distance` pairs separated by commas
pub fn parse_brokers(value: &str) -> Vec<Broker> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| match entry.rsplit_once(':') {
            Some((host, distance)) => match distance.parse::<i32>() {
                Ok(distance) => Some(Broker::new(host, distance)),
                Err(_) => {
                    warn!("Ignoring broker entry with bad distance: {}", entry);
                    None
                }
            },
            None => Some(Broker::new(entry, 0)),
        })
        .collect()
}

impl MessagingConfig {
    /// Load configuration from file and environment variables
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let mut config = Self::default();

        match std::fs::read_to_string(&config_path) {
            Ok(content) => match serde_yaml::from_str::<RootConfig>(&content) {
                Ok(root_config) => {
                    config.apply_root_config(root_config);
                    info!("Loaded configuration from {:?}", config_path.as_ref());
                }
                Err(e) => warn!(
                    "Failed to parse config file {:?}, using defaults: {}",
                    config_path.as_ref(),
                    e
                ),
            },
            Err(_) => warn!("Config file {:?} not found, using defaults", config_path.as_ref()),
        }

        config.apply_environment_overrides();

        info!(
            "Final messaging configuration: pipe={}, threshold={}, cooldown={}ms, poll={}ms",
            config.pipe_path,
            config.failure_threshold,
            config.reconnect_cooldown_ms,
            config.poll_interval_ms
        );

        Ok(config)
    }

    fn apply_root_config(&mut self, root_config: RootConfig) {
        if let Some(service) = root_config.services.and_then(|s| s.messaging) {
            self.apply_service_config(service);
        }
    }

    fn apply_service_config(&mut self, service_config: ServiceConfig) {
        for arg in service_config.args.unwrap_or_default() {
            if let Some(pipe) = arg.strip_prefix("--pipe=") {
                self.pipe_path = pipe.to_string();
            }
        }

        for (key, value) in service_config.config.unwrap_or_default() {
            match key.as_str() {
                "services.messaging.pipe_path" => self.pipe_path = value,
                "services.messaging.failure_threshold" => {
                    if let Ok(threshold) = value.parse::<u32>() {
                        self.failure_threshold = threshold;
                    }
                }
                "services.messaging.reconnect_cooldown" => {
                    if let Some(ms) = parse_millis(&value) {
                        self.reconnect_cooldown_ms = ms;
                    }
                }
                "services.messaging.poll_interval" => {
                    if let Some(ms) = parse_millis(&value) {
                        self.poll_interval_ms = ms;
                    }
                }
                "services.messaging.connect_timeout" => {
                    if let Some(ms) = parse_millis(&value) {
                        self.connect_timeout_ms = ms;
                    }
                }
                "services.messaging.queue_capacity" => {
                    if let Ok(capacity) = value.parse::<usize>() {
                        self.queue_capacity = capacity;
                    }
                }
                "services.messaging.brokers" => self.brokers = parse_brokers(&value),
                _ => {
                    // Ignore unknown configuration keys
                }
            }
        }
    }

    /// Apply environment variable overrides
    fn apply_environment_overrides(&mut self) {
        if let Ok(pipe) = std::env::var("GOGOC_PIPE_PATH") {
            self.pipe_path = pipe;
            info!("Pipe path overridden by environment: {}", self.pipe_path);
        }

        if let Ok(threshold) = std::env::var("GOGOC_FAILURE_THRESHOLD") {
            if let Ok(threshold) = threshold.parse::<u32>() {
                self.failure_threshold = threshold;
                info!("Failure threshold overridden by environment: {}", threshold);
            }
        }

        if let Ok(cooldown) = std::env::var("GOGOC_RECONNECT_COOLDOWN") {
            if let Some(ms) = parse_millis(&cooldown) {
                self.reconnect_cooldown_ms = ms;
                info!("Reconnect cooldown overridden by environment: {}ms", ms);
            }
        }

        if let Ok(poll) = std::env::var("GOGOC_POLL_INTERVAL") {
            if let Some(ms) = parse_millis(&poll) {
                self.poll_interval_ms = ms;
                info!("Poll interval overridden by environment: {}ms", ms);
            }
        }
    }

    /// Build the session-layer settings
    pub fn messenger_config(&self) -> MessengerConfig {
        MessengerConfig {
            pipe_path: self.pipe_path.clone().into(),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            manager: ManagerConfig {
                failure_threshold: self.failure_threshold,
                reconnect_cooldown: Duration::from_millis(self.reconnect_cooldown_ms),
                poll_interval: Duration::from_millis(self.poll_interval_ms),
                queue_capacity: self.queue_capacity,
                ..ManagerConfig::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = MessagingConfig::default();
        assert_eq!(config.failure_threshold, 3);
        assert_eq!(config.reconnect_cooldown_ms, 10_000);
        assert_eq!(config.poll_interval_ms, 300);
        assert_eq!(config.queue_capacity, 512);
        assert!(config.pipe_path.ends_with("gogocmessaging-ipc"));
    }

    #[test]
    fn test_load_from_file() {
        let yaml_content = r#"
services:
  messaging:
    enabled: true
    executable: ./gogoc-messaging
    args:
      - --pipe=/run/gogoc/ipc.sock
    config:
      services.messaging.failure_threshold: "5"
      services.messaging.reconnect_cooldown: "2s"
      services.messaging.poll_interval: "150"
      services.messaging.brokers: "broker.freenet6.net:120, 2001:db8::1:45"
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(yaml_content.as_bytes()).unwrap();

        let config = MessagingConfig::load_from_file(temp_file.path()).unwrap();

        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.reconnect_cooldown_ms, 2_000);
        assert_eq!(config.poll_interval_ms, 150);
        assert_eq!(
            config.brokers,
            vec![
                Broker::new("broker.freenet6.net", 120),
                Broker::new("2001:db8::1", 45)
            ]
        );

        let messenger = config.messenger_config();
        assert_eq!(messenger.manager.failure_threshold, 5);
        assert_eq!(messenger.manager.reconnect_cooldown, Duration::from_secs(2));
        assert_eq!(messenger.manager.teardown_grace, Duration::from_secs(1));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = MessagingConfig::load_from_file(dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config.queue_capacity, 512);
    }

    #[test]
    fn test_parse_brokers_skips_bad_entries() {
        let brokers = parse_brokers("a.net:1,b.net:far,,c.net");
        assert_eq!(brokers, vec![Broker::new("a.net", 1), Broker::new("c.net", 0)]);
    }
}
