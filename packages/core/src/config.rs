use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use crate::cache;
use crate::cli::Cli;

pub const DEFAULT_BROKER: &str = "broker.hivemq.com";
pub const DEFAULT_BROKER_PORT: u16 = 1883;
pub const DEFAULT_TOPIC: &str = "steel/defects";
pub const DEFAULT_KEEP_ALIVE_SECONDS: u64 = 60;
pub const DEFAULT_DATABASE_URL: &str = "sqlite://defects.db";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
pub const DEFAULT_QUERY_TIMEOUT_SECONDS: u64 = 5;

/// rumqttc rejects keep-alive intervals shorter than this.
const MIN_KEEP_ALIVE_SECONDS: u64 = 5;

#[derive(Debug, Clone)]
pub struct Config {
    pub mqtt: MqttConfig,
    pub cache_capacity: usize,
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub query_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub broker: String,
    pub port: u16,
    pub topic: String,
    pub client_id: String,
    pub keep_alive_seconds: u64,
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, String> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| format!("{} must be a valid number, got '{}'", key, raw)),
        None => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Unset keys fall back to
    /// their defaults; set-but-invalid keys are errors.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let broker = lookup("MQTT_BROKER").unwrap_or_else(|| DEFAULT_BROKER.to_string());
        let port = parse_var(&lookup, "MQTT_PORT", DEFAULT_BROKER_PORT)?;
        let topic = lookup("MQTT_TOPIC").unwrap_or_else(|| DEFAULT_TOPIC.to_string());
        let client_id = lookup("MQTT_CLIENT_ID")
            .unwrap_or_else(|| format!("defect-alert-monitor-{}", std::process::id()));
        let keep_alive_seconds =
            parse_var(&lookup, "MQTT_KEEP_ALIVE_SECONDS", DEFAULT_KEEP_ALIVE_SECONDS)?;

        let cache_capacity = parse_var(&lookup, "ALERT_CACHE_SIZE", cache::DEFAULT_CAPACITY)?;
        let database_url =
            lookup("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());
        let bind_addr = lookup("API_BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|_| "API_BIND_ADDR must be a socket address like 0.0.0.0:8000")?;
        let query_timeout_seconds =
            parse_var(&lookup, "QUERY_TIMEOUT_SECONDS", DEFAULT_QUERY_TIMEOUT_SECONDS)?;

        let config = Self {
            mqtt: MqttConfig {
                broker,
                port,
                topic,
                client_id,
                keep_alive_seconds,
            },
            cache_capacity,
            database_url,
            bind_addr,
            query_timeout: Duration::from_secs(query_timeout_seconds),
        };
        config.validate()?;
        Ok(config)
    }

    /// Apply command-line overrides on top of the environment.
    pub fn with_overrides(mut self, cli: &Cli) -> Result<Self, String> {
        if let Some(broker) = &cli.broker {
            self.mqtt.broker = broker.clone();
        }
        if let Some(port) = cli.broker_port {
            self.mqtt.port = port;
        }
        if let Some(topic) = &cli.topic {
            self.mqtt.topic = topic.clone();
        }
        if let Some(capacity) = cli.cache_size {
            self.cache_capacity = capacity;
        }
        if let Some(url) = &cli.database_url {
            self.database_url = url.clone();
        }
        if let Some(addr) = cli.bind {
            self.bind_addr = addr;
        }
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<(), String> {
        if self.mqtt.broker.trim().is_empty() {
            return Err("MQTT_BROKER must not be empty".to_string());
        }
        if self.mqtt.port == 0 {
            return Err("MQTT_PORT must be between 1 and 65535".to_string());
        }
        if self.mqtt.topic.trim().is_empty() {
            return Err("MQTT_TOPIC must not be empty".to_string());
        }
        if self.mqtt.client_id.trim().is_empty() {
            return Err("MQTT_CLIENT_ID must not be empty".to_string());
        }
        if self.mqtt.keep_alive_seconds < MIN_KEEP_ALIVE_SECONDS {
            return Err(format!(
                "MQTT_KEEP_ALIVE_SECONDS must be at least {}",
                MIN_KEEP_ALIVE_SECONDS
            ));
        }
        if self.cache_capacity > cache::MAX_CAPACITY {
            return Err(format!(
                "ALERT_CACHE_SIZE must be at most {}, got {}",
                cache::MAX_CAPACITY,
                self.cache_capacity
            ));
        }
        if self.database_url.trim().is_empty() {
            return Err("DATABASE_URL must not be empty".to_string());
        }
        if self.query_timeout.is_zero() {
            return Err("QUERY_TIMEOUT_SECONDS must be greater than zero".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use clap::Parser;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<Config, String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = from_pairs(&[]).unwrap();

        assert_eq!(config.mqtt.broker, DEFAULT_BROKER);
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.mqtt.topic, "steel/defects");
        assert!(config.mqtt.client_id.starts_with("defect-alert-monitor-"));
        assert_eq!(config.cache_capacity, 10);
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.bind_addr.port(), 8000);
        assert_eq!(config.query_timeout, Duration::from_secs(5));
    }

    #[test]
    fn env_values_override_defaults() {
        let config = from_pairs(&[
            ("MQTT_BROKER", "mqtt.plant.local"),
            ("MQTT_PORT", "8883"),
            ("MQTT_TOPIC", "line2/defects"),
            ("ALERT_CACHE_SIZE", "25"),
            ("DATABASE_URL", "sqlite::memory:"),
            ("API_BIND_ADDR", "127.0.0.1:9000"),
        ])
        .unwrap();

        assert_eq!(config.mqtt.broker, "mqtt.plant.local");
        assert_eq!(config.mqtt.port, 8883);
        assert_eq!(config.mqtt.topic, "line2/defects");
        assert_eq!(config.cache_capacity, 25);
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.bind_addr, "127.0.0.1:9000".parse().unwrap());
    }

    #[test]
    fn invalid_port_is_rejected() {
        let err = from_pairs(&[("MQTT_PORT", "not-a-port")]).unwrap_err();
        assert!(err.contains("MQTT_PORT"));

        assert!(from_pairs(&[("MQTT_PORT", "0")]).is_err());
        assert!(from_pairs(&[("MQTT_PORT", "70000")]).is_err());
    }

    #[test]
    fn invalid_cache_size_is_rejected() {
        assert!(from_pairs(&[("ALERT_CACHE_SIZE", "-1")]).is_err());
    }

    #[test]
    fn oversized_cache_size_is_rejected() {
        let huge = usize::MAX.to_string();
        let err = from_pairs(&[("ALERT_CACHE_SIZE", huge.as_str())]).unwrap_err();
        assert!(err.contains("ALERT_CACHE_SIZE"));

        let over = (cache::MAX_CAPACITY + 1).to_string();
        assert!(from_pairs(&[("ALERT_CACHE_SIZE", over.as_str())]).is_err());

        let at_limit = cache::MAX_CAPACITY.to_string();
        let config = from_pairs(&[("ALERT_CACHE_SIZE", at_limit.as_str())]).unwrap();
        assert_eq!(config.cache_capacity, cache::MAX_CAPACITY);
    }

    #[test]
    fn oversized_cache_size_flag_is_rejected() {
        let cli = Cli::parse_from(["defect-alert-monitor", "--cache-size", "1000000000"]);
        assert!(from_pairs(&[]).unwrap().with_overrides(&cli).is_err());
    }

    #[test]
    fn empty_topic_is_rejected() {
        let err = from_pairs(&[("MQTT_TOPIC", "  ")]).unwrap_err();
        assert!(err.contains("MQTT_TOPIC"));
    }

    #[test]
    fn zero_query_timeout_is_rejected() {
        assert!(from_pairs(&[("QUERY_TIMEOUT_SECONDS", "0")]).is_err());
    }

    #[test]
    fn short_keep_alive_is_rejected() {
        assert!(from_pairs(&[("MQTT_KEEP_ALIVE_SECONDS", "1")]).is_err());
    }

    #[test]
    fn bad_bind_address_is_rejected() {
        assert!(from_pairs(&[("API_BIND_ADDR", "localhost")]).is_err());
    }

    #[test]
    fn cli_flags_override_env() {
        let cli = Cli::parse_from([
            "defect-alert-monitor",
            "--broker",
            "10.0.0.5",
            "--topic",
            "line3/defects",
            "--cache-size",
            "3",
        ]);
        let config = from_pairs(&[("MQTT_BROKER", "mqtt.plant.local")])
            .unwrap()
            .with_overrides(&cli)
            .unwrap();

        assert_eq!(config.mqtt.broker, "10.0.0.5");
        assert_eq!(config.mqtt.topic, "line3/defects");
        assert_eq!(config.cache_capacity, 3);
        assert_eq!(config.mqtt.port, DEFAULT_BROKER_PORT);
    }

    #[test]
    fn cli_overrides_are_validated() {
        let cli = Cli::parse_from(["defect-alert-monitor", "--topic", ""]);
        assert!(from_pairs(&[]).unwrap().with_overrides(&cli).is_err());
    }
}
