//! Configuration management for the widget gateway

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Address the HTTP server binds to
    pub bind_address: String,

    /// Port the HTTP server listens on
    pub port: u16,

    /// Path to the services file
    pub services_path: String,

    /// Refresh cadence for every mounted widget
    pub poll_interval: Duration,

    /// How long an unsubscribed cache entry survives before removal
    pub cache_grace: Duration,

    /// Timeout for a single outbound gateway call
    pub gateway_timeout: Duration,

    /// Upper bound on simultaneous outbound gateway calls
    pub max_outbound_requests: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 3000,
            services_path: "config/services.yaml".to_string(),
            poll_interval: Duration::from_secs(10),
            cache_grace: Duration::from_secs(30),
            gateway_timeout: Duration::from_secs(10),
            max_outbound_requests: 16,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup, defaults for anything
    /// missing or unparsable.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(bind_address) = lookup("BIND_ADDRESS") {
            config.bind_address = bind_address;
        }

        if let Some(port) = lookup("PORT").and_then(|v| v.parse().ok()) {
            config.port = port;
        }

        if let Some(path) = lookup("SERVICES_CONFIG") {
            config.services_path = path;
        }

        if let Some(seconds) = lookup("POLL_INTERVAL_SECONDS").and_then(|v| v.parse::<u64>().ok()) {
            config.poll_interval = Duration::from_secs(seconds);
        }

        if let Some(seconds) = lookup("CACHE_GRACE_SECONDS").and_then(|v| v.parse::<u64>().ok()) {
            config.cache_grace = Duration::from_secs(seconds);
        }

        if let Some(seconds) = lookup("GATEWAY_TIMEOUT_SECONDS").and_then(|v| v.parse::<u64>().ok()) {
            config.gateway_timeout = Duration::from_secs(seconds);
        }

        if let Some(limit) = lookup("MAX_OUTBOUND_REQUESTS").and_then(|v| v.parse().ok()) {
            config.max_outbound_requests = limit;
        }

        config
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.bind_address.is_empty() {
            return Err("bind_address cannot be empty".to_string());
        }

        if self.services_path.is_empty() {
            return Err("services_path cannot be empty".to_string());
        }

        if self.poll_interval.is_zero() {
            return Err("poll_interval must be greater than 0".to_string());
        }

        if self.gateway_timeout.is_zero() {
            return Err("gateway_timeout must be greater than 0".to_string());
        }

        if self.max_outbound_requests == 0 {
            return Err("max_outbound_requests must be greater than 0".to_string());
        }

        Ok(())
    }
}
