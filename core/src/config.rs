use std::fs;
use std::path::Path;

use crate::handler::ConflictPolicy;
use crate::messaging::{DEFAULT_GROUP_ID, DEFAULT_TOPIC};

/// Publish endpoint configuration
#[derive(Clone, Debug, PartialEq)]
pub struct HttpConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl HttpConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Runtime configuration
#[derive(Clone, Debug, PartialEq)]
pub struct RelayConfig {
    /// Topic every event type shares
    pub topic: String,
    /// Consumer group the dispatcher joins
    pub group_id: String,
    pub http: HttpConfig,
    pub conflict_policy: ConflictPolicy,
    /// Inbound buffer per consumer
    pub channel_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            topic: DEFAULT_TOPIC.to_string(),
            group_id: DEFAULT_GROUP_ID.to_string(),
            http: HttpConfig::default(),
            conflict_policy: ConflictPolicy::Warn,
            channel_capacity: 1024,
        }
    }
}

impl RelayConfig {
    /// Defaults overridden by `RELAY_*` environment variables.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(v) = env_string("RELAY_TOPIC") {
            cfg.topic = v;
        }
        if let Some(v) = env_string("RELAY_GROUP_ID") {
            cfg.group_id = v;
        }
        if let Some(v) = env_string("RELAY_HTTP_HOST") {
            cfg.http.host = v;
        }
        if let Some(v) = env_parse::<u16>("RELAY_HTTP_PORT") {
            cfg.http.port = v;
        }
        if let Some(v) = env_parse::<bool>("RELAY_HTTP_ENABLED") {
            cfg.http.enabled = v;
        }
        if let Some(v) = env_parse::<ConflictPolicy>("RELAY_CONFLICT_POLICY") {
            cfg.conflict_policy = v;
        }
        if let Some(v) = env_parse::<usize>("RELAY_CHANNEL_CAPACITY") {
            cfg.channel_capacity = v.max(1);
        }
        cfg
    }

    /// Load configuration from a TOML file (path via RELAY_CONFIG or ./relay.toml),
    /// overlaying values onto env-driven defaults.
    pub fn load() -> Self {
        let base = Self::from_env();
        let path = std::env::var("RELAY_CONFIG").unwrap_or_else(|_| "relay.toml".into());
        let p = Path::new(&path);
        if !p.exists() {
            tracing::info!(target: "config", path = %path, "No TOML config found; using defaults/env");
            return base;
        }
        match fs::read_to_string(p) {
            Ok(s) => match toml::from_str::<RelayToml>(&s) {
                Ok(t) => t.overlay(base),
                Err(e) => {
                    tracing::warn!(target: "config", path = %path, error = %e, "Failed to parse TOML; using defaults");
                    base
                }
            },
            Err(e) => {
                tracing::warn!(target: "config", path = %path, error = %e, "Failed to read TOML; using defaults");
                base
            }
        }
    }

    /// Overlay a TOML document onto `self`.
    pub fn overlay_toml(self, s: &str) -> Result<Self, toml::de::Error> {
        Ok(toml::from_str::<RelayToml>(s)?.overlay(self))
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|v| v.parse().ok())
}

// =========================
// TOML overlay definitions
// =========================

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct RelayToml {
    pub topic: Option<String>,
    pub group_id: Option<String>,
    pub conflict_policy: Option<ConflictPolicy>,
    pub channel_capacity: Option<usize>,
    pub http: Option<HttpToml>,
}

impl RelayToml {
    fn overlay(self, mut base: RelayConfig) -> RelayConfig {
        if let Some(v) = self.topic {
            base.topic = v;
        }
        if let Some(v) = self.group_id {
            base.group_id = v;
        }
        if let Some(v) = self.conflict_policy {
            base.conflict_policy = v;
        }
        if let Some(v) = self.channel_capacity {
            base.channel_capacity = v.max(1);
        }
        if let Some(h) = self.http {
            h.apply(&mut base.http);
        }
        base
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct HttpToml {
    pub enabled: Option<bool>,
    pub host: Option<String>,
    pub port: Option<u16>,
}

impl HttpToml {
    fn apply(self, h: &mut HttpConfig) {
        if let Some(v) = self.enabled {
            h.enabled = v;
        }
        if let Some(v) = self.host {
            h.host = v;
        }
        if let Some(v) = self.port {
            h.port = v;
        }
    }
}
