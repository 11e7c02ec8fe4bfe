use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub db: DbConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DbConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    /// Account ensured at startup so a fresh deployment can manage bindings.
    #[serde(default)]
    pub bootstrap_admin: Option<String>,
}

/// Upper bounds on the two kinds of network calls a webhook delivery makes.
/// Hitting either bound is reported to the sender as a transport failure.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebhookConfig {
    #[serde(default = "default_lookup_timeout_ms")]
    pub lookup_timeout_ms: u64,
    #[serde(default = "default_publish_timeout_ms")]
    pub publish_timeout_ms: u64,
}

impl WebhookConfig {
    pub fn lookup_timeout(&self) -> Duration { Duration::from_millis(self.lookup_timeout_ms) }

    pub fn publish_timeout(&self) -> Duration { Duration::from_millis(self.publish_timeout_ms) }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            lookup_timeout_ms: default_lookup_timeout_ms(),
            publish_timeout_ms: default_publish_timeout_ms(),
        }
    }
}

fn default_max_connections() -> u32 { 10 }

fn default_lookup_timeout_ms() -> u64 { 5000 }

fn default_publish_timeout_ms() -> u64 { 5000 }
