use serde::Deserialize;
use tasq_core::LeaseConfig;

/// Top-level server configuration, deserializable from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub server: ListenConfig,
    pub queue: LeaseConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    pub listen_addr: String,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:7711".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = ServerConfig::default();
        assert_eq!(config.server.listen_addr, "0.0.0.0:7711");
        assert_eq!(config.queue.default_lease_secs, 60);
        assert!(config.queue.leases.is_empty());
    }

    #[test]
    fn toml_parsing_with_overrides() {
        let toml_str = r#"
            [server]
            listen_addr = "127.0.0.1:9999"

            [queue]
            default_lease_secs = 30

            [queue.leases]
            orders = 120
        "#;
        let config: ServerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen_addr, "127.0.0.1:9999");
        assert_eq!(config.queue.default_lease_secs, 30);
        assert_eq!(config.queue.lease_for("orders"), 120);
        assert_eq!(config.queue.lease_for("other"), 30);
    }

    #[test]
    fn toml_parsing_empty_uses_defaults() {
        let config: ServerConfig = toml::from_str("").unwrap();
        assert_eq!(config.server.listen_addr, "0.0.0.0:7711");
        assert_eq!(config.queue.default_lease_secs, 60);
    }
}
