//! Server registry.
//!
//! The registry is the source of truth for which servers exist and in what
//! order they were registered. Registration order matters downstream: the
//! router breaks score ties in favor of earlier registrations, so the
//! registry assigns each server a monotonically increasing sequence number
//! and lists static servers before dynamic ones.

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::{debug, info};

use conductor_core::{ConfigError, ConfigResult};

use crate::config::{DiscoveryOutcome, ServerConfig, ServerSource};

struct RegisteredServer {
    config: ServerConfig,
    seq: u64,
}

#[derive(Default)]
struct RegistryInner {
    next_seq: u64,
    entries: HashMap<String, RegisteredServer>,
}

/// Thread-safe registry of known servers.
#[derive(Default)]
pub struct ServerRegistry {
    inner: RwLock<RegistryInner>,
}

impl ServerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a server, replacing any previous configuration under the
    /// same id. A replaced server keeps its original registration order.
    pub fn register(&self, config: ServerConfig) -> ConfigResult<()> {
        config.validate()?;
        let mut inner = self.inner.write().expect("registry lock poisoned");
        let seq = match inner.entries.get(&config.id) {
            Some(existing) => existing.seq,
            None => {
                let seq = inner.next_seq;
                inner.next_seq += 1;
                seq
            }
        };
        info!(server_id = %config.id, source = ?config.source, "Registered server");
        inner
            .entries
            .insert(config.id.clone(), RegisteredServer { config, seq });
        Ok(())
    }

    /// Register a server, refusing to overwrite an existing id.
    pub fn register_exclusive(&self, config: ServerConfig) -> ConfigResult<()> {
        config.validate()?;
        {
            let inner = self.inner.read().expect("registry lock poisoned");
            if inner.entries.contains_key(&config.id) {
                return Err(ConfigError::DuplicateId(config.id));
            }
        }
        self.register(config)
    }

    /// Register every well-formed configuration from a discovery pass,
    /// returning the errors of the malformed ones.
    pub fn register_discovered(&self, outcome: DiscoveryOutcome) -> Vec<ConfigError> {
        let mut errors = outcome.errors;
        for config in outcome.configs {
            if let Err(err) = self.register(config) {
                errors.push(err);
            }
        }
        errors
    }

    /// Remove a server from the registry.
    pub fn unregister(&self, id: &str) -> ConfigResult<ServerConfig> {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        let removed = inner
            .entries
            .remove(id)
            .ok_or_else(|| ConfigError::NotFound(id.to_string()))?;
        debug!(server_id = %id, "Unregistered server");
        Ok(removed.config)
    }

    /// Get a server configuration by id.
    pub fn get(&self, id: &str) -> Option<ServerConfig> {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner.entries.get(id).map(|entry| entry.config.clone())
    }

    /// Check whether an id is registered.
    pub fn contains(&self, id: &str) -> bool {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner.entries.contains_key(id)
    }

    /// All registered servers: static servers first, then dynamic, each
    /// group in registration order.
    pub fn list(&self) -> Vec<ServerConfig> {
        let inner = self.inner.read().expect("registry lock poisoned");
        let mut entries: Vec<_> = inner.entries.values().collect();
        entries.sort_by_key(|entry| (source_rank(entry.config.source), entry.seq));
        entries.into_iter().map(|entry| entry.config.clone()).collect()
    }

    /// Number of registered servers.
    pub fn len(&self) -> usize {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner.entries.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn source_rank(source: ServerSource) -> u8 {
    match source {
        ServerSource::Static => 0,
        ServerSource::Dynamic => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::discover_from_env;

    fn config(id: &str) -> ServerConfig {
        ServerConfig::new(id, format!("{id}-MCP"), format!("http://{id}.example"))
    }

    #[test]
    fn test_register_and_get() {
        let registry = ServerRegistry::new();
        registry.register(config("weather")).unwrap();

        assert!(registry.contains("weather"));
        assert_eq!(registry.get("weather").unwrap().id, "weather");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_rejects_invalid() {
        let registry = ServerRegistry::new();
        assert!(matches!(
            registry.register(config("")),
            Err(ConfigError::InvalidId(_))
        ));
        assert!(matches!(
            registry.register(config("Weather")),
            Err(ConfigError::InvalidId(_))
        ));
        assert!(matches!(
            registry.register(ServerConfig::new("weather", "Weather-MCP", "")),
            Err(ConfigError::MissingUrl(_))
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_overwrite_keeps_registration_order() {
        let registry = ServerRegistry::new();
        registry.register(config("first")).unwrap();
        registry.register(config("second")).unwrap();
        registry
            .register(config("first").with_description("updated"))
            .unwrap();

        let listed = registry.list();
        assert_eq!(listed[0].id, "first");
        assert_eq!(listed[0].description, "updated");
        assert_eq!(listed[1].id, "second");
    }

    #[test]
    fn test_register_exclusive_rejects_duplicate() {
        let registry = ServerRegistry::new();
        registry.register_exclusive(config("db")).unwrap();
        assert!(matches!(
            registry.register_exclusive(config("db")),
            Err(ConfigError::DuplicateId(_))
        ));
    }

    #[test]
    fn test_unregister() {
        let registry = ServerRegistry::new();
        registry.register(config("db")).unwrap();

        let removed = registry.unregister("db").unwrap();
        assert_eq!(removed.id, "db");
        assert!(!registry.contains("db"));
        assert!(matches!(
            registry.unregister("db"),
            Err(ConfigError::NotFound(_))
        ));
    }

    #[test]
    fn test_list_orders_static_before_dynamic() {
        let registry = ServerRegistry::new();
        let outcome = discover_from_env(vec![("MCP_SERVER_AAA_URL", "http://aaa.example")]);
        let errors = registry.register_discovered(outcome);
        assert!(errors.is_empty());
        registry.register(config("zzz")).unwrap();

        let ids: Vec<_> = registry.list().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["zzz", "aaa"]);
    }
}
