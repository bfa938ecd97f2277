//! Aggregate tool catalog.
//!
//! A read-only view over the connection manager's per-server catalogs.
//! Tools are never copied out into a second index: every query reads the
//! live connection records, so a server losing its session drops out of
//! the catalog in the same moment its status changes.

use std::sync::Arc;

use crate::connection::ConnectionManager;
use crate::transport::ToolDescriptor;

/// Cross-server view of every advertised tool.
#[derive(Clone)]
pub struct ToolCatalog {
    connections: Arc<ConnectionManager>,
}

impl ToolCatalog {
    /// Create a catalog over a connection manager.
    pub fn new(connections: Arc<ConnectionManager>) -> Self {
        Self { connections }
    }

    /// All tools advertised by usable servers, in registry order.
    pub fn all(&self) -> Vec<ToolDescriptor> {
        self.connections
            .registry()
            .list()
            .into_iter()
            .filter_map(|config| self.connections.record(&config.id))
            .filter(|record| record.status.is_usable())
            .flat_map(|record| record.advertised_tools)
            .collect()
    }

    /// Servers that advertise a tool name, in registry order.
    pub fn lookup(&self, tool_name: &str) -> Vec<String> {
        self.connections
            .registry()
            .list()
            .into_iter()
            .filter_map(|config| self.connections.record(&config.id))
            .filter(|record| {
                record.status.is_usable()
                    && record.advertised_tools.iter().any(|t| t.name == tool_name)
            })
            .map(|record| record.server_id)
            .collect()
    }

    /// Check whether any usable server advertises the tool.
    pub fn contains(&self, tool_name: &str) -> bool {
        !self.lookup(tool_name).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::registry::ServerRegistry;
    use crate::transport::{LocalTransport, LocalTransportFactory};
    use serde_json::json;

    async fn catalog_fixture() -> (Arc<ConnectionManager>, ToolCatalog) {
        let registry = Arc::new(ServerRegistry::new());
        for id in ["weather", "db"] {
            registry
                .register(ServerConfig::new(
                    id,
                    format!("{id}-MCP"),
                    format!("http://{id}.example"),
                ))
                .unwrap();
        }

        let factory = LocalTransportFactory::new()
            .with_transport(
                LocalTransport::new("weather")
                    .with_tool("get_forecast", "Weather forecast", |_| Ok(json!({})))
                    .with_tool("search", "Search weather records", |_| Ok(json!({}))),
            )
            .with_transport(
                LocalTransport::new("db")
                    .with_tool("query", "Run a database query", |_| Ok(json!({})))
                    .with_tool("search", "Search stored rows", |_| Ok(json!({}))),
            );

        let manager = Arc::new(ConnectionManager::new(registry, Arc::new(factory)));
        manager.connect_all().await;
        let catalog = ToolCatalog::new(Arc::clone(&manager));
        (manager, catalog)
    }

    #[tokio::test]
    async fn test_all_in_registry_order() {
        let (_manager, catalog) = catalog_fixture().await;
        let names: Vec<_> = catalog.all().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["get_forecast", "search", "query", "search"]);
    }

    #[tokio::test]
    async fn test_lookup_spans_servers() {
        let (_manager, catalog) = catalog_fixture().await;
        assert_eq!(catalog.lookup("search"), vec!["weather", "db"]);
        assert_eq!(catalog.lookup("query"), vec!["db"]);
        assert!(catalog.lookup("nonexistent").is_empty());
        assert!(catalog.contains("get_forecast"));
    }

    #[tokio::test]
    async fn test_disconnect_removes_tools_atomically() {
        let (manager, catalog) = catalog_fixture().await;
        manager.disconnect("weather").await.unwrap();

        assert_eq!(catalog.lookup("search"), vec!["db"]);
        assert!(!catalog.contains("get_forecast"));
    }
}
