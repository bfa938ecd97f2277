//! Server configuration and dynamic discovery.
//!
//! Servers come from two sources: static declarations made through the
//! registry API, and a discovery convention over environment-like
//! key/value mappings. Discovery parses everything into strongly-typed
//! [`ServerConfig`] values at the boundary; malformed entries are
//! collected as errors instead of failing the whole pass.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use conductor_core::ConfigError;

/// Default port for discovered servers without an explicit `_PORT`.
pub const DEFAULT_PORT: u16 = 8080;

const DISCOVERY_PREFIX: &str = "MCP_SERVER_";
const DISCOVERY_SUFFIX: &str = "_URL";

/// Where a server configuration came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerSource {
    /// Declared through the registry API.
    Static,
    /// Found through the `MCP_SERVER_<NAME>_URL` discovery convention.
    Dynamic,
}

/// Configuration for one remote tool server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Unique lowercase identifier, derived from the server name.
    pub id: String,
    /// Human-readable name.
    pub display_name: String,
    /// Base URL of the server, without the port.
    pub base_url: String,
    /// Port the server listens on.
    pub port: u16,
    /// Description used by the router for keyword scoring.
    #[serde(default)]
    pub description: String,
    /// How this configuration was registered.
    pub source: ServerSource,
}

impl ServerConfig {
    /// Create a static server configuration with the default port.
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            base_url: base_url.into(),
            port: DEFAULT_PORT,
            description: String::new(),
            source: ServerSource::Static,
        }
    }

    /// Set the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the source.
    pub fn with_source(mut self, source: ServerSource) -> Self {
        self.source = source;
        self
    }

    /// Full endpoint the transport connects to.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.base_url, self.port)
    }

    /// Validate the configuration for registration.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.id.is_empty() || self.id != self.id.to_lowercase() {
            return Err(ConfigError::InvalidId(self.id.clone()));
        }
        if self.base_url.is_empty() {
            return Err(ConfigError::MissingUrl(self.id.clone()));
        }
        Ok(())
    }
}

/// Result of one discovery pass.
#[derive(Debug, Default)]
pub struct DiscoveryOutcome {
    /// Well-formed configurations, in discovery order.
    pub configs: Vec<ServerConfig>,
    /// Entries that matched the convention but could not be parsed.
    pub errors: Vec<ConfigError>,
}

/// Scan a key/value mapping for the `MCP_SERVER_<NAME>_URL` convention.
///
/// Keys are matched case-insensitively; `<NAME>` lower-cased becomes the
/// server id with non-alphanumeric characters preserved. `_PORT` defaults
/// to 8080 when absent or non-numeric, `_DESC` to `"<NAME> MCP server"`.
/// Keys are scanned in sorted order, so two passes over the same mapping
/// produce identical output.
pub fn discover_from_env<'a, I>(vars: I) -> DiscoveryOutcome
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    // Uppercase-keyed index so the convention is case-insensitive while
    // the original NAME casing stays available for generated strings.
    let indexed: BTreeMap<String, (&str, &str)> = vars
        .into_iter()
        .map(|(k, v)| (k.to_ascii_uppercase(), (k, v)))
        .collect();

    let mut outcome = DiscoveryOutcome::default();

    for (upper_key, (original_key, url)) in &indexed {
        if !upper_key.starts_with(DISCOVERY_PREFIX) || !upper_key.ends_with(DISCOVERY_SUFFIX) {
            continue;
        }
        // A key like `MCP_SERVER_URL` matches both prefix and suffix with
        // overlap and has no name segment.
        if upper_key.len() < DISCOVERY_PREFIX.len() + DISCOVERY_SUFFIX.len() {
            outcome
                .errors
                .push(ConfigError::InvalidId((*original_key).to_string()));
            continue;
        }

        let name = &original_key[DISCOVERY_PREFIX.len()..original_key.len() - DISCOVERY_SUFFIX.len()];
        let id = name.to_lowercase();
        if id.is_empty() {
            outcome
                .errors
                .push(ConfigError::InvalidId((*original_key).to_string()));
            continue;
        }
        if url.is_empty() {
            outcome.errors.push(ConfigError::MissingUrl(id));
            continue;
        }

        let upper_name = &upper_key[DISCOVERY_PREFIX.len()..upper_key.len() - DISCOVERY_SUFFIX.len()];
        let port = indexed
            .get(&format!("{DISCOVERY_PREFIX}{upper_name}_PORT"))
            .and_then(|(_, v)| v.parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);
        let description = indexed
            .get(&format!("{DISCOVERY_PREFIX}{upper_name}_DESC"))
            .map(|(_, v)| (*v).to_string())
            .unwrap_or_else(|| format!("{name} MCP server"));

        tracing::debug!(server_id = %id, url = %url, port, "Discovered dynamic server");

        outcome.configs.push(ServerConfig {
            id,
            display_name: display_name_for(name),
            base_url: (*url).to_string(),
            port,
            description,
            source: ServerSource::Dynamic,
        });
    }

    outcome
}

/// `MY_TOOLS` becomes `My-Tools-MCP`.
fn display_name_for(name: &str) -> String {
    let titled = name
        .split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-");
    format!("{titled}-MCP")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&'static str, &'static str)]) -> Vec<(&'static str, &'static str)> {
        pairs.to_vec()
    }

    #[test]
    fn test_endpoint() {
        let config = ServerConfig::new("weather", "Weather-MCP", "http://w.example").with_port(9001);
        assert_eq!(config.endpoint(), "http://w.example:9001");
    }

    #[test]
    fn test_discovery_basic() {
        let outcome = discover_from_env(vars(&[
            ("MCP_SERVER_WEATHER_URL", "http://w.example"),
            ("MCP_SERVER_WEATHER_PORT", "9001"),
            ("MCP_SERVER_WEATHER_DESC", "Forecast and climate tools"),
            ("UNRELATED", "ignored"),
        ]));

        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.configs.len(), 1);
        let config = &outcome.configs[0];
        assert_eq!(config.id, "weather");
        assert_eq!(config.display_name, "Weather-MCP");
        assert_eq!(config.base_url, "http://w.example");
        assert_eq!(config.port, 9001);
        assert_eq!(config.description, "Forecast and climate tools");
        assert_eq!(config.source, ServerSource::Dynamic);
    }

    #[test]
    fn test_discovery_defaults() {
        let outcome = discover_from_env(vars(&[("MCP_SERVER_MY_TOOLS_URL", "http://t.example")]));

        let config = &outcome.configs[0];
        assert_eq!(config.id, "my_tools");
        assert_eq!(config.display_name, "My-Tools-MCP");
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.description, "MY_TOOLS MCP server");
    }

    #[test]
    fn test_discovery_non_numeric_port_defaults() {
        let outcome = discover_from_env(vars(&[
            ("MCP_SERVER_DB_URL", "http://d.example"),
            ("MCP_SERVER_DB_PORT", "not-a-port"),
        ]));
        assert_eq!(outcome.configs[0].port, DEFAULT_PORT);
    }

    #[test]
    fn test_discovery_case_insensitive_keys() {
        let outcome = discover_from_env(vars(&[
            ("mcp_server_db_url", "http://d.example"),
            ("mcp_server_db_port", "8090"),
        ]));
        assert_eq!(outcome.configs.len(), 1);
        assert_eq!(outcome.configs[0].id, "db");
        assert_eq!(outcome.configs[0].port, 8090);
    }

    #[test]
    fn test_discovery_collects_malformed_entries() {
        let outcome = discover_from_env(vars(&[
            ("MCP_SERVER_GOOD_URL", "http://g.example"),
            ("MCP_SERVER_EMPTY_URL", ""),
            ("MCP_SERVER__URL", "http://anon.example"),
        ]));

        assert_eq!(outcome.configs.len(), 1);
        assert_eq!(outcome.configs[0].id, "good");
        assert_eq!(outcome.errors.len(), 2);
    }

    #[test]
    fn test_discovery_nameless_key_is_invalid() {
        // Prefix and suffix overlap; there is no name segment to slice.
        let outcome = discover_from_env(vars(&[("MCP_SERVER_URL", "http://x.example")]));
        assert!(outcome.configs.is_empty());
        assert_eq!(outcome.errors.len(), 1);
        assert!(matches!(outcome.errors[0], ConfigError::InvalidId(_)));
    }

    #[test]
    fn test_discovery_deterministic() {
        let forward = vars(&[
            ("MCP_SERVER_B_URL", "http://b.example"),
            ("MCP_SERVER_A_URL", "http://a.example"),
        ]);
        let mut reversed = forward.clone();
        reversed.reverse();

        let first = discover_from_env(forward);
        let second = discover_from_env(reversed);
        assert_eq!(first.configs, second.configs);
        // Sorted scan order, not input order.
        assert_eq!(first.configs[0].id, "a");
    }
}
