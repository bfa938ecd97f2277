//! Transports for talking to tool servers.
//!
//! [`ToolInvocable`] is the seam between the connection manager and the
//! wire: the manager never sees HTTP, only this trait. [`HttpTransport`]
//! speaks the JSON-over-HTTP protocol real servers expose, while
//! [`LocalTransport`] serves in-process closures for tests and embedded
//! tooling.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use conductor_core::{ConnectError, ConnectResult, InvokeError, InvokeResult};

use crate::config::ServerConfig;

/// A tool advertised by a server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Tool name, unique within its server.
    pub name: String,
    /// Server that advertises the tool.
    pub server_id: String,
    /// What the tool does; feeds the router's keyword scoring.
    #[serde(default)]
    pub description: String,
    /// JSON schema for the tool's parameters.
    #[serde(default, rename = "parameters")]
    pub input_schema: Value,
}

/// A live session with one tool server.
#[async_trait]
pub trait ToolInvocable: Send + Sync {
    /// Fetch the server's current tool catalog.
    async fn list_tools(&self) -> ConnectResult<Vec<ToolDescriptor>>;

    /// Invoke a tool with the given arguments.
    async fn invoke(&self, tool: &str, args: Value) -> InvokeResult<Value>;

    /// Lightweight liveness probe.
    async fn probe(&self) -> ConnectResult<()>;
}

/// Builds transports for registered servers.
pub trait TransportFactory: Send + Sync {
    /// Create a transport for the given server configuration.
    fn create(&self, config: &ServerConfig) -> Arc<dyn ToolInvocable>;
}

// ============================================================================
// HTTP transport
// ============================================================================

#[derive(Deserialize)]
struct ToolsResponse {
    tools: Vec<WireTool>,
}

#[derive(Deserialize)]
struct WireTool {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    parameters: Value,
}

/// Transport speaking the JSON-over-HTTP tool server protocol:
/// `GET /health`, `GET /tools`, `POST /tools/call`.
pub struct HttpTransport {
    server_id: String,
    base: String,
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport for a server endpoint.
    pub fn new(server_id: impl Into<String>, base: impl Into<String>) -> Self {
        Self {
            server_id: server_id.into(),
            base: base.into(),
            client: reqwest::Client::new(),
        }
    }

    fn connect_error(&self, err: &reqwest::Error) -> ConnectError {
        if err.is_timeout() {
            ConnectError::Timeout(self.server_id.clone())
        } else {
            ConnectError::Unreachable {
                server_id: self.server_id.clone(),
                reason: err.to_string(),
            }
        }
    }
}

#[async_trait]
impl ToolInvocable for HttpTransport {
    async fn list_tools(&self) -> ConnectResult<Vec<ToolDescriptor>> {
        let url = format!("{}/tools", self.base);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.connect_error(&e))?;

        if !response.status().is_success() {
            return Err(ConnectError::Protocol {
                server_id: self.server_id.clone(),
                reason: format!("tools endpoint returned {}", response.status()),
            });
        }

        let body: ToolsResponse = response.json().await.map_err(|e| ConnectError::Protocol {
            server_id: self.server_id.clone(),
            reason: e.to_string(),
        })?;

        debug!(server_id = %self.server_id, count = body.tools.len(), "Fetched tool catalog");

        Ok(body
            .tools
            .into_iter()
            .map(|tool| ToolDescriptor {
                name: tool.name,
                server_id: self.server_id.clone(),
                description: tool.description,
                input_schema: tool.parameters,
            })
            .collect())
    }

    async fn invoke(&self, tool: &str, args: Value) -> InvokeResult<Value> {
        let url = format!("{}/tools/call", self.base);
        let request = serde_json::json!({ "tool": tool, "parameters": args });

        let response = self.client.post(&url).json(&request).send().await.map_err(|e| {
            if e.is_timeout() {
                InvokeError::Timeout {
                    server_id: self.server_id.clone(),
                    tool: tool.to_string(),
                }
            } else {
                InvokeError::RemoteFault {
                    server_id: self.server_id.clone(),
                    reason: e.to_string(),
                }
            }
        })?;

        if !response.status().is_success() {
            return Err(InvokeError::RemoteFault {
                server_id: self.server_id.clone(),
                reason: format!("tool call returned {}", response.status()),
            });
        }

        let body: Value = response.json().await.map_err(|e| InvokeError::RemoteFault {
            server_id: self.server_id.clone(),
            reason: e.to_string(),
        })?;

        // Servers wrap the payload in a `result` field; tolerate bare bodies.
        Ok(body.get("result").cloned().unwrap_or(body))
    }

    async fn probe(&self) -> ConnectResult<()> {
        let url = format!("{}/health", self.base);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.connect_error(&e))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(ConnectError::Unreachable {
                server_id: self.server_id.clone(),
                reason: format!("health endpoint returned {}", response.status()),
            })
        }
    }
}

/// Factory producing [`HttpTransport`] sessions from server endpoints.
#[derive(Default)]
pub struct HttpTransportFactory;

impl TransportFactory for HttpTransportFactory {
    fn create(&self, config: &ServerConfig) -> Arc<dyn ToolInvocable> {
        Arc::new(HttpTransport::new(&config.id, config.endpoint()))
    }
}

// ============================================================================
// Local transport
// ============================================================================

type ToolHandler = Arc<dyn Fn(Value) -> Result<Value, String> + Send + Sync>;

/// In-process transport serving closures instead of a remote server.
pub struct LocalTransport {
    server_id: String,
    tools: Vec<(ToolDescriptor, ToolHandler)>,
}

impl LocalTransport {
    /// Create an empty local transport for a server id.
    pub fn new(server_id: impl Into<String>) -> Self {
        Self {
            server_id: server_id.into(),
            tools: Vec::new(),
        }
    }

    /// Add a tool backed by a closure.
    pub fn with_tool<F>(mut self, name: &str, description: &str, handler: F) -> Self
    where
        F: Fn(Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        let descriptor = ToolDescriptor {
            name: name.to_string(),
            server_id: self.server_id.clone(),
            description: description.to_string(),
            input_schema: Value::Null,
        };
        self.tools.push((descriptor, Arc::new(handler)));
        self
    }
}

#[async_trait]
impl ToolInvocable for LocalTransport {
    async fn list_tools(&self) -> ConnectResult<Vec<ToolDescriptor>> {
        Ok(self.tools.iter().map(|(d, _)| d.clone()).collect())
    }

    async fn invoke(&self, tool: &str, args: Value) -> InvokeResult<Value> {
        let handler = self
            .tools
            .iter()
            .find(|(d, _)| d.name == tool)
            .map(|(_, h)| Arc::clone(h))
            .ok_or_else(|| InvokeError::UnknownTool {
                server_id: self.server_id.clone(),
                tool: tool.to_string(),
            })?;

        handler(args).map_err(|reason| InvokeError::RemoteFault {
            server_id: self.server_id.clone(),
            reason,
        })
    }

    async fn probe(&self) -> ConnectResult<()> {
        Ok(())
    }
}

/// Factory serving pre-built [`LocalTransport`] instances by server id.
///
/// Ids without a transport get a session that fails every call, which is
/// how tests model an unreachable server.
#[derive(Default)]
pub struct LocalTransportFactory {
    transports: HashMap<String, Arc<LocalTransport>>,
}

impl LocalTransportFactory {
    /// Create an empty factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a transport for a server id.
    pub fn with_transport(mut self, transport: LocalTransport) -> Self {
        self.transports
            .insert(transport.server_id.clone(), Arc::new(transport));
        self
    }
}

impl TransportFactory for LocalTransportFactory {
    fn create(&self, config: &ServerConfig) -> Arc<dyn ToolInvocable> {
        match self.transports.get(&config.id) {
            Some(transport) => Arc::clone(transport) as Arc<dyn ToolInvocable>,
            None => Arc::new(UnreachableTransport {
                server_id: config.id.clone(),
            }),
        }
    }
}

struct UnreachableTransport {
    server_id: String,
}

#[async_trait]
impl ToolInvocable for UnreachableTransport {
    async fn list_tools(&self) -> ConnectResult<Vec<ToolDescriptor>> {
        Err(ConnectError::Unreachable {
            server_id: self.server_id.clone(),
            reason: "no transport available".to_string(),
        })
    }

    async fn invoke(&self, _tool: &str, _args: Value) -> InvokeResult<Value> {
        Err(InvokeError::NotConnected(self.server_id.clone()))
    }

    async fn probe(&self) -> ConnectResult<()> {
        Err(ConnectError::Unreachable {
            server_id: self.server_id.clone(),
            reason: "no transport available".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_http_list_tools() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tools"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "tools": [
                    {"name": "get_forecast", "description": "Weather forecast", "parameters": {"type": "object"}},
                    {"name": "get_alerts"}
                ]
            })))
            .mount(&server)
            .await;

        let transport = HttpTransport::new("weather", server.uri());
        let tools = transport.list_tools().await.unwrap();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].name, "get_forecast");
        assert_eq!(tools[0].server_id, "weather");
        assert_eq!(tools[1].description, "");
    }

    #[tokio::test]
    async fn test_http_list_tools_bad_shape_is_protocol_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tools"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"unexpected": []})))
            .mount(&server)
            .await;

        let transport = HttpTransport::new("weather", server.uri());
        assert!(matches!(
            transport.list_tools().await,
            Err(ConnectError::Protocol { .. })
        ));
    }

    #[tokio::test]
    async fn test_http_invoke_unwraps_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tools/call"))
            .and(body_partial_json(json!({"tool": "get_forecast"})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"result": {"temp_c": 21}})),
            )
            .mount(&server)
            .await;

        let transport = HttpTransport::new("weather", server.uri());
        let result = transport
            .invoke("get_forecast", json!({"city": "kyiv"}))
            .await
            .unwrap();
        assert_eq!(result, json!({"temp_c": 21}));
    }

    #[tokio::test]
    async fn test_http_invoke_server_error_is_remote_fault() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tools/call"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let transport = HttpTransport::new("weather", server.uri());
        assert!(matches!(
            transport.invoke("get_forecast", json!({})).await,
            Err(InvokeError::RemoteFault { .. })
        ));
    }

    #[tokio::test]
    async fn test_http_probe() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let transport = HttpTransport::new("weather", server.uri());
        assert!(transport.probe().await.is_ok());
    }

    #[tokio::test]
    async fn test_http_unreachable() {
        // Port reserved and closed by the mock server lifecycle.
        let transport = HttpTransport::new("weather", "http://127.0.0.1:1");
        assert!(matches!(
            transport.probe().await,
            Err(ConnectError::Unreachable { .. })
        ));
    }

    #[tokio::test]
    async fn test_local_transport() {
        let transport = LocalTransport::new("calc")
            .with_tool("add", "Add two numbers", |args| {
                let a = args["a"].as_i64().unwrap_or(0);
                let b = args["b"].as_i64().unwrap_or(0);
                Ok(json!(a + b))
            });

        let tools = transport.list_tools().await.unwrap();
        assert_eq!(tools[0].name, "add");

        let result = transport.invoke("add", json!({"a": 2, "b": 3})).await.unwrap();
        assert_eq!(result, json!(5));

        assert!(matches!(
            transport.invoke("missing", json!({})).await,
            Err(InvokeError::UnknownTool { .. })
        ));
    }

    #[tokio::test]
    async fn test_local_factory_unknown_id_is_unreachable() {
        let factory = LocalTransportFactory::new();
        let config = ServerConfig::new("ghost", "Ghost-MCP", "http://ghost.example");
        let transport = factory.create(&config);
        assert!(matches!(
            transport.probe().await,
            Err(ConnectError::Unreachable { .. })
        ));
    }
}
