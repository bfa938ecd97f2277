//! Connection manager.
//!
//! One [`ConnectionManager`] owns the live sessions for every registered
//! server. Each server has an entry with an async operation lock, so
//! connect, disconnect, health checks and invocations for the same id are
//! serialized, while operations on different servers run concurrently.
//! Network calls never happen while a record lock is held.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use dashmap::DashMap;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use conductor_core::{ConnectError, ConnectResult, InvokeError, InvokeResult};

use crate::config::ServerConfig;
use crate::registry::ServerRegistry;
use crate::transport::{ToolDescriptor, ToolInvocable, TransportFactory};

/// Lifecycle state of one server connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// Known to the registry, no session attempted yet.
    Registered,
    /// A connection attempt is in flight.
    Connecting,
    /// Live session with a fresh tool catalog.
    Connected,
    /// Session exists but the last probe failed.
    Degraded,
    /// Session lost; tools are invalid.
    Failed,
    /// Session closed deliberately.
    Disconnected,
}

impl ConnectionStatus {
    /// Check whether invocations are allowed in this state.
    pub fn is_usable(&self) -> bool {
        matches!(self, ConnectionStatus::Connected | ConnectionStatus::Degraded)
    }
}

/// Observable state of one server connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    /// Server this record belongs to.
    pub server_id: String,
    /// Current lifecycle state.
    pub status: ConnectionStatus,
    /// Last error observed on this connection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// When the last health probe ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_health_check_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Consecutive failed probes since the last success.
    pub probe_failures: u32,
    /// Tools the server advertised at connect or last successful probe.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub advertised_tools: Vec<ToolDescriptor>,
}

impl ConnectionRecord {
    fn new(server_id: &str) -> Self {
        Self {
            server_id: server_id.to_string(),
            status: ConnectionStatus::Registered,
            last_error: None,
            last_health_check_at: None,
            probe_failures: 0,
            advertised_tools: Vec::new(),
        }
    }
}

/// Timeouts and health thresholds for the manager.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Budget for connect (including the initial catalog fetch).
    pub connect_timeout: Duration,
    /// Budget for one tool invocation.
    pub invoke_timeout: Duration,
    /// Budget for one health probe.
    pub probe_timeout: Duration,
    /// Consecutive probe failures before a degraded server is failed.
    pub probe_failure_threshold: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            invoke_timeout: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(5),
            probe_failure_threshold: 3,
        }
    }
}

struct ServerEntry {
    /// Serializes connect/disconnect/probe for one server.
    op_lock: Mutex<()>,
    record: RwLock<ConnectionRecord>,
    transport: RwLock<Option<Arc<dyn ToolInvocable>>>,
}

impl ServerEntry {
    fn new(server_id: &str) -> Self {
        Self {
            op_lock: Mutex::new(()),
            record: RwLock::new(ConnectionRecord::new(server_id)),
            transport: RwLock::new(None),
        }
    }
}

/// Registry-plus-status summary of one server, for operators.
#[derive(Debug, Clone, Serialize)]
pub struct ServerSummary {
    /// Registered configuration.
    #[serde(flatten)]
    pub config: ServerConfig,
    /// Whether invocations are currently allowed.
    pub connected: bool,
    /// Connection lifecycle state.
    pub status: ConnectionStatus,
}

/// Manages live sessions for every registered server.
pub struct ConnectionManager {
    registry: Arc<ServerRegistry>,
    factory: Arc<dyn TransportFactory>,
    config: ConnectionConfig,
    entries: DashMap<String, Arc<ServerEntry>>,
}

impl ConnectionManager {
    /// Create a manager over a registry with the default timeouts.
    pub fn new(registry: Arc<ServerRegistry>, factory: Arc<dyn TransportFactory>) -> Self {
        Self::with_config(registry, factory, ConnectionConfig::default())
    }

    /// Create a manager with explicit timeouts and thresholds.
    pub fn with_config(
        registry: Arc<ServerRegistry>,
        factory: Arc<dyn TransportFactory>,
        config: ConnectionConfig,
    ) -> Self {
        Self {
            registry,
            factory,
            config,
            entries: DashMap::new(),
        }
    }

    /// The registry this manager serves.
    pub fn registry(&self) -> &Arc<ServerRegistry> {
        &self.registry
    }

    fn entry(&self, server_id: &str) -> Arc<ServerEntry> {
        self.entries
            .entry(server_id.to_string())
            .or_insert_with(|| Arc::new(ServerEntry::new(server_id)))
            .clone()
    }

    fn write_record<F>(&self, entry: &ServerEntry, mutate: F) -> ConnectionRecord
    where
        F: FnOnce(&mut ConnectionRecord),
    {
        let mut record = entry.record.write().expect("record lock poisoned");
        mutate(&mut record);
        record.clone()
    }

    /// Connect to a registered server and fetch its tool catalog.
    ///
    /// Safe to call when already connected: the session is rebuilt and the
    /// catalog refreshed.
    pub async fn connect(&self, server_id: &str) -> ConnectResult<ConnectionRecord> {
        let config = self
            .registry
            .get(server_id)
            .ok_or_else(|| ConnectError::UnknownServer(server_id.to_string()))?;

        let entry = self.entry(server_id);
        let _op = entry.op_lock.lock().await;

        self.write_record(&entry, |record| {
            record.status = ConnectionStatus::Connecting;
        });

        let transport = self.factory.create(&config);
        let attempt = tokio::time::timeout(self.config.connect_timeout, transport.list_tools());

        match attempt.await {
            Ok(Ok(tools)) => {
                info!(server_id = %server_id, tools = tools.len(), "Connected to server");
                *entry.transport.write().expect("transport lock poisoned") = Some(transport);
                Ok(self.write_record(&entry, |record| {
                    record.status = ConnectionStatus::Connected;
                    record.last_error = None;
                    record.probe_failures = 0;
                    record.advertised_tools = tools;
                }))
            }
            Ok(Err(err)) => {
                warn!(server_id = %server_id, error = %err, "Connection failed");
                *entry.transport.write().expect("transport lock poisoned") = None;
                self.write_record(&entry, |record| {
                    record.status = ConnectionStatus::Failed;
                    record.last_error = Some(err.to_string());
                    record.advertised_tools.clear();
                });
                Err(err)
            }
            Err(_) => {
                let err = ConnectError::Timeout(server_id.to_string());
                warn!(server_id = %server_id, "Connection timed out");
                *entry.transport.write().expect("transport lock poisoned") = None;
                self.write_record(&entry, |record| {
                    record.status = ConnectionStatus::Failed;
                    record.last_error = Some(err.to_string());
                    record.advertised_tools.clear();
                });
                Err(err)
            }
        }
    }

    /// Connect to every registered server concurrently.
    ///
    /// Partial availability is normal: the result maps each server id to
    /// its individual outcome, and one server's failure never blocks the
    /// others.
    pub async fn connect_all(&self) -> HashMap<String, ConnectResult<ConnectionRecord>> {
        let configs = self.registry.list();
        let total = configs.len();

        let attempts = configs.iter().map(|config| {
            let id = config.id.clone();
            async move { (id.clone(), self.connect(&id).await) }
        });

        let results: HashMap<_, _> = join_all(attempts).await.into_iter().collect();
        let connected = results.values().filter(|r| r.is_ok()).count();
        info!(connected, total, "Connected {connected} of {total} servers");
        results
    }

    /// Close the session for a server.
    pub async fn disconnect(&self, server_id: &str) -> ConnectResult<ConnectionRecord> {
        if !self.registry.contains(server_id) && !self.entries.contains_key(server_id) {
            return Err(ConnectError::UnknownServer(server_id.to_string()));
        }

        let entry = self.entry(server_id);
        let _op = entry.op_lock.lock().await;

        let status = entry.record.read().expect("record lock poisoned").status;
        if !status.is_usable() {
            return Err(ConnectError::NotConnected(server_id.to_string()));
        }

        *entry.transport.write().expect("transport lock poisoned") = None;
        info!(server_id = %server_id, "Disconnected from server");
        Ok(self.write_record(&entry, |record| {
            record.status = ConnectionStatus::Disconnected;
            record.advertised_tools.clear();
        }))
    }

    /// Close every usable session.
    pub async fn disconnect_all(&self) {
        let ids: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        let attempts = ids.iter().map(|id| self.disconnect(id));
        for result in join_all(attempts).await {
            // NotConnected entries are fine here.
            if let Err(err @ ConnectError::UnknownServer(_)) = result {
                warn!(error = %err, "Disconnect skipped unknown server");
            }
        }
    }

    /// Probe one server and update its record.
    ///
    /// A failed probe degrades a connected server; after
    /// `probe_failure_threshold` consecutive failures a degraded server is
    /// failed and its tools invalidated. A successful probe restores the
    /// server to connected and refreshes its tool catalog.
    pub async fn health_check(&self, server_id: &str) -> ConnectResult<ConnectionRecord> {
        if !self.registry.contains(server_id) {
            return Err(ConnectError::UnknownServer(server_id.to_string()));
        }

        let entry = self.entry(server_id);
        let _op = entry.op_lock.lock().await;

        let transport = entry
            .transport
            .read()
            .expect("transport lock poisoned")
            .clone();
        let Some(transport) = transport else {
            return Ok(self.write_record(&entry, |record| {
                record.last_health_check_at = Some(chrono::Utc::now());
            }));
        };

        let probe = tokio::time::timeout(self.config.probe_timeout, transport.probe()).await;
        let probe = match probe {
            Ok(inner) => inner,
            Err(_) => Err(ConnectError::Timeout(server_id.to_string())),
        };

        match probe {
            Ok(()) => {
                // Catalog refresh is best-effort; a stale catalog beats none.
                let refreshed = tokio::time::timeout(self.config.probe_timeout, transport.list_tools())
                    .await
                    .ok()
                    .and_then(Result::ok);
                debug!(server_id = %server_id, "Health probe succeeded");
                Ok(self.write_record(&entry, |record| {
                    record.status = ConnectionStatus::Connected;
                    record.last_error = None;
                    record.probe_failures = 0;
                    record.last_health_check_at = Some(chrono::Utc::now());
                    if let Some(tools) = refreshed {
                        record.advertised_tools = tools;
                    }
                }))
            }
            Err(err) => {
                let threshold = self.config.probe_failure_threshold;
                warn!(server_id = %server_id, error = %err, "Health probe failed");
                let record = self.write_record(&entry, |record| {
                    record.probe_failures += 1;
                    record.last_error = Some(err.to_string());
                    record.last_health_check_at = Some(chrono::Utc::now());
                    match record.status {
                        ConnectionStatus::Connected => {
                            record.status = ConnectionStatus::Degraded;
                        }
                        ConnectionStatus::Degraded if record.probe_failures >= threshold => {
                            record.status = ConnectionStatus::Failed;
                            record.advertised_tools.clear();
                        }
                        _ => {}
                    }
                });
                if record.status == ConnectionStatus::Failed {
                    *entry.transport.write().expect("transport lock poisoned") = None;
                }
                Ok(record)
            }
        }
    }

    /// Probe every server with a session, concurrently.
    pub async fn health_check_all(&self) -> HashMap<String, ConnectResult<ConnectionRecord>> {
        let ids: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        let attempts = ids.iter().map(|id| {
            let id = id.clone();
            async move { (id.clone(), self.health_check(&id).await) }
        });
        join_all(attempts).await.into_iter().collect()
    }

    /// Invoke a tool on a specific server.
    pub async fn invoke(
        &self,
        server_id: &str,
        tool: &str,
        args: serde_json::Value,
    ) -> InvokeResult<serde_json::Value> {
        let entry = match self.entries.get(server_id) {
            Some(entry) => Arc::clone(entry.value()),
            None => return Err(InvokeError::NotConnected(server_id.to_string())),
        };

        {
            let record = entry.record.read().expect("record lock poisoned");
            if !record.status.is_usable() {
                return Err(InvokeError::NotConnected(server_id.to_string()));
            }
            if !record.advertised_tools.iter().any(|t| t.name == tool) {
                return Err(InvokeError::UnknownTool {
                    server_id: server_id.to_string(),
                    tool: tool.to_string(),
                });
            }
        }

        let transport = entry
            .transport
            .read()
            .expect("transport lock poisoned")
            .clone()
            .ok_or_else(|| InvokeError::NotConnected(server_id.to_string()))?;

        debug!(server_id = %server_id, tool = %tool, "Invoking tool");
        match tokio::time::timeout(self.config.invoke_timeout, transport.invoke(tool, args)).await {
            Ok(result) => result,
            Err(_) => Err(InvokeError::Timeout {
                server_id: server_id.to_string(),
                tool: tool.to_string(),
            }),
        }
    }

    /// Current record for one server.
    pub fn record(&self, server_id: &str) -> Option<ConnectionRecord> {
        self.entries
            .get(server_id)
            .map(|entry| entry.record.read().expect("record lock poisoned").clone())
    }

    /// Records for every server the manager has touched.
    pub fn records(&self) -> Vec<ConnectionRecord> {
        self.entries
            .iter()
            .map(|entry| entry.record.read().expect("record lock poisoned").clone())
            .collect()
    }

    /// Registry-ordered summaries combining configuration and status.
    pub fn summaries(&self) -> Vec<ServerSummary> {
        self.registry
            .list()
            .into_iter()
            .map(|config| {
                let status = self
                    .record(&config.id)
                    .map_or(ConnectionStatus::Registered, |r| r.status);
                ServerSummary {
                    connected: status.is_usable(),
                    status,
                    config,
                }
            })
            .collect()
    }

    /// Start a background task probing all servers on a fixed interval.
    pub fn start_health_sweep(self: &Arc<Self>, interval: Duration) -> SweepHandle {
        let manager = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let results = manager.health_check_all().await;
                debug!(probed = results.len(), "Health sweep completed");
            }
        });
        SweepHandle { handle }
    }
}

/// Handle for a running health sweep task.
pub struct SweepHandle {
    handle: JoinHandle<()>,
}

impl SweepHandle {
    /// Stop the sweep.
    pub fn stop(self) {
        self.handle.abort();
    }
}

impl Drop for SweepHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
