//! # Conductor MCP - Server Registry, Connections and Routing
//!
//! Everything between the workflow engine and the tool servers it drives:
//!
//! - **Discovery & registry** ([`config`], [`registry`]): where servers
//!   come from and the ordered source of truth for which ones exist.
//! - **Transport** ([`transport`]): the [`ToolInvocable`] seam plus the
//!   HTTP implementation of the tool server protocol and an in-process
//!   variant for tests.
//! - **Connections** ([`connection`]): per-server session lifecycle,
//!   health probes with degradation, and timeout-bounded invocation.
//! - **Catalog & routing** ([`catalog`], [`router`]): the cross-server
//!   tool view and deterministic keyword-scored server selection.

pub mod catalog;
pub mod config;
pub mod connection;
pub mod registry;
pub mod router;
pub mod transport;

pub use catalog::ToolCatalog;
pub use config::{DEFAULT_PORT, DiscoveryOutcome, ServerConfig, ServerSource, discover_from_env};
pub use connection::{
    ConnectionConfig, ConnectionManager, ConnectionRecord, ConnectionStatus, ServerSummary,
    SweepHandle,
};
pub use registry::ServerRegistry;
pub use router::Router;
pub use transport::{
    HttpTransport, HttpTransportFactory, LocalTransport, LocalTransportFactory, ToolDescriptor,
    ToolInvocable, TransportFactory,
};
