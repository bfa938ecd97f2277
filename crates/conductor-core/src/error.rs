//! Error taxonomy for the orchestration core.
//!
//! Each layer of the system owns one error enum: registration
//! ([`ConfigError`]), session establishment ([`ConnectError`]), tool
//! invocation ([`InvokeError`]), server selection ([`RouteError`]), plan
//! parsing ([`PlanningError`]), checkpoint persistence ([`StoreError`]) and
//! the workflow run itself ([`WorkflowError`]).

use thiserror::Error;

/// Errors produced by server registration and discovery input.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Server id is empty or not lowercase.
    #[error("Invalid server id: {0:?}")]
    InvalidId(String),

    /// Registration is missing a base URL.
    #[error("Server {0} has no base URL")]
    MissingUrl(String),

    /// Id already registered and overwrite was not requested.
    #[error("Server id already registered: {0}")]
    DuplicateId(String),

    /// Id is not present in the registry.
    #[error("Server not found: {0}")]
    NotFound(String),
}

/// Result type for registry operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors produced while establishing or tearing down a server session.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The connection attempt did not complete within its timeout.
    #[error("Connection to {0} timed out")]
    Timeout(String),

    /// The server could not be reached.
    #[error("Server {server_id} unreachable: {reason}")]
    Unreachable { server_id: String, reason: String },

    /// The server answered with a malformed tool catalog response.
    #[error("Protocol error from {server_id}: {reason}")]
    Protocol { server_id: String, reason: String },

    /// The id is not present in the registry.
    #[error("Server not registered: {0}")]
    UnknownServer(String),

    /// Disconnect was requested for a server without a live session.
    #[error("Server not connected: {0}")]
    NotConnected(String),
}

/// Result type for connection operations.
pub type ConnectResult<T> = Result<T, ConnectError>;

/// Errors produced by a tool invocation against a connected server.
#[derive(Debug, Error)]
pub enum InvokeError {
    /// The call did not complete within its timeout.
    #[error("Invocation of {tool} on {server_id} timed out")]
    Timeout { server_id: String, tool: String },

    /// The server reported a failure executing the tool.
    #[error("Remote fault from {server_id}: {reason}")]
    RemoteFault { server_id: String, reason: String },

    /// The target server has no live session.
    #[error("Server not connected: {0}")]
    NotConnected(String),

    /// The target server does not advertise the requested tool.
    #[error("Tool {tool} not advertised by {server_id}")]
    UnknownTool { server_id: String, tool: String },

    /// Routed invocation could not select a server.
    #[error(transparent)]
    Route(#[from] RouteError),
}

/// Result type for invocation operations.
pub type InvokeResult<T> = Result<T, InvokeError>;

/// Errors produced by server selection.
///
/// The two variants are deliberately distinct: callers must be able to tell
/// "nothing is up" apart from "nothing fits".
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    /// The candidate set was empty before scoring.
    #[error("No connected servers")]
    NoConnectedServers,

    /// Candidates existed but none matched the request.
    #[error("No server matches the request: {0}")]
    NoRoute(String),
}

/// Result type for routing operations.
pub type RouteResult<T> = Result<T, RouteError>;

/// Errors produced while parsing a planner response into an execution plan.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanningError {
    /// The planner response is not a JSON object.
    #[error("Plan is not a JSON object")]
    NotAnObject,

    /// The plan has no steps.
    #[error("Plan contains no steps")]
    EmptyPlan,

    /// A step is missing a required field.
    #[error("Plan step {position} is missing field `{field}`")]
    MissingField {
        position: usize,
        field: &'static str,
    },

    /// Step indices are not contiguous and 1-based.
    #[error("Plan step at position {position} has index {found}, expected {expected}")]
    BadStepIndex {
        position: usize,
        found: u64,
        expected: u64,
    },
}

/// Result type for plan parsing.
pub type PlanningResult<T> = Result<T, PlanningError>;

/// Errors produced by checkpoint persistence.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying I/O failure.
    #[error("Checkpoint I/O error: {0}")]
    Io(String),

    /// The checkpoint could not be serialized or deserialized.
    #[error("Checkpoint serialization error: {0}")]
    Serialization(String),
}

/// Result type for checkpoint store operations.
pub type StoreResult<T> = Result<T, StoreError>;

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Terminal errors for a workflow run.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// The planner response could not be parsed; planning failures are fatal.
    #[error("Planning failed: {0}")]
    Planning(#[from] PlanningError),

    /// The iteration ceiling was breached; the engine fails closed.
    #[error("Iteration ceiling of {ceiling} exceeded")]
    IterationCeilingExceeded { ceiling: u32 },

    /// The run was cancelled; completed step results are preserved.
    #[error("Run cancelled")]
    Cancelled,

    /// A step failed irrecoverably under the abort policy.
    #[error("Step {step_index} aborted the run: {reason}")]
    StepAborted { step_index: usize, reason: String },

    /// A collaborator (responder/summarizer) failed.
    #[error("Responder failed: {0}")]
    Responder(String),

    /// Checkpoint persistence failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type for workflow runs.
pub type WorkflowResult<T> = Result<T, WorkflowError>;

impl ConnectError {
    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ConnectError::Timeout(_) | ConnectError::Unreachable { .. }
        )
    }

    /// Get the error code suitable for logging or reporting.
    pub fn error_code(&self) -> &'static str {
        match self {
            ConnectError::Timeout(_) => "CONNECT_TIMEOUT",
            ConnectError::Unreachable { .. } => "UNREACHABLE",
            ConnectError::Protocol { .. } => "PROTOCOL_ERROR",
            ConnectError::UnknownServer(_) => "UNKNOWN_SERVER",
            ConnectError::NotConnected(_) => "NOT_CONNECTED",
        }
    }
}

impl InvokeError {
    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            InvokeError::Timeout { .. }
                | InvokeError::RemoteFault { .. }
                | InvokeError::Route(RouteError::NoConnectedServers)
        )
    }

    /// Get the error code suitable for logging or reporting.
    pub fn error_code(&self) -> &'static str {
        match self {
            InvokeError::Timeout { .. } => "INVOKE_TIMEOUT",
            InvokeError::RemoteFault { .. } => "REMOTE_FAULT",
            InvokeError::NotConnected(_) => "NOT_CONNECTED",
            InvokeError::UnknownTool { .. } => "UNKNOWN_TOOL",
            InvokeError::Route(RouteError::NoConnectedServers) => "NO_CONNECTED_SERVERS",
            InvokeError::Route(RouteError::NoRoute(_)) => "NO_ROUTE",
        }
    }
}
