//! MCP server lifecycle management.
//!
//! [`McpManager`] owns every running server and the shared tool catalog.
//! Cross-server state sits behind one `RwLock` that is never held across
//! I/O; per-server request state lives in each server's correlator.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use toolhost_core::{
    CallToolResult, McpError, McpEvent, McpEventSink, McpServerInfo, McpServerStatus, McpSettings,
    NoopEventSink, RejectedServer, ServerRegistry, Tool,
};

use crate::catalog::{ToolCatalog, fetch_tools, invoke_tool};
use crate::connection::ServerConnection;
use crate::handshake::HandshakeCoordinator;
use crate::launcher::{ProcessLauncher, ServerLauncher};
use crate::process::{ExitCallback, ProcessExit};

/// Lifecycle bookkeeping for one configured server.
#[derive(Debug, Clone)]
struct Lifecycle {
    status: McpServerStatus,
    /// Start attempt this status belongs to.
    instance: u64,
    started_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct ManagerState {
    /// Connections being initialized or running, by server name.
    servers: HashMap<String, Arc<ServerConnection>>,
    /// Tools of running servers only.
    catalog: ToolCatalog,
    lifecycle: HashMap<String, Lifecycle>,
}

impl ManagerState {
    fn is_running(&self, name: &str) -> bool {
        self.lifecycle
            .get(name)
            .is_some_and(|l| l.status.is_running())
    }

    /// Whether `instance` is still the live attempt and has `status`.
    fn is_current(&self, name: &str, instance: u64, status: &McpServerStatus) -> bool {
        self.lifecycle
            .get(name)
            .is_some_and(|l| l.instance == instance && &l.status == status)
    }

    fn running_connection(&self, name: &str) -> Option<Arc<ServerConnection>> {
        if self.is_running(name) {
            self.servers.get(name).cloned()
        } else {
            None
        }
    }
}

struct Inner {
    registry: ServerRegistry,
    settings: McpSettings,
    launcher: Arc<dyn ServerLauncher>,
    events: Arc<dyn McpEventSink>,
    state: RwLock<ManagerState>,
    next_instance: AtomicU64,
}

/// Manager for MCP server lifecycle and tool routing.
///
/// Cloning is cheap and every clone drives the same set of servers.
#[derive(Clone)]
pub struct McpManager {
    inner: Arc<Inner>,
}

impl McpManager {
    /// Create a manager. Nothing is started until [`Self::start_all`] or
    /// [`Self::start_server`].
    pub fn new(
        registry: ServerRegistry,
        settings: McpSettings,
        launcher: Arc<dyn ServerLauncher>,
        events: Arc<dyn McpEventSink>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry,
                settings,
                launcher,
                events,
                state: RwLock::new(ManagerState::default()),
                next_instance: AtomicU64::new(1),
            }),
        }
    }

    /// Manager that spawns real processes and discards events.
    pub fn with_process_launcher(registry: ServerRegistry, settings: McpSettings) -> Self {
        Self::new(
            registry,
            settings,
            Arc::new(ProcessLauncher),
            Arc::new(NoopEventSink),
        )
    }

    pub fn registry(&self) -> &ServerRegistry {
        &self.inner.registry
    }

    pub fn settings(&self) -> &McpSettings {
        &self.inner.settings
    }

    /// Start every configured server that is not already running.
    ///
    /// Spawns are staggered by `settings.start_stagger`; handshakes then
    /// proceed independently. One server failing does not affect the others.
    /// Returns the failures in configuration order, followed by config
    /// entries that were rejected as invalid.
    pub async fn start_all(&self) -> Vec<(String, McpError)> {
        let stagger = self.inner.settings.start_stagger;
        let mut tasks = JoinSet::new();

        for name in self.inner.registry.names() {
            if self.is_running(&name).await {
                continue;
            }
            if !tasks.is_empty() && !stagger.is_zero() {
                tokio::time::sleep(stagger).await;
            }
            let inner = Arc::clone(&self.inner);
            tasks.spawn(async move {
                let result = inner.start_server(&name).await;
                (name, result)
            });
        }

        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(_))) => {}
                Ok((name, Err(e))) => failures.push((name, e)),
                Err(e) => warn!(error = %e, "Server start task failed"),
            }
        }
        failures.sort_by_key(|(name, _)| self.inner.rank(name));

        for rejected in self.inner.registry.rejected() {
            self.inner.events.emit(McpEvent::ServerFailed {
                name: rejected.name.clone(),
                message: rejected.error().to_string(),
            });
            failures.push((rejected.name.clone(), rejected.error()));
        }
        failures
    }

    /// Start one configured server. Returns the number of tools discovered.
    pub async fn start_server(&self, name: &str) -> Result<usize, McpError> {
        self.inner.start_server(name).await
    }

    /// Stop one server, failing its pending requests with `ServerStopped`.
    ///
    /// Stopping a configured server that is not running is a no-op.
    pub async fn stop_server(&self, name: &str) -> Result<(), McpError> {
        self.inner.stop_server(name).await
    }

    /// Stop every running or starting server.
    pub async fn stop_all(&self) {
        let names: Vec<String> = self.inner.state.read().await.servers.keys().cloned().collect();

        let mut tasks = JoinSet::new();
        for name in names {
            let inner = Arc::clone(&self.inner);
            tasks.spawn(async move { inner.stop_server(&name).await });
        }
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "Failed to stop MCP server"),
                Err(e) => warn!(error = %e, "Server stop task failed"),
            }
        }
    }

    /// Tools of all running servers, in configuration order.
    pub async fn get_tools(&self) -> Vec<Tool> {
        self.inner.state.read().await.catalog.all_tools()
    }

    /// `(server, tool)` pairs for all running servers.
    pub async fn tools_by_server(&self) -> Vec<(String, Tool)> {
        self.inner
            .state
            .read()
            .await
            .catalog
            .tools_by_server()
            .map(|(server, tool)| (server.to_string(), tool.clone()))
            .collect()
    }

    pub async fn has_tool(&self, tool: &str) -> bool {
        self.inner.state.read().await.catalog.has_tool(tool)
    }

    /// Name of the first running server, in configuration order, that
    /// declares `tool`.
    pub async fn get_server_for_tool(&self, tool: &str) -> Option<String> {
        self.inner
            .state
            .read()
            .await
            .catalog
            .find_owner(tool)
            .map(ToString::to_string)
    }

    /// Route a tool call to the server that owns `tool`.
    ///
    /// Fails with `ToolNotFound` without contacting any server when no
    /// running server declares the tool.
    pub async fn call_tool_by_name(
        &self,
        tool: &str,
        arguments: Map<String, Value>,
    ) -> Result<CallToolResult, McpError> {
        let connection = {
            let state = self.inner.state.read().await;
            let owner = state
                .catalog
                .find_owner(tool)
                .ok_or_else(|| McpError::ToolNotFound(tool.to_string()))?;
            state
                .running_connection(owner)
                .ok_or_else(|| McpError::ServerStopped(owner.to_string()))?
        };

        debug!(server = %connection.name(), %tool, "Calling tool");
        invoke_tool(
            connection.correlator(),
            tool,
            arguments,
            self.inner.settings.request_timeout,
        )
        .await
    }

    /// Re-list one running server's tools. Returns the new tool count.
    pub async fn refresh_tools(&self, name: &str) -> Result<usize, McpError> {
        self.inner.refresh_tools(name).await
    }

    /// Re-list tools of every running server. Returns the failures.
    pub async fn refresh_all_tools(&self) -> Vec<(String, McpError)> {
        let names = self.running_servers().await;

        let mut tasks = JoinSet::new();
        for name in names {
            let inner = Arc::clone(&self.inner);
            tasks.spawn(async move {
                let result = inner.refresh_tools(&name).await;
                (name, result)
            });
        }

        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(_))) => {}
                Ok((name, Err(e))) => failures.push((name, e)),
                Err(e) => warn!(error = %e, "Tool refresh task failed"),
            }
        }
        failures.sort_by_key(|(name, _)| self.inner.rank(name));
        failures
    }

    pub async fn is_running(&self, name: &str) -> bool {
        self.inner.state.read().await.is_running(name)
    }

    /// Names of running servers, in configuration order.
    pub async fn running_servers(&self) -> Vec<String> {
        let state = self.inner.state.read().await;
        self.inner
            .registry
            .iter()
            .filter(|config| state.is_running(&config.name))
            .map(|config| config.name.clone())
            .collect()
    }

    /// One entry per configured server, in configuration order, then one
    /// `Failed` entry per rejected config entry.
    pub async fn server_statuses(&self) -> Vec<McpServerInfo> {
        let state = self.inner.state.read().await;
        let rejected = self.inner.registry.rejected().iter().map(|r| McpServerInfo {
            name: r.name.clone(),
            status: McpServerStatus::Failed(r.error().to_string()),
            tool_count: 0,
            started_at: None,
        });
        self.inner
            .registry
            .iter()
            .map(|config| {
                let lifecycle = state.lifecycle.get(&config.name);
                McpServerInfo {
                    name: config.name.clone(),
                    status: lifecycle.map(|l| l.status.clone()).unwrap_or_default(),
                    tool_count: state.catalog.tool_count(&config.name),
                    started_at: lifecycle.and_then(|l| l.started_at),
                }
            })
            .chain(rejected)
            .collect()
    }
}

impl std::fmt::Debug for McpManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpManager")
            .field("servers", &self.inner.registry.len())
            .finish_non_exhaustive()
    }
}

impl Inner {
    /// Position of `name` in the registry; unknown names sort last.
    fn rank(&self, name: &str) -> usize {
        self.registry
            .iter()
            .position(|config| config.name == name)
            .unwrap_or(usize::MAX)
    }

    async fn start_server(self: &Arc<Self>, name: &str) -> Result<usize, McpError> {
        let config = self.registry.get(name).cloned().ok_or_else(|| {
            self.registry
                .find_rejected(name)
                .map_or_else(|| McpError::ServerNotFound(name.to_string()), RejectedServer::error)
        })?;
        let instance = self.next_instance.fetch_add(1, Ordering::Relaxed);

        {
            let mut state = self.state.write().await;
            let busy = state.lifecycle.get(name).is_some_and(|l| {
                matches!(l.status, McpServerStatus::Starting | McpServerStatus::Running)
            });
            if busy {
                return Err(McpError::AlreadyRunning(name.to_string()));
            }
            state.lifecycle.insert(
                name.to_string(),
                Lifecycle {
                    status: McpServerStatus::Starting,
                    instance,
                    started_at: None,
                },
            );
        }
        info!(server = %name, instance, "Starting MCP server");

        let on_exit: ExitCallback = {
            let weak = Arc::downgrade(self);
            let name = name.to_string();
            Box::new(move |exit: ProcessExit| spawn_termination(weak, name, instance, exit.code))
        };

        let launched = match self.launcher.launch(&config, on_exit).await {
            Ok(launched) => launched,
            Err(e) => {
                self.mark_failed(name, instance, &e).await;
                return Err(e);
            }
        };

        let on_closed = {
            let weak = Arc::downgrade(self);
            let name = name.to_string();
            move || spawn_termination(weak, name, instance, None)
        };
        let connection = Arc::new(ServerConnection::attach(name, instance, launched, on_closed));

        {
            let mut state = self.state.write().await;
            if !state.is_current(name, instance, &McpServerStatus::Starting) {
                drop(state);
                connection.shutdown().await;
                return Err(McpError::ServerStopped(name.to_string()));
            }
            state
                .servers
                .insert(name.to_string(), Arc::clone(&connection));
        }

        let tools = match self.initialize(&connection).await {
            Ok(tools) => tools,
            Err(e) => {
                connection.shutdown().await;
                self.mark_failed(name, instance, &e).await;
                return Err(e);
            }
        };
        let tool_count = tools.len();

        {
            let mut state = self.state.write().await;
            if !state.is_current(name, instance, &McpServerStatus::Starting) {
                drop(state);
                connection.shutdown().await;
                return Err(McpError::ServerStopped(name.to_string()));
            }
            state.catalog.replace(name, tools);
            state.catalog.order_by(|server| self.rank(server));
            state.lifecycle.insert(
                name.to_string(),
                Lifecycle {
                    status: McpServerStatus::Running,
                    instance,
                    started_at: Some(connection.started_at()),
                },
            );
        }

        info!(server = %name, tool_count, "MCP server started");
        self.events.emit(McpEvent::ServerStarted {
            name: name.to_string(),
            tool_count,
        });
        Ok(tool_count)
    }

    /// Handshake, then the initial `tools/list`.
    async fn initialize(&self, connection: &ServerConnection) -> Result<Vec<Tool>, McpError> {
        HandshakeCoordinator::new(connection.correlator(), &self.settings)
            .with_stderr(connection.stderr())
            .run()
            .await?;

        fetch_tools(connection.correlator(), self.settings.request_timeout)
            .await
            .map_err(|e| McpError::ServerInitializationFailed {
                name: connection.name().to_string(),
                cause: format!("tools/list failed: {e}"),
            })
    }

    /// Record a failed start unless a newer attempt or a stop superseded it.
    async fn mark_failed(&self, name: &str, instance: u64, err: &McpError) {
        {
            let mut state = self.state.write().await;
            if let Some(lifecycle) = state.lifecycle.get_mut(name) {
                if lifecycle.instance != instance
                    || lifecycle.status == McpServerStatus::Stopped
                {
                    return;
                }
                lifecycle.status = McpServerStatus::Failed(err.to_string());
                lifecycle.started_at = None;
            }
            if state
                .servers
                .get(name)
                .is_some_and(|c| c.instance() == instance)
            {
                state.servers.remove(name);
            }
        }

        warn!(server = %name, error = %err, "MCP server failed to start");
        self.events.emit(McpEvent::ServerFailed {
            name: name.to_string(),
            message: err.to_string(),
        });
    }

    async fn stop_server(&self, name: &str) -> Result<(), McpError> {
        if self.registry.get(name).is_none() {
            return Err(McpError::ServerNotFound(name.to_string()));
        }

        let connection = {
            let mut state = self.state.write().await;
            state.catalog.remove(name);
            if let Some(lifecycle) = state.lifecycle.get_mut(name) {
                lifecycle.status = McpServerStatus::Stopped;
                lifecycle.started_at = None;
            }
            state.servers.remove(name)
        };

        let Some(connection) = connection else {
            debug!(server = %name, "Stop requested for server that is not running");
            return Ok(());
        };

        connection.shutdown().await;
        info!(server = %name, "MCP server stopped");
        self.events.emit(McpEvent::ServerStopped {
            name: name.to_string(),
        });
        Ok(())
    }

    async fn refresh_tools(&self, name: &str) -> Result<usize, McpError> {
        if self.registry.get(name).is_none() {
            return Err(McpError::ServerNotFound(name.to_string()));
        }
        let connection = self
            .state
            .read()
            .await
            .running_connection(name)
            .ok_or_else(|| McpError::ServerStopped(name.to_string()))?;

        let tools = fetch_tools(connection.correlator(), self.settings.request_timeout).await?;
        let tool_count = tools.len();

        {
            let mut state = self.state.write().await;
            let same_run = state
                .servers
                .get(name)
                .is_some_and(|c| c.instance() == connection.instance());
            if !same_run || !state.is_running(name) {
                return Err(McpError::ServerStopped(name.to_string()));
            }
            state.catalog.replace(name, tools);
            state.catalog.order_by(|server| self.rank(server));
        }

        debug!(server = %name, tool_count, "Tools refreshed");
        self.events.emit(McpEvent::ToolsRefreshed {
            name: name.to_string(),
            tool_count,
        });
        Ok(tool_count)
    }

    /// Clean up after a server exited or closed stdout on its own.
    async fn handle_termination(&self, name: &str, instance: u64, code: Option<i32>) {
        let connection = {
            let mut state = self.state.write().await;
            let matches = state
                .servers
                .get(name)
                .is_some_and(|c| c.instance() == instance);
            if !matches {
                return;
            }
            state.catalog.remove(name);
            if let Some(lifecycle) = state.lifecycle.get_mut(name) {
                lifecycle.status = McpServerStatus::Failed(match code {
                    Some(code) => format!("process exited with code {code}"),
                    None => "process exited".to_string(),
                });
                lifecycle.started_at = None;
            }
            state.servers.remove(name)
        };

        if let Some(connection) = connection {
            warn!(server = %name, code = ?code, "MCP server terminated unexpectedly");
            connection.shutdown().await;
            self.events.emit(McpEvent::ServerExited {
                name: name.to_string(),
                code,
            });
        }
    }
}

/// Run termination handling off the caller's task.
///
/// Invoked from process watcher and dispatcher tasks; the manager may
/// already be gone.
fn spawn_termination(inner: Weak<Inner>, name: String, instance: u64, code: Option<i32>) {
    tokio::spawn(async move {
        if let Some(inner) = inner.upgrade() {
            inner.handle_termination(&name, instance, code).await;
        }
    });
}
