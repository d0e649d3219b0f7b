//! In-memory MCP servers for manager tests.
//!
//! `FakeLauncher` hands the manager `tokio::io::duplex` pipes instead of a
//! child process. Behind each pipe pair runs a scripted `FakeServer` that
//! answers the handshake, `tools/list` and `tools/call`, and records every
//! method it receives.

// Each test binary uses a different subset of these helpers.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::sync::Mutex as AsyncMutex;

use toolhost_core::{McpError, McpEvent, McpEventSink, McpSettings, ServerConfig, ServerRegistry};
use toolhost_mcp::{
    ExitCallback, LaunchedServer, McpManager, ProcessExit, ServerLauncher, ServerPipes,
};

/// How the fake answers one `tools/call`.
#[derive(Debug, Clone)]
pub enum Reply {
    /// `result` with the given value.
    Result(Value),
    /// `error` with the given payload.
    Error(Value),
    /// `result` after a delay, without blocking other requests.
    Delayed(Duration, Value),
    /// A line of invalid JSON, then the normal `result`.
    GarbledThen(Value),
    /// Never answer.
    Silent,
    /// Close stdout, as a crashing server would.
    Hangup,
    /// Answer with `arguments.text` after `arguments.delay_ms`.
    Echo,
    /// Stop reading stdin for good while keeping both pipes open.
    Stall,
}

/// Script for one fake server.
#[derive(Debug, Clone)]
pub struct FakeServer {
    tools: Arc<Mutex<Vec<Value>>>,
    calls: HashMap<String, Reply>,
    initialize: Option<Reply>,
    list_delay: Duration,
    methods: Arc<Mutex<Vec<String>>>,
}

impl FakeServer {
    /// A well-behaved server declaring `tools`, each answering with
    /// `"<tool> ok"`.
    pub fn with_tools(tools: &[&str]) -> Self {
        Self {
            tools: Arc::new(Mutex::new(tools.iter().map(|t| tool_json(t)).collect())),
            calls: HashMap::new(),
            initialize: None,
            list_delay: Duration::ZERO,
            methods: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Declare `tool` and answer calls to it with `reply`.
    #[must_use]
    pub fn on_call(mut self, tool: &str, reply: Reply) -> Self {
        let declared = self.tools.lock().unwrap().iter().any(|t| t["name"] == tool);
        if !declared {
            self.tools.lock().unwrap().push(tool_json(tool));
        }
        self.calls.insert(tool.to_string(), reply);
        self
    }

    /// Answer `initialize` with `reply` instead of a valid result.
    #[must_use]
    pub fn on_initialize(mut self, reply: Reply) -> Self {
        self.initialize = Some(reply);
        self
    }

    /// Delay every `tools/list` answer.
    #[must_use]
    pub const fn with_list_delay(mut self, delay: Duration) -> Self {
        self.list_delay = delay;
        self
    }

    /// Replace the tools returned by later `tools/list` calls.
    pub fn set_tools(&self, tools: &[&str]) {
        *self.tools.lock().unwrap() = tools.iter().map(|t| tool_json(t)).collect();
    }

    /// Methods received so far, in order (requests and notifications).
    pub fn methods(&self) -> Vec<String> {
        self.methods.lock().unwrap().clone()
    }

    pub fn count(&self, method: &str) -> usize {
        self.methods().iter().filter(|m| *m == method).count()
    }

    fn reply_for(&self, method: &str, params: &Value) -> Reply {
        match method {
            "initialize" => self.initialize.clone().unwrap_or_else(|| {
                Reply::Result(json!({
                    "protocolVersion": "2024-11-05",
                    "serverInfo": {"name": "fake", "version": "0.0.0"},
                    "capabilities": {"tools": {}}
                }))
            }),
            "tools/list" => {
                let tools = self.tools.lock().unwrap().clone();
                let result = json!({ "tools": tools });
                if self.list_delay.is_zero() {
                    Reply::Result(result)
                } else {
                    Reply::Delayed(self.list_delay, result)
                }
            }
            "tools/call" => {
                let tool = params["name"].as_str().unwrap_or_default();
                self.calls
                    .get(tool)
                    .cloned()
                    .unwrap_or_else(|| Reply::Result(text_result(&format!("{tool} ok"), false)))
            }
            _ => Reply::Error(json!({"code": -32601, "message": "Method not found"})),
        }
    }
}

fn tool_json(name: &str) -> Value {
    json!({
        "name": name,
        "description": format!("{name} tool"),
        "inputSchema": {"type": "object", "properties": {}}
    })
}

/// A `tools/call` result with one text block.
pub fn text_result(text: &str, is_error: impl Into<Value>) -> Value {
    json!({
        "content": [{"type": "text", "text": text}],
        "isError": is_error.into()
    })
}

type Output = Arc<AsyncMutex<DuplexStream>>;

async fn write_line(out: &Output, line: &str) {
    let mut out = out.lock().await;
    let _ = out.write_all(line.as_bytes()).await;
    let _ = out.write_all(b"\n").await;
    let _ = out.flush().await;
}

async fn respond(out: &Output, id: &Value, result: Value) {
    let reply = json!({"jsonrpc": "2.0", "id": id, "result": result});
    write_line(out, &reply.to_string()).await;
}

/// Serve one connection until stdin closes or the script hangs up.
async fn serve(script: FakeServer, stdin: DuplexStream, stdout: DuplexStream) {
    let out: Output = Arc::new(AsyncMutex::new(stdout));
    let mut lines = BufReader::new(stdin).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let Ok(message) = serde_json::from_str::<Value>(&line) else {
            continue;
        };
        let Some(method) = message["method"].as_str().map(ToString::to_string) else {
            continue;
        };
        script.methods.lock().unwrap().push(method.clone());

        let Some(id) = message.get("id").cloned() else {
            continue;
        };

        match script.reply_for(&method, &message["params"]) {
            Reply::Result(result) => respond(&out, &id, result).await,
            Reply::Error(payload) => {
                let reply = json!({"jsonrpc": "2.0", "id": id, "error": payload});
                write_line(&out, &reply.to_string()).await;
            }
            Reply::Delayed(delay, result) => {
                let out = Arc::clone(&out);
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    respond(&out, &id, result).await;
                });
            }
            Reply::GarbledThen(result) => {
                write_line(&out, "{\"jsonrpc\": \"2.0\", \"id\": ").await;
                respond(&out, &id, result).await;
            }
            Reply::Silent => {}
            Reply::Hangup => return,
            Reply::Stall => std::future::pending::<()>().await,
            Reply::Echo => {
                let args = &message["params"]["arguments"];
                let delay = Duration::from_millis(args["delay_ms"].as_u64().unwrap_or(0));
                let result = text_result(args["text"].as_str().unwrap_or_default(), false);
                let out = Arc::clone(&out);
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    respond(&out, &id, result).await;
                });
            }
        }
    }
}

const DEFAULT_PIPE_CAPACITY: usize = 64 * 1024;

/// Launches [`FakeServer`]s over in-memory pipes.
pub struct FakeLauncher {
    scripts: HashMap<String, FakeServer>,
    exits: Mutex<HashMap<String, ExitCallback>>,
    launches: Mutex<Vec<String>>,
    pipe_capacity: usize,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self {
            scripts: HashMap::new(),
            exits: Mutex::new(HashMap::new()),
            launches: Mutex::new(Vec::new()),
            pipe_capacity: DEFAULT_PIPE_CAPACITY,
        }
    }

    /// Buffer size of each in-memory pipe.
    #[must_use]
    pub const fn with_pipe_capacity(mut self, capacity: usize) -> Self {
        self.pipe_capacity = capacity;
        self
    }

    #[must_use]
    pub fn server(mut self, name: &str, script: FakeServer) -> Self {
        self.scripts.insert(name.to_string(), script);
        self
    }

    /// Invoke the exit callback for `name`, as if its process died.
    pub fn trigger_exit(&self, name: &str, code: Option<i32>) -> bool {
        let callback = self.exits.lock().unwrap().remove(name);
        match callback {
            Some(callback) => {
                callback(ProcessExit { code, signal: None });
                true
            }
            None => false,
        }
    }

    /// Server names in launch order.
    pub fn launches(&self) -> Vec<String> {
        self.launches.lock().unwrap().clone()
    }

    /// Registry with one entry per scripted server.
    pub fn registry(&self) -> ServerRegistry {
        let configs = self
            .scripts
            .keys()
            .map(|name| ServerConfig::new(name.clone(), "fake-mcp-server", vec![]))
            .collect();
        ServerRegistry::new(configs)
    }
}

impl Default for FakeLauncher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ServerLauncher for FakeLauncher {
    async fn launch(
        &self,
        config: &ServerConfig,
        on_exit: ExitCallback,
    ) -> Result<LaunchedServer, McpError> {
        let script = self
            .scripts
            .get(&config.name)
            .cloned()
            .ok_or_else(|| McpError::ProcessSpawn {
                name: config.name.clone(),
                reason: "no script for server".to_string(),
            })?;

        let (client_stdin, server_stdin) = tokio::io::duplex(self.pipe_capacity);
        let (server_stdout, client_stdout) = tokio::io::duplex(self.pipe_capacity);
        tokio::spawn(serve(script, server_stdin, server_stdout));

        self.exits
            .lock()
            .unwrap()
            .insert(config.name.clone(), on_exit);
        self.launches.lock().unwrap().push(config.name.clone());

        Ok(LaunchedServer {
            pipes: ServerPipes {
                stdin: Box::new(client_stdin),
                stdout: Box::new(client_stdout),
                stderr: None,
            },
            process: None,
        })
    }
}

/// Collects emitted events.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<McpEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<McpEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl McpEventSink for RecordingSink {
    fn emit(&self, event: McpEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Test settings: no stagger, short request timeout.
pub fn settings(request_timeout: Duration) -> McpSettings {
    McpSettings::default()
        .with_request_timeout(request_timeout)
        .with_handshake_timeout(Duration::from_secs(5))
        .with_start_stagger(Duration::ZERO)
}

/// Build a manager over `launcher`, returning it with its event sink.
pub fn manager(
    launcher: &Arc<FakeLauncher>,
    request_timeout: Duration,
) -> (McpManager, Arc<RecordingSink>) {
    manager_with(launcher, launcher.registry(), request_timeout)
}

/// Like [`manager`], with an explicit registry.
pub fn manager_with(
    launcher: &Arc<FakeLauncher>,
    registry: ServerRegistry,
    request_timeout: Duration,
) -> (McpManager, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let manager = McpManager::new(
        registry,
        settings(request_timeout),
        Arc::clone(launcher) as Arc<dyn ServerLauncher>,
        Arc::clone(&sink) as Arc<dyn McpEventSink>,
    );
    (manager, sink)
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn eventually<F, Fut>(mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
