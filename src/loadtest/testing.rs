//! In-memory [`ToolChannel`] for engine and driver tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::loadtest::channel::{ToolCallResult, ToolChannel, ToolDescriptor};
use crate::loadtest::error::McpError;

type Responder = Box<dyn Fn(&Value) -> Result<ToolCallResult, McpError> + Send + Sync>;

/// Answers each tool call from a per-tool closure and logs what was called.
pub struct ScriptedChannel {
    pub tools: Vec<ToolDescriptor>,
    pub calls: Arc<Mutex<Vec<(String, Value)>>>,
    pub closed: Arc<AtomicBool>,
    responders: HashMap<String, Responder>,
    fail_connect: bool,
}

impl ScriptedChannel {
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
            responders: HashMap::new(),
            fail_connect: false,
        }
    }

    pub fn tool<F>(self, name: &str, respond: F) -> Self
    where
        F: Fn(&Value) -> Result<ToolCallResult, McpError> + Send + Sync + 'static,
    {
        self.tool_with_schema(name, json!({"type": "object", "properties": {}}), respond)
    }

    pub fn tool_with_schema<F>(mut self, name: &str, schema: Value, respond: F) -> Self
    where
        F: Fn(&Value) -> Result<ToolCallResult, McpError> + Send + Sync + 'static,
    {
        self.tools.push(ToolDescriptor::new(name, schema));
        self.responders.insert(name.to_string(), Box::new(respond));
        self
    }

    pub fn failing_connect(mut self) -> Self {
        self.fail_connect = true;
        self
    }
}

#[async_trait]
impl ToolChannel for ScriptedChannel {
    async fn connect(&mut self) -> Result<(), McpError> {
        if self.fail_connect {
            return Err(McpError::Connection {
                message: "connection refused".to_string(),
            });
        }
        Ok(())
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, McpError> {
        Ok(self.tools.clone())
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolCallResult, McpError> {
        self.calls
            .lock()
            .unwrap()
            .push((name.to_string(), arguments.clone()));
        match self.responders.get(name) {
            Some(respond) => respond(&arguments),
            None => Err(McpError::JsonRpc {
                code: -32602,
                message: format!("Unknown tool: {name}"),
            }),
        }
    }

    async fn close(&mut self) -> Result<(), McpError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
