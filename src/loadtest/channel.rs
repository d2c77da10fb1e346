//! Tool channel: the boundary to the remote MCP server.
//!
//! [`ToolChannel`] is what the engine and driver talk to. [`HttpToolChannel`]
//! implements it with MCP JSON-RPC 2.0 over Streamable HTTP. Tests substitute
//! in-memory channels.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use crate::loadtest::error::McpError;

/// MCP protocol revision sent in `initialize`.
pub const PROTOCOL_VERSION: &str = "2025-06-18";

/// Header carrying the Streamable HTTP session id.
const SESSION_HEADER: &str = "mcp-session-id";

/// Upper bound on `tools/list` pages followed during discovery.
const MAX_LIST_PAGES: usize = 100;

/// A callable tool advertised by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    /// Tool name used in `tools/call`.
    pub name: String,
    /// Optional human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON-Schema-like description of the tool's arguments.
    #[serde(default = "empty_object_schema")]
    pub input_schema: Value,
}

fn empty_object_schema() -> Value {
    json!({"type": "object", "properties": {}})
}

impl ToolDescriptor {
    /// Creates a descriptor with the given name and input schema.
    pub fn new(name: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: None,
            input_schema,
        }
    }

    /// Names listed in the schema's `required` array.
    pub fn required_fields(&self) -> Vec<&str> {
        self.input_schema
            .get("required")
            .and_then(Value::as_array)
            .map(|fields| fields.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// Schema of a single property, if declared.
    pub fn property_schema(&self, field: &str) -> Option<&Value> {
        self.input_schema.get("properties")?.get(field)
    }
}

/// One content item of a tool result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    /// Content type, e.g. `"text"`.
    #[serde(rename = "type", default = "default_content_type")]
    pub kind: String,
    /// Text payload for text content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

fn default_content_type() -> String {
    "text".to_string()
}

impl ContentItem {
    /// Creates a text content item.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: default_content_type(),
            text: Some(text.into()),
        }
    }
}

/// Decoded `tools/call` result.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    /// Result content items.
    #[serde(default)]
    pub content: Vec<ContentItem>,
    /// Set by the tool when it failed at the application level.
    #[serde(default)]
    pub is_error: bool,
}

impl ToolCallResult {
    /// A successful result with one text item.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentItem::text(text)],
            is_error: false,
        }
    }

    /// A tool-reported failure with one text item.
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentItem::text(text)],
            is_error: true,
        }
    }

    /// Text of the first content item, if any.
    pub fn first_text(&self) -> Option<&str> {
        self.content.first().and_then(|item| item.text.as_deref())
    }

    /// Converts a tool-reported failure into an [`McpError::Tool`].
    pub fn into_result(self) -> Result<Self, McpError> {
        if self.is_error {
            let message = self
                .first_text()
                .unwrap_or("Tool returned an error")
                .to_string();
            return Err(McpError::Tool { message });
        }
        Ok(self)
    }
}

/// Transport to a server exposing callable tools.
///
/// Calls are issued one at a time; implementations need not support
/// concurrent use.
#[async_trait]
pub trait ToolChannel: Send + Sync {
    /// Establish the session. Failure is fatal for the run.
    async fn connect(&mut self) -> Result<(), McpError>;

    /// Discover the tools the server exposes.
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, McpError>;

    /// Invoke a tool. An `isError` result is returned as `Ok`; callers decide
    /// how to treat it.
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolCallResult, McpError>;

    /// Tear down the session. Best effort.
    async fn close(&mut self) -> Result<(), McpError> {
        Ok(())
    }
}

/// MCP client speaking JSON-RPC over Streamable HTTP.
pub struct HttpToolChannel {
    http: Client,
    url: String,
    api_key: Option<String>,
    session_id: Option<String>,
    next_id: AtomicU64,
}

impl HttpToolChannel {
    /// Creates a channel for the given endpoint URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            url: url.into(),
            api_key: None,
            session_id: None,
            next_id: AtomicU64::new(1),
        }
    }

    /// Sends `key` as a bearer token and `X-API-Key` on every request.
    pub fn with_api_key(mut self, key: Option<String>) -> Self {
        self.api_key = key;
        self
    }

    /// Target endpoint URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Session id assigned by the server during `connect`, if any.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    fn request(&self, method: reqwest::Method) -> reqwest::RequestBuilder {
        let mut req = self
            .http
            .request(method, &self.url)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json, text/event-stream");
        if let Some(sid) = &self.session_id {
            req = req.header(SESSION_HEADER, sid);
        }
        if let Some(key) = &self.api_key {
            req = req
                .header("Authorization", format!("Bearer {key}"))
                .header("X-API-Key", key);
        }
        req
    }

    /// Send a JSON-RPC request and return its `result` member along with the
    /// session id header, if the server set one.
    async fn rpc(&self, method: &str, params: Value) -> Result<(Value, Option<String>), McpError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        debug!(method, id, "sending JSON-RPC request");

        let response = self
            .request(reqwest::Method::POST)
            .json(&body)
            .send()
            .await
            .map_err(|e| McpError::classify_reqwest(&e))?;

        let status = response.status();
        let session = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let is_sse = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));
        let text = response
            .text()
            .await
            .map_err(|e| McpError::classify_reqwest(&e))?;

        if !status.is_success() {
            return Err(McpError::Http {
                status: status.as_u16(),
                body: text,
            });
        }

        let message = if is_sse {
            find_sse_response(&text, id)?
        } else {
            serde_json::from_str::<Value>(&text).map_err(|e| McpError::Protocol {
                message: format!("invalid JSON-RPC response: {e}"),
            })?
        };
        Ok((extract_result(message)?, session))
    }

    async fn notify(&self, method: &str) -> Result<(), McpError> {
        let body = json!({"jsonrpc": "2.0", "method": method});
        let response = self
            .request(reqwest::Method::POST)
            .json(&body)
            .send()
            .await
            .map_err(|e| McpError::classify_reqwest(&e))?;
        if !response.status().is_success() {
            return Err(McpError::Http {
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ToolChannel for HttpToolChannel {
    async fn connect(&mut self) -> Result<(), McpError> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            },
        });
        let (result, session) = self.rpc("initialize", params).await?;
        if let Some(sid) = session {
            self.session_id = Some(sid);
        }
        let server = result.get("serverInfo").cloned().unwrap_or_default();
        debug!(
            server = %server,
            session = ?self.session_id,
            "initialized MCP session"
        );
        self.notify("notifications/initialized").await
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, McpError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        for _ in 0..MAX_LIST_PAGES {
            let params = match &cursor {
                Some(c) => json!({ "cursor": c }),
                None => json!({}),
            };
            let (result, _) = self.rpc("tools/list", params).await?;
            let page = result
                .get("tools")
                .cloned()
                .unwrap_or_else(|| Value::Array(Vec::new()));
            let page: Vec<ToolDescriptor> =
                serde_json::from_value(page).map_err(|e| McpError::Protocol {
                    message: format!("invalid tools/list result: {e}"),
                })?;
            tools.extend(page);

            cursor = result
                .get("nextCursor")
                .and_then(Value::as_str)
                .map(str::to_owned);
            if cursor.is_none() {
                return Ok(tools);
            }
        }
        warn!(pages = MAX_LIST_PAGES, "tools/list pagination limit reached");
        Ok(tools)
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolCallResult, McpError> {
        let params = json!({ "name": name, "arguments": arguments });
        let (result, _) = self.rpc("tools/call", params).await?;
        serde_json::from_value(result).map_err(|e| McpError::Protocol {
            message: format!("invalid tools/call result: {e}"),
        })
    }

    async fn close(&mut self) -> Result<(), McpError> {
        if self.session_id.is_none() {
            return Ok(());
        }
        let outcome = self.request(reqwest::Method::DELETE).send().await;
        self.session_id = None;
        match outcome {
            Ok(_) => Ok(()),
            Err(e) => Err(McpError::classify_reqwest(&e)),
        }
    }
}

/// Pick the JSON-RPC response with the given id out of an SSE body.
fn find_sse_response(body: &str, id: u64) -> Result<Value, McpError> {
    sse_event_data(body)
        .iter()
        .filter_map(|data| serde_json::from_str::<Value>(data).ok())
        .find(|msg| msg.get("id").and_then(Value::as_u64) == Some(id))
        .ok_or_else(|| McpError::Protocol {
            message: format!("no response with id {id} in event stream"),
        })
}

/// Data payload of each SSE event. Multiple `data:` lines within one event
/// are joined with newlines; a blank line ends the event.
fn sse_event_data(body: &str) -> Vec<String> {
    let mut events = Vec::new();
    let mut current: Option<String> = None;
    for line in body.lines() {
        if line.trim().is_empty() {
            events.extend(current.take());
            continue;
        }
        let Some(data) = line.strip_prefix("data:") else {
            continue;
        };
        let data = data.strip_prefix(' ').unwrap_or(data);
        match current.as_mut() {
            Some(buf) => {
                buf.push('\n');
                buf.push_str(data);
            },
            None => current = Some(data.to_string()),
        }
    }
    events.extend(current);
    events
}

/// Split a JSON-RPC response into its result or a [`McpError::JsonRpc`].
fn extract_result(message: Value) -> Result<Value, McpError> {
    if let Some(error) = message.get("error") {
        let code = error
            .get("code")
            .and_then(Value::as_i64)
            .and_then(|c| i32::try_from(c).ok())
            .unwrap_or(-32603);
        let text = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        return Err(McpError::JsonRpc {
            code,
            message: text,
        });
    }
    message
        .get("result")
        .cloned()
        .ok_or_else(|| McpError::Protocol {
            message: "response has neither result nor error".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[test]
    fn test_tool_descriptor_defaults_schema() {
        let tool: ToolDescriptor = serde_json::from_value(json!({"name": "ping"})).unwrap();
        assert_eq!(tool.input_schema["type"], "object");
        assert!(tool.required_fields().is_empty());
    }

    #[test]
    fn test_tool_descriptor_required_fields() {
        let tool = ToolDescriptor::new(
            "create_user",
            json!({
                "type": "object",
                "properties": {"email": {"type": "string"}, "age": {"type": "integer"}},
                "required": ["email"]
            }),
        );
        assert_eq!(tool.required_fields(), vec!["email"]);
        assert_eq!(tool.property_schema("age"), Some(&json!({"type": "integer"})));
        assert!(tool.property_schema("missing").is_none());
    }

    #[test]
    fn test_call_result_is_error_becomes_tool_error() {
        let result: ToolCallResult = serde_json::from_value(json!({
            "content": [{"type": "text", "text": "boom"}],
            "isError": true
        }))
        .unwrap();
        match result.into_result() {
            Err(McpError::Tool { message }) => assert_eq!(message, "boom"),
            other => panic!("Expected tool error, got {other:?}"),
        }
    }

    #[test]
    fn test_call_result_without_content_has_no_text() {
        let result = ToolCallResult::default();
        assert!(result.first_text().is_none());
        assert!(result.into_result().is_ok());
    }

    #[test]
    fn test_find_sse_response_matches_id() {
        let body = "event: message\ndata: {\"jsonrpc\":\"2.0\",\"method\":\"notifications/progress\"}\n\n\
                    event: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":7,\"result\":{\"ok\":true}}\n\n";
        let msg = find_sse_response(body, 7).unwrap();
        assert_eq!(msg["result"]["ok"], true);
        assert!(find_sse_response(body, 8).is_err());
    }

    #[test]
    fn test_find_sse_response_joins_multiline_data() {
        let body = "event: message\n\
                    data: {\"jsonrpc\": \"2.0\",\n\
                    data:  \"id\": 3,\n\
                    data:  \"result\": {\"tools\": []}}\n\n";
        let msg = find_sse_response(body, 3).unwrap();
        assert_eq!(msg["result"]["tools"], json!([]));
    }

    #[test]
    fn test_sse_event_data_splits_on_blank_lines() {
        let events = sse_event_data("data: a\ndata: b\n\nid: 9\ndata:c\n");
        assert_eq!(events, vec!["a\nb".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_extract_result_maps_jsonrpc_error() {
        let err = extract_result(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {"code": -32601, "message": "Method not found"}
        }))
        .unwrap_err();
        assert!(err.is_method_not_found());
    }

    #[tokio::test]
    async fn test_http_channel_session_lifecycle() {
        let mut server = mockito::Server::new_async().await;
        let init = server
            .mock("POST", "/mcp")
            .match_body(Matcher::PartialJson(json!({"method": "initialize"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_header("mcp-session-id", "session-123")
            .with_body(
                json!({"jsonrpc": "2.0", "id": 1, "result": {"serverInfo": {"name": "mock"}}})
                    .to_string(),
            )
            .create_async()
            .await;
        let initialized = server
            .mock("POST", "/mcp")
            .match_header("mcp-session-id", "session-123")
            .match_body(Matcher::PartialJson(
                json!({"method": "notifications/initialized"}),
            ))
            .with_status(202)
            .create_async()
            .await;
        let list = server
            .mock("POST", "/mcp")
            .match_header("mcp-session-id", "session-123")
            .match_body(Matcher::PartialJson(json!({"method": "tools/list"})))
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(format!(
                "event: message\ndata: {}\n\n",
                json!({"jsonrpc": "2.0", "id": 2, "result": {"tools": [
                    {"name": "echo", "inputSchema": {"type": "object", "properties": {"text": {"type": "string"}}}}
                ]}})
            ))
            .create_async()
            .await;
        let call = server
            .mock("POST", "/mcp")
            .match_body(Matcher::PartialJson(
                json!({"method": "tools/call", "params": {"name": "echo"}}),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({"jsonrpc": "2.0", "id": 3, "result": {
                    "content": [{"type": "text", "text": "hi"}], "isError": false
                }})
                .to_string(),
            )
            .create_async()
            .await;
        let delete = server
            .mock("DELETE", "/mcp")
            .match_header("mcp-session-id", "session-123")
            .with_status(200)
            .create_async()
            .await;

        let mut channel = HttpToolChannel::new(format!("{}/mcp", server.url()));
        channel.connect().await.unwrap();
        assert_eq!(channel.session_id(), Some("session-123"));

        let tools = channel.list_tools().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "echo");

        let result = channel
            .call_tool("echo", json!({"text": "hi"}))
            .await
            .unwrap();
        assert_eq!(result.first_text(), Some("hi"));

        channel.close().await.unwrap();
        assert!(channel.session_id().is_none());

        init.assert_async().await;
        initialized.assert_async().await;
        list.assert_async().await;
        call.assert_async().await;
        delete.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_channel_reports_http_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_status(503)
            .with_body("unavailable")
            .create_async()
            .await;

        let channel = HttpToolChannel::new(server.url());
        let err = channel.call_tool("echo", json!({})).await.unwrap_err();
        match err {
            McpError::Http { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "unavailable");
            },
            other => panic!("Expected HTTP error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_http_channel_unreachable_is_connection_error() {
        let mut channel = HttpToolChannel::new("http://127.0.0.1:1/mcp");
        let err = channel.connect().await.unwrap_err();
        assert_eq!(err.error_category(), "connection");
    }
}
