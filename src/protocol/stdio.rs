//! Stdio client for the tool server process
//!
//! Requests are written as single JSON lines to the child's stdin; a reader
//! task correlates response lines back to waiting callers by request id.
//! Many requests may be in flight at once.

use super::{
    CallToolResult, JsonRpcRequest, JsonRpcResponse, ListToolsResult, RemoteTool,
    ToolCallOutput, ToolTransport, PROTOCOL_VERSION,
};
use crate::error::RouterError;
use crate::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, Mutex};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Upper bound on `tools/list` pages fetched in one listing
pub const MAX_LIST_PAGES: usize = 32;

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>;
type LineWriter = Box<dyn AsyncWrite + Send + Unpin>;

pub struct StdioToolClient {
    command: String,
    args: Vec<String>,
    request_timeout: Duration,
    process: Mutex<Option<Child>>,
    writer: Mutex<Option<LineWriter>>,
    request_id: AtomicU64,
    pending: PendingMap,
    closed: Arc<AtomicBool>,
}

impl StdioToolClient {
    pub fn new(command: impl Into<String>, args: Vec<String>, request_timeout: Duration) -> Self {
        Self {
            command: command.into(),
            args,
            request_timeout,
            process: Mutex::new(None),
            writer: Mutex::new(None),
            request_id: AtomicU64::new(1),
            pending: Arc::new(Mutex::new(HashMap::new())),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Spawn the server process and run the initialize handshake
    pub async fn connect(&self) -> Result<()> {
        info!(
            command = %self.command,
            args = ?self.args,
            "Starting tool server"
        );

        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                error!(error = %e, "Failed to spawn tool server");
                RouterError::Transport(format!("Failed to spawn '{}': {}", self.command, e))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| RouterError::Transport("Failed to capture stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RouterError::Transport("Failed to capture stdout".to_string()))?;

        *self.process.lock().await = Some(child);
        self.attach(stdout, stdin).await;

        self.initialize().await
    }

    /// Wire the client to a byte stream pair and start the reader task
    pub(crate) async fn attach<R, W>(&self, reader: R, writer: W)
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        self.closed.store(false, Ordering::SeqCst);
        *self.writer.lock().await = Some(Box::new(writer));
        self.spawn_reader(reader);
    }

    async fn initialize(&self) -> Result<()> {
        let init = self
            .send_request(
                "initialize",
                Some(json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {
                        "name": env!("CARGO_PKG_NAME"),
                        "version": env!("CARGO_PKG_VERSION"),
                    }
                })),
            )
            .await?;

        self.send_notification("notifications/initialized").await?;

        let server = init
            .pointer("/serverInfo/name")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("unknown");
        info!(server = %server, "Tool server initialized");

        Ok(())
    }

    pub async fn disconnect(&self) {
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        if let Some(mut child) = self.process.lock().await.take() {
            let _ = child.kill().await;
            let _ = child.wait().await;
        }
        info!("Tool server stopped");
    }

    async fn write_line(&self, request: &JsonRpcRequest) -> Result<()> {
        let mut line = serde_json::to_string(request)?;
        line.push('\n');

        let mut guard = self.writer.lock().await;
        let writer = guard
            .as_mut()
            .ok_or_else(|| RouterError::Transport("Tool server not connected".to_string()))?;

        writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| RouterError::Transport(format!("Write to tool server failed: {}", e)))?;
        writer
            .flush()
            .await
            .map_err(|e| RouterError::Transport(format!("Write to tool server failed: {}", e)))?;
        Ok(())
    }

    async fn send_notification(&self, method: &str) -> Result<()> {
        self.write_line(&JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: None,
            method: method.to_string(),
            params: None,
        })
        .await
    }

    async fn send_request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            if self.closed.load(Ordering::SeqCst) {
                return Err(RouterError::Transport(
                    "Tool server closed the connection".to_string(),
                ));
            }
            pending.insert(id, tx);
        }

        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(id),
            method: method.to_string(),
            params,
        };

        if let Err(e) = self.write_line(&request).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        let response = match timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => {
                return Err(RouterError::Transport(
                    "Tool server closed the connection".to_string(),
                ))
            }
            Err(_) => {
                self.pending.lock().await.remove(&id);
                warn!(method = %method, id, "Tool server request timed out");
                return Err(RouterError::Timeout(self.request_timeout.as_millis() as u64));
            }
        };

        if let Some(err) = response.error {
            return Err(RouterError::Protocol(format!(
                "{} (code: {})",
                err.message, err.code
            )));
        }

        response
            .result
            .ok_or_else(|| RouterError::Protocol(format!("Missing result for {}", method)))
    }

    fn spawn_reader<R>(&self, reader: R)
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let pending = Arc::clone(&self.pending);
        let closed = Arc::clone(&self.closed);

        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();

            while let Ok(Some(line)) = lines.next_line().await {
                if line.trim().is_empty() {
                    continue;
                }

                let response = match serde_json::from_str::<JsonRpcResponse>(&line) {
                    Ok(response) => response,
                    Err(e) => {
                        debug!(error = %e, "Ignoring non-JSON-RPC line from tool server");
                        continue;
                    }
                };

                // Server-initiated notifications carry no id
                let Some(id) = response.id.as_u64() else {
                    continue;
                };

                match pending.lock().await.remove(&id) {
                    Some(tx) => {
                        let _ = tx.send(response);
                    }
                    None => warn!(id, "Response for unknown or expired request"),
                }
            }

            // Dropping the senders fails every in-flight request
            let mut pending = pending.lock().await;
            closed.store(true, Ordering::SeqCst);
            pending.clear();
            warn!("Tool server stdout closed");
        });
    }
}

#[async_trait]
impl ToolTransport for StdioToolClient {
    async fn list_tools(&self) -> Result<Vec<RemoteTool>> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        let mut seen = HashSet::new();

        for _ in 0..MAX_LIST_PAGES {
            let params = match &cursor {
                Some(c) => json!({ "cursor": c }),
                None => json!({}),
            };
            let result = self.send_request("tools/list", Some(params)).await?;
            let page: ListToolsResult = serde_json::from_value(result)
                .map_err(|e| RouterError::Protocol(format!("Invalid tools/list result: {}", e)))?;

            tools.extend(page.tools);

            match page.next_cursor {
                None => {
                    debug!(count = tools.len(), "Listed tools");
                    return Ok(tools);
                }
                Some(next) if !seen.insert(next.clone()) => {
                    warn!(cursor = %next, "Tool server repeated a listing cursor");
                    return Ok(tools);
                }
                Some(next) => cursor = Some(next),
            }
        }

        warn!(
            pages = MAX_LIST_PAGES,
            count = tools.len(),
            "Tool listing truncated at page limit"
        );
        Ok(tools)
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolCallOutput> {
        debug!(tool = %name, "Calling tool");

        let result = self
            .send_request(
                "tools/call",
                Some(json!({ "name": name, "arguments": arguments })),
            )
            .await?;

        let call: CallToolResult = serde_json::from_value(result)
            .map_err(|e| RouterError::Protocol(format!("Invalid tools/call result: {}", e)))?;

        Ok(call.into_output())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::DuplexStream;
    use tokio::task::JoinHandle;

    async fn attached_client(request_timeout: Duration) -> (StdioToolClient, DuplexStream) {
        let (client_io, server_io) = tokio::io::duplex(64 * 1024);
        let client = StdioToolClient::new("unused", vec![], request_timeout);
        let (read, write) = tokio::io::split(client_io);
        client.attach(read, write).await;
        (client, server_io)
    }

    /// Line-oriented fake tool server. `reply` maps each incoming message to
    /// the lines it writes back.
    fn fake_server<F>(io: DuplexStream, mut reply: F) -> JoinHandle<()>
    where
        F: FnMut(&Value) -> Vec<Value> + Send + 'static,
    {
        tokio::spawn(async move {
            let (read, mut write) = tokio::io::split(io);
            let mut lines = BufReader::new(read).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let message: Value = serde_json::from_str(&line).unwrap();
                for out in reply(&message) {
                    let mut out = out.to_string();
                    out.push('\n');
                    if write.write_all(out.as_bytes()).await.is_err() {
                        return;
                    }
                }
            }
        })
    }

    fn result_for(request: &Value, result: Value) -> Value {
        json!({ "jsonrpc": "2.0", "id": request["id"], "result": result })
    }

    fn text_result(text: &str, is_error: bool) -> Value {
        json!({ "content": [{ "type": "text", "text": text }], "isError": is_error })
    }

    #[tokio::test]
    async fn test_request_before_connect_is_transport_error() {
        let client = StdioToolClient::new("unused", vec![], Duration::from_millis(50));
        let err = client.list_tools().await.unwrap_err();
        assert!(matches!(err, RouterError::Transport(_)));
        assert!(client.pending.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_spawn_failure_is_transport_error() {
        let client = StdioToolClient::new(
            "/nonexistent/tool-server-binary",
            vec![],
            Duration::from_millis(50),
        );
        let err = client.connect().await.unwrap_err();
        assert_eq!(err.code(), "transport");
    }

    #[tokio::test]
    async fn test_handshake_then_call_passes_error_flag_through() {
        let (client, server_io) = attached_client(Duration::from_secs(5)).await;
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);

        let _server = fake_server(server_io, move |msg| {
            log.lock().unwrap().push(msg["method"].as_str().unwrap_or("").to_string());
            match msg["method"].as_str() {
                Some("initialize") => vec![result_for(
                    msg,
                    json!({ "protocolVersion": PROTOCOL_VERSION, "serverInfo": { "name": "finance" } }),
                )],
                Some("tools/call") => vec![
                    json!({ "jsonrpc": "2.0", "method": "notifications/progress", "params": {} }),
                    result_for(msg, text_result("Symbol not found", true)),
                ],
                _ => vec![],
            }
        });

        client.initialize().await.unwrap();
        let output = client
            .call_tool("get_stock_quote", json!({ "symbol": "ZZZZ" }))
            .await
            .unwrap();

        assert_eq!(output.text, "Symbol not found");
        assert!(output.is_error);
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["initialize", "notifications/initialized", "tools/call"]
        );
        assert!(client.pending.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_out_of_order_responses_reach_their_callers() {
        let (client, server_io) = attached_client(Duration::from_secs(5)).await;
        let mut held: Vec<Value> = Vec::new();

        let _server = fake_server(server_io, move |msg| {
            held.push(msg.clone());
            if held.len() < 2 {
                return vec![];
            }
            held.drain(..)
                .rev()
                .map(|req| {
                    let tag = req["params"]["arguments"]["symbol"].as_str().unwrap_or("").to_string();
                    result_for(&req, text_result(&tag, false))
                })
                .collect()
        });

        let (first, second) = tokio::join!(
            client.call_tool("get_stock_quote", json!({ "symbol": "AAPL" })),
            client.call_tool("get_stock_quote", json!({ "symbol": "MSFT" })),
        );

        assert_eq!(first.unwrap().text, "AAPL");
        assert_eq!(second.unwrap().text, "MSFT");
    }

    #[tokio::test]
    async fn test_timeout_removes_pending_entry() {
        let (client, server_io) = attached_client(Duration::from_millis(50)).await;
        let _server = fake_server(server_io, |_| vec![]);

        let err = client
            .call_tool("get_stock_quote", json!({ "symbol": "AAPL" }))
            .await
            .unwrap_err();

        assert!(matches!(err, RouterError::Timeout(50)));
        assert!(client.pending.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_server_exit_fails_in_flight_and_later_requests() {
        let (client, server_io) = attached_client(Duration::from_secs(30)).await;
        let server = tokio::spawn(async move {
            let (read, _write) = tokio::io::split(server_io);
            let mut lines = BufReader::new(read).lines();
            let _ = lines.next_line().await;
        });

        let err = client
            .call_tool("get_stock_quote", json!({ "symbol": "AAPL" }))
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::Transport(_)));

        server.await.unwrap();
        let err = client.list_tools().await.unwrap_err();
        assert!(matches!(err, RouterError::Transport(_)));
        assert!(client.pending.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_list_tools_follows_cursors() {
        let (client, server_io) = attached_client(Duration::from_secs(5)).await;
        let _server = fake_server(server_io, |msg| {
            let page = match msg["params"]["cursor"].as_str() {
                None => json!({ "tools": [{ "name": "get_stock_quote" }], "nextCursor": "p2" }),
                Some("p2") => json!({ "tools": [{ "name": "search_stocks" }] }),
                Some(_) => json!({ "tools": [] }),
            };
            vec![result_for(msg, page)]
        });

        let names: Vec<String> = client
            .list_tools()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["get_stock_quote", "search_stocks"]);
    }

    #[tokio::test]
    async fn test_list_tools_stops_on_repeated_cursor() {
        let (client, server_io) = attached_client(Duration::from_secs(5)).await;
        let requests = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&requests);

        let _server = fake_server(server_io, move |msg| {
            counter.fetch_add(1, Ordering::SeqCst);
            vec![result_for(
                msg,
                json!({ "tools": [{ "name": "get_stock_quote" }], "nextCursor": "again" }),
            )]
        });

        let tools = client.list_tools().await.unwrap();
        assert_eq!(tools.len(), 2);
        assert_eq!(requests.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_list_tools_stops_at_page_limit() {
        let (client, server_io) = attached_client(Duration::from_secs(5)).await;
        let mut page = 0u64;

        let _server = fake_server(server_io, move |msg| {
            page += 1;
            vec![result_for(
                msg,
                json!({ "tools": [{ "name": format!("tool_{page}") }], "nextCursor": format!("c{page}") }),
            )]
        });

        let tools = client.list_tools().await.unwrap();
        assert_eq!(tools.len(), MAX_LIST_PAGES);
    }
}
