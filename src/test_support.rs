//! Scripted doubles for the tool server and the model endpoint

use crate::error::RouterError;
use crate::llm::{ModelClient, SamplingOptions};
use crate::protocol::{RemoteTool, ToolCallOutput, ToolTransport};
use crate::tools::{names, ToolRegistry};
use crate::Result;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

pub fn remote_tool(name: &str, required: &[&str]) -> RemoteTool {
    let properties: Map<String, Value> = required
        .iter()
        .map(|p| (p.to_string(), json!({ "type": "string" })))
        .collect();

    RemoteTool {
        name: name.to_string(),
        description: Some(format!("{} (test)", name)),
        input_schema: json!({
            "type": "object",
            "properties": properties,
            "required": required,
        }),
    }
}

/// The finance tool server's catalogue
pub fn standard_tools() -> Vec<RemoteTool> {
    vec![
        remote_tool(names::QUOTE, &["symbol"]),
        remote_tool(names::HISTORICAL, &["symbol"]),
        remote_tool(names::CHART, &["symbol"]),
        remote_tool(names::SEARCH, &["query"]),
        remote_tool(names::TRENDING, &[]),
        remote_tool(names::TRENDING_ETFS, &[]),
        remote_tool(names::TOP_GAINERS, &[]),
        remote_tool(names::SCREENER, &["criteria"]),
        remote_tool(names::NEWS, &[]),
        remote_tool(names::INSIGHTS, &["symbol"]),
        remote_tool(names::MARKET_SUMMARY, &[]),
        remote_tool(names::RECOMMENDATIONS, &["symbol"]),
    ]
}

pub fn standard_registry() -> ToolRegistry {
    match ToolRegistry::from_tools(standard_tools()) {
        Ok(registry) => registry,
        Err(e) => panic!("standard registry: {e}"),
    }
}

enum Scripted {
    Text(String),
    TransportFailure,
}

/// Tool server double: canned replies per tool, records every call
pub struct ScriptedTransport {
    tools: Vec<RemoteTool>,
    replies: HashMap<String, Scripted>,
    calls: Mutex<Vec<(String, Value)>>,
    list_calls: Mutex<usize>,
}

impl ScriptedTransport {
    pub fn new(tools: Vec<RemoteTool>) -> Self {
        Self {
            tools,
            replies: HashMap::new(),
            calls: Mutex::new(Vec::new()),
            list_calls: Mutex::new(0),
        }
    }

    pub fn standard() -> Self {
        Self::new(standard_tools())
    }

    pub fn respond(mut self, tool: &str, text: &str) -> Self {
        self.replies
            .insert(tool.to_string(), Scripted::Text(text.to_string()));
        self
    }

    /// Calls to `tool` fail at the transport level
    pub fn fail(mut self, tool: &str) -> Self {
        self.replies
            .insert(tool.to_string(), Scripted::TransportFailure);
        self
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn list_calls(&self) -> usize {
        *self.list_calls.lock().unwrap()
    }
}

#[async_trait]
impl ToolTransport for ScriptedTransport {
    async fn list_tools(&self) -> Result<Vec<RemoteTool>> {
        *self.list_calls.lock().unwrap() += 1;
        Ok(self.tools.clone())
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolCallOutput> {
        self.calls
            .lock()
            .unwrap()
            .push((name.to_string(), arguments.clone()));

        match self.replies.get(name) {
            Some(Scripted::Text(text)) => Ok(ToolCallOutput {
                text: text.clone(),
                is_error: false,
            }),
            Some(Scripted::TransportFailure) => {
                Err(RouterError::Transport(format!("{} connection reset", name)))
            }
            None => Ok(ToolCallOutput {
                text: json!({ "tool": name, "arguments": arguments }).to_string(),
                is_error: false,
            }),
        }
    }
}

enum ModelBehavior {
    Reply(String),
    Fail,
    Hang,
}

/// Model endpoint double
pub struct ScriptedModel {
    behavior: ModelBehavior,
    timeout: Duration,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    fn with(behavior: ModelBehavior, timeout: Duration) -> Self {
        Self {
            behavior,
            timeout,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(text: &str) -> Self {
        Self::with(ModelBehavior::Reply(text.to_string()), Duration::from_secs(3))
    }

    pub fn failing() -> Self {
        Self::with(ModelBehavior::Fail, Duration::from_secs(3))
    }

    /// Never answers within `timeout`
    pub fn hanging(timeout: Duration) -> Self {
        Self::with(ModelBehavior::Hang, timeout)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn complete(&self, prompt: &str, _options: SamplingOptions) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());

        match &self.behavior {
            ModelBehavior::Reply(text) => Ok(text.clone()),
            ModelBehavior::Fail => Err(RouterError::ClassifierUnavailable(
                "connection refused".to_string(),
            )),
            ModelBehavior::Hang => {
                tokio::time::sleep(self.timeout * 50).await;
                Ok(String::new())
            }
        }
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}
