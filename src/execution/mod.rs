//! Execution engine with fallback chain
//!
//! Invokes the chosen tool once. On failure, walks a static per-category
//! list of alternate tools (filtered to the live registry), adapting the
//! arguments for each, and stops at the first success. The same tool is
//! never called twice for one request.

use crate::error::RouterError;
use crate::models::{AttemptOutcome, ExecutionAttempt, ToolDescriptor, WidgetType};
use crate::protocol::{ToolCallOutput, ToolTransport};
use crate::resolver::DEFAULT_COUNT;
use crate::tools::{names, ToolRegistry};
use crate::Result;
use lazy_static::lazy_static;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

lazy_static! {
    /// Primary category → alternates, in the order they are tried
    static ref FALLBACK_CHAINS: HashMap<WidgetType, Vec<&'static str>> = {
        let mut m = HashMap::new();
        m.insert(WidgetType::Screener, vec![names::TRENDING, names::SEARCH]);
        m.insert(WidgetType::Quote, vec![names::SEARCH]);
        m.insert(WidgetType::Search, vec![names::TRENDING]);
        m.insert(WidgetType::Historical, vec![names::CHART, names::QUOTE]);
        m.insert(WidgetType::Chart, vec![names::HISTORICAL, names::QUOTE]);
        m.insert(WidgetType::Insights, vec![names::QUOTE]);
        m.insert(WidgetType::Gainers, vec![names::TRENDING]);
        m.insert(WidgetType::Etf, vec![names::TRENDING_ETFS, names::SEARCH]);
        m.insert(WidgetType::Trending, vec![names::TOP_GAINERS, names::SEARCH]);
        m
    };
}

/// Alternates for `primary`, present in the registry, never the primary itself
pub fn fallback_chain<'r>(registry: &'r ToolRegistry, primary: &ToolDescriptor) -> Vec<&'r ToolDescriptor> {
    FALLBACK_CHAINS
        .get(&primary.capabilities.category)
        .map(|chain| {
            chain
                .iter()
                .filter(|name| **name != primary.name)
                .filter_map(|name| registry.get(name))
                .collect()
        })
        .unwrap_or_default()
}

/// Soft-error convention: a successful transport call whose payload says it failed
pub fn embedded_error(output: &ToolCallOutput) -> Option<String> {
    let text = output.text.trim();

    if output.is_error {
        return Some(if text.is_empty() {
            "tool reported an error".to_string()
        } else {
            text.to_string()
        });
    }

    if text
        .get(..5)
        .map_or(false, |prefix| prefix.eq_ignore_ascii_case("error"))
    {
        return Some(text.to_string());
    }

    let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(text) else {
        return None;
    };

    match obj.get("error") {
        None | Some(Value::Null) | Some(Value::Bool(false)) => {}
        Some(Value::String(message)) => return Some(message.clone()),
        Some(other) => {
            let message = other
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| other.to_string());
            return Some(message);
        }
    }

    if obj.get("success") == Some(&Value::Bool(false)) {
        let message = obj
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("tool reported failure");
        return Some(message.to_string());
    }

    None
}

/// Every schema-required parameter must be present and non-empty
pub fn validate_required(tool: &ToolDescriptor, arguments: &Map<String, Value>) -> Result<()> {
    for name in &tool.input_schema.required {
        let present = match arguments.get(name) {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.trim().is_empty(),
            Some(_) => true,
        };
        if !present {
            return Err(RouterError::missing_parameter(
                name,
                format!("required by tool '{}'", tool.name),
            ));
        }
    }
    Ok(())
}

/// Reshape the primary's arguments for an alternate tool.
/// `None` when the alternate needs something we do not have.
pub fn adapt_arguments(
    alternate: &ToolDescriptor,
    primary_args: &Map<String, Value>,
    query: &str,
) -> Option<Map<String, Value>> {
    let caps = alternate.capabilities;
    let schema = &alternate.input_schema;
    let wants = |name: &str| {
        schema.required.iter().any(|r| r == name) || schema.properties.contains_key(name)
    };

    let mut args = Map::new();

    if caps.requires_query || wants("query") {
        args.insert("query".to_string(), json!(query.trim()));
    }

    if caps.requires_symbol || wants("symbol") {
        if let Some(symbol) = primary_args.get("symbol").filter(|v| !v.is_null()) {
            args.insert("symbol".to_string(), symbol.clone());
        }
    }

    if caps.requires_count || wants("count") {
        let count = primary_args
            .get("count")
            .cloned()
            .unwrap_or_else(|| json!(DEFAULT_COUNT));
        args.insert("count".to_string(), count);
    }

    if wants("period") {
        if let Some(period) = primary_args.get("period") {
            args.insert("period".to_string(), period.clone());
        }
    }

    validate_required(alternate, &args).ok()?;
    if caps.requires_symbol && !args.contains_key("symbol") {
        return None;
    }
    Some(args)
}

/// Successful execution, possibly via an alternate tool
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub tool_used: String,
    pub arguments: Value,
    pub text: String,
    pub attempts: Vec<ExecutionAttempt>,
}

impl ExecutionOutcome {
    pub fn used_fallback(&self) -> bool {
        self.attempts.len() > 1
    }
}

/// Executes one tool call per attempt, walking the fallback chain on failure
pub struct ExecutionEngine {
    transport: Arc<dyn ToolTransport>,
}

impl ExecutionEngine {
    pub fn new(transport: Arc<dyn ToolTransport>) -> Self {
        Self { transport }
    }

    pub async fn execute(
        &self,
        tool: &ToolDescriptor,
        arguments: Map<String, Value>,
        query: &str,
        registry: &ToolRegistry,
    ) -> Result<ExecutionOutcome> {
        validate_required(tool, &arguments)?;

        let mut attempts = Vec::new();

        // -------------------------------------------------
        // 1️⃣ PRIMARY
        // -------------------------------------------------
        let primary_args = Value::Object(arguments.clone());
        let mut last_error = match self.attempt(&tool.name, primary_args.clone(), &mut attempts).await {
            Ok(text) => {
                return Ok(ExecutionOutcome {
                    tool_used: tool.name.clone(),
                    arguments: primary_args,
                    text,
                    attempts,
                })
            }
            Err(message) => (tool.name.clone(), message),
        };

        // -------------------------------------------------
        // 2️⃣ FALLBACK CHAIN
        // -------------------------------------------------
        let chain = fallback_chain(registry, tool);
        if chain.is_empty() {
            debug!(tool = %tool.name, "No fallback tools for category");
        }

        for alternate in chain {
            let Some(adapted) = adapt_arguments(alternate, &arguments, query) else {
                debug!(tool = %alternate.name, "Skipping fallback; arguments cannot be adapted");
                continue;
            };

            info!(
                primary = %tool.name,
                fallback = %alternate.name,
                "Trying fallback tool"
            );

            let args = Value::Object(adapted);
            match self.attempt(&alternate.name, args.clone(), &mut attempts).await {
                Ok(text) => {
                    return Ok(ExecutionOutcome {
                        tool_used: alternate.name.clone(),
                        arguments: args,
                        text,
                        attempts,
                    })
                }
                Err(message) => last_error = (alternate.name.clone(), message),
            }
        }

        // -------------------------------------------------
        // 3️⃣ EXHAUSTED
        // -------------------------------------------------
        warn!(
            primary = %tool.name,
            attempts = attempts.len(),
            last_tool = %last_error.0,
            "All tools failed"
        );

        Err(RouterError::ToolExecution {
            tool: last_error.0,
            message: last_error.1,
        })
    }

    /// One call; records the attempt and returns the payload or an error message
    async fn attempt(
        &self,
        tool: &str,
        arguments: Value,
        attempts: &mut Vec<ExecutionAttempt>,
    ) -> std::result::Result<String, String> {
        let start = Instant::now();
        let result = self.transport.call_tool(tool, arguments.clone()).await;
        let execution_time_ms = start.elapsed().as_millis() as u64;

        let (outcome, payload) = match result {
            Ok(output) => match embedded_error(&output) {
                None => (AttemptOutcome::Success, Ok(output.text)),
                Some(message) => (AttemptOutcome::ToolError, Err(message)),
            },
            Err(e) => (AttemptOutcome::TransportError, Err(e.to_string())),
        };

        match &payload {
            Ok(_) => debug!(tool, execution_time_ms, "Tool call succeeded"),
            Err(message) => warn!(
                tool,
                outcome = ?outcome,
                error = %message,
                execution_time_ms,
                "Tool call failed"
            ),
        }

        attempts.push(ExecutionAttempt {
            tool: tool.to_string(),
            arguments,
            outcome,
            error: payload.as_ref().err().cloned(),
            execution_time_ms,
        });

        payload
    }
}
