//! Main orchestrator - one query, one pass
//!
//! DISCOVER → CLASSIFY → RESOLVE → EXECUTE (+ fallbacks) → TAG

use crate::classifier::QueryClassifier;
use crate::error::RouterError;
use crate::execution::{ExecutionEngine, ExecutionOutcome};
use crate::models::{AnalysisResult, ClassificationResult, ErrorInfo, ToolDescriptor, WidgetType};
use crate::presentation::{payload_data, widget_for};
use crate::protocol::ToolTransport;
use crate::resolver::EntityResolver;
use crate::suggest::SuggestionGenerator;
use crate::tools::ToolRegistry;
use crate::Result;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// Longest plain-text payload echoed back as content
const MAX_TEXT_CONTENT: usize = 500;

fn number_field(data: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter()
        .find_map(|key| data.get(*key).and_then(Value::as_f64))
}

fn list_len(data: &Value) -> Option<usize> {
    if let Some(items) = data.as_array() {
        return Some(items.len());
    }
    ["results", "quotes", "items", "stocks", "data"]
        .iter()
        .find_map(|key| data.get(*key).and_then(Value::as_array))
        .map(Vec::len)
}

/// Short human-readable summary of a tool payload
fn summarize(outcome: &ExecutionOutcome, widget: WidgetType, data: &Value) -> String {
    let symbol = data
        .get("symbol")
        .and_then(Value::as_str)
        .or_else(|| outcome.arguments.get("symbol").and_then(Value::as_str));

    let mut content = match (widget, symbol, number_field(data, &["price", "regularMarketPrice"])) {
        (WidgetType::Quote, Some(symbol), Some(price)) => {
            let mut line = format!("{} is trading at {:.2}", symbol, price);
            if let Some(change) = number_field(data, &["change_percent", "regularMarketChangePercent"]) {
                line.push_str(&format!(" ({:+.2}%)", change));
            }
            line
        }
        _ => match list_len(data) {
            Some(n) => format!("{} result(s) from {}", n, outcome.tool_used),
            None if data.is_null() && !outcome.text.trim().is_empty() => {
                let text = outcome.text.trim();
                match text.char_indices().nth(MAX_TEXT_CONTENT) {
                    Some((cut, _)) => format!("{}…", &text[..cut]),
                    None => text.to_string(),
                }
            }
            None => format!("{} completed successfully.", outcome.tool_used),
        },
    };

    if outcome.used_fallback() {
        if let Some(primary) = outcome.attempts.first() {
            content.push_str(&format!(
                " (answered by {} after {} failed)",
                outcome.tool_used, primary.tool
            ));
        }
    }
    content
}

/// Coordinates registry, classifier, resolver and execution engine
pub struct Orchestrator {
    registry: Arc<ToolRegistry>,
    transport: Arc<dyn ToolTransport>,
    classifier: QueryClassifier,
    resolver: EntityResolver,
    execution_engine: ExecutionEngine,
    suggestions: SuggestionGenerator,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<ToolRegistry>,
        transport: Arc<dyn ToolTransport>,
        classifier: QueryClassifier,
        resolver: EntityResolver,
        suggestions: SuggestionGenerator,
    ) -> Self {
        Self {
            execution_engine: ExecutionEngine::new(transport.clone()),
            registry,
            transport,
            classifier,
            resolver,
            suggestions,
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Answer one query. Never fails: errors come back as an error-tagged result.
    pub async fn analyze(&self, query: &str) -> AnalysisResult {
        let request_id = Uuid::new_v4();
        let span = info_span!("analyze", %request_id);

        async move {
            let start = Instant::now();
            let mut classification = None;

            match self.run(query, &mut classification).await {
                Ok(outcome) => {
                    let widget = widget_for(&self.registry, &outcome.tool_used);
                    let data = payload_data(&outcome.text);
                    let content = summarize(&outcome, widget, &data);

                    info!(
                        tool = %outcome.tool_used,
                        widget = %widget,
                        attempts = outcome.attempts.len(),
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "Query answered"
                    );

                    AnalysisResult {
                        request_id,
                        content,
                        data,
                        widget_type: widget,
                        tool_used: Some(outcome.tool_used),
                        classification,
                        error: None,
                    }
                }
                Err(e) => {
                    warn!(
                        code = e.code(),
                        error = %e,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "Query failed"
                    );

                    AnalysisResult {
                        request_id,
                        content: format!("Unable to answer: {}", e),
                        data: Value::Null,
                        widget_type: WidgetType::Error,
                        tool_used: None,
                        classification,
                        error: Some(ErrorInfo {
                            code: e.code().to_string(),
                            message: e.to_string(),
                        }),
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run(
        &self,
        query: &str,
        classification: &mut Option<ClassificationResult>,
    ) -> Result<ExecutionOutcome> {
        let query = query.trim();
        if query.is_empty() {
            return Err(RouterError::missing_parameter("query", "query is empty"));
        }

        // === DISCOVER ===
        self.registry
            .ensure_discovered(self.transport.as_ref())
            .await?;

        // === CLASSIFY ===
        let chosen = self.classifier.classify(query, &self.registry).await;
        let tool = self
            .registry
            .get(&chosen.tool)
            .ok_or_else(|| RouterError::ToolNotFound(chosen.tool.clone()))?;
        let classified = classification.insert(chosen);

        // === RESOLVE ===
        let mut parameters = classified.parameters.clone();
        self.resolver
            .resolve_parameters(
                tool,
                &mut parameters,
                query,
                &self.registry,
                self.transport.as_ref(),
            )
            .await?;
        classified.parameters = parameters.clone();

        // === EXECUTE ===
        self.execution_engine
            .execute(tool, parameters, query, &self.registry)
            .await
    }

    /// Registry snapshot with derived capabilities
    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        self.registry
            .ensure_discovered(self.transport.as_ref())
            .await?;
        Ok(self.registry.snapshot())
    }

    pub async fn suggest(&self, seed: &str) -> Vec<String> {
        if let Err(e) = self
            .registry
            .ensure_discovered(self.transport.as_ref())
            .await
        {
            warn!(code = e.code(), error = %e, "Suggesting without a tool registry");
        }
        self.suggestions.suggest(seed, &self.registry).await
    }
}
