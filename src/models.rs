//! Core data models for the query router

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// Confidence used when a classifier omits one
pub const DEFAULT_CONFIDENCE: f32 = 0.8;

//
// ================= Enums =================
//

/// Presentation category consumed by the rendering layer
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WidgetType {
    Trending,
    Quote,
    Historical,
    Chart,
    Insights,
    Search,
    Etf,
    Gainers,
    Screener,
    News,
    MarketSummary,
    Recommendations,
    General,
    Error,
}

/// Which classifier produced a result
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ClassificationSource {
    Llm,
    Fallback,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    ToolError,
    TransportError,
}

//
// ================= Tools =================
//

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ToolInputSchema {
    #[serde(default)]
    pub required: Vec<String>,
    /// Parameter name → declared JSON type ("string", "integer", ...)
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl ToolInputSchema {
    pub fn from_json_schema(schema: &Value) -> Self {
        let required = schema
            .get("required")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        let properties = schema
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| {
                props
                    .iter()
                    .map(|(name, prop)| {
                        let ty = prop.get("type").cloned().unwrap_or(Value::Null);
                        (name.clone(), ty)
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            required,
            properties,
        }
    }
}

/// Tags derived once from a tool's name at discovery
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCapabilities {
    pub requires_symbol: bool,
    pub requires_count: bool,
    pub requires_query: bool,
    pub category: WidgetType,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: ToolInputSchema,
    pub capabilities: ToolCapabilities,
}

//
// ================= Classification =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassificationResult {
    pub tool: String,
    pub parameters: Map<String, Value>,
    pub reasoning: String,
    pub confidence: f32,
    pub source: ClassificationSource,
}

impl ClassificationResult {
    pub fn new(
        tool: impl Into<String>,
        parameters: Map<String, Value>,
        reasoning: impl Into<String>,
        confidence: f32,
        source: ClassificationSource,
    ) -> Self {
        Self {
            tool: tool.into(),
            parameters,
            reasoning: reasoning.into(),
            confidence: clamp_confidence(confidence),
            source,
        }
    }
}

/// Clamp into [0, 1]; non-finite values fall back to the default
pub fn clamp_confidence(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        DEFAULT_CONFIDENCE
    }
}

//
// ================= Execution =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionAttempt {
    pub tool: String,
    pub arguments: Value,
    pub outcome: AttemptOutcome,
    pub error: Option<String>,
    pub execution_time_ms: u64,
}

//
// ================= Final Result =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub request_id: Uuid,
    pub content: String,
    pub data: Value,
    pub widget_type: WidgetType,
    pub tool_used: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification: Option<ClassificationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl AnalysisResult {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

impl fmt::Display for WidgetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WidgetType::Trending => "trending",
            WidgetType::Quote => "quote",
            WidgetType::Historical => "historical",
            WidgetType::Chart => "chart",
            WidgetType::Insights => "insights",
            WidgetType::Search => "search",
            WidgetType::Etf => "etf",
            WidgetType::Gainers => "gainers",
            WidgetType::Screener => "screener",
            WidgetType::News => "news",
            WidgetType::MarketSummary => "market_summary",
            WidgetType::Recommendations => "recommendations",
            WidgetType::General => "general",
            WidgetType::Error => "error",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for ClassificationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ClassificationSource::Llm => "llm",
            ClassificationSource::Fallback => "fallback",
        };
        write!(f, "{}", s)
    }
}
