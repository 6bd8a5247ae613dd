//! Model-backed intent classifier
//!
//! Asks the model for a JSON tool selection. Model output is untrusted:
//! it is repaired, parsed, and validated against the registry before use.
//! Any failure is reported to the caller, which falls back to the rules.

use crate::error::RouterError;
use crate::llm::{ModelClient, SamplingOptions};
use crate::models::{clamp_confidence, ClassificationResult, ClassificationSource, DEFAULT_CONFIDENCE};
use crate::tools::{names, ToolRegistry};
use crate::Result;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::time::timeout;
use tracing::debug;

/// Tool names listed in the prompt are capped to keep it bounded
const MAX_PROMPT_TOOLS: usize = 40;

/// (query, tool, parameters) worked examples
const EXAMPLES: &[(&str, &str, &str)] = &[
    ("What's Apple trading at?", names::QUOTE, r#"{"symbol": "AAPL"}"#),
    ("top 5 dividend stocks", names::SCREENER, r#"{"criteria": "dividend_yield", "count": 5}"#),
    ("show me TSLA over the last year", names::HISTORICAL, r#"{"symbol": "TSLA", "period": "1y"}"#),
    ("what's hot today", names::TRENDING, r#"{"count": 5}"#),
    ("find the ticker for Rivian", names::SEARCH, r#"{"query": "Rivian"}"#),
    ("latest Nvidia news", names::NEWS, r#"{"symbol": "NVDA"}"#),
];

pub struct LlmClassifier {
    model: Arc<dyn ModelClient>,
}

impl LlmClassifier {
    pub fn new(model: Arc<dyn ModelClient>) -> Self {
        Self { model }
    }

    /// One bounded model call, no retries.
    pub async fn classify(
        &self,
        query: &str,
        registry: &ToolRegistry,
    ) -> Result<ClassificationResult> {
        let prompt = build_prompt(query, registry);
        let limit = self.model.timeout();

        let raw = timeout(limit, self.model.complete(&prompt, SamplingOptions::CLASSIFY))
            .await
            .map_err(|_| RouterError::Timeout(limit.as_millis() as u64))??;

        debug!(response_len = raw.len(), "Classifier response received");
        parse_classification(&raw, registry)
    }
}

pub fn build_prompt(query: &str, registry: &ToolRegistry) -> String {
    let tools = registry.names();
    let listed: Vec<&str> = tools.iter().take(MAX_PROMPT_TOOLS).copied().collect();

    let examples: Vec<String> = EXAMPLES
        .iter()
        .filter(|(_, tool, _)| registry.contains(tool))
        .map(|(q, tool, params)| {
            format!(
                "Query: {}\n{{\"tool\": \"{}\", \"parameters\": {}, \"reasoning\": \"...\", \"confidence\": 0.9}}",
                q, tool, params
            )
        })
        .collect();

    format!(
        r#"You route financial questions to exactly one data tool.

Available tools:
- {}

Parameter conventions:
- symbol: uppercase stock ticker (e.g. "AAPL")
- count: number of results
- query: free search text
- period: one of 5d, 1mo, 3mo, 6mo, 1y, 5y

Examples:
{}

Rules:
- Choose only from the available tools
- Return ONLY one JSON object, no explanation text

Query: {}
"#,
        listed.join("\n- "),
        examples.join("\n\n"),
        query.trim(),
    )
}

//
// ================= Response repair =================
//

/// Strip code fences, cut the first balanced object, fix common slips
pub fn repair_json(raw: &str) -> Option<String> {
    let unfenced = strip_code_fences(raw);
    let object = extract_balanced(&unfenced, '{', '}')?;
    Some(strip_trailing_commas(&fix_leading_zeros(object)))
}

pub fn strip_code_fences(raw: &str) -> String {
    raw.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// First `open`…`close` span whose delimiters balance outside of strings.
/// An unterminated span is returned as-is up to the end of input.
pub fn extract_balanced(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        if c == '"' {
            in_string = true;
        } else if c == open {
            depth += 1;
        } else if c == close {
            depth -= 1;
            if depth == 0 {
                return Some(&text[start..start + offset + c.len_utf8()]);
            }
        }
    }

    Some(&text[start..])
}

/// `00.85` → `0.85` for numbers outside of strings
pub fn fix_leading_zeros(json: &str) -> String {
    let chars: Vec<char> = json.chars().collect();
    let mut out = String::with_capacity(json.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            out.push(c);
            i += 1;
            continue;
        }

        let starts_number = i == 0 || !(chars[i - 1].is_ascii_digit() || chars[i - 1] == '.');
        if c == '0' && starts_number {
            let mut j = i;
            while j + 1 < chars.len() && chars[j + 1] == '0' {
                j += 1;
            }
            if j > i && chars.get(j + 1) == Some(&'.') {
                out.push('0');
                i = j + 1;
                continue;
            }
        }

        if c == '"' {
            in_string = true;
        }
        out.push(c);
        i += 1;
    }

    out
}

/// Drop commas that directly precede `}` or `]`
pub fn strip_trailing_commas(json: &str) -> String {
    let chars: Vec<char> = json.chars().collect();
    let mut out = String::with_capacity(json.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            out.push(c);
            continue;
        }

        if c == '"' {
            in_string = true;
        }

        if c == ',' {
            let next = chars[i + 1..].iter().find(|n| !n.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(c);
    }

    out
}

/// Turn raw model output into a validated classification
pub fn parse_classification(raw: &str, registry: &ToolRegistry) -> Result<ClassificationResult> {
    let repaired = repair_json(raw).ok_or_else(|| {
        RouterError::MalformedClassifierOutput("no JSON object in response".to_string())
    })?;

    let value: Value = serde_json::from_str(&repaired)
        .map_err(|e| RouterError::MalformedClassifierOutput(format!("invalid JSON: {}", e)))?;

    let tool = ["tool", "tool_name", "name"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| RouterError::MalformedClassifierOutput("missing tool name".to_string()))?;

    if !registry.contains(tool) {
        return Err(RouterError::MalformedClassifierOutput(format!(
            "unknown tool '{}'",
            tool
        )));
    }

    let parameters: Map<String, Value> = ["parameters", "params", "arguments"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_object))
        .cloned()
        .unwrap_or_default();

    let confidence = match value.get("confidence") {
        Some(Value::Number(n)) => n.as_f64().map(|f| f as f32),
        Some(Value::String(s)) => s.trim().parse::<f32>().ok(),
        _ => None,
    }
    .map(clamp_confidence)
    .unwrap_or(DEFAULT_CONFIDENCE);

    let reasoning = value
        .get("reasoning")
        .and_then(Value::as_str)
        .unwrap_or("Selected by language model")
        .to_string();

    Ok(ClassificationResult::new(
        tool,
        parameters,
        reasoning,
        confidence,
        ClassificationSource::Llm,
    ))
}
