//! Query classification
//!
//! Maps free text to a registered tool plus parameters:
//! - Model-backed first (best effort, bounded by a short timeout)
//! - Rule-based fallback on any model failure (always answers)

use crate::models::ClassificationResult;
use crate::tools::ToolRegistry;
use tracing::{info, warn};

pub mod llm;
pub mod rules;

pub use llm::LlmClassifier;

pub struct QueryClassifier {
    llm: Option<LlmClassifier>,
}

impl QueryClassifier {
    pub fn new(llm: Option<LlmClassifier>) -> Self {
        Self { llm }
    }

    /// Rules only; used when no model endpoint is configured
    pub fn rules_only() -> Self {
        Self { llm: None }
    }

    /// Never fails: every model-side error falls through to the rules
    pub async fn classify(&self, query: &str, registry: &ToolRegistry) -> ClassificationResult {
        if let Some(llm) = &self.llm {
            match llm.classify(query, registry).await {
                Ok(result) => {
                    info!(
                        tool = %result.tool,
                        confidence = result.confidence,
                        source = %result.source,
                        "Query classified"
                    );
                    return result;
                }
                Err(e) => {
                    warn!(
                        code = e.code(),
                        error = %e,
                        "Model classification unavailable; using rules"
                    );
                }
            }
        }

        let result = rules::classify(query, registry);
        info!(
            tool = %result.tool,
            confidence = result.confidence,
            source = %result.source,
            "Query classified"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ClassificationSource;
    use crate::test_support::{standard_registry, ScriptedModel};
    use crate::tools::names;
    use serde_json::json;
    use std::sync::Arc;

    fn with_model(model: ScriptedModel) -> QueryClassifier {
        QueryClassifier::new(Some(LlmClassifier::new(Arc::new(model))))
    }

    #[tokio::test]
    async fn test_model_result_is_used_when_valid() {
        let classifier = with_model(ScriptedModel::replying(
            r#"{"tool": "get_stock_news", "parameters": {"symbol": "NVDA"}, "reasoning": "news", "confidence": 0.93}"#,
        ));

        let result = classifier.classify("nvidia headlines", &standard_registry()).await;
        assert_eq!(result.tool, names::NEWS);
        assert_eq!(result.source, ClassificationSource::Llm);
        assert_eq!(result.confidence, 0.93);
    }

    #[tokio::test]
    async fn test_invalid_json_falls_back() {
        let classifier = with_model(ScriptedModel::replying("{tool: quote"));

        let result = classifier.classify("Apple stock", &standard_registry()).await;
        assert_eq!(result.source, ClassificationSource::Fallback);
        assert_eq!(result.tool, names::QUOTE);
        assert_eq!(result.parameters["symbol"], json!("AAPL"));
    }

    #[tokio::test]
    async fn test_unknown_tool_never_propagates() {
        let classifier = with_model(ScriptedModel::replying(
            r#"{"tool": "get_options_chain", "parameters": {}, "confidence": 0.99}"#,
        ));

        let result = classifier
            .classify("top 5 dividend stocks", &standard_registry())
            .await;
        assert_eq!(result.tool, names::SCREENER);
        assert_eq!(result.source, ClassificationSource::Fallback);
        assert_eq!(result.confidence, 0.9);
    }

    #[tokio::test]
    async fn test_unreachable_model_falls_back() {
        let classifier = with_model(ScriptedModel::failing());

        let result = classifier
            .classify("compare Apple and Microsoft", &standard_registry())
            .await;
        assert_eq!(result.source, ClassificationSource::Fallback);
        assert_eq!(result.parameters["symbol"], json!("AAPL"));
        assert_eq!(result.confidence, 0.85);
    }
}
