//! Example query suggestions
//!
//! Same pattern as classification: ask the model, and on any failure build
//! suggestions from templates for the tools the registry actually has.

use crate::classifier::llm::{extract_balanced, fix_leading_zeros, strip_code_fences, strip_trailing_commas};
use crate::error::RouterError;
use crate::llm::{ModelClient, SamplingOptions};
use crate::resolver::static_symbol;
use crate::tools::{names, ToolRegistry};
use crate::Result;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, warn};

pub const MAX_SUGGESTIONS: usize = 5;

/// (tool, template); `{}` is replaced by the seed's ticker
const SYMBOL_TEMPLATES: &[(&str, &str)] = &[
    (names::QUOTE, "What is {} trading at?"),
    (names::HISTORICAL, "Show {} price history for the last year"),
    (names::NEWS, "Latest news on {}"),
    (names::INSIGHTS, "Technical outlook for {}"),
    (names::RECOMMENDATIONS, "Analyst recommendations for {}"),
    (names::CHART, "Chart {} over the last 3 months"),
];

const MARKET_TEMPLATES: &[(&str, &str)] = &[
    (names::TRENDING, "What stocks are trending today?"),
    (names::SCREENER, "Top 5 dividend stocks"),
    (names::TOP_GAINERS, "Biggest gainers today"),
    (names::TRENDING_ETFS, "Most popular ETFs right now"),
    (names::SEARCH, "Find the ticker for Rivian"),
    (names::MARKET_SUMMARY, "How is the market doing today?"),
];

pub struct SuggestionGenerator {
    model: Option<Arc<dyn ModelClient>>,
}

impl SuggestionGenerator {
    pub fn new(model: Option<Arc<dyn ModelClient>>) -> Self {
        Self { model }
    }

    pub async fn suggest(&self, seed: &str, registry: &ToolRegistry) -> Vec<String> {
        if let Some(model) = &self.model {
            match self.from_model(model.as_ref(), seed).await {
                Ok(suggestions) => return suggestions,
                Err(e) => warn!(code = e.code(), error = %e, "Model suggestions unavailable; using templates"),
            }
        }
        template_suggestions(seed, registry)
    }

    async fn from_model(&self, model: &dyn ModelClient, seed: &str) -> Result<Vec<String>> {
        let prompt = format!(
            r#"Suggest up to {} short example questions a user could ask a financial data assistant,
related to: "{}"

Return ONLY a JSON array of strings."#,
            MAX_SUGGESTIONS,
            seed.trim()
        );

        let limit = model.timeout();
        let raw = timeout(limit, model.complete(&prompt, SamplingOptions::SUGGEST))
            .await
            .map_err(|_| RouterError::Timeout(limit.as_millis() as u64))??;

        let suggestions = parse_suggestions(&raw)?;
        debug!(count = suggestions.len(), "Model suggestions received");
        Ok(suggestions)
    }
}

pub fn parse_suggestions(raw: &str) -> Result<Vec<String>> {
    let unfenced = strip_code_fences(raw);
    let array = extract_balanced(&unfenced, '[', ']').ok_or_else(|| {
        RouterError::MalformedClassifierOutput("no JSON array in response".to_string())
    })?;
    let repaired = strip_trailing_commas(&fix_leading_zeros(array));

    let items: Vec<serde_json::Value> = serde_json::from_str(&repaired)
        .map_err(|e| RouterError::MalformedClassifierOutput(format!("invalid JSON: {}", e)))?;

    let suggestions: Vec<String> = items
        .iter()
        .filter_map(|item| item.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .take(MAX_SUGGESTIONS)
        .map(str::to_string)
        .collect();

    if suggestions.is_empty() {
        return Err(RouterError::MalformedClassifierOutput(
            "no suggestions in response".to_string(),
        ));
    }
    Ok(suggestions)
}

pub fn template_suggestions(seed: &str, registry: &ToolRegistry) -> Vec<String> {
    let available = |tool: &str| !registry.is_populated() || registry.contains(tool);

    let mut out: Vec<String> = Vec::new();
    if let Some(symbol) = static_symbol(seed) {
        out.extend(
            SYMBOL_TEMPLATES
                .iter()
                .filter(|(tool, _)| available(*tool))
                .map(|(_, template)| template.replace("{}", &symbol)),
        );
    }

    for (tool, template) in MARKET_TEMPLATES {
        if out.len() >= MAX_SUGGESTIONS {
            break;
        }
        if available(*tool) && !out.iter().any(|s| s == template) {
            out.push(template.to_string());
        }
    }

    out.truncate(MAX_SUGGESTIONS);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{remote_tool, standard_registry, ScriptedModel};

    #[test]
    fn test_parse_repairs_fenced_array() {
        let raw = "Here:\n```json\n[\"Apple price?\", \"TSLA news\",]\n```";
        assert_eq!(
            parse_suggestions(raw).unwrap(),
            vec!["Apple price?".to_string(), "TSLA news".to_string()]
        );
        assert!(parse_suggestions("no list here").is_err());
        assert!(parse_suggestions("[]").is_err());
    }

    #[test]
    fn test_templates_use_seed_symbol() {
        let suggestions = template_suggestions("tell me about apple", &standard_registry());
        assert_eq!(suggestions.len(), MAX_SUGGESTIONS);
        assert_eq!(suggestions[0], "What is AAPL trading at?");
    }

    #[test]
    fn test_templates_follow_registry_categories() {
        let registry = ToolRegistry::from_tools(vec![remote_tool(names::TRENDING, &[])]).unwrap();
        let suggestions = template_suggestions("apple", &registry);
        assert_eq!(
            suggestions,
            vec!["What stocks are trending today?".to_string()]
        );
    }

    #[tokio::test]
    async fn test_model_failure_uses_templates() {
        let generator = SuggestionGenerator::new(Some(Arc::new(ScriptedModel::failing())));
        let suggestions = generator.suggest("markets", &standard_registry()).await;
        assert_eq!(suggestions[0], "What stocks are trending today?");
    }

    #[tokio::test]
    async fn test_model_suggestions_are_capped() {
        let model = ScriptedModel::replying(r#"["a", "b", "c", "d", "e", "f", "g"]"#);
        let generator = SuggestionGenerator::new(Some(Arc::new(model)));
        let suggestions = generator.suggest("anything", &standard_registry()).await;
        assert_eq!(suggestions.len(), MAX_SUGGESTIONS);
    }
}
