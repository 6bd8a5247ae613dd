//! Presentation tagging
//!
//! The registry's derived category is authoritative. The static table only
//! covers names the registry has no entry for (incomplete discovery).

use crate::models::WidgetType;
use crate::tools::{names, ToolRegistry};
use lazy_static::lazy_static;
use serde_json::Value;
use std::collections::HashMap;

lazy_static! {
    static ref STATIC_CATEGORIES: HashMap<&'static str, WidgetType> = {
        let mut m = HashMap::new();
        m.insert(names::QUOTE, WidgetType::Quote);
        m.insert(names::HISTORICAL, WidgetType::Historical);
        m.insert(names::CHART, WidgetType::Chart);
        m.insert(names::SEARCH, WidgetType::Search);
        m.insert(names::TRENDING, WidgetType::Trending);
        m.insert(names::TRENDING_ETFS, WidgetType::Etf);
        m.insert(names::TOP_GAINERS, WidgetType::Gainers);
        m.insert(names::SCREENER, WidgetType::Screener);
        m.insert(names::NEWS, WidgetType::News);
        m.insert(names::INSIGHTS, WidgetType::Insights);
        m.insert(names::MARKET_SUMMARY, WidgetType::MarketSummary);
        m.insert(names::RECOMMENDATIONS, WidgetType::Recommendations);
        m
    };
}

pub fn widget_for(registry: &ToolRegistry, tool: &str) -> WidgetType {
    registry
        .category_for(tool)
        .or_else(|| STATIC_CATEGORIES.get(tool).copied())
        .unwrap_or(WidgetType::General)
}

/// Structured view of a tool payload; non-JSON text becomes null
pub fn payload_data(text: &str) -> Value {
    serde_json::from_str(text.trim()).unwrap_or(Value::Null)
}
