//! Tool registry and capability cache
//!
//! The live tool set is discovered once from the tool server and frozen.
//! Capability tags are derived from tool names at that point and are the
//! single source of truth for classification, resolution and presentation.

use crate::error::RouterError;
use crate::models::{ToolCapabilities, ToolDescriptor, ToolInputSchema, WidgetType};
use crate::protocol::{RemoteTool, ToolTransport};
use crate::Result;
use std::collections::BTreeMap;
use tokio::sync::OnceCell;
use tracing::{info, warn};

/// Well-known tool names served by the finance tool server
pub mod names {
    pub const QUOTE: &str = "get_stock_quote";
    pub const HISTORICAL: &str = "get_historical_data";
    pub const CHART: &str = "get_chart_data";
    pub const SEARCH: &str = "search_symbols";
    pub const TRENDING: &str = "get_trending_stocks";
    pub const TRENDING_ETFS: &str = "get_trending_etfs";
    pub const TOP_GAINERS: &str = "get_top_gainers";
    pub const SCREENER: &str = "screen_stocks";
    pub const NEWS: &str = "get_stock_news";
    pub const INSIGHTS: &str = "get_stock_insights";
    pub const MARKET_SUMMARY: &str = "get_market_summary";
    pub const RECOMMENDATIONS: &str = "get_recommendations";
}

/// Ordered category checks; the first substring hit wins
const CATEGORY_PRECEDENCE: &[(&[&str], WidgetType)] = &[
    (&["trending"], WidgetType::Trending),
    (&["quote", "price"], WidgetType::Quote),
    (&["historical"], WidgetType::Historical),
    (&["chart"], WidgetType::Chart),
    (&["insights"], WidgetType::Insights),
    (&["search"], WidgetType::Search),
    (&["etf"], WidgetType::Etf),
    (&["gainer"], WidgetType::Gainers),
    (&["screen"], WidgetType::Screener),
];

const SYMBOL_HINTS: &[&str] = &[
    "quote", "price", "historical", "chart", "news", "insights", "recommend", "profile",
];
const COUNT_HINTS: &[&str] = &["trending", "gainer", "loser", "screen", "top", "active"];
const QUERY_HINTS: &[&str] = &["search", "lookup"];

/// Derive capability tags from a tool name
pub fn derive_capabilities(name: &str) -> ToolCapabilities {
    let lowered = name.to_lowercase();
    let has_any = |hints: &[&str]| hints.iter().any(|h| lowered.contains(h));

    let category = CATEGORY_PRECEDENCE
        .iter()
        .find(|(needles, _)| has_any(needles))
        .map(|(_, category)| *category)
        .unwrap_or(WidgetType::General);

    ToolCapabilities {
        requires_symbol: has_any(SYMBOL_HINTS),
        requires_count: has_any(COUNT_HINTS),
        requires_query: has_any(QUERY_HINTS),
        category,
    }
}

pub fn describe(tool: RemoteTool) -> ToolDescriptor {
    let capabilities = derive_capabilities(&tool.name);
    ToolDescriptor {
        input_schema: ToolInputSchema::from_json_schema(&tool.input_schema),
        description: tool.description.unwrap_or_default(),
        name: tool.name,
        capabilities,
    }
}

/// Read-mostly store of discovered tools (init once, then frozen)
pub struct ToolRegistry {
    tools: OnceCell<BTreeMap<String, ToolDescriptor>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: OnceCell::new(),
        }
    }

    /// Build an already-populated registry
    pub fn from_tools(tools: Vec<RemoteTool>) -> Result<Self> {
        let map = build_map(tools)?;
        Ok(Self {
            tools: OnceCell::new_with(Some(map)),
        })
    }

    /// Discover tools if that has not happened yet.
    /// An empty listing leaves the registry unset so a later call retries.
    pub async fn ensure_discovered(&self, transport: &dyn ToolTransport) -> Result<()> {
        self.tools
            .get_or_try_init(|| async {
                let listed = transport.list_tools().await?;
                let map = build_map(listed)?;
                info!(
                    count = map.len(),
                    tools = ?map.keys().collect::<Vec<_>>(),
                    "Tool registry populated"
                );
                Ok::<_, RouterError>(map)
            })
            .await?;
        Ok(())
    }

    pub fn is_populated(&self) -> bool {
        self.tools.initialized()
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.get().and_then(|tools| tools.get(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> Vec<&str> {
        self.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn snapshot(&self) -> Vec<ToolDescriptor> {
        self.iter().cloned().collect()
    }

    pub fn category_for(&self, name: &str) -> Option<WidgetType> {
        self.get(name).map(|t| t.capabilities.category)
    }

    pub fn has_category(&self, category: WidgetType) -> bool {
        self.iter().any(|t| t.capabilities.category == category)
    }

    /// The tool used for free-text symbol lookups, if any
    pub fn search_tool(&self) -> Option<&ToolDescriptor> {
        self.get(names::SEARCH).or_else(|| {
            self.iter()
                .find(|t| t.capabilities.category == WidgetType::Search)
        })
    }

    fn iter(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.tools.get().into_iter().flat_map(|tools| tools.values())
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn build_map(tools: Vec<RemoteTool>) -> Result<BTreeMap<String, ToolDescriptor>> {
    let mut map = BTreeMap::new();
    for tool in tools {
        if tool.name.trim().is_empty() {
            warn!("Skipping tool with empty name");
            continue;
        }
        let descriptor = describe(tool);
        map.insert(descriptor.name.clone(), descriptor);
    }

    if map.is_empty() {
        return Err(RouterError::RegistryEmpty);
    }
    Ok(map)
}
