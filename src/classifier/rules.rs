//! Rule-based fallback classifier
//!
//! An ordered table of (predicate, builder) rules evaluated first-match-wins.
//! Categories overlap ("top 5 bond ETFs" is both a listing and an ETF query),
//! so table order is the precedence. The default branch guarantees a result.

use crate::models::{ClassificationResult, ClassificationSource};
use crate::resolver::{self, DEFAULT_COUNT};
use crate::tools::{names, ToolRegistry};
use serde_json::{json, Map, Value};
use tracing::debug;

const DEFAULT_CONFIDENCE: f32 = 0.6;

/// Everything a rule may look at, computed once per query
pub struct RuleContext<'a> {
    pub original: &'a str,
    pub lowered: String,
    pub symbol: Option<String>,
    pub count: u32,
}

impl<'a> RuleContext<'a> {
    pub fn new(query: &'a str) -> Self {
        Self {
            original: query,
            lowered: query.to_lowercase(),
            symbol: resolver::static_symbol(query),
            count: resolver::extract_count(query, DEFAULT_COUNT),
        }
    }

    /// Keyword hit. Plain words match at the start of a word ("dividend"
    /// hits "dividends", "top" does not hit "stop"); anything with spaces
    /// or punctuation is a substring match.
    fn mentions(&self, keywords: &[&str]) -> bool {
        keywords.iter().any(|kw| {
            if kw.chars().all(|c| c.is_ascii_alphanumeric()) {
                self.lowered
                    .split(|c: char| !c.is_alphanumeric())
                    .any(|word| word.starts_with(kw))
            } else {
                self.lowered.contains(kw)
            }
        })
    }
}

pub struct Rule {
    pub name: &'static str,
    pub tool: &'static str,
    pub confidence: f32,
    pub matches: fn(&RuleContext) -> bool,
    pub params: fn(&RuleContext) -> Map<String, Value>,
    pub explain: Option<fn(&RuleContext) -> String>,
}

impl Rule {
    fn build(&self, ctx: &RuleContext) -> ClassificationResult {
        let reasoning = match self.explain {
            Some(explain) => explain(ctx),
            None => format!("Matched '{}' keywords", self.name),
        };
        ClassificationResult::new(
            self.tool,
            (self.params)(ctx),
            reasoning,
            self.confidence,
            ClassificationSource::Fallback,
        )
    }
}

//
// ================= Keyword groups =================
//

const COMPARISON: &[&str] = &["compar", "vs", "vs.", "versus"];
const SUPERLATIVE: &[&str] = &["top", "best", "most", "list"];
const DIVIDEND: &[&str] = &["dividend", "yield", "income"];
const MARKET_CAP: &[&str] = &["market cap", "largest", "biggest", "mega cap"];
const PERFORMANCE: &[&str] = &["perform", "gainer", "gain", "winner", "momentum", "return"];
const QUOTE: &[&str] = &["price", "quote", "current"];
const HISTORICAL: &[&str] = &["history", "historical", "chart", "past", "over the last", "last year"];
const TRENDING: &[&str] = &["trending", "popular", "hot", "buzz", "most active"];
const ETF: &[&str] = &["etf", "exchange traded", "exchange-traded"];
const REIT: &[&str] = &["reit", "real estate"];
const BOND: &[&str] = &["bond", "fixed income", "treasur"];
const SECTOR: &[&str] = &["sector", "tech", "healthcare", "energy", "financial", "industrial"];
const SEARCH: &[&str] = &["search", "find", "lookup", "look up", "ticker for", "symbol for"];
const NEWS: &[&str] = &["news", "headline", "latest on"];
const INSIGHTS: &[&str] = &[
    "insight", "technical", "analysis", "outlook", "rsi", "macd", "moving average", "support",
    "resistance",
];
const MARKET_SUMMARY: &[&str] = &[
    "market summary", "market overview", "how is the market", "how's the market",
    "market today", "indices", "indexes", "s&p", "nasdaq", "dow jones",
];
const RECOMMENDATIONS: &[&str] = &[
    "recommend", "analyst", "rating", "upgrade", "downgrade", "price target", "buy or sell",
];

pub const REIT_ETF_QUERY: &str = "REIT ETF real estate";
pub const BOND_ETF_QUERY: &str = "bond ETF fixed income";
pub const SECTOR_ETF_QUERY: &str = "sector ETF";

//
// ================= Parameter builders =================
//

fn no_params(_: &RuleContext) -> Map<String, Value> {
    Map::new()
}

fn count_params(ctx: &RuleContext) -> Map<String, Value> {
    let mut params = Map::new();
    params.insert("count".to_string(), json!(ctx.count));
    params
}

fn symbol_params(ctx: &RuleContext) -> Map<String, Value> {
    let mut params = Map::new();
    if let Some(symbol) = &ctx.symbol {
        params.insert("symbol".to_string(), json!(symbol));
    }
    params
}

fn query_params(query: &str) -> Map<String, Value> {
    let mut params = Map::new();
    params.insert("query".to_string(), json!(query));
    params
}

fn comparison_params(ctx: &RuleContext) -> Map<String, Value> {
    let mut params = Map::new();
    if let Some(first) = resolver::mentioned_symbols(ctx.original).into_iter().next() {
        params.insert("symbol".to_string(), json!(first));
    }
    params
}

fn explain_comparison(ctx: &RuleContext) -> String {
    let symbols = resolver::mentioned_symbols(ctx.original);
    match symbols.first() {
        Some(first) => format!(
            "Comparison query for {}; using {} as representative",
            symbols.join(", "),
            first
        ),
        None => "Comparison query with no recognizable symbols".to_string(),
    }
}

fn dividend_params(ctx: &RuleContext) -> Map<String, Value> {
    let mut params = count_params(ctx);
    params.insert("criteria".to_string(), json!("dividend_yield"));
    params
}

fn historical_params(ctx: &RuleContext) -> Map<String, Value> {
    let mut params = symbol_params(ctx);
    params.insert("period".to_string(), json!(extract_period(&ctx.lowered)));
    params
}

/// Map period wording to a provider period code
pub fn extract_period(lowered: &str) -> &'static str {
    const PERIODS: &[(&[&str], &str)] = &[
        (&["5 year", "five year", "5y"], "5y"),
        (&["6 month", "six month", "half year", "6mo"], "6mo"),
        (&["3 month", "three month", "quarter", "3mo"], "3mo"),
        (&["year", "12 month", "annual", "1y"], "1y"),
        (&["week", "5 day", "five day", "5d"], "5d"),
        (&["month", "30 day", "1mo"], "1mo"),
    ];

    PERIODS
        .iter()
        .find(|(needles, _)| needles.iter().any(|n| lowered.contains(n)))
        .map(|(_, period)| *period)
        .unwrap_or("1mo")
}

//
// ================= Rule table =================
//

pub static RULES: &[Rule] = &[
    Rule {
        name: "comparison",
        tool: names::QUOTE,
        confidence: 0.85,
        matches: |ctx| ctx.mentions(COMPARISON),
        params: comparison_params,
        explain: Some(explain_comparison),
    },
    Rule {
        name: "top_dividend",
        tool: names::SCREENER,
        confidence: 0.9,
        matches: |ctx| ctx.mentions(SUPERLATIVE) && ctx.mentions(DIVIDEND),
        params: dividend_params,
        explain: None,
    },
    Rule {
        name: "top_market_cap",
        tool: names::TRENDING,
        confidence: 0.8,
        matches: |ctx| ctx.mentions(SUPERLATIVE) && ctx.mentions(MARKET_CAP),
        params: count_params,
        explain: None,
    },
    Rule {
        name: "top_performance",
        tool: names::TRENDING,
        confidence: 0.8,
        matches: |ctx| ctx.mentions(SUPERLATIVE) && ctx.mentions(PERFORMANCE),
        params: count_params,
        explain: None,
    },
    Rule {
        name: "top_generic",
        tool: names::TRENDING,
        confidence: 0.7,
        matches: |ctx| ctx.mentions(SUPERLATIVE),
        params: count_params,
        explain: None,
    },
    Rule {
        name: "quote",
        tool: names::QUOTE,
        confidence: 0.8,
        matches: |ctx| ctx.mentions(QUOTE),
        params: symbol_params,
        explain: None,
    },
    Rule {
        name: "historical",
        tool: names::HISTORICAL,
        confidence: 0.8,
        matches: |ctx| ctx.mentions(HISTORICAL),
        params: historical_params,
        explain: None,
    },
    Rule {
        name: "trending",
        tool: names::TRENDING,
        confidence: 0.8,
        matches: |ctx| ctx.mentions(TRENDING),
        params: count_params,
        explain: None,
    },
    Rule {
        name: "reit_etf",
        tool: names::SEARCH,
        confidence: 0.95,
        matches: |ctx| ctx.mentions(ETF) && ctx.mentions(REIT),
        params: |_| query_params(REIT_ETF_QUERY),
        explain: None,
    },
    Rule {
        name: "bond_etf",
        tool: names::SEARCH,
        confidence: 0.95,
        matches: |ctx| ctx.mentions(ETF) && ctx.mentions(BOND),
        params: |_| query_params(BOND_ETF_QUERY),
        explain: None,
    },
    Rule {
        name: "sector_etf",
        tool: names::SEARCH,
        confidence: 0.95,
        matches: |ctx| ctx.mentions(ETF) && ctx.mentions(SECTOR),
        params: |_| query_params(SECTOR_ETF_QUERY),
        explain: None,
    },
    Rule {
        name: "etf",
        tool: names::TRENDING_ETFS,
        confidence: 0.9,
        matches: |ctx| ctx.mentions(ETF),
        params: count_params,
        explain: None,
    },
    Rule {
        name: "search",
        tool: names::SEARCH,
        confidence: 0.8,
        matches: |ctx| ctx.mentions(SEARCH),
        params: |ctx| query_params(ctx.original.trim()),
        explain: None,
    },
    Rule {
        name: "news",
        tool: names::NEWS,
        confidence: 0.8,
        matches: |ctx| ctx.mentions(NEWS),
        params: symbol_params,
        explain: None,
    },
    Rule {
        name: "insights",
        tool: names::INSIGHTS,
        confidence: 0.8,
        matches: |ctx| ctx.mentions(INSIGHTS),
        params: symbol_params,
        explain: None,
    },
    Rule {
        name: "market_summary",
        tool: names::MARKET_SUMMARY,
        confidence: 0.8,
        matches: |ctx| ctx.mentions(MARKET_SUMMARY),
        params: no_params,
        explain: None,
    },
    Rule {
        name: "recommendations",
        tool: names::RECOMMENDATIONS,
        confidence: 0.8,
        matches: |ctx| ctx.mentions(RECOMMENDATIONS),
        params: symbol_params,
        explain: None,
    },
    Rule {
        name: "company_mention",
        tool: names::QUOTE,
        confidence: 0.8,
        matches: |ctx| ctx.symbol.is_some(),
        params: symbol_params,
        explain: None,
    },
];

/// First rule whose predicate holds, ignoring registry availability
pub fn first_match(query: &str) -> Option<&'static Rule> {
    let ctx = RuleContext::new(query);
    RULES.iter().find(|rule| (rule.matches)(&ctx))
}

/// Classify without the model. Rules naming a tool the live registry lacks
/// are passed over so the next applicable rule can answer.
pub fn classify(query: &str, registry: &ToolRegistry) -> ClassificationResult {
    let ctx = RuleContext::new(query);
    let available = |tool: &str| !registry.is_populated() || registry.contains(tool);

    for rule in RULES {
        if !(rule.matches)(&ctx) {
            continue;
        }
        if !available(rule.tool) {
            debug!(rule = rule.name, tool = rule.tool, "Rule matched but tool is not registered");
            continue;
        }
        debug!(rule = rule.name, tool = rule.tool, "Fallback rule matched");
        return rule.build(&ctx);
    }

    debug!("No fallback rule matched; using default");
    ClassificationResult::new(
        names::TRENDING,
        count_params(&ctx),
        "No specific intent recognized; showing trending stocks",
        DEFAULT_CONFIDENCE,
        ClassificationSource::Fallback,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{remote_tool, standard_registry};

    fn rule_name(query: &str) -> Option<&'static str> {
        first_match(query).map(|r| r.name)
    }

    #[test]
    fn test_top_dividend_stocks() {
        let result = classify("top 5 dividend stocks", &standard_registry());
        assert_eq!(result.tool, names::SCREENER);
        assert_eq!(result.parameters["criteria"], json!("dividend_yield"));
        assert_eq!(result.parameters["count"], json!(5));
        assert_eq!(result.confidence, 0.9);
        assert_eq!(result.source, ClassificationSource::Fallback);
    }

    #[test]
    fn test_comparison_uses_first_symbol() {
        let result = classify("compare Apple and Microsoft", &standard_registry());
        assert_eq!(result.tool, names::QUOTE);
        assert_eq!(result.parameters["symbol"], json!("AAPL"));
        assert_eq!(result.confidence, 0.85);
        assert!(result.reasoning.contains("AAPL"));
        assert!(result.reasoning.contains("MSFT"));
    }

    #[test]
    fn test_bare_company_is_quote() {
        let result = classify("Apple stock", &standard_registry());
        assert_eq!(result.tool, names::QUOTE);
        assert_eq!(result.parameters["symbol"], json!("AAPL"));
        assert!(result.confidence >= 0.8);
    }

    #[test]
    fn test_superlative_sub_branches() {
        assert_eq!(rule_name("largest companies by market cap, top 10"), Some("top_market_cap"));
        assert_eq!(rule_name("best performing stocks this week"), Some("top_performance"));
        assert_eq!(rule_name("list some stocks"), Some("top_generic"));

        let result = classify("top 10 biggest stocks", &standard_registry());
        assert_eq!(result.tool, names::TRENDING);
        assert_eq!(result.parameters["count"], json!(10));
    }

    #[test]
    fn test_precedence_between_overlapping_rules() {
        // listing wording outranks the ETF branches
        assert_eq!(rule_name("best bond ETFs"), Some("top_generic"));
        // comparison outranks quote wording
        assert_eq!(rule_name("TSLA vs F price"), Some("comparison"));
        // ETF sub-categories outrank the generic ETF branch
        assert_eq!(rule_name("REIT ETFs for income"), Some("reit_etf"));
        assert_eq!(rule_name("bond etf options"), Some("bond_etf"));
        assert_eq!(rule_name("tech sector etf"), Some("sector_etf"));
        assert_eq!(rule_name("show me etfs"), Some("etf"));
    }

    #[test]
    fn test_keyword_prefix_matching() {
        assert_eq!(rule_name("stop loss for AAPL"), Some("company_mention"));
        assert_eq!(rule_name("Tesla headlines"), Some("news"));
    }

    #[test]
    fn test_etf_subcategory_queries() {
        let result = classify("bond etf options", &standard_registry());
        assert_eq!(result.tool, names::SEARCH);
        assert_eq!(result.parameters["query"], json!(BOND_ETF_QUERY));
        assert_eq!(result.confidence, 0.95);

        let result = classify("any good etf ideas", &standard_registry());
        assert_eq!(result.tool, names::TRENDING_ETFS);
        assert_eq!(result.confidence, 0.9);
    }

    #[test]
    fn test_remaining_rules() {
        assert_eq!(rule_name("what's the price of NVDA"), Some("quote"));
        assert_eq!(rule_name("AAPL 5 year history"), Some("historical"));
        assert_eq!(rule_name("what is trending"), Some("trending"));
        assert_eq!(rule_name("search lithium miners"), Some("search"));
        assert_eq!(rule_name("technical outlook for MSFT"), Some("insights"));
        assert_eq!(rule_name("how is the market doing"), Some("market_summary"));
        assert_eq!(rule_name("analyst ratings on Nvidia"), Some("recommendations"));
    }

    #[test]
    fn test_historical_period() {
        let result = classify("Tesla chart over the last 6 months", &standard_registry());
        assert_eq!(result.tool, names::HISTORICAL);
        assert_eq!(result.parameters["symbol"], json!("TSLA"));
        assert_eq!(result.parameters["period"], json!("6mo"));
        assert_eq!(extract_period("past week"), "5d");
        assert_eq!(extract_period("history"), "1mo");
    }

    #[test]
    fn test_default_branch() {
        let result = classify("hello there", &standard_registry());
        assert_eq!(result.tool, names::TRENDING);
        assert_eq!(result.parameters["count"], json!(5));
        assert_eq!(result.confidence, 0.6);
    }

    #[test]
    fn test_unregistered_rule_tool_is_skipped() {
        let registry = ToolRegistry::from_tools(vec![
            remote_tool(names::TRENDING, &[]),
            remote_tool(names::QUOTE, &["symbol"]),
        ])
        .unwrap();

        // screener absent: the generic listing rule answers instead
        let result = classify("top 5 dividend stocks", &registry);
        assert_eq!(result.tool, names::TRENDING);
        assert_eq!(result.confidence, 0.7);
    }

    #[test]
    fn test_every_confidence_in_range() {
        for rule in RULES {
            assert!((0.0..=1.0).contains(&rule.confidence), "{}", rule.name);
        }
    }
}
