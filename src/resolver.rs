//! Entity / parameter resolver
//!
//! Fills the parameters a tool needs (symbol, count, query) from the raw
//! query text. Symbol resolution is tiered:
//!   (a) explicit uppercase ticker token
//!   (b) static company-name dictionary
//!   (c) one lookup through the search tool
//! If all tiers miss, resolution fails. Nothing is guessed.

use crate::error::RouterError;
use crate::models::ToolDescriptor;
use crate::protocol::ToolTransport;
use crate::tools::ToolRegistry;
use crate::Result;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

pub const DEFAULT_COUNT: u32 = 5;
pub const MAX_COUNT: u32 = 50;

/// Company name → ticker. Matched case-insensitively on word boundaries.
const COMPANY_TICKERS: &[(&str, &str)] = &[
    ("apple", "AAPL"),
    ("microsoft", "MSFT"),
    ("google", "GOOGL"),
    ("alphabet", "GOOGL"),
    ("amazon", "AMZN"),
    ("tesla", "TSLA"),
    ("meta", "META"),
    ("meta platforms", "META"),
    ("facebook", "META"),
    ("nvidia", "NVDA"),
    ("netflix", "NFLX"),
    ("berkshire hathaway", "BRK-B"),
    ("berkshire", "BRK-B"),
    ("jpmorgan", "JPM"),
    ("jp morgan", "JPM"),
    ("johnson & johnson", "JNJ"),
    ("visa", "V"),
    ("mastercard", "MA"),
    ("walmart", "WMT"),
    ("procter & gamble", "PG"),
    ("exxon", "XOM"),
    ("exxon mobil", "XOM"),
    ("chevron", "CVX"),
    ("coca-cola", "KO"),
    ("coca cola", "KO"),
    ("pepsico", "PEP"),
    ("pepsi", "PEP"),
    ("intel", "INTC"),
    ("amd", "AMD"),
    ("advanced micro devices", "AMD"),
    ("ibm", "IBM"),
    ("oracle", "ORCL"),
    ("salesforce", "CRM"),
    ("adobe", "ADBE"),
    ("disney", "DIS"),
    ("walt disney", "DIS"),
    ("boeing", "BA"),
    ("ford", "F"),
    ("general motors", "GM"),
    ("general electric", "GE"),
    ("uber", "UBER"),
    ("airbnb", "ABNB"),
    ("paypal", "PYPL"),
    ("starbucks", "SBUX"),
    ("nike", "NKE"),
    ("mcdonald's", "MCD"),
    ("mcdonalds", "MCD"),
    ("costco", "COST"),
    ("home depot", "HD"),
    ("bank of america", "BAC"),
    ("wells fargo", "WFC"),
    ("goldman sachs", "GS"),
    ("morgan stanley", "MS"),
    ("pfizer", "PFE"),
    ("moderna", "MRNA"),
    ("verizon", "VZ"),
    ("at&t", "T"),
    ("qualcomm", "QCOM"),
    ("broadcom", "AVGO"),
    ("cisco", "CSCO"),
    ("palantir", "PLTR"),
    ("spotify", "SPOT"),
    ("shopify", "SHOP"),
    ("snowflake", "SNOW"),
    ("coinbase", "COIN"),
    ("caterpillar", "CAT"),
    ("unitedhealth", "UNH"),
    ("eli lilly", "LLY"),
    ("abbvie", "ABBV"),
    ("merck", "MRK"),
];

/// Uppercase words that look like tickers but are not
const NOT_TICKERS: &[&str] = &[
    "I", "A", "ETF", "ETFS", "REIT", "REITS", "CEO", "CFO", "IPO", "EPS", "PE", "USA", "US",
    "USD", "GDP", "CPI", "AI", "API", "ATH", "YTD", "OK", "NYSE", "TOP", "BEST", "BUY", "SELL",
    "NEWS", "PRICE", "THE", "AND", "FOR", "VS", "ME", "MY", "IS", "OF", "IN", "ON", "TO", "DO",
    "HOW", "WHAT", "SHOW", "GET", "FIND", "LIST", "HOT",
];

const COMPANY_SUFFIXES: &[&str] = &[
    "inc", "corp", "corporation", "company", "co", "technologies", "holdings", "group", "ltd",
    "plc", "industries", "systems", "therapeutics", "pharmaceuticals", "bancorp",
];

/// Capitalized words that start a sentence rather than name a company
const LEADING_WORDS: &[&str] = &[
    "what", "whats", "what's", "how", "show", "get", "give", "tell", "find", "search", "compare",
    "is", "are", "should", "can", "could", "please", "the", "stock", "stocks", "price", "quote",
    "news", "latest", "current", "i", "me", "my", "look", "lookup", "buy", "sell", "any", "do",
    "does", "ticker", "symbol", "share", "shares", "today",
];

const QUERY_TRIGGERS: &[&str] = &["search for", "search", "find", "symbol", "ticker"];

/// Words after which a company name commonly follows ("price of X")
const NAME_INTRODUCERS: &[&str] = &["of", "for", "about", "on"];

//
// ================= Static extraction =================
//

fn tokens(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !(c.is_ascii_alphanumeric() || c == '$'))
        .filter(|t| !t.is_empty())
}

fn ticker_like(token: &str, min_len: usize) -> Option<&str> {
    let bare = token.strip_prefix('$').unwrap_or(token);
    let len_ok = (min_len..=5).contains(&bare.len());
    if len_ok
        && bare.chars().all(|c| c.is_ascii_uppercase())
        && !NOT_TICKERS.contains(&bare)
    {
        Some(bare)
    } else {
        None
    }
}

/// Tier (a): first explicit 1–5 letter uppercase token
pub fn explicit_ticker(text: &str) -> Option<String> {
    tokens(text).find_map(|t| ticker_like(t, 1)).map(str::to_string)
}

/// All explicit 3–5 letter uppercase tokens with their positions
pub fn ticker_tokens(text: &str) -> Vec<(usize, String)> {
    let mut found = Vec::new();
    let mut offset = 0;
    for token in tokens(text) {
        let pos = text[offset..].find(token).map(|p| p + offset).unwrap_or(offset);
        offset = pos + token.len();
        if let Some(ticker) = ticker_like(token, 3) {
            found.push((pos, ticker.to_string()));
        }
    }
    found
}

fn on_word_boundary(text: &str, start: usize, len: usize) -> bool {
    let before_ok = text[..start]
        .chars()
        .next_back()
        .map_or(true, |c| !c.is_alphanumeric());
    let after_ok = text[start + len..]
        .chars()
        .next()
        .map_or(true, |c| !c.is_alphanumeric());
    before_ok && after_ok
}

/// Every dictionary hit as (position, name, ticker)
pub fn company_mentions(text: &str) -> Vec<(usize, &'static str, &'static str)> {
    let lowered = text.to_lowercase();
    let mut hits = Vec::new();

    for (name, ticker) in COMPANY_TICKERS {
        for (pos, _) in lowered.match_indices(name) {
            if on_word_boundary(&lowered, pos, name.len()) {
                hits.push((pos, *name, *ticker));
            }
        }
    }

    hits.sort_by_key(|(pos, name, _)| (*pos, std::cmp::Reverse(name.len())));
    hits
}

/// Tier (b): the most specific (longest) matching company name
pub fn lookup_company(text: &str) -> Option<&'static str> {
    company_mentions(text)
        .into_iter()
        .max_by(|a, b| a.1.len().cmp(&b.1.len()).then(b.0.cmp(&a.0)))
        .map(|(_, _, ticker)| ticker)
}

/// Tiers (a) and (b) only; never touches the network
pub fn static_symbol(text: &str) -> Option<String> {
    explicit_ticker(text).or_else(|| lookup_company(text).map(str::to_string))
}

/// Distinct symbols in order of appearance (company names and 3–5 letter tickers)
pub fn mentioned_symbols(text: &str) -> Vec<String> {
    let mut hits: Vec<(usize, String)> = company_mentions(text)
        .into_iter()
        .map(|(pos, _, ticker)| (pos, ticker.to_string()))
        .collect();
    hits.extend(ticker_tokens(text));
    hits.sort_by_key(|(pos, _)| *pos);

    let mut symbols: Vec<String> = Vec::new();
    for (_, symbol) in hits {
        if !symbols.contains(&symbol) {
            symbols.push(symbol);
        }
    }
    symbols
}

fn clamp_count(n: u64) -> u32 {
    n.clamp(1, MAX_COUNT as u64) as u32
}

/// A run of ASCII digits as a clamped count. Runs too long for `u64` saturate.
fn parse_digit_run(digits: &str) -> Option<u32> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(digits.parse::<u64>().map_or(MAX_COUNT, clamp_count))
}

/// First integer in the text, clamped, else the default
pub fn extract_count(text: &str, default: u32) -> u32 {
    text.split(|c: char| !c.is_ascii_digit())
        .find(|s| !s.is_empty())
        .and_then(parse_digit_run)
        .unwrap_or(default)
}

/// Search text with leading trigger phrases removed
pub fn extract_query(text: &str) -> String {
    let trimmed = text.trim();

    let mut rest = trimmed;
    for trigger in QUERY_TRIGGERS {
        let matches = trimmed
            .get(..trigger.len())
            .map_or(false, |prefix| prefix.eq_ignore_ascii_case(trigger));
        if matches {
            rest = &trimmed[trigger.len()..];
            break;
        }
    }

    let rest = rest
        .trim_start_matches(|c: char| c.is_whitespace() || c == ':')
        .trim_start_matches("for ")
        .trim();

    if rest.is_empty() {
        trimmed.to_string()
    } else {
        rest.to_string()
    }
}

fn clean_word(word: &str) -> &str {
    word.trim_matches(|c: char| !(c.is_alphanumeric() || c == '&' || c == '-'))
}

fn is_capitalized(word: &str) -> bool {
    word.chars().next().map_or(false, |c| c.is_uppercase())
}

/// Company name candidate for the search tier
pub fn candidate_company_name(text: &str) -> Option<String> {
    let words: Vec<&str> = text.split_whitespace().map(clean_word).collect();

    // "Rivian Automotive Inc", "Acme Corp"
    for (idx, word) in words.iter().enumerate() {
        let lowered = word.to_lowercase();
        if idx == 0 || !COMPANY_SUFFIXES.contains(&lowered.as_str()) {
            continue;
        }
        let start = (0..idx)
            .rev()
            .take(3)
            .take_while(|&i| is_capitalized(words[i]))
            .last();
        if let Some(start) = start {
            return Some(words[start..=idx].join(" "));
        }
    }

    // Bare proper noun run: "Rivian", "Lucid Motors"
    let is_leading = |w: &str| LEADING_WORDS.contains(&w.to_lowercase().as_str());
    let is_name_word = |w: &str| is_capitalized(w) && !is_leading(w);
    if let Some(start) = words
        .iter()
        .position(|&w| w.len() > 1 && is_name_word(w))
    {
        let run: Vec<&str> = words[start..]
            .iter()
            .copied()
            .take_while(|&w| is_name_word(w))
            .take(3)
            .collect();
        return Some(run.join(" "));
    }

    // "price of rivian"
    words
        .windows(2)
        .find(|pair| NAME_INTRODUCERS.contains(&pair[0].to_lowercase().as_str()))
        .map(|pair| pair[1])
        .filter(|&w| w.len() > 1 && !is_leading(w))
        .map(str::to_string)
}

/// Pick a symbol from a search tool payload, preferring equities
pub fn pick_search_symbol(payload: &str) -> Option<String> {
    let parsed: Value = serde_json::from_str(payload.trim()).ok()?;

    let items = match &parsed {
        Value::Array(items) => items.clone(),
        Value::Object(obj) => ["quotes", "results", "data"]
            .iter()
            .find_map(|key| obj.get(*key).and_then(Value::as_array).cloned())?,
        _ => return None,
    };

    let symbol_of = |item: &Value| {
        item.get("symbol")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    let is_equity = |item: &Value| {
        ["quoteType", "quote_type", "type", "typeDisp"]
            .iter()
            .filter_map(|key| item.get(*key).and_then(Value::as_str))
            .any(|t| t.eq_ignore_ascii_case("equity"))
    };

    items
        .iter()
        .find(|&item| is_equity(item) && symbol_of(item).is_some())
        .or_else(|| items.iter().find(|&item| symbol_of(item).is_some()))
        .and_then(|item| symbol_of(item))
}

//
// ================= Resolver =================
//

pub struct EntityResolver {
    default_count: u32,
}

impl EntityResolver {
    pub fn new(default_count: u32) -> Self {
        Self {
            default_count: default_count.clamp(1, MAX_COUNT),
        }
    }

    pub fn default_count(&self) -> u32 {
        self.default_count
    }

    /// Resolve a ticker for `text`, issuing at most one search call
    pub async fn resolve_symbol(
        &self,
        text: &str,
        registry: &ToolRegistry,
        transport: &dyn ToolTransport,
    ) -> Result<String> {
        if let Some(ticker) = explicit_ticker(text) {
            debug!(%ticker, "Symbol resolved from explicit ticker");
            return Ok(ticker);
        }

        if let Some(ticker) = lookup_company(text) {
            debug!(%ticker, "Symbol resolved from company dictionary");
            return Ok(ticker.to_string());
        }

        let not_found = || RouterError::missing_parameter("symbol", "symbol not found");

        let Some(search) = registry.search_tool() else {
            debug!("No search tool registered; symbol unresolved");
            return Err(not_found());
        };
        let Some(candidate) = candidate_company_name(text) else {
            debug!("No company name candidate in query");
            return Err(not_found());
        };

        info!(tool = %search.name, %candidate, "Looking up symbol via search tool");

        let output = transport
            .call_tool(&search.name, json!({ "query": candidate }))
            .await
            .map_err(|e| {
                warn!(error = %e, "Symbol lookup failed");
                RouterError::missing_parameter("symbol", format!("symbol not found ({})", e))
            })?;

        if output.is_error {
            return Err(not_found());
        }

        pick_search_symbol(&output.text).ok_or_else(not_found)
    }

    /// Fill the parameters `tool` needs. Only schema-required parameters are
    /// terminal when unresolved; capability-implied ones are best effort.
    pub async fn resolve_parameters(
        &self,
        tool: &ToolDescriptor,
        parameters: &mut Map<String, Value>,
        text: &str,
        registry: &ToolRegistry,
        transport: &dyn ToolTransport,
    ) -> Result<()> {
        let caps = tool.capabilities;
        let required = |name: &str| tool.input_schema.required.iter().any(|r| r == name);

        if caps.requires_symbol || required("symbol") {
            let existing = parameters
                .get("symbol")
                .and_then(Value::as_str)
                .map(str::to_string);

            let resolved = match existing {
                Some(value) if !value.trim().is_empty() => {
                    self.normalize_symbol(&value, registry, transport).await
                }
                _ => self.resolve_symbol(text, registry, transport).await,
            };

            match resolved {
                Ok(symbol) => {
                    parameters.insert("symbol".to_string(), json!(symbol));
                }
                Err(e) if required("symbol") => return Err(e),
                Err(_) => {
                    parameters.remove("symbol");
                }
            }
        }

        if caps.requires_count || required("count") {
            let count = match parameters.get("count") {
                Some(Value::Number(n)) => n
                    .as_u64()
                    .map(clamp_count)
                    .or_else(|| n.as_i64().map(|_| 1)),
                Some(Value::String(s)) => parse_digit_run(s.trim()),
                _ => None,
            }
            .unwrap_or_else(|| extract_count(text, self.default_count));
            parameters.insert("count".to_string(), json!(count));
        }

        if caps.requires_query || required("query") {
            let has_query = parameters
                .get("query")
                .and_then(Value::as_str)
                .map_or(false, |q| !q.trim().is_empty());
            if !has_query {
                parameters.insert("query".to_string(), json!(extract_query(text)));
            }
        }

        Ok(())
    }

    /// A model-supplied symbol may be a company name; map it to a ticker
    async fn normalize_symbol(
        &self,
        value: &str,
        registry: &ToolRegistry,
        transport: &dyn ToolTransport,
    ) -> Result<String> {
        if let Some(ticker) = lookup_company(value) {
            return Ok(ticker.to_string());
        }

        let trimmed = value.trim().trim_start_matches('$');
        let ticker_shaped = trimmed.len() <= 6
            && trimmed
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
        if ticker_shaped {
            return Ok(trimmed.to_uppercase());
        }

        self.resolve_symbol(value, registry, transport).await
    }
}

impl Default for EntityResolver {
    fn default() -> Self {
        Self::new(DEFAULT_COUNT)
    }
}
