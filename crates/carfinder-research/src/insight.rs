//! Best-effort extraction of structured signals from free-text market
//! commentary.
//!
//! Each signal has its own extraction function with a fixed pattern list and
//! precedence order; a miss yields the documented default, never an error.

use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;

use carfinder_core::{CompetitiveAnalysis, MarketInsight, PriceRange, TrendDirection};

static RE_RANGE_DOLLARS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\$([0-9,]+)\s*(?:-|to)\s*\$([0-9,]+)").expect("range pattern")
});
static RE_RANGE_K: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)([0-9]+)k\s*(?:-|to)\s*([0-9]+)k").expect("k-range pattern"));
static RE_RANGE_LOW_HIGH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)low:\s*\$([0-9,]+).*high:\s*\$([0-9,]+)").expect("low/high pattern")
});
static RE_RANGE_LOOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)range.*\$([0-9,]+).*\$([0-9,]+)").expect("loose range"));

static RE_AVG_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)average.*\$([0-9,]+)",
        r"(?i)typical.*\$([0-9,]+)",
        r"(?i)median.*\$([0-9,]+)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("average pattern"))
    .collect()
});

static RE_DOLLAR_AMOUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$[0-9,]+").expect("dollar pattern"));

static RE_SOURCE_BRANDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(AutoTrader|Cars\.com|CarGurus|KBB|Kelley Blue Book|Edmunds|NADA)")
        .expect("brand pattern")
});
static RE_SOURCE_ACCORDING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)according to ([^,\.]+)").expect("according-to pattern"));
static RE_SOURCE_EXPLICIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)source: ([^,\.]+)").expect("source pattern"));

static RE_DAYS_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)([0-9]+)\s*days?\s*on\s*market",
        r"(?i)sell.*?([0-9]+)\s*days?",
        r"(?i)([0-9]+)\s*days?.*sell",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("days pattern"))
    .collect()
});

const CONDITION_INDICATORS: &[&str] = &[
    "market conditions",
    "current market",
    "market situation",
    "demand",
    "supply",
    "pricing trends",
];

const REGIONAL_KEYWORDS: &[&str] = &[
    "florida", "georgia", "southeast", "regional", "local", "weather", "climate", "hurricane",
    "seasonal",
];

const RISING_WORDS: &[&str] = &["increasing", "rising", "upward", "growth"];
const FALLING_WORDS: &[&str] = &["decreasing", "falling", "declining", "down"];
const STABLE_WORDS: &[&str] = &["stable", "steady", "consistent", "flat"];

const CONFIDENCE_INDICATORS: &[&str] = &[
    "according to",
    "data shows",
    "recent sales",
    "market data",
    "statistics",
    "analysis",
    "research",
    "$",
];

const MAX_REGIONAL_FACTORS: usize = 5;
const MAX_SOURCES: usize = 5;
const MAX_CONDITION_SENTENCES: usize = 3;

fn parse_money(raw: &str) -> Option<f64> {
    raw.replace(',', "").parse::<f64>().ok()
}

/// Price range recognized from "$X - $Y", "Xk to Yk", "low: $X ... high: $Y",
/// or a loose "range ... $X ... $Y", tried in that order.
pub fn extract_price_range(content: &str) -> Option<PriceRange> {
    if let Some(caps) = RE_RANGE_DOLLARS.captures(content) {
        let min = parse_money(&caps[1])?;
        let max = parse_money(&caps[2])?;
        return Some(PriceRange::new(min, max));
    }
    if let Some(caps) = RE_RANGE_K.captures(content) {
        let min = parse_money(&caps[1])? * 1000.0;
        let max = parse_money(&caps[2])? * 1000.0;
        return Some(PriceRange::new(min, max));
    }
    for re in [&*RE_RANGE_LOW_HIGH, &*RE_RANGE_LOOSE] {
        if let Some(caps) = re.captures(content) {
            let min = parse_money(&caps[1])?;
            let max = parse_money(&caps[2])?;
            return Some(PriceRange::new(min, max));
        }
    }
    None
}

/// Single "average/typical/median ... $X" price, if stated.
pub fn extract_average_price(content: &str) -> Option<f64> {
    for re in RE_AVG_PATTERNS.iter() {
        if let Some(caps) = re.captures(content) {
            if let Some(value) = parse_money(&caps[1]) {
                return Some(value);
            }
        }
    }
    None
}

/// First few sentences that talk about market conditions, joined. Defaults to
/// a fixed placeholder when nothing matches.
pub fn extract_market_conditions(content: &str) -> String {
    let relevant: Vec<&str> = content
        .split('.')
        .map(str::trim)
        .filter(|sentence| {
            let lower = sentence.to_lowercase();
            CONDITION_INDICATORS.iter().any(|ind| lower.contains(ind))
        })
        .take(MAX_CONDITION_SENTENCES)
        .collect();
    if relevant.is_empty() {
        "Market conditions not specified".to_string()
    } else {
        relevant.join(". ")
    }
}

fn capitalize(sentence: &str) -> String {
    let mut chars = sentence.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Sentences mentioning regional keywords (states, weather, seasonality),
/// capped at five.
pub fn extract_regional_factors(content: &str) -> Vec<String> {
    content
        .to_lowercase()
        .split('.')
        .map(str::trim)
        .filter(|sentence| REGIONAL_KEYWORDS.iter().any(|kw| sentence.contains(kw)))
        .map(capitalize)
        .take(MAX_REGIONAL_FACTORS)
        .collect()
}

/// Trend direction by keyword presence. Rising wins over falling wins over
/// stable; anything else is unknown.
pub fn extract_market_trend(content: &str) -> TrendDirection {
    let lower = content.to_lowercase();
    if RISING_WORDS.iter().any(|w| lower.contains(w)) {
        TrendDirection::Rising
    } else if FALLING_WORDS.iter().any(|w| lower.contains(w)) {
        TrendDirection::Falling
    } else if STABLE_WORDS.iter().any(|w| lower.contains(w)) {
        TrendDirection::Stable
    } else {
        TrendDirection::Unknown
    }
}

/// Heuristic trust score: +0.1 per evidence indicator present, +0.2 when a
/// concrete dollar amount appears, capped at 1.0.
pub fn content_confidence(content: &str) -> f64 {
    let lower = content.to_lowercase();
    let mut score: f64 = 0.0;
    for indicator in CONFIDENCE_INDICATORS {
        if lower.contains(indicator) {
            score += 0.1;
        }
    }
    if RE_DOLLAR_AMOUNT.is_match(content) {
        score += 0.2;
    }
    score.min(1.0)
}

/// Marketplace/valuation brands and attributed sources, deduplicated and
/// capped at five, in order of first mention.
pub fn extract_sources(content: &str) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    let mut push_unique = |candidate: &str| {
        let trimmed = candidate.trim();
        if trimmed.is_empty() {
            return;
        }
        if !sources.iter().any(|s| s.eq_ignore_ascii_case(trimmed)) {
            sources.push(trimmed.to_string());
        }
    };
    for caps in RE_SOURCE_BRANDS.captures_iter(content) {
        push_unique(&caps[1]);
    }
    for caps in RE_SOURCE_ACCORDING.captures_iter(content) {
        push_unique(&caps[1]);
    }
    for caps in RE_SOURCE_EXPLICIT.captures_iter(content) {
        push_unique(&caps[1]);
    }
    sources.truncate(MAX_SOURCES);
    sources
}

/// Average days-on-market figure, if the text states one.
pub fn extract_days_on_market(content: &str) -> Option<u32> {
    for re in RE_DAYS_PATTERNS.iter() {
        if let Some(caps) = re.captures(content) {
            if let Ok(days) = caps[1].parse::<u32>() {
                return Some(days);
            }
        }
    }
    None
}

/// Runs the full signal pipeline over one market-analysis response.
pub fn parse_market_insight(content: &str, vehicle_info: &str) -> MarketInsight {
    MarketInsight {
        vehicle_info: vehicle_info.to_string(),
        value_range: extract_price_range(content),
        market_conditions: extract_market_conditions(content),
        regional_factors: extract_regional_factors(content),
        confidence_score: content_confidence(content),
        sources: extract_sources(content),
        analyzed_at: Utc::now(),
    }
}

/// Parses a competitive-pricing response, anchoring every missing figure to
/// the listed price (average falls back to it, range to average ±15%).
pub fn parse_competitive_analysis(content: &str, listed_price: f64) -> CompetitiveAnalysis {
    let average = extract_average_price(content).unwrap_or(listed_price);
    let price_range = extract_price_range(content).unwrap_or(PriceRange::around(average, 0.15));
    CompetitiveAnalysis {
        average_market_price: average,
        price_range,
        market_trend: extract_market_trend(content),
        days_on_market_avg: extract_days_on_market(content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dollar_range_with_commas() {
        let range = extract_price_range("Current value: $15,000 - $18,000 depending on trim")
            .expect("range");
        assert_eq!(range.min, 15_000.0);
        assert_eq!(range.max, 18_000.0);
        assert_eq!(range.average(), 16_500.0);
    }

    #[test]
    fn k_suffixed_range() {
        let range = extract_price_range("Sells for roughly 15k to 18k in good condition").unwrap();
        assert_eq!(range.min, 15_000.0);
        assert_eq!(range.max, 18_000.0);
    }

    #[test]
    fn low_high_labeled_range() {
        let range = extract_price_range("Low: $12,500 and high: $14,900 for this model").unwrap();
        assert_eq!(range.min, 12_500.0);
        assert_eq!(range.max, 14_900.0);
    }

    #[test]
    fn dollar_pattern_precedes_k_pattern() {
        // Both forms present; the explicit dollar range wins.
        let range =
            extract_price_range("Listings run $10,000 to $12,000, sometimes quoted as 9k to 13k")
                .unwrap();
        assert_eq!(range.min, 10_000.0);
        assert_eq!(range.max, 12_000.0);
    }

    #[test]
    fn no_price_pattern_yields_none() {
        assert!(extract_price_range("No recognizable pricing in this text").is_none());
        assert!(extract_price_range("").is_none());
    }

    #[test]
    fn extractors_tolerate_hostile_input() {
        let huge = "$ -- to -- k ".repeat(10_000);
        assert!(extract_price_range(&huge).is_none());
        let _ = extract_average_price(&huge);
        let _ = extract_market_conditions(&huge);
        let _ = extract_regional_factors(&huge);
        let _ = extract_sources(&huge);
        assert!(content_confidence(&huge) <= 1.0);
    }

    #[test]
    fn average_price_from_typical_phrase() {
        assert_eq!(
            extract_average_price("A typical sale lands around $16,400 here"),
            Some(16_400.0)
        );
        assert_eq!(extract_average_price("No numbers to be found"), None);
    }

    #[test]
    fn market_conditions_joins_matching_sentences() {
        let text = "Demand is strong in the region. Unrelated filler. Supply remains tight. \
                    More filler. Market conditions favor sellers. Demand keeps climbing.";
        let conditions = extract_market_conditions(text);
        assert!(conditions.contains("Demand is strong"));
        assert!(conditions.contains("Supply remains tight"));
        // Capped at three sentences.
        assert!(!conditions.contains("keeps climbing"));
    }

    #[test]
    fn market_conditions_default_when_absent() {
        assert_eq!(
            extract_market_conditions("Nothing relevant here"),
            "Market conditions not specified"
        );
    }

    #[test]
    fn regional_factors_capped_at_five() {
        let text = "Florida one. Georgia two. Seasonal three. Hurricane four. Regional five. \
                    Climate six. Weather seven.";
        let factors = extract_regional_factors(text);
        assert_eq!(factors.len(), 5);
        assert!(factors[0].starts_with("Florida"));
    }

    #[test]
    fn trend_precedence_rising_over_falling_over_stable() {
        assert_eq!(
            extract_market_trend("Prices are rising though some segments are declining"),
            TrendDirection::Rising
        );
        assert_eq!(
            extract_market_trend("Prices are declining but otherwise steady"),
            TrendDirection::Falling
        );
        assert_eq!(extract_market_trend("Prices are steady"), TrendDirection::Stable);
        assert_eq!(extract_market_trend("No signal at all"), TrendDirection::Unknown);
    }

    #[test]
    fn confidence_is_zero_for_empty_and_capped_for_maximal_text() {
        assert_eq!(content_confidence(""), 0.0);
        let maximal = "According to market data, data shows recent sales statistics; \
                       our analysis and research put it at $14,000.";
        assert!((content_confidence(maximal) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn confidence_counts_dollar_bonus() {
        // One indicator ("$" substring) plus the dollar-amount bonus.
        let score = content_confidence("listed at $9,500");
        assert!((score - 0.3).abs() < 1e-9);
    }

    #[test]
    fn sources_deduplicate_and_cap() {
        let text = "KBB and Edmunds agree; KBB repeats. According to CarGurus data, \
                    AutoTrader and NADA and Cars.com also list it.";
        let sources = extract_sources(text);
        assert_eq!(sources.len(), 5);
        assert_eq!(sources.iter().filter(|s| *s == "KBB").count(), 1);
    }

    #[test]
    fn days_on_market_extraction() {
        assert_eq!(extract_days_on_market("typically 45 days on market"), Some(45));
        assert_eq!(extract_days_on_market("tends to sell within 30 days"), Some(30));
        assert_eq!(extract_days_on_market("moves quickly"), None);
    }

    #[test]
    fn competitive_analysis_falls_back_to_listed_price() {
        let analysis = parse_competitive_analysis("nothing useful", 20_000.0);
        assert_eq!(analysis.average_market_price, 20_000.0);
        assert_eq!(analysis.price_range.min, 17_000.0);
        assert_eq!(analysis.price_range.max, 23_000.0);
        assert_eq!(analysis.market_trend, TrendDirection::Unknown);
        assert_eq!(analysis.days_on_market_avg, None);
    }

    #[test]
    fn full_insight_pipeline_over_fixture_text() {
        let text = "According to recent sales data, market conditions are favorable. \
                    The market value range is $15,000 - $18,000. Demand is rising in Florida \
                    due to seasonal buying. Source: KBB.";
        let insight = parse_market_insight(text, "2018 Honda Civic");
        assert_eq!(insight.vehicle_info, "2018 Honda Civic");
        let range = insight.value_range.unwrap();
        assert_eq!(range.average(), 16_500.0);
        assert!(insight.confidence_score > 0.3);
        assert!(!insight.regional_factors.is_empty());
        assert!(insight.sources.iter().any(|s| s == "KBB"));
    }
}
