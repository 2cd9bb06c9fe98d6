//! AI-backed market research for vehicle arbitrage.
//!
//! A [`MarketResearcher`] turns a vehicle into market intelligence by asking
//! a chat-completion provider and parsing the prose response into structured
//! signals. Results are cached per vehicle profile so repeated scoring passes
//! do not re-query the provider.

pub mod cache;
pub mod client;
pub mod insight;

use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use carfinder_core::{CompetitiveAnalysis, MarketInsight, Vehicle};

pub use cache::{research_cache_key, InsightCache};
pub use client::{
    Completion, CompletionClient, PerplexityClient, PerplexityConfig, ResearchError,
};

pub const CRATE_NAME: &str = env!("CARGO_PKG_NAME");

const SYSTEM_PROMPT: &str = "You are an expert automotive market analyst specializing in used car \
valuation and market trends. Provide accurate, data-driven insights based on current market \
conditions. Focus on actionable information for car dealers and investors.";

/// Market intelligence lookups used by the scoring engine.
#[async_trait]
pub trait MarketResearch: Send + Sync {
    async fn vehicle_market(&self, vehicle: &Vehicle) -> Result<MarketInsight, ResearchError>;

    async fn competitive_pricing(
        &self,
        vehicle: &Vehicle,
    ) -> Result<CompetitiveAnalysis, ResearchError>;
}

pub struct MarketResearcher<C> {
    client: C,
    market_cache: InsightCache<MarketInsight>,
    pricing_cache: InsightCache<CompetitiveAnalysis>,
}

impl<C: CompletionClient> MarketResearcher<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            market_cache: InsightCache::default(),
            pricing_cache: InsightCache::default(),
        }
    }

    pub fn with_cache_ttl(client: C, ttl: Duration) -> Self {
        Self {
            client,
            market_cache: InsightCache::new(cache::DEFAULT_CAPACITY, ttl),
            pricing_cache: InsightCache::new(cache::DEFAULT_CAPACITY, ttl),
        }
    }

    fn market_prompt(vehicle: &Vehicle) -> String {
        let region = match vehicle.state() {
            Some(state) => format!("in {state}"),
            None => "in Florida and Georgia".to_string(),
        };
        format!(
            "Analyze the current used car market for a {} with {} miles {region}.\n\n\
             Please provide:\n\
             1. Current market value range (low, average, high)\n\
             2. Market conditions and trends for this vehicle\n\
             3. Regional factors affecting pricing in the Southeast US\n\
             4. Factors that could affect resale value\n\
             5. Comparable recent sales data if available\n\n\
             Focus on actual market data and recent sales, not just book values.",
            vehicle.display_name(),
            vehicle.mileage,
        )
    }

    fn pricing_prompt(vehicle: &Vehicle) -> String {
        format!(
            "Find current market pricing for used {} vehicles with approximately {} miles \
             within 100 miles of Florida and Georgia.\n\n\
             Please provide:\n\
             1. Average selling price in the region\n\
             2. Price range (lowest to highest for similar vehicles)\n\
             3. How long similar vehicles typically stay on the market\n\
             4. Current market trend (increasing, decreasing, or stable prices)\n\
             5. Any recent comparable sales data\n\n\
             Focus on actual listing prices and recent sales, not just estimated values.",
            vehicle.display_name(),
            vehicle.mileage,
        )
    }

    fn cache_key(kind: &str, vehicle: &Vehicle) -> String {
        research_cache_key(
            kind,
            &vehicle.make,
            &vehicle.model,
            vehicle.year,
            vehicle.mileage,
            vehicle.state(),
        )
    }
}

#[async_trait]
impl<C: CompletionClient> MarketResearch for MarketResearcher<C> {
    async fn vehicle_market(&self, vehicle: &Vehicle) -> Result<MarketInsight, ResearchError> {
        let key = Self::cache_key("market", vehicle);
        if let Some(cached) = self.market_cache.get(&key).await {
            info!(vehicle = %vehicle.display_name(), "market insight served from cache");
            return Ok(cached);
        }

        let prompt = Self::market_prompt(vehicle);
        let completion = self.client.complete(&prompt, Some(SYSTEM_PROMPT)).await?;
        let insight = insight::parse_market_insight(&completion.content, &vehicle.display_name());
        self.market_cache.put(key, insight.clone()).await;
        Ok(insight)
    }

    async fn competitive_pricing(
        &self,
        vehicle: &Vehicle,
    ) -> Result<CompetitiveAnalysis, ResearchError> {
        let key = Self::cache_key("pricing", vehicle);
        if let Some(cached) = self.pricing_cache.get(&key).await {
            info!(vehicle = %vehicle.display_name(), "competitive pricing served from cache");
            return Ok(cached);
        }

        let prompt = Self::pricing_prompt(vehicle);
        let completion = self.client.complete(&prompt, Some(SYSTEM_PROMPT)).await?;
        let analysis = insight::parse_competitive_analysis(&completion.content, vehicle.price);
        self.pricing_cache.put(key, analysis.clone()).await;
        Ok(analysis)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct CannedClient {
        content: &'static str,
        calls: AtomicUsize,
    }

    impl CannedClient {
        fn new(content: &'static str) -> Self {
            Self {
                content,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl CompletionClient for CannedClient {
        async fn complete(
            &self,
            _prompt: &str,
            _system_prompt: Option<&str>,
        ) -> Result<Completion, ResearchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Completion {
                content: self.content.to_string(),
                total_tokens: Some(100),
            })
        }
    }

    fn sample_vehicle() -> Vehicle {
        let now = chrono::Utc::now();
        Vehicle {
            id: uuid::Uuid::new_v4(),
            source: "edmunds".to_string(),
            external_id: "ext-1".to_string(),
            make: "Honda".to_string(),
            model: "Civic".to_string(),
            year: 2018,
            mileage: 45_000,
            price: 15_000.0,
            location: None,
            url: String::new(),
            discovered_at: now,
            last_seen_at: now,
            is_active: true,
        }
    }

    #[tokio::test]
    async fn market_insight_is_cached_per_profile() {
        let client = CannedClient::new(
            "The market value ranges from $15,000 to $18,000 with typical price around $16,500. \
             Market conditions show strong demand. Prices are rising according to recent sales.",
        );
        let researcher = MarketResearcher::new(client);
        let vehicle = sample_vehicle();

        let first = researcher.vehicle_market(&vehicle).await.unwrap();
        let second = researcher.vehicle_market(&vehicle).await.unwrap();
        assert_eq!(researcher.client.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.value_range, second.value_range);
        let range = first.value_range.expect("range extracted");
        assert_eq!(range.average(), 16_500.0);
    }

    #[tokio::test]
    async fn pricing_falls_back_to_listed_price() {
        let client = CannedClient::new("No pricing figures to report for this segment.");
        let researcher = MarketResearcher::new(client);
        let vehicle = sample_vehicle();

        let analysis = researcher.competitive_pricing(&vehicle).await.unwrap();
        assert_eq!(analysis.average_market_price, 15_000.0);
    }

    #[test]
    fn prompts_mention_vehicle_and_region() {
        let vehicle = sample_vehicle();
        let prompt = MarketResearcher::<CannedClient>::market_prompt(&vehicle);
        assert!(prompt.contains("2018 Honda Civic"));
        assert!(prompt.contains("in Florida and Georgia"));
    }
}
