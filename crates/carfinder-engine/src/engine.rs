//! Search execution: ingest scraped listings, score fresh vehicles,
//! materialize opportunities.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use carfinder_adapters::ScrapeOutcome;
use carfinder_core::{Opportunity, OpportunityStatus, Search, Vehicle};
use carfinder_research::MarketResearch;
use carfinder_store::{DocumentStore, StoreError, VehicleQuery};

use crate::costs::{acquisition_costs, FeeSchedule, TransportParams};
use crate::scoring::{degraded_score, score_vehicle, OpportunityScore};

/// Only vehicles seen within this window are scored. Stale listings wait for
/// the next sighting.
pub const FRESHNESS_WINDOW_HOURS: i64 = 24;

/// Scoring cap per execution, bounding research spend.
pub const SCORING_BATCH_LIMIT: usize = 50;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub freshness_window_hours: i64,
    pub scoring_batch_limit: usize,
    pub fee_schedule: FeeSchedule,
    pub transport: TransportParams,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            freshness_window_hours: FRESHNESS_WINDOW_HOURS,
            scoring_batch_limit: SCORING_BATCH_LIMIT,
            fee_schedule: FeeSchedule::default(),
            transport: TransportParams::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(hours) = std::env::var("CARFINDER_FRESHNESS_HOURS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.freshness_window_hours = hours;
        }
        if let Some(limit) = std::env::var("CARFINDER_SCORING_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.scoring_batch_limit = limit;
        }
        config
    }
}

/// Summary returned by every execution, success or not. Failures are
/// reported here rather than raised past the engine boundary.
#[derive(Debug, Clone)]
pub struct SearchExecutionResult {
    pub search_id: Uuid,
    pub vehicles_found: usize,
    pub opportunities_created: usize,
    pub execution_time: std::time::Duration,
    pub success: bool,
    pub error_message: Option<String>,
}

pub struct SearchEngine {
    store: Arc<dyn DocumentStore>,
    research: Arc<dyn MarketResearch>,
    config: EngineConfig,
}

impl SearchEngine {
    pub fn new(store: Arc<dyn DocumentStore>, research: Arc<dyn MarketResearch>) -> Self {
        Self::with_config(store, research, EngineConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn DocumentStore>,
        research: Arc<dyn MarketResearch>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            research,
            config,
        }
    }

    /// Runs one full execution of a search against pre-fetched scrape
    /// outcomes. Always returns a summary; store failures flip the success
    /// flag instead of propagating.
    pub async fn execute_search(
        &self,
        search: &Search,
        outcomes: &[ScrapeOutcome],
    ) -> SearchExecutionResult {
        let started = std::time::Instant::now();
        info!(search = %search.name, "executing search");

        match self.run(search, outcomes).await {
            Ok((vehicles_found, opportunities_created)) => {
                info!(
                    vehicles_found,
                    opportunities_created, "search completed"
                );
                SearchExecutionResult {
                    search_id: search.id,
                    vehicles_found,
                    opportunities_created,
                    execution_time: started.elapsed(),
                    success: true,
                    error_message: None,
                }
            }
            Err(error) => {
                warn!(%error, "search execution failed");
                SearchExecutionResult {
                    search_id: search.id,
                    vehicles_found: 0,
                    opportunities_created: 0,
                    execution_time: started.elapsed(),
                    success: false,
                    error_message: Some(error.to_string()),
                }
            }
        }
    }

    async fn run(
        &self,
        search: &Search,
        outcomes: &[ScrapeOutcome],
    ) -> Result<(usize, usize), StoreError> {
        let vehicles_found = self.ingest(outcomes).await?;
        let opportunities_created = self.materialize_opportunities(search).await?;
        self.store.mark_search_executed(search.id, Utc::now()).await?;
        Ok((vehicles_found, opportunities_created))
    }

    /// Merges scraped listings into the vehicle set. Returns the number of
    /// newly created vehicles; re-sightings only bump freshness.
    pub async fn ingest(&self, outcomes: &[ScrapeOutcome]) -> Result<usize, StoreError> {
        let mut created = 0usize;

        for outcome in outcomes {
            if !outcome.success {
                warn!(
                    source = %outcome.source,
                    error = outcome.error_message.as_deref().unwrap_or("unknown"),
                    "skipping failed scrape outcome"
                );
                continue;
            }

            for listing in &outcome.listings {
                let now = Utc::now();
                let vehicle = match listing.clone().into_vehicle(now) {
                    Ok(vehicle) => vehicle,
                    Err(defect) => {
                        warn!(%defect, "dropping malformed listing");
                        continue;
                    }
                };

                let key = vehicle.key();
                if self.store.find_vehicle(&key).await?.is_some() {
                    self.store.touch_vehicle(&key, now).await?;
                    continue;
                }

                // The find-then-insert pair is not atomic; a concurrent
                // execution may have inserted the same key in between.
                match self.store.insert_vehicle(vehicle).await {
                    Ok(_) => created += 1,
                    Err(error) if error.is_duplicate_key() => {
                        self.store.touch_vehicle(&key, now).await?;
                    }
                    Err(error) => return Err(error),
                }
            }
        }

        Ok(created)
    }

    /// Scores freshly seen vehicles matching the search and persists the
    /// qualifying ones.
    async fn materialize_opportunities(&self, search: &Search) -> Result<usize, StoreError> {
        let cutoff = Utc::now() - Duration::hours(self.config.freshness_window_hours);
        let query = VehicleQuery::from_criteria(&search.criteria).seen_since(cutoff);
        let vehicles = self
            .store
            .find_vehicles(&query, self.config.scoring_batch_limit)
            .await?;

        let mut created = 0usize;
        for vehicle in &vehicles {
            let score = self.score(vehicle).await;
            if !score.meets_threshold() {
                continue;
            }

            let opportunity = Opportunity {
                id: Uuid::new_v4(),
                vehicle_id: vehicle.id,
                search_id: search.id,
                market_analysis: score.market_analysis,
                cost_breakdown: score.cost_breakdown,
                projected_profit: score.profit_potential,
                confidence_score: score.confidence_score,
                status: OpportunityStatus::New,
                created_at: Utc::now(),
            };

            match self.store.insert_opportunity(opportunity).await {
                Ok(_) => {
                    info!(
                        vehicle = %vehicle.display_name(),
                        profit = score.profit_potential,
                        confidence = score.confidence_score,
                        "created opportunity"
                    );
                    created += 1;
                }
                Err(error) if error.is_duplicate_key() => {}
                Err(error) => return Err(error),
            }
        }

        Ok(created)
    }

    /// Scores a single vehicle. Research failures degrade to a skip-tier
    /// score at this boundary; scoring itself never fails.
    pub async fn score(&self, vehicle: &Vehicle) -> OpportunityScore {
        let costs = acquisition_costs(vehicle, &self.config.fee_schedule, &self.config.transport);

        let insight = match self.research.vehicle_market(vehicle).await {
            Ok(insight) => insight,
            Err(error) => {
                warn!(vehicle = %vehicle.display_name(), %error, "market research failed");
                return degraded_score(vehicle, costs, &error.to_string());
            }
        };

        let competitive = match self.research.competitive_pricing(vehicle).await {
            Ok(competitive) => competitive,
            Err(error) => {
                warn!(vehicle = %vehicle.display_name(), %error, "competitive pricing failed");
                return degraded_score(vehicle, costs, &error.to_string());
            }
        };

        score_vehicle(vehicle, insight, competitive, costs)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use carfinder_core::{
        CompetitiveAnalysis, MarketInsight, PriceRange, RawListing, SearchCriteria,
        TrendDirection, VehicleLocation,
    };
    use carfinder_research::ResearchError;
    use carfinder_store::MemoryStore;

    use super::*;

    struct FixedResearch {
        average_price: f64,
        confidence: f64,
    }

    #[async_trait]
    impl MarketResearch for FixedResearch {
        async fn vehicle_market(&self, vehicle: &Vehicle) -> Result<MarketInsight, ResearchError> {
            Ok(MarketInsight {
                vehicle_info: vehicle.display_name(),
                value_range: Some(PriceRange::around(self.average_price, 0.10)),
                market_conditions: "steady demand".to_string(),
                regional_factors: Vec::new(),
                confidence_score: self.confidence,
                sources: Vec::new(),
                analyzed_at: Utc::now(),
            })
        }

        async fn competitive_pricing(
            &self,
            _vehicle: &Vehicle,
        ) -> Result<CompetitiveAnalysis, ResearchError> {
            Ok(CompetitiveAnalysis {
                average_market_price: self.average_price,
                price_range: PriceRange::around(self.average_price, 0.10),
                market_trend: TrendDirection::Stable,
                days_on_market_avg: Some(30),
            })
        }
    }

    struct FailingResearch;

    #[async_trait]
    impl MarketResearch for FailingResearch {
        async fn vehicle_market(&self, _: &Vehicle) -> Result<MarketInsight, ResearchError> {
            Err(ResearchError::EmptyCompletion)
        }

        async fn competitive_pricing(
            &self,
            _: &Vehicle,
        ) -> Result<CompetitiveAnalysis, ResearchError> {
            Err(ResearchError::EmptyCompletion)
        }
    }

    fn listing(source: &str, external_id: &str, price: f64) -> RawListing {
        RawListing {
            source: source.to_string(),
            external_id: Some(external_id.to_string()),
            make: Some("Toyota".to_string()),
            model: Some("Camry".to_string()),
            year: Some(2018),
            mileage: Some(60_000),
            price: Some(price),
            location: Some(VehicleLocation {
                city: "Tampa".to_string(),
                state: "FL".to_string(),
                coordinates: Vec::new(),
            }),
            url: None,
        }
    }

    fn engine_with(
        store: Arc<MemoryStore>,
        research: Arc<dyn MarketResearch>,
    ) -> SearchEngine {
        SearchEngine::new(store, research)
    }

    #[tokio::test]
    async fn reingesting_same_key_keeps_one_vehicle_and_original_price() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine_with(store.clone(), Arc::new(FailingResearch));

        let first = vec![ScrapeOutcome::ok(
            "cars.com",
            vec![listing("cars.com", "X123", 12_000.0)],
        )];
        let second = vec![ScrapeOutcome::ok(
            "cars.com",
            vec![listing("cars.com", "X123", 11_500.0)],
        )];

        assert_eq!(engine.ingest(&first).await.unwrap(), 1);
        assert_eq!(engine.ingest(&second).await.unwrap(), 0);

        assert_eq!(store.vehicle_count().await, 1);
        let key = carfinder_core::VehicleKey::new("cars.com", "X123");
        let stored = store.find_vehicle(&key).await.unwrap().unwrap();
        assert_eq!(stored.price, 12_000.0);
        assert!(stored.last_seen_at >= stored.discovered_at);
    }

    #[tokio::test]
    async fn malformed_listings_are_dropped_not_fatal() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine_with(store.clone(), Arc::new(FailingResearch));

        let mut no_price = listing("edmunds", "A1", 10_000.0);
        no_price.price = None;
        let outcomes = vec![ScrapeOutcome::ok(
            "edmunds",
            vec![no_price, listing("edmunds", "A2", 10_000.0)],
        )];

        assert_eq!(engine.ingest(&outcomes).await.unwrap(), 1);
        assert_eq!(store.vehicle_count().await, 1);
    }

    #[tokio::test]
    async fn failed_scrape_outcome_is_skipped() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine_with(store.clone(), Arc::new(FailingResearch));

        let outcomes = vec![ScrapeOutcome::failed("cargurus", "upstream timeout")];
        assert_eq!(engine.ingest(&outcomes).await.unwrap(), 0);
        assert_eq!(store.vehicle_count().await, 0);
    }

    #[tokio::test]
    async fn qualifying_vehicle_materializes_an_opportunity() {
        let store = Arc::new(MemoryStore::new());
        // Resale 16000 against roughly 13350 total cost clears the profit
        // gate; stable trend plus full data quality clears confidence.
        let research = Arc::new(FixedResearch {
            average_price: 16_000.0,
            confidence: 0.8,
        });
        let engine = engine_with(store.clone(), research);

        let search = Search::new("fl-camrys", SearchCriteria::default());
        let outcomes = vec![ScrapeOutcome::ok(
            "cars.com",
            vec![listing("cars.com", "X123", 12_000.0)],
        )];

        let result = engine.execute_search(&search, &outcomes).await;
        assert!(result.success);
        assert_eq!(result.vehicles_found, 1);
        assert_eq!(result.opportunities_created, 1);

        let opportunities = store.opportunities().await;
        assert_eq!(opportunities.len(), 1);
        let opportunity = &opportunities[0];
        assert_eq!(opportunity.status, OpportunityStatus::New);
        assert_eq!(opportunity.search_id, search.id);
        assert!(opportunity.projected_profit >= 500.0);
        assert!(opportunity.confidence_score >= 0.3);
        assert!(store.last_executed(search.id).await.is_some());
    }

    #[tokio::test]
    async fn below_profit_gate_creates_nothing() {
        let store = Arc::new(MemoryStore::new());
        // Market average barely above acquisition cost: profit under 500.
        let research = Arc::new(FixedResearch {
            average_price: 13_500.0,
            confidence: 0.8,
        });
        let engine = engine_with(store.clone(), research);

        let search = Search::new("fl-camrys", SearchCriteria::default());
        let outcomes = vec![ScrapeOutcome::ok(
            "cars.com",
            vec![listing("cars.com", "X123", 12_000.0)],
        )];

        let result = engine.execute_search(&search, &outcomes).await;
        assert!(result.success);
        assert_eq!(result.opportunities_created, 0);
        assert!(store.opportunities().await.is_empty());
    }

    #[tokio::test]
    async fn research_failure_degrades_to_skip_not_error() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine_with(store.clone(), Arc::new(FailingResearch));

        let search = Search::new("fl-camrys", SearchCriteria::default());
        let outcomes = vec![ScrapeOutcome::ok(
            "cars.com",
            vec![listing("cars.com", "X123", 12_000.0)],
        )];

        let result = engine.execute_search(&search, &outcomes).await;
        assert!(result.success);
        assert_eq!(result.vehicles_found, 1);
        assert_eq!(result.opportunities_created, 0);
    }

    #[tokio::test]
    async fn repeated_executions_append_opportunities() {
        let store = Arc::new(MemoryStore::new());
        let research = Arc::new(FixedResearch {
            average_price: 16_000.0,
            confidence: 0.8,
        });
        let engine = engine_with(store.clone(), research);

        let search = Search::new("fl-camrys", SearchCriteria::default());
        let outcomes = vec![ScrapeOutcome::ok(
            "cars.com",
            vec![listing("cars.com", "X123", 12_000.0)],
        )];

        engine.execute_search(&search, &outcomes).await;
        engine.execute_search(&search, &outcomes).await;

        // One vehicle, but each qualifying run records its own opportunity.
        assert_eq!(store.vehicle_count().await, 1);
        assert_eq!(store.opportunities().await.len(), 2);
    }
}
