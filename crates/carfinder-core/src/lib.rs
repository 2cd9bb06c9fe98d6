//! Core domain model for the vehicle arbitrage finder.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub const CRATE_NAME: &str = "carfinder-core";

/// Dedup identity of a listing. Exactly one persisted vehicle may exist per
/// (source marketplace, external listing id) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VehicleKey {
    pub source: String,
    pub external_id: String,
}

impl VehicleKey {
    pub fn new(source: impl Into<String>, external_id: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            external_id: external_id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleLocation {
    pub city: String,
    pub state: String,
    /// `[longitude, latitude]`; empty when the listing carried no geodata.
    #[serde(default)]
    pub coordinates: Vec<f64>,
}

/// Canonical persisted vehicle. Created on first sighting; re-sightings only
/// bump `last_seen_at`. Never deleted, only deactivated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: Uuid,
    pub source: String,
    pub external_id: String,
    pub make: String,
    pub model: String,
    pub year: i32,
    pub mileage: u32,
    pub price: f64,
    pub location: Option<VehicleLocation>,
    pub url: String,
    pub discovered_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub is_active: bool,
}

impl Vehicle {
    pub fn key(&self) -> VehicleKey {
        VehicleKey::new(self.source.clone(), self.external_id.clone())
    }

    /// Human-readable label used in prompts and logs, e.g. "2018 Honda Civic".
    pub fn display_name(&self) -> String {
        format!("{} {} {}", self.year, self.make, self.model)
    }

    pub fn state(&self) -> Option<&str> {
        self.location.as_ref().map(|l| l.state.as_str())
    }
}

/// Immutable description of a desired vehicle profile, owned by a [`Search`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchCriteria {
    #[serde(default)]
    pub makes: Vec<String>,
    #[serde(default)]
    pub models: Vec<String>,
    pub year_min: Option<i32>,
    pub year_max: Option<i32>,
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
    pub mileage_max: Option<u32>,
    /// Target states, e.g. `["FL", "GA"]`.
    #[serde(default)]
    pub locations: Vec<String>,
}

impl Default for SearchCriteria {
    fn default() -> Self {
        Self {
            makes: Vec::new(),
            models: Vec::new(),
            year_min: Some(2010),
            year_max: Some(2023),
            price_min: Some(5000.0),
            price_max: Some(50_000.0),
            mileage_max: Some(150_000),
            locations: Vec::new(),
        }
    }
}

/// A saved search configuration. Scheduling of executions lives outside this
/// workspace; only `last_executed` bookkeeping is done here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Search {
    pub id: Uuid,
    pub name: String,
    pub criteria: SearchCriteria,
    pub is_active: bool,
    pub last_executed: Option<DateTime<Utc>>,
}

impl Search {
    pub fn new(name: impl Into<String>, criteria: SearchCriteria) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            criteria,
            is_active: true,
            last_executed: None,
        }
    }
}

/// Categorical market trend extracted from analyst commentary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Rising,
    Falling,
    Stable,
    #[default]
    Unknown,
}

impl TrendDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendDirection::Rising => "rising",
            TrendDirection::Falling => "falling",
            TrendDirection::Stable => "stable",
            TrendDirection::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `min..max` dollar range with a derived midpoint average.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceRange {
    pub min: f64,
    pub max: f64,
}

impl PriceRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Symmetric range around a central value, `spread` as a fraction of it.
    pub fn around(center: f64, spread: f64) -> Self {
        Self {
            min: center * (1.0 - spread),
            max: center * (1.0 + spread),
        }
    }

    pub fn average(&self) -> f64 {
        (self.min + self.max) / 2.0
    }
}

/// Structured signals extracted from one free-text market-analysis response.
/// Every field is best-effort; absent signals keep their documented defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketInsight {
    pub vehicle_info: String,
    pub value_range: Option<PriceRange>,
    pub market_conditions: String,
    pub regional_factors: Vec<String>,
    /// Heuristic trust in the commentary itself, clamped to [0, 1].
    pub confidence_score: f64,
    pub sources: Vec<String>,
    pub analyzed_at: DateTime<Utc>,
}

impl MarketInsight {
    /// Zero-confidence placeholder used when research is unavailable.
    pub fn unavailable(vehicle_info: impl Into<String>, reason: &str) -> Self {
        Self {
            vehicle_info: vehicle_info.into(),
            value_range: None,
            market_conditions: format!("Analysis unavailable: {reason}"),
            regional_factors: Vec::new(),
            confidence_score: 0.0,
            sources: Vec::new(),
            analyzed_at: Utc::now(),
        }
    }
}

/// Competitive pricing snapshot for comparable listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetitiveAnalysis {
    pub average_market_price: f64,
    pub price_range: PriceRange,
    pub market_trend: TrendDirection,
    pub days_on_market_avg: Option<u32>,
}

impl CompetitiveAnalysis {
    /// Degraded analysis anchored to the listed price (±10%), used when the
    /// competitive-pricing query fails or parses to nothing.
    pub fn fallback_for_price(listed_price: f64) -> Self {
        Self {
            average_market_price: listed_price,
            price_range: PriceRange::around(listed_price, 0.10),
            market_trend: TrendDirection::Unknown,
            days_on_market_avg: None,
        }
    }
}

/// Market analysis embedded into an [`Opportunity`]. Derived per scoring run,
/// never persisted independently.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MarketAnalysis {
    pub comparable_prices: Vec<f64>,
    pub market_average: Option<f64>,
    pub insight: Option<MarketInsight>,
}

/// Full acquisition cost for a vehicle in a given jurisdiction. Deterministic
/// given vehicle + fee table; recomputed each scoring pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub purchase_price: f64,
    pub sales_tax: f64,
    pub title_fee: f64,
    pub registration_fee: f64,
    pub transportation_cost: f64,
    pub total_cost: f64,
}

/// Opportunity lifecycle: `new -> alerted -> viewed` or `new -> dismissed`.
/// Transitions past `new` are driven by the alerting/UI layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpportunityStatus {
    #[default]
    New,
    Alerted,
    Viewed,
    Dismissed,
}

/// A scored arbitrage opportunity persisted for alerting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub id: Uuid,
    pub vehicle_id: Uuid,
    pub search_id: Uuid,
    pub market_analysis: MarketAnalysis,
    pub cost_breakdown: CostBreakdown,
    /// Projected resale profit, floored at 0.
    pub projected_profit: f64,
    /// Clamped to [0, 1].
    pub confidence_score: f64,
    pub status: OpportunityStatus,
    pub created_at: DateTime<Utc>,
}

/// Pre-validation handoff record from a scraping adapter. Required fields are
/// enumerated by [`RawListing::validate`]; everything else is optional and
/// defaulted when the listing is promoted to a [`Vehicle`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawListing {
    pub source: String,
    pub external_id: Option<String>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub year: Option<i32>,
    pub mileage: Option<u32>,
    pub price: Option<f64>,
    pub location: Option<VehicleLocation>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ListingDefect {
    #[error("listing from {marketplace} has no price")]
    MissingPrice { marketplace: String },
    #[error("listing from {marketplace} has no year")]
    MissingYear { marketplace: String },
    #[error("listing from {marketplace} has no make")]
    MissingMake { marketplace: String },
    #[error("listing from {marketplace} has no external id")]
    MissingExternalId { marketplace: String },
}

impl RawListing {
    /// Checks the mandatory fields (price, year, make, external id). Records
    /// failing this are dropped from the batch, not errors.
    pub fn validate(&self) -> Result<(), ListingDefect> {
        let marketplace = self.source.clone();
        if self.price.is_none() {
            return Err(ListingDefect::MissingPrice { marketplace });
        }
        if self.year.is_none() {
            return Err(ListingDefect::MissingYear { marketplace });
        }
        if self.make.as_deref().map(str::trim).unwrap_or("").is_empty() {
            return Err(ListingDefect::MissingMake { marketplace });
        }
        if self
            .external_id
            .as_deref()
            .map(str::trim)
            .unwrap_or("")
            .is_empty()
        {
            return Err(ListingDefect::MissingExternalId { marketplace });
        }
        Ok(())
    }

    pub fn key(&self) -> Option<VehicleKey> {
        self.external_id
            .as_deref()
            .map(|id| VehicleKey::new(self.source.clone(), id))
    }

    /// Promotes a validated listing to a fresh active vehicle.
    pub fn into_vehicle(self, now: DateTime<Utc>) -> Result<Vehicle, ListingDefect> {
        self.validate()?;
        let (Some(external_id), Some(make), Some(year), Some(price)) =
            (self.external_id, self.make, self.year, self.price)
        else {
            // Unreachable after validate, kept total instead of panicking.
            return Err(ListingDefect::MissingExternalId {
                marketplace: self.source,
            });
        };
        Ok(Vehicle {
            id: Uuid::new_v4(),
            external_id,
            make,
            model: self.model.unwrap_or_else(|| "Unknown".to_string()),
            year,
            mileage: self.mileage.unwrap_or(0),
            price,
            location: self.location,
            url: self.url.unwrap_or_default(),
            source: self.source,
            discovered_at: now,
            last_seen_at: now,
            is_active: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing() -> RawListing {
        RawListing {
            source: "cars_com".into(),
            external_id: Some("X123".into()),
            make: Some("Honda".into()),
            model: Some("Civic".into()),
            year: Some(2018),
            mileage: Some(45_000),
            price: Some(15_500.0),
            location: None,
            url: Some("https://example.com/x123".into()),
        }
    }

    #[test]
    fn price_range_average_is_midpoint() {
        assert_eq!(PriceRange::new(15_000.0, 18_000.0).average(), 16_500.0);
    }

    #[test]
    fn listing_missing_price_is_rejected() {
        let mut raw = listing();
        raw.price = None;
        assert!(matches!(
            raw.validate(),
            Err(ListingDefect::MissingPrice { .. })
        ));
    }

    #[test]
    fn listing_defect_names_the_marketplace() {
        let mut raw = listing();
        raw.price = None;
        let defect = raw.validate().unwrap_err();
        assert_eq!(defect.to_string(), "listing from cars_com has no price");
        // Defects carry no underlying cause; the marketplace is plain data.
        assert!(std::error::Error::source(&defect).is_none());
    }

    #[test]
    fn listing_blank_make_is_rejected() {
        let mut raw = listing();
        raw.make = Some("  ".into());
        assert!(matches!(
            raw.validate(),
            Err(ListingDefect::MissingMake { .. })
        ));
    }

    #[test]
    fn promoted_vehicle_defaults_optional_fields() {
        let mut raw = listing();
        raw.model = None;
        raw.mileage = None;
        let now = Utc::now();
        let vehicle = raw.into_vehicle(now).unwrap();
        assert_eq!(vehicle.model, "Unknown");
        assert_eq!(vehicle.mileage, 0);
        assert_eq!(vehicle.discovered_at, vehicle.last_seen_at);
        assert!(vehicle.is_active);
    }

    #[test]
    fn fallback_competitive_analysis_brackets_listed_price() {
        let fallback = CompetitiveAnalysis::fallback_for_price(10_000.0);
        assert_eq!(fallback.average_market_price, 10_000.0);
        assert_eq!(fallback.price_range.min, 9_000.0);
        assert_eq!(fallback.price_range.max, 11_000.0);
        assert_eq!(fallback.market_trend, TrendDirection::Unknown);
    }
}
