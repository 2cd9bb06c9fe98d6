//! Profit, confidence and recommendation scoring.

use carfinder_core::{
    CompetitiveAnalysis, CostBreakdown, MarketAnalysis, MarketInsight, TrendDirection, Vehicle,
};

/// Materialization gate: both must hold for an opportunity to be persisted.
pub const MIN_PROFIT: f64 = 500.0;
pub const MIN_CONFIDENCE: f64 = 0.3;

/// Coarse action tier derived from profit and confidence. First matching
/// tier wins; the `monitor` tier deliberately asks for more confidence than
/// `consider` at a lower profit bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    StrongBuy,
    Consider,
    Monitor,
    Skip,
}

impl Recommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::StrongBuy => "strong_buy",
            Recommendation::Consider => "consider",
            Recommendation::Monitor => "monitor",
            Recommendation::Skip => "skip",
        }
    }
}

impl std::fmt::Display for Recommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Complete scoring result for one vehicle. Always fully populated, even
/// when research degraded to defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct OpportunityScore {
    pub market_analysis: MarketAnalysis,
    pub cost_breakdown: CostBreakdown,
    pub profit_potential: f64,
    pub confidence_score: f64,
    pub recommendation: Recommendation,
}

impl OpportunityScore {
    pub fn meets_threshold(&self) -> bool {
        self.profit_potential >= MIN_PROFIT && self.confidence_score >= MIN_CONFIDENCE
    }
}

/// Resale estimate resolution order: competitive market average, then the
/// mean of comparable prices, then a conservative 10% markup on the listed
/// price.
fn resale_estimate(vehicle: &Vehicle, analysis: &MarketAnalysis) -> f64 {
    if let Some(average) = analysis.market_average {
        if average > 0.0 {
            return average;
        }
    }
    if !analysis.comparable_prices.is_empty() {
        let sum: f64 = analysis.comparable_prices.iter().sum();
        let mean = sum / analysis.comparable_prices.len() as f64;
        if mean > 0.0 {
            return mean;
        }
    }
    vehicle.price * 1.10
}

pub fn profit_potential(
    vehicle: &Vehicle,
    analysis: &MarketAnalysis,
    costs: &CostBreakdown,
) -> f64 {
    (resale_estimate(vehicle, analysis) - costs.total_cost).max(0.0)
}

pub fn confidence_score(
    vehicle: &Vehicle,
    analysis: &MarketAnalysis,
    competitive: &CompetitiveAnalysis,
    insight: &MarketInsight,
) -> f64 {
    let mut confidence = insight.confidence_score * 0.4;

    let mut data_quality = 0.0;
    if vehicle.mileage > 0 {
        data_quality += 0.2;
    }
    if vehicle.year > 2000 {
        data_quality += 0.2;
    }
    if vehicle.state().is_some() {
        data_quality += 0.2;
    }
    confidence += data_quality * 0.3;

    confidence += match competitive.market_trend {
        TrendDirection::Rising | TrendDirection::Stable => 0.2,
        TrendDirection::Falling => 0.05,
        TrendDirection::Unknown => 0.0,
    };

    if let Some(average) = analysis.market_average {
        if average > 0.0 {
            let price_ratio = vehicle.price / average;
            if (0.7..=1.0).contains(&price_ratio) {
                confidence += 0.1;
            }
        }
    }

    confidence.min(1.0)
}

pub fn recommendation(profit: f64, confidence: f64) -> Recommendation {
    if profit >= 2000.0 && confidence >= 0.7 {
        Recommendation::StrongBuy
    } else if profit >= 1000.0 && confidence >= 0.5 {
        Recommendation::Consider
    } else if profit >= 500.0 && confidence >= 0.6 {
        Recommendation::Monitor
    } else {
        Recommendation::Skip
    }
}

/// Scores a vehicle from already-resolved research inputs. Pure; callers
/// decide how to obtain (or degrade) the research.
pub fn score_vehicle(
    vehicle: &Vehicle,
    insight: MarketInsight,
    competitive: CompetitiveAnalysis,
    costs: CostBreakdown,
) -> OpportunityScore {
    let analysis = MarketAnalysis {
        comparable_prices: vec![competitive.average_market_price],
        market_average: Some(competitive.average_market_price),
        insight: None,
    };

    let profit = profit_potential(vehicle, &analysis, &costs);
    let confidence = confidence_score(vehicle, &analysis, &competitive, &insight);

    OpportunityScore {
        recommendation: recommendation(profit, confidence),
        market_analysis: MarketAnalysis {
            insight: Some(insight),
            ..analysis
        },
        cost_breakdown: costs,
        profit_potential: profit,
        confidence_score: confidence,
    }
}

/// Degraded score used when research fails: zero profit, zero confidence,
/// skip. The market analysis is anchored to the fallback competitive
/// estimate and the cost breakdown is still real, so the record stays
/// inspectable.
pub fn degraded_score(vehicle: &Vehicle, costs: CostBreakdown, reason: &str) -> OpportunityScore {
    let fallback = CompetitiveAnalysis::fallback_for_price(vehicle.price);
    OpportunityScore {
        market_analysis: MarketAnalysis {
            comparable_prices: vec![fallback.average_market_price],
            market_average: Some(fallback.average_market_price),
            insight: Some(MarketInsight::unavailable(vehicle.display_name(), reason)),
        },
        cost_breakdown: costs,
        profit_potential: 0.0,
        confidence_score: 0.0,
        recommendation: Recommendation::Skip,
    }
}
