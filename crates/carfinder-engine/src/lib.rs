//! Opportunity-scoring pipeline: cost model, scorer, ingestion and the
//! search execution loop that ties them to the store and research layers.

pub mod costs;
pub mod engine;
pub mod scoring;

pub use costs::{acquisition_costs, FeeSchedule, StateFees, TransportParams};
pub use engine::{
    EngineConfig, SearchEngine, SearchExecutionResult, FRESHNESS_WINDOW_HOURS,
    SCORING_BATCH_LIMIT,
};
pub use scoring::{
    confidence_score, degraded_score, profit_potential, recommendation, score_vehicle,
    OpportunityScore, Recommendation, MIN_CONFIDENCE, MIN_PROFIT,
};

pub const CRATE_NAME: &str = "carfinder-engine";
