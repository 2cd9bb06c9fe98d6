//! Document-store contract for vehicles, opportunities, and search bookkeeping.
//!
//! The engine only ever performs single-document inserts and field updates, so
//! the contract is deliberately small: the (source, external_id) uniqueness
//! constraint stands in for any cross-execution locking.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use carfinder_core::{Opportunity, SearchCriteria, Vehicle, VehicleKey};

pub const CRATE_NAME: &str = "carfinder-store";

#[derive(Debug, Error)]
pub enum StoreError {
    /// Uniqueness violation on insert. Callers ingesting listings must treat
    /// this as "already exists", not a failure.
    #[error("duplicate key in {collection}: {key}")]
    DuplicateKey {
        collection: &'static str,
        key: String,
    },
    #[error("no document in {collection} for key {key}")]
    NotFound {
        collection: &'static str,
        key: String,
    },
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl StoreError {
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, StoreError::DuplicateKey { .. })
    }
}

/// Store-level vehicle filter derived from search criteria plus a freshness
/// cutoff. Normalization (title-cased makes/models, upper-cased states)
/// happens here so adapters and criteria can stay case-sloppy.
#[derive(Debug, Clone, Default)]
pub struct VehicleQuery {
    pub makes: Vec<String>,
    pub models: Vec<String>,
    pub year_min: Option<i32>,
    pub year_max: Option<i32>,
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
    pub mileage_max: Option<u32>,
    pub states: Vec<String>,
    pub seen_since: Option<DateTime<Utc>>,
    pub active_only: bool,
}

fn title_case(input: &str) -> String {
    let mut chars = input.trim().chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

impl VehicleQuery {
    pub fn from_criteria(criteria: &SearchCriteria) -> Self {
        Self {
            makes: criteria.makes.iter().map(|m| title_case(m)).collect(),
            models: criteria.models.iter().map(|m| title_case(m)).collect(),
            year_min: criteria.year_min,
            year_max: criteria.year_max,
            price_min: criteria.price_min,
            price_max: criteria.price_max,
            mileage_max: criteria.mileage_max,
            states: criteria
                .locations
                .iter()
                .map(|s| s.trim().to_ascii_uppercase())
                .collect(),
            seen_since: None,
            active_only: true,
        }
    }

    pub fn seen_since(mut self, cutoff: DateTime<Utc>) -> Self {
        self.seen_since = Some(cutoff);
        self
    }

    pub fn matches(&self, vehicle: &Vehicle) -> bool {
        if self.active_only && !vehicle.is_active {
            return false;
        }
        if !self.makes.is_empty() && !self.makes.iter().any(|m| m == &vehicle.make) {
            return false;
        }
        if !self.models.is_empty() && !self.models.iter().any(|m| m == &vehicle.model) {
            return false;
        }
        if self.year_min.is_some_and(|min| vehicle.year < min) {
            return false;
        }
        if self.year_max.is_some_and(|max| vehicle.year > max) {
            return false;
        }
        if self.price_min.is_some_and(|min| vehicle.price < min) {
            return false;
        }
        if self.price_max.is_some_and(|max| vehicle.price > max) {
            return false;
        }
        if self.mileage_max.is_some_and(|max| vehicle.mileage > max) {
            return false;
        }
        if !self.states.is_empty() {
            let Some(state) = vehicle.state() else {
                return false;
            };
            if !self.states.iter().any(|s| s == state) {
                return false;
            }
        }
        if let Some(cutoff) = self.seen_since {
            if vehicle.last_seen_at < cutoff {
                return false;
            }
        }
        true
    }
}

/// Operations the engine consumes from the persistence collaborator.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find_vehicle(&self, key: &VehicleKey) -> Result<Option<Vehicle>, StoreError>;

    /// Inserts a new vehicle. Returns `StoreError::DuplicateKey` when another
    /// document already holds the same (source, external_id).
    async fn insert_vehicle(&self, vehicle: Vehicle) -> Result<Uuid, StoreError>;

    /// Bumps `last_seen_at` for an existing vehicle ("still alive" signal).
    async fn touch_vehicle(
        &self,
        key: &VehicleKey,
        seen_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn find_vehicles(
        &self,
        query: &VehicleQuery,
        limit: usize,
    ) -> Result<Vec<Vehicle>, StoreError>;

    async fn insert_opportunity(&self, opportunity: Opportunity) -> Result<Uuid, StoreError>;

    async fn mark_search_executed(
        &self,
        search_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}

#[derive(Default)]
struct MemoryInner {
    vehicles: HashMap<VehicleKey, Vehicle>,
    opportunities: Vec<Opportunity>,
    search_executions: HashMap<Uuid, DateTime<Utc>>,
}

/// In-memory reference store. Enforces the same uniqueness constraint a real
/// backend index would, so duplicate-insert races behave identically in tests.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn vehicle_count(&self) -> usize {
        self.inner.read().await.vehicles.len()
    }

    pub async fn opportunities(&self) -> Vec<Opportunity> {
        self.inner.read().await.opportunities.clone()
    }

    pub async fn last_executed(&self, search_id: Uuid) -> Option<DateTime<Utc>> {
        self.inner.read().await.search_executions.get(&search_id).copied()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find_vehicle(&self, key: &VehicleKey) -> Result<Option<Vehicle>, StoreError> {
        Ok(self.inner.read().await.vehicles.get(key).cloned())
    }

    async fn insert_vehicle(&self, vehicle: Vehicle) -> Result<Uuid, StoreError> {
        let mut inner = self.inner.write().await;
        let key = vehicle.key();
        if inner.vehicles.contains_key(&key) {
            return Err(StoreError::DuplicateKey {
                collection: "vehicles",
                key: format!("{}:{}", key.source, key.external_id),
            });
        }
        let id = vehicle.id;
        inner.vehicles.insert(key, vehicle);
        Ok(id)
    }

    async fn touch_vehicle(
        &self,
        key: &VehicleKey,
        seen_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        match inner.vehicles.get_mut(key) {
            Some(vehicle) => {
                vehicle.last_seen_at = seen_at;
                Ok(())
            }
            None => Err(StoreError::NotFound {
                collection: "vehicles",
                key: format!("{}:{}", key.source, key.external_id),
            }),
        }
    }

    async fn find_vehicles(
        &self,
        query: &VehicleQuery,
        limit: usize,
    ) -> Result<Vec<Vehicle>, StoreError> {
        let inner = self.inner.read().await;
        let mut matched: Vec<Vehicle> = inner
            .vehicles
            .values()
            .filter(|v| query.matches(v))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.last_seen_at.cmp(&a.last_seen_at));
        matched.truncate(limit);
        Ok(matched)
    }

    async fn insert_opportunity(&self, opportunity: Opportunity) -> Result<Uuid, StoreError> {
        let mut inner = self.inner.write().await;
        if inner.opportunities.iter().any(|o| o.id == opportunity.id) {
            return Err(StoreError::DuplicateKey {
                collection: "opportunities",
                key: opportunity.id.to_string(),
            });
        }
        let id = opportunity.id;
        inner.opportunities.push(opportunity);
        Ok(id)
    }

    async fn mark_search_executed(
        &self,
        search_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .search_executions
            .insert(search_id, at);
        Ok(())
    }
}
