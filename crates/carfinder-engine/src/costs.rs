//! Jurisdiction-aware acquisition cost model.
//!
//! Pure arithmetic over the vehicle and a fee table. No I/O, no clock, no
//! randomness, so the same vehicle always prices out identically.

use carfinder_core::{CostBreakdown, Vehicle};

/// Per-state sales tax rate and fixed fees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateFees {
    pub tax_rate: f64,
    pub title_fee: f64,
    pub registration_fee: f64,
}

/// Fee schedule for the states the finder operates in. Vehicles from an
/// unlisted or unknown state price out under the default jurisdiction.
#[derive(Debug, Clone, PartialEq)]
pub struct FeeSchedule {
    entries: Vec<(&'static str, StateFees)>,
    default_fees: StateFees,
}

impl FeeSchedule {
    pub fn lookup(&self, state: Option<&str>) -> StateFees {
        state
            .and_then(|state| {
                self.entries
                    .iter()
                    .find(|(code, _)| code.eq_ignore_ascii_case(state))
                    .map(|(_, fees)| *fees)
            })
            .unwrap_or(self.default_fees)
    }
}

impl Default for FeeSchedule {
    fn default() -> Self {
        let florida = StateFees {
            tax_rate: 0.06,
            title_fee: 77.25,
            registration_fee: 225.0,
        };
        let georgia = StateFees {
            tax_rate: 0.04,
            title_fee: 18.0,
            registration_fee: 20.0,
        };
        Self {
            entries: vec![("FL", florida), ("GA", georgia)],
            default_fees: florida,
        }
    }
}

/// Transport pricing. Without geodata only the base fee applies; with a
/// known location a fixed average distance is assumed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransportParams {
    pub base_fee: f64,
    pub cost_per_mile: f64,
    pub assumed_distance_miles: f64,
}

impl Default for TransportParams {
    fn default() -> Self {
        Self {
            base_fee: 200.0,
            cost_per_mile: 0.65,
            assumed_distance_miles: 200.0,
        }
    }
}

pub fn acquisition_costs(
    vehicle: &Vehicle,
    schedule: &FeeSchedule,
    transport: &TransportParams,
) -> CostBreakdown {
    let fees = schedule.lookup(vehicle.state());
    let purchase_price = vehicle.price;
    let sales_tax = purchase_price * fees.tax_rate;

    let transportation_cost = if vehicle.location.is_some() {
        transport.base_fee + transport.assumed_distance_miles * transport.cost_per_mile
    } else {
        transport.base_fee
    };

    let total_cost =
        purchase_price + sales_tax + fees.title_fee + fees.registration_fee + transportation_cost;

    CostBreakdown {
        purchase_price,
        sales_tax,
        title_fee: fees.title_fee,
        registration_fee: fees.registration_fee,
        transportation_cost,
        total_cost,
    }
}
