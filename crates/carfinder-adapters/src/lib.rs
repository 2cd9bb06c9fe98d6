//! Marketplace adapter contracts + text-content listing extractors.
//!
//! Each adapter knows how to build a search URL for its marketplace and how
//! to pull candidate listings out of scraped page text. Extraction is best
//! effort; anything a listing block does not yield stays `None` on the
//! [`RawListing`] and is judged later by validation.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use carfinder_core::{RawListing, SearchCriteria, VehicleLocation};

pub const CRATE_NAME: &str = "carfinder-adapters";

static RE_PRICE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$([0-9,]+)").unwrap());
static RE_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(20\d{2}|19\d{2})\b").unwrap());
static RE_MILEAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)([0-9,]+)\s*(?:mi|miles)\b").unwrap());
static RE_LOCATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Za-z]+(?: [A-Za-z]+)*),\s*([A-Z]{2})\b").unwrap());

const KNOWN_MAKES: &[&str] = &[
    "toyota",
    "honda",
    "ford",
    "chevrolet",
    "chevy",
    "nissan",
    "hyundai",
    "kia",
    "bmw",
    "mercedes",
    "audi",
    "volkswagen",
    "vw",
    "mazda",
    "subaru",
    "lexus",
    "acura",
    "infiniti",
    "volvo",
    "jeep",
    "dodge",
    "chrysler",
    "cadillac",
    "buick",
    "gmc",
    "lincoln",
    "mitsubishi",
    "isuzu",
];

// Listing blocks without any of these are skipped without parsing.
const LISTING_HINTS: &[&str] = &["$", "mile", "year", "mpg"];

/// One scrape pass against a single marketplace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeOutcome {
    pub source: String,
    pub listings: Vec<RawListing>,
    pub total_found: usize,
    pub success: bool,
    pub error_message: Option<String>,
}

impl ScrapeOutcome {
    pub fn ok(source: impl Into<String>, listings: Vec<RawListing>) -> Self {
        let total_found = listings.len();
        Self {
            source: source.into(),
            listings,
            total_found,
            success: true,
            error_message: None,
        }
    }

    pub fn failed(source: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            listings: Vec::new(),
            total_found: 0,
            success: false,
            error_message: Some(error.into()),
        }
    }
}

/// Marketplace-specific knowledge: where to search and how to read results.
pub trait MarketplaceAdapter: Send + Sync {
    fn source_id(&self) -> &'static str;

    /// Search page URL for the given criteria and an optional location zip.
    fn search_url(&self, criteria: &SearchCriteria, location_zip: Option<&str>) -> String;

    /// Pulls candidate listings out of scraped page text.
    fn extract_listings(&self, content: &str) -> Vec<RawListing>;
}

struct UrlParams {
    make: &'static str,
    model: &'static str,
    year_min: &'static str,
    year_max: &'static str,
    price_min: &'static str,
    price_max: &'static str,
    location: &'static str,
}

fn build_search_url(
    base_url: &str,
    params: &UrlParams,
    extra: &[&str],
    criteria: &SearchCriteria,
    location_zip: Option<&str>,
) -> String {
    let mut query = Vec::new();
    for make in &criteria.makes {
        query.push(format!("{}={}", params.make, make.to_lowercase()));
    }
    for model in &criteria.models {
        query.push(format!("{}={}", params.model, model.to_lowercase()));
    }
    if let Some(year_min) = criteria.year_min {
        query.push(format!("{}={year_min}", params.year_min));
    }
    if let Some(year_max) = criteria.year_max {
        query.push(format!("{}={year_max}", params.year_max));
    }
    if let Some(price_min) = criteria.price_min {
        query.push(format!("{}={}", params.price_min, price_min as i64));
    }
    if let Some(price_max) = criteria.price_max {
        query.push(format!("{}={}", params.price_max, price_max as i64));
    }
    if let Some(zip) = location_zip {
        query.push(format!("{}={zip}", params.location));
    }
    for extra_param in extra {
        query.push((*extra_param).to_string());
    }
    format!("{base_url}?{}", query.join("&"))
}

/// Stable listing identity for sources whose pages carry no listing id.
/// Derived from the extracted attributes so a re-scrape of the same listing
/// maps to the same vehicle.
pub fn synthesize_external_id(
    source: &str,
    make: &str,
    model: &str,
    year: i32,
    price: f64,
) -> String {
    let seed = format!("{source}:{make}:{model}:{year}:{price}");
    Uuid::new_v5(&Uuid::NAMESPACE_URL, seed.as_bytes()).to_string()
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn extract_make_model(text: &str) -> (Option<String>, Option<String>) {
    let text_lower = text.to_lowercase();
    for make in KNOWN_MAKES {
        if let Some(idx) = text_lower.find(make) {
            let model = text_lower[idx + make.len()..]
                .split_whitespace()
                .next()
                .map(|word| {
                    word.chars()
                        .take_while(|c| c.is_alphanumeric())
                        .collect::<String>()
                })
                .filter(|word| !word.is_empty())
                .map(|word| title_case(&word));
            return (Some(title_case(make)), model);
        }
    }
    (None, None)
}

fn extract_location(text: &str) -> Option<VehicleLocation> {
    RE_LOCATION.captures(text).map(|caps| VehicleLocation {
        city: caps[1].trim().to_string(),
        state: caps[2].trim().to_string(),
        coordinates: Vec::new(),
    })
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.replace(',', "").parse().ok()
}

/// Parses one blank-line-delimited listing block. Returns `None` when the
/// block yields none of price, year or make, meaning it was page chrome
/// rather than a listing.
fn parse_listing_block(source: &str, text: &str) -> Option<RawListing> {
    let price = RE_PRICE
        .captures(text)
        .and_then(|caps| parse_number(&caps[1]));
    let year = RE_YEAR
        .captures(text)
        .and_then(|caps| caps[1].parse::<i32>().ok());
    let mileage = RE_MILEAGE
        .captures(text)
        .and_then(|caps| parse_number(&caps[1]))
        .map(|m| m as u32);
    let (make, model) = extract_make_model(text);

    if price.is_none() && year.is_none() && make.is_none() {
        return None;
    }

    let external_id = match (&make, price, year) {
        (Some(make), Some(price), Some(year)) => Some(synthesize_external_id(
            source,
            make,
            model.as_deref().unwrap_or("Unknown"),
            year,
            price,
        )),
        _ => None,
    };

    Some(RawListing {
        source: source.to_string(),
        external_id,
        make,
        model,
        year,
        mileage,
        price,
        location: extract_location(text),
        url: None,
    })
}

fn extract_text_listings(source: &str, content: &str) -> Vec<RawListing> {
    content
        .split("\n\n")
        .filter(|block| {
            let lower = block.to_lowercase();
            LISTING_HINTS.iter().any(|hint| lower.contains(hint))
        })
        .filter_map(|block| parse_listing_block(source, block))
        .collect()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EdmundsAdapter;

impl MarketplaceAdapter for EdmundsAdapter {
    fn source_id(&self) -> &'static str {
        "edmunds"
    }

    fn search_url(&self, criteria: &SearchCriteria, location_zip: Option<&str>) -> String {
        build_search_url(
            "https://www.edmunds.com/inventory/srp.html",
            &UrlParams {
                make: "make",
                model: "model",
                year_min: "yearmin",
                year_max: "yearmax",
                price_min: "pricemin",
                price_max: "pricemax",
                location: "zip",
            },
            &["radius=100", "sort=price_asc"],
            criteria,
            location_zip,
        )
    }

    fn extract_listings(&self, content: &str) -> Vec<RawListing> {
        extract_text_listings(self.source_id(), content)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CarsComAdapter;

impl MarketplaceAdapter for CarsComAdapter {
    fn source_id(&self) -> &'static str {
        "cars.com"
    }

    fn search_url(&self, criteria: &SearchCriteria, location_zip: Option<&str>) -> String {
        build_search_url(
            "https://www.cars.com/shopping/results/",
            &UrlParams {
                make: "make",
                model: "model",
                year_min: "year_min",
                year_max: "year_max",
                price_min: "price_min",
                price_max: "price_max",
                location: "zip",
            },
            &["maximum_distance=100", "stock_type=used"],
            criteria,
            location_zip,
        )
    }

    fn extract_listings(&self, content: &str) -> Vec<RawListing> {
        extract_text_listings(self.source_id(), content)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CarGurusAdapter;

impl MarketplaceAdapter for CarGurusAdapter {
    fn source_id(&self) -> &'static str {
        "cargurus"
    }

    fn search_url(&self, criteria: &SearchCriteria, location_zip: Option<&str>) -> String {
        build_search_url(
            "https://www.cargurus.com/Cars/inventorylisting/viewDetailsFilterViewInventoryListing.action",
            &UrlParams {
                make: "sourceContext",
                model: "modelFilters",
                year_min: "minYear",
                year_max: "maxYear",
                price_min: "minPrice",
                price_max: "maxPrice",
                location: "distance",
            },
            &["distance=100", "inventorySearchWidgetType=AUTO"],
            criteria,
            location_zip,
        )
    }

    fn extract_listings(&self, content: &str) -> Vec<RawListing> {
        extract_text_listings(self.source_id(), content)
    }
}

/// The full adapter roster, in scrape order.
pub fn all_adapters() -> Vec<Box<dyn MarketplaceAdapter>> {
    vec![
        Box::new(EdmundsAdapter),
        Box::new(CarsComAdapter),
        Box::new(CarGurusAdapter),
    ]
}
