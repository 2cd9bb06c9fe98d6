use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use carfinder_adapters::{all_adapters, ScrapeOutcome};
use carfinder_core::{Search, SearchCriteria};
use carfinder_engine::{EngineConfig, SearchEngine};
use carfinder_research::{insight, MarketResearcher, PerplexityClient, PerplexityConfig};
use carfinder_store::MemoryStore;

#[derive(Debug, Parser)]
#[command(name = "carfinder")]
#[command(about = "Vehicle arbitrage opportunity finder")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a search over pre-fetched scrape outcomes (JSON file).
    Run {
        /// Path to a JSON array of scrape outcomes.
        #[arg(long)]
        outcomes: PathBuf,
        /// Search name used in logs and the result summary.
        #[arg(long, default_value = "ad-hoc")]
        name: String,
    },
    /// Parse scraped marketplace page text into listings and print them as a
    /// scrape outcome (JSON, feedable to `run`).
    Listings {
        /// Path to scraped page text (markdown or plain text).
        path: PathBuf,
        /// Marketplace the page came from: edmunds, cars.com or cargurus.
        #[arg(long)]
        source: String,
    },
    /// Parse analyst commentary from a text file and print the extracted
    /// market insight as JSON.
    Extract {
        /// Path to a plain-text analyst response.
        path: PathBuf,
        /// Vehicle label the commentary concerns, e.g. "2018 Honda Civic".
        #[arg(long, default_value = "unknown vehicle")]
        vehicle: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { outcomes, name } => {
            let raw = std::fs::read_to_string(&outcomes)
                .with_context(|| format!("reading {}", outcomes.display()))?;
            let outcomes: Vec<ScrapeOutcome> =
                serde_json::from_str(&raw).with_context(|| "parsing scrape outcomes")?;

            let config = PerplexityConfig::from_env()
                .context("PERPLEXITY_API_KEY is not set")?;
            let client = PerplexityClient::new(config)?;
            let researcher = Arc::new(MarketResearcher::new(client));
            let store = Arc::new(MemoryStore::new());
            let engine =
                SearchEngine::with_config(store.clone(), researcher, EngineConfig::from_env());

            let search = Search::new(name, SearchCriteria::default());
            let result = engine.execute_search(&search, &outcomes).await;

            println!(
                "search {}: vehicles={} opportunities={} elapsed={:.1}s success={}",
                result.search_id,
                result.vehicles_found,
                result.opportunities_created,
                result.execution_time.as_secs_f64(),
                result.success,
            );
            if let Some(error) = result.error_message {
                eprintln!("error: {error}");
            }
            for opportunity in store.opportunities().await {
                println!("{}", serde_json::to_string_pretty(&opportunity)?);
            }
        }
        Commands::Listings { path, source } => {
            let adapter = all_adapters()
                .into_iter()
                .find(|a| a.source_id() == source)
                .with_context(|| format!("unknown marketplace {source}"))?;
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let outcome = ScrapeOutcome::ok(adapter.source_id(), adapter.extract_listings(&content));
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Commands::Extract { path, vehicle } => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let parsed = insight::parse_market_insight(&text, &vehicle);
            println!("{}", serde_json::to_string_pretty(&parsed)?);
        }
    }

    Ok(())
}
