use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{bail, Context};
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use fingraph_core::config::{Config, Persistence, ENV_PERSISTENCE, ENV_WORKERS};
use fingraph_core::{
    BatchSummary, CancelToken, EntityOutcome, EntityRequest, IngestionOrchestrator, ResultCache,
    SystemClock,
};
use fingraph_graph::{GraphStore, Neo4jGraphStore};
use fingraph_market_data::{
    Exchange, RateLimiter, SecEdgarCollector, YahooAdapter, YahooNewsSource,
};

use crate::cli::{parse_batch, Cli};

pub fn init_tracing() {
    let log_format =
        std::env::var("FINGRAPH_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init();
    }
}

/// Load configuration with the global flags applied as overrides.
pub fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut overrides = BTreeMap::new();
    if cli.no_persistence {
        overrides.insert(ENV_PERSISTENCE, "disabled".to_string());
    }
    if let Some(workers) = cli.workers {
        overrides.insert(ENV_WORKERS, workers.to_string());
    }
    Config::load_with_overrides(cli.config.as_deref(), &overrides)
        .context("Failed to load configuration")
}

pub fn build_orchestrator(config: &Config) -> anyhow::Result<IngestionOrchestrator> {
    let limiter = Arc::new(RateLimiter::new(config.rate_limits.clone()));
    let adapter = YahooAdapter::new(limiter.clone(), config.backoff)?;
    let news = YahooNewsSource::new(limiter.clone(), config.backoff, config.news_limit)?;
    let sec = SecEdgarCollector::new(
        limiter,
        config.backoff,
        &config.sec_user_agent,
        config.sec_filings,
    )?;
    let cache = ResultCache::new(
        &config.cache_dir,
        config.cache_max_age,
        Arc::new(SystemClock),
    )
    .with_context(|| format!("Failed to open cache at {}", config.cache_dir.display()))?;

    let mut builder = IngestionOrchestrator::builder()
        .adapter(Arc::new(adapter))
        .news_source(Arc::new(news))
        .collector(Arc::new(sec))
        .cache(Arc::new(cache))
        .config(config.clone());
    if config.persistence == Persistence::Graph {
        builder = builder.store(Arc::new(Neo4jGraphStore::new(config.graph.neo4j_settings())));
    } else {
        info!("Persistence disabled; results go to the cache only");
    }
    Ok(builder.build()?)
}

/// A token cancelled by Ctrl-C. In-flight steps finish; nothing new starts.
pub fn cancel_on_interrupt() -> CancelToken {
    let token = CancelToken::new();
    let handle = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; finishing in-flight steps and skipping the rest");
            handle.cancel();
        }
    });
    token
}

fn print_outcome(outcome: &EntityOutcome, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
    } else {
        print!("{}", outcome.render());
    }
    Ok(())
}

fn print_summary(summary: &BatchSummary, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }
    for outcome in &summary.outcomes {
        print!("{}", outcome.render());
    }
    println!("{}", summary.summary());
    Ok(())
}

/// Returns whether the entity was ingested at least partially.
pub async fn run_company(
    config: &Config,
    ticker: String,
    exchange: Option<Exchange>,
    json: bool,
) -> anyhow::Result<bool> {
    let orchestrator = build_orchestrator(config)?;
    let mut request = EntityRequest::new(ticker);
    request.exchange = exchange;

    let outcome = orchestrator
        .process_entity(&request, &cancel_on_interrupt())
        .await;
    print_outcome(&outcome, json)?;
    Ok(outcome.status != fingraph_core::OutcomeStatus::Failed)
}

/// Returns whether no entity failed outright.
pub async fn run_batch(
    config: &Config,
    file: &std::path::Path,
    exchange: Option<Exchange>,
    json: bool,
) -> anyhow::Result<bool> {
    let contents = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read batch file {}", file.display()))?;
    let requests: Vec<EntityRequest> = parse_batch(&contents)
        .into_iter()
        .map(|ticker| EntityRequest {
            ticker,
            exchange: exchange.clone(),
        })
        .collect();
    if requests.is_empty() {
        bail!("Batch file {} lists no tickers", file.display());
    }

    let orchestrator = build_orchestrator(config)?;
    let summary = orchestrator
        .process_many(requests, &cancel_on_interrupt())
        .await;
    print_summary(&summary, json)?;
    Ok(summary.is_success())
}

pub async fn run_verify(config: &Config) -> anyhow::Result<bool> {
    if config.persistence == Persistence::Disabled {
        bail!("Persistence is disabled; nothing to verify");
    }
    let store = Neo4jGraphStore::new(config.graph.neo4j_settings());
    let ready = match store.ensure_ready().await {
        Ok(()) => store.ensure_schema().await,
        Err(err) => Err(err),
    };
    println!("Graph store at {}: {}", config.graph.uri, store.state());
    match ready {
        Ok(()) => {
            println!("Schema declared");
            Ok(true)
        }
        Err(err) => {
            println!("Verification failed: {err}");
            Ok(false)
        }
    }
}

pub fn run_config(config: &Config) -> anyhow::Result<bool> {
    println!("{}", serde_json::to_string_pretty(&config.redacted())?);
    Ok(true)
}
