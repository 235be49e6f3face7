//! Runtime configuration.
//!
//! Built once at startup from defaults, an optional JSON file and the
//! environment (in that order of precedence), validated, then handed to
//! constructors. Nothing mutates it afterwards.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;

use fingraph_graph::{Neo4jSettings, DEFAULT_CHUNK_SIZE};
use fingraph_market_data::{BackoffPolicy, RateLimitTable, REQUEST_TIMEOUT};

use crate::errors::ConfigError;

pub const ENV_NEO4J_URI: &str = "NEO4J_URI";
pub const ENV_NEO4J_USER: &str = "NEO4J_USER";
pub const ENV_NEO4J_PASSWORD: &str = "NEO4J_PASSWORD";
pub const ENV_NEO4J_DATABASE: &str = "NEO4J_DATABASE";
pub const ENV_PERSISTENCE: &str = "FINGRAPH_PERSISTENCE";
pub const ENV_CACHE_DIR: &str = "FINGRAPH_CACHE_DIR";
pub const ENV_CACHE_MAX_AGE: &str = "FINGRAPH_CACHE_MAX_AGE_SECS";
pub const ENV_WORKERS: &str = "FINGRAPH_WORKERS";
pub const ENV_CHUNK_SIZE: &str = "FINGRAPH_BATCH_CHUNK_SIZE";
pub const ENV_SEC_USER_AGENT: &str = "SEC_USER_AGENT";
pub const ENV_CONFIG_FILE: &str = "FINGRAPH_CONFIG";

const DEFAULT_URI: &str = "bolt://localhost:7687";
const DEFAULT_USER: &str = "neo4j";
const DEFAULT_CACHE_DIR: &str = "cache";
const DEFAULT_CACHE_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);
const DEFAULT_WORKERS: usize = 4;
const DEFAULT_TEXT_CHUNK: usize = 1000;
const DEFAULT_TEXT_OVERLAP: usize = 200;
const DEFAULT_NEWS_LIMIT: usize = 20;
const DEFAULT_SEC_FILINGS: usize = 10;
/// Retried source calls one step may make back to back (Yahoo chart, then
/// profile).
const SOURCE_CALLS_PER_STEP: u32 = 2;
/// Slack for rate-limit waits, cache I/O and graph writes within a step.
const STEP_TIMEOUT_SLACK: Duration = Duration::from_secs(30);
const DEFAULT_SEC_USER_AGENT: &str = "fingraph/0.4 (ingestion@localhost)";

/// Step timeout that lets every retried source call in a step run out its
/// whole backoff budget, so an exhausted source is reported as unavailable
/// rather than as a step timeout. 360s with the default policy.
pub fn step_timeout_for(backoff: &BackoffPolicy) -> Duration {
    backoff
        .worst_case(REQUEST_TIMEOUT)
        .saturating_mul(SOURCE_CALLS_PER_STEP)
        .saturating_add(STEP_TIMEOUT_SLACK)
}

/// Where the pipeline writes its results.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Persistence {
    Graph,
    Disabled,
}

impl FromStr for Persistence {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "graph" | "neo4j" => Ok(Self::Graph),
            "disabled" | "none" | "off" => Ok(Self::Disabled),
            _ => Err(()),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GraphConfig {
    pub uri: String,
    pub user: String,
    pub password: Option<String>,
    pub database: Option<String>,
    /// Rows per transaction for batch writes.
    pub chunk_size: usize,
}

impl GraphConfig {
    pub fn neo4j_settings(&self) -> Neo4jSettings {
        let mut settings = Neo4jSettings::new(
            self.uri.clone(),
            self.user.clone(),
            self.password.clone().unwrap_or_default(),
        );
        settings.database = self.database.clone();
        settings.chunk_size = self.chunk_size;
        settings
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub graph: GraphConfig,
    pub persistence: Persistence,
    pub cache_dir: PathBuf,
    pub cache_max_age: Duration,
    pub workers: usize,
    pub backoff: BackoffPolicy,
    pub rate_limits: RateLimitTable,
    pub text: TextConfig,
    pub news_limit: usize,
    pub sec_filings: usize,
    pub sec_user_agent: String,
    pub step_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            graph: GraphConfig {
                uri: DEFAULT_URI.to_string(),
                user: DEFAULT_USER.to_string(),
                password: None,
                database: None,
                chunk_size: DEFAULT_CHUNK_SIZE,
            },
            persistence: Persistence::Graph,
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            cache_max_age: DEFAULT_CACHE_MAX_AGE,
            workers: DEFAULT_WORKERS,
            backoff: BackoffPolicy::default(),
            rate_limits: RateLimitTable::default(),
            text: TextConfig {
                chunk_size: DEFAULT_TEXT_CHUNK,
                overlap: DEFAULT_TEXT_OVERLAP,
            },
            news_limit: DEFAULT_NEWS_LIMIT,
            sec_filings: DEFAULT_SEC_FILINGS,
            sec_user_agent: DEFAULT_SEC_USER_AGENT.to_string(),
            step_timeout: step_timeout_for(&BackoffPolicy::default()),
        }
    }
}

/// "`requests` per `per_secs` seconds" quota as written in the config file.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct RateLimitEntry {
    pub requests: u32,
    pub per_secs: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct FileGraph {
    uri: Option<String>,
    user: Option<String>,
    password: Option<String>,
    database: Option<String>,
    chunk_size: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct FileBackoff {
    max_attempts: Option<u32>,
    initial_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct FileText {
    chunk_size: Option<usize>,
    overlap: Option<usize>,
}

/// On-disk config. Every field is optional and overrides the default.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct FileConfig {
    #[serde(default)]
    graph: FileGraph,
    persistence: Option<Persistence>,
    cache_dir: Option<PathBuf>,
    cache_max_age_secs: Option<u64>,
    workers: Option<usize>,
    #[serde(default)]
    backoff: FileBackoff,
    #[serde(default)]
    rate_limits: BTreeMap<String, RateLimitEntry>,
    #[serde(default)]
    text: FileText,
    news_limit: Option<usize>,
    sec_filings: Option<usize>,
    sec_user_agent: Option<String>,
    step_timeout_secs: Option<u64>,
}

fn parse_env<T: FromStr>(
    env: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    match env(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw,
            }),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Load `.env`, then build from the process environment and the file
    /// named by `file` or `FINGRAPH_CONFIG`.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_overrides(file, &BTreeMap::new())
    }

    /// Like [`Self::load`], with `overrides` taking precedence over the
    /// process environment. Command-line flags come in this way so they are
    /// validated with everything else.
    pub fn load_with_overrides(
        file: Option<&Path>,
        overrides: &BTreeMap<&str, String>,
    ) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let env = |key: &str| {
            overrides
                .get(key)
                .cloned()
                .or_else(|| std::env::var(key).ok())
        };
        let from_env = non_empty(env(ENV_CONFIG_FILE)).map(PathBuf::from);
        let file = file.map(Path::to_path_buf).or(from_env);
        Self::from_sources(file.as_deref(), env)
    }

    /// Build from an optional file and an environment lookup.
    pub fn from_sources(
        file: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(path) = file {
            let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            let parsed: FileConfig =
                serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?;
            config.apply_file(parsed)?;
        }
        config.apply_env(&env)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_file(&mut self, file: FileConfig) -> Result<(), ConfigError> {
        let graph = file.graph;
        if let Some(uri) = graph.uri {
            self.graph.uri = uri;
        }
        if let Some(user) = graph.user {
            self.graph.user = user;
        }
        if graph.password.is_some() {
            self.graph.password = graph.password;
        }
        if graph.database.is_some() {
            self.graph.database = graph.database;
        }
        if let Some(chunk) = graph.chunk_size {
            self.graph.chunk_size = chunk;
        }
        if let Some(persistence) = file.persistence {
            self.persistence = persistence;
        }
        if let Some(dir) = file.cache_dir {
            self.cache_dir = dir;
        }
        if let Some(secs) = file.cache_max_age_secs {
            self.cache_max_age = Duration::from_secs(secs);
        }
        if let Some(workers) = file.workers {
            self.workers = workers;
        }
        if let Some(attempts) = file.backoff.max_attempts {
            self.backoff.max_attempts = attempts;
        }
        if let Some(ms) = file.backoff.initial_delay_ms {
            self.backoff.initial_delay = Duration::from_millis(ms);
        }
        for (api, entry) in file.rate_limits {
            let interval = RateLimitTable::interval_from_quota(entry.requests, entry.per_secs)
                .ok_or_else(|| ConfigError::InvalidRateLimit {
                    api: api.clone(),
                    message: format!(
                        "{} requests per {}s cannot be enforced",
                        entry.requests, entry.per_secs
                    ),
                })?;
            self.rate_limits.set(api, interval);
        }
        if let Some(chunk) = file.text.chunk_size {
            self.text.chunk_size = chunk;
        }
        if let Some(overlap) = file.text.overlap {
            self.text.overlap = overlap;
        }
        if let Some(n) = file.news_limit {
            self.news_limit = n;
        }
        if let Some(n) = file.sec_filings {
            self.sec_filings = n;
        }
        if let Some(agent) = file.sec_user_agent {
            self.sec_user_agent = agent;
        }
        self.step_timeout = match file.step_timeout_secs {
            Some(secs) => Duration::from_secs(secs),
            None => step_timeout_for(&self.backoff),
        };
        Ok(())
    }

    fn apply_env(&mut self, env: &impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(uri) = non_empty(env(ENV_NEO4J_URI)) {
            self.graph.uri = uri;
        }
        if let Some(user) = non_empty(env(ENV_NEO4J_USER)) {
            self.graph.user = user;
        }
        if let Some(password) = non_empty(env(ENV_NEO4J_PASSWORD)) {
            self.graph.password = Some(password);
        }
        if let Some(db) = non_empty(env(ENV_NEO4J_DATABASE)) {
            self.graph.database = Some(db);
        }
        if let Some(raw) = non_empty(env(ENV_PERSISTENCE)) {
            self.persistence =
                raw.parse()
                    .map_err(|_| ConfigError::InvalidValue {
                        key: ENV_PERSISTENCE.to_string(),
                        value: raw.clone(),
                    })?;
        }
        if let Some(dir) = non_empty(env(ENV_CACHE_DIR)) {
            self.cache_dir = PathBuf::from(dir);
        }
        if let Some(secs) = parse_env::<u64>(env, ENV_CACHE_MAX_AGE)? {
            self.cache_max_age = Duration::from_secs(secs);
        }
        if let Some(workers) = parse_env::<usize>(env, ENV_WORKERS)? {
            self.workers = workers;
        }
        if let Some(chunk) = parse_env::<usize>(env, ENV_CHUNK_SIZE)? {
            self.graph.chunk_size = chunk;
        }
        if let Some(agent) = non_empty(env(ENV_SEC_USER_AGENT)) {
            self.sec_user_agent = agent;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        if self.graph.chunk_size == 0 {
            return Err(ConfigError::Invalid(
                "graph batch chunk size must be at least 1".into(),
            ));
        }
        if self.text.chunk_size == 0 || self.text.overlap >= self.text.chunk_size {
            return Err(ConfigError::Invalid(format!(
                "text overlap ({}) must be smaller than the chunk size ({})",
                self.text.overlap, self.text.chunk_size
            )));
        }
        if self.backoff.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "backoff max attempts must be at least 1".into(),
            ));
        }
        let budget = self.backoff.worst_case(REQUEST_TIMEOUT);
        if self.step_timeout <= budget {
            return Err(ConfigError::Invalid(format!(
                "step timeout ({}s) must exceed the retry budget of one source call ({}s)",
                self.step_timeout.as_secs(),
                budget.as_secs()
            )));
        }
        if self.persistence == Persistence::Graph && self.graph.password.is_none() {
            return Err(ConfigError::MissingPassword);
        }
        Ok(())
    }

    /// Turn persistence off regardless of what the sources said.
    pub fn without_persistence(mut self) -> Self {
        self.persistence = Persistence::Disabled;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Result<Self, ConfigError> {
        self.workers = workers;
        self.validate()?;
        Ok(self)
    }

    /// Effective configuration for display, with the password redacted.
    pub fn redacted(&self) -> serde_json::Value {
        let rate_limits: BTreeMap<String, f64> =
            std::iter::once(("default".to_string(), self.rate_limits.default_interval()))
                .chain(
                    self.rate_limits
                        .entries()
                        .into_iter()
                        .map(|(api, interval)| (api.to_string(), interval)),
                )
                .map(|(api, interval)| (api, interval.as_secs_f64()))
                .collect();
        json!({
            "graph": {
                "uri": self.graph.uri,
                "user": self.graph.user,
                "password": self.graph.password.as_ref().map(|_| "********"),
                "database": self.graph.database,
                "chunkSize": self.graph.chunk_size,
            },
            "persistence": self.persistence,
            "cacheDir": self.cache_dir,
            "cacheMaxAgeSecs": self.cache_max_age.as_secs(),
            "workers": self.workers,
            "backoff": {
                "maxAttempts": self.backoff.max_attempts,
                "initialDelayMs": self.backoff.initial_delay.as_millis() as u64,
            },
            "rateLimitIntervalsSecs": rate_limits,
            "text": {
                "chunkSize": self.text.chunk_size,
                "overlap": self.text.overlap,
            },
            "newsLimit": self.news_limit,
            "secFilings": self.sec_filings,
            "secUserAgent": self.sec_user_agent,
            "stepTimeoutSecs": self.step_timeout.as_secs(),
        })
    }
}
