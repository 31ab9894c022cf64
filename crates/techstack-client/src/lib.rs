//! HTTP client for the opportunity search API.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value as JsonValue;
use techstack_core::{dedupe, FilterSelection, FilterValue, Opportunity, ALL_SENTINEL};
use thiserror::Error;
use tracing::{debug, info_span, warn, Instrument};

pub const CRATE_NAME: &str = "techstack-client";

pub const API_URL_VAR: &str = "TECHSTACK_API_URL";
pub const HTTP_TIMEOUT_VAR: &str = "TECHSTACK_HTTP_TIMEOUT_SECS";
pub const USER_AGENT_VAR: &str = "TECHSTACK_USER_AGENT";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("TECHSTACK_API_URL is not set; the search API base URL has no default")]
    MissingApiUrl,
    #[error("invalid TECHSTACK_HTTP_TIMEOUT_SECS value {0:?}")]
    InvalidTimeout(String),
    #[error("building http client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Search API settings. Built once at startup and handed to the client.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub user_agent: Option<String>,
}

impl ApiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(20),
            user_agent: None,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let base_url = lookup(API_URL_VAR)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::MissingApiUrl)?;
        let mut config = Self::new(base_url);
        if let Some(raw) = lookup(HTTP_TIMEOUT_VAR) {
            let secs: u64 = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidTimeout(raw.clone()))?;
            config.timeout = Duration::from_secs(secs);
        }
        config.user_agent = lookup(USER_AGENT_VAR).filter(|v| !v.trim().is_empty());
        Ok(config)
    }
}

/// Parameters of one search call, already in wire form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpportunityQuery {
    pub domain: String,
    pub search: String,
    pub level: String,
    pub types: Vec<String>,
    pub platforms: Vec<String>,
}

impl OpportunityQuery {
    pub fn from_selection(selection: &FilterSelection, search: impl Into<String>) -> Self {
        Self {
            domain: selection.domain.label().to_string(),
            search: search.into(),
            level: selection.level.label().to_string(),
            types: selection.cert_type_labels(),
            platforms: selection.platform_labels(),
        }
    }

    /// An unscoped query is answered locally with no results.
    pub fn is_unscoped(&self) -> bool {
        let domain = self.domain.trim();
        domain.is_empty() || domain.eq_ignore_ascii_case(ALL_SENTINEL)
    }

    /// Query pairs in wire order; `types` and `platforms` repeat their key.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("domain", self.domain.trim().to_ascii_lowercase()),
            ("search", self.search.clone()),
            ("level", self.level.clone()),
        ];
        pairs.extend(self.types.iter().map(|t| ("types", t.clone())));
        pairs.extend(self.platforms.iter().map(|p| ("platforms", p.clone())));
        pairs
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("transport failure: {message}")]
    Transport { message: String },
}

impl FetchError {
    /// Single string shown to the user in place of results.
    pub fn user_message(&self) -> String {
        match self {
            FetchError::HttpStatus { status, .. } => {
                format!("Failed to fetch certifications: {status}")
            }
            FetchError::Transport { message } if !message.trim().is_empty() => message.clone(),
            FetchError::Transport { .. } => "An unexpected error occurred".to_string(),
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Transport {
            message: err.to_string(),
        }
    }
}

/// Anything that can answer an opportunity query.
#[async_trait]
pub trait OpportunitySource: Send + Sync {
    async fn fetch(&self, query: &OpportunityQuery) -> Result<Vec<Opportunity>, FetchError>;
}

#[derive(Debug, Clone)]
pub struct OpportunityClient {
    client: reqwest::Client,
    endpoint: String,
}

impl OpportunityClient {
    pub fn new(config: &ApiConfig) -> Result<Self, ConfigError> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        Ok(Self {
            client: builder.build()?,
            endpoint: format!("{}/certifications", config.base_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn fetch_remote(&self, query: &OpportunityQuery) -> Result<Vec<Opportunity>, FetchError> {
        let resp = self
            .client
            .get(&self.endpoint)
            .query(&query.query_pairs())
            .send()
            .await?;

        let status = resp.status();
        let final_url = resp.url().to_string();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url: final_url,
            });
        }

        let body = resp.bytes().await?;
        let items = parse_results(&body);
        debug!(url = %final_url, count = items.len(), "search API responded");
        Ok(items)
    }
}

#[async_trait]
impl OpportunitySource for OpportunityClient {
    async fn fetch(&self, query: &OpportunityQuery) -> Result<Vec<Opportunity>, FetchError> {
        if query.is_unscoped() {
            debug!(domain = %query.domain, "unscoped query answered locally");
            return Ok(Vec::new());
        }

        let span = info_span!("opportunity_fetch", domain = %query.domain, level = %query.level);
        self.fetch_remote(query).instrument(span).await
    }
}

/// Decode a search payload. Anything other than `{"results": [...]}` is an
/// empty list; individual records that fail to decode are skipped.
pub fn parse_results(body: &[u8]) -> Vec<Opportunity> {
    let value: JsonValue = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(err) => {
            warn!(error = %err, "search payload is not JSON; treating as empty");
            return Vec::new();
        }
    };

    let Some(records) = value.get("results").and_then(|v| v.as_array()) else {
        return Vec::new();
    };

    let items = records
        .iter()
        .filter_map(|record| match serde_json::from_value::<Opportunity>(record.clone()) {
            Ok(item) => Some(item),
            Err(err) => {
                warn!(error = %err, "skipping undecodable opportunity record");
                None
            }
        })
        .collect::<Vec<_>>();

    dedupe(items)
}
