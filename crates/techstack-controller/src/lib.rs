//! Draft/apply filter state machine with last-call-wins fetch resolution and
//! single-card expansion state.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use techstack_client::{FetchError, OpportunityQuery, OpportunitySource};
use techstack_core::{with_identifiers, CertType, Domain, FilterSelection, Level, Opportunity, Platform};
use tokio::sync::Mutex;
use tracing::{debug, info};

pub const CRATE_NAME: &str = "techstack-controller";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum FetchState {
    Idle,
    Loading,
    Success(Vec<Opportunity>),
    Error(String),
}

impl FetchState {
    pub fn is_loading(&self) -> bool {
        matches!(self, FetchState::Loading)
    }

    pub fn results(&self) -> &[Opportunity] {
        match self {
            FetchState::Success(items) => items,
            _ => &[],
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            FetchState::Error(message) => Some(message),
            _ => None,
        }
    }
}

/// Monotonic per-controller request number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RequestSeq(pub u64);

/// A fetch issued by `begin_apply`/`begin_retry` that still has to be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFetch {
    pub seq: RequestSeq,
    pub query: OpportunityQuery,
}

/// At most one expanded card, keyed by opportunity identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExpansionState {
    expanded: Option<String>,
}

impl ExpansionState {
    pub fn toggle(&mut self, identifier: &str) {
        if self.expanded.as_deref() == Some(identifier) {
            self.expanded = None;
        } else {
            self.expanded = Some(identifier.to_string());
        }
    }

    pub fn is_expanded(&self, identifier: &str) -> bool {
        self.expanded.as_deref() == Some(identifier)
    }

    pub fn expanded(&self) -> Option<&str> {
        self.expanded.as_deref()
    }

    pub fn clear(&mut self) {
        self.expanded = None;
    }

    fn retain_within(&mut self, items: &[Opportunity]) {
        let Some(current) = self.expanded.as_deref() else {
            return;
        };
        if !with_identifiers(items).iter().any(|(id, _)| id == current) {
            self.expanded = None;
        }
    }
}

/// Read-only view for rendering and the JSON state endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ControllerSnapshot {
    pub draft: FilterSelection,
    pub applied: FilterSelection,
    pub fetch: FetchState,
    pub expanded: Option<String>,
    pub applied_at: Option<DateTime<Utc>>,
    pub in_flight: Option<RequestSeq>,
}

#[derive(Debug, Clone)]
pub struct FilterController {
    draft: FilterSelection,
    applied: FilterSelection,
    fetch: FetchState,
    expansion: ExpansionState,
    last_issued: u64,
    in_flight: Option<RequestSeq>,
    applied_at: Option<DateTime<Utc>>,
}

impl Default for FilterController {
    fn default() -> Self {
        Self::new(FilterSelection::default())
    }
}

impl FilterController {
    pub fn new(initial: FilterSelection) -> Self {
        Self {
            draft: initial.clone(),
            applied: initial,
            fetch: FetchState::Idle,
            expansion: ExpansionState::default(),
            last_issued: 0,
            in_flight: None,
            applied_at: None,
        }
    }

    pub fn draft(&self) -> &FilterSelection {
        &self.draft
    }

    pub fn applied(&self) -> &FilterSelection {
        &self.applied
    }

    pub fn fetch_state(&self) -> &FetchState {
        &self.fetch
    }

    pub fn results(&self) -> &[Opportunity] {
        self.fetch.results()
    }

    pub fn expansion(&self) -> &ExpansionState {
        &self.expansion
    }

    pub fn in_flight(&self) -> Option<RequestSeq> {
        self.in_flight
    }

    pub fn applied_at(&self) -> Option<DateTime<Utc>> {
        self.applied_at
    }

    pub fn set_draft_domain(&mut self, domain: Domain) {
        self.draft.domain = domain;
    }

    pub fn set_draft_level(&mut self, level: Level) {
        self.draft.level = level;
    }

    pub fn toggle_draft_cert_type(&mut self, cert_type: CertType, included: bool) {
        self.draft.set_cert_type(cert_type, included);
    }

    pub fn toggle_draft_platform(&mut self, platform: Platform, included: bool) {
        self.draft.set_platform(platform, included);
    }

    pub fn toggle_expanded(&mut self, identifier: &str) {
        self.expansion.toggle(identifier);
    }

    /// Commit the draft and issue a new fetch. Any fetch still in flight is
    /// superseded from this point on.
    pub fn begin_apply(&mut self) -> PendingFetch {
        self.applied = self.draft.clone();
        self.issue()
    }

    /// Re-run the applied selection without touching the draft.
    pub fn begin_retry(&mut self) -> PendingFetch {
        self.issue()
    }

    fn issue(&mut self) -> PendingFetch {
        self.last_issued += 1;
        let seq = RequestSeq(self.last_issued);
        if let Some(previous) = self.in_flight.replace(seq) {
            debug!(superseded = previous.0, seq = seq.0, "fetch superseded");
        }
        self.fetch = FetchState::Loading;
        self.applied_at = Some(Utc::now());
        info!(
            seq = seq.0,
            domain = %self.applied.domain,
            level = %self.applied.level,
            types = ?self.applied.cert_type_labels(),
            platforms = ?self.applied.platform_labels(),
            "applying filters"
        );
        PendingFetch {
            seq,
            query: OpportunityQuery::from_selection(&self.applied, ""),
        }
    }

    /// Commit a fetch result. Returns false, leaving state untouched, unless
    /// `seq` is the fetch currently in flight.
    pub fn resolve(&mut self, seq: RequestSeq, result: Result<Vec<Opportunity>, FetchError>) -> bool {
        if self.in_flight != Some(seq) {
            debug!(seq = seq.0, latest = self.last_issued, "discarding stale search response");
            return false;
        }
        self.in_flight = None;

        match result {
            Ok(items) => {
                debug!(seq = seq.0, count = items.len(), "search succeeded");
                self.expansion.retain_within(&items);
                self.fetch = FetchState::Success(items);
            }
            Err(err) => {
                info!(seq = seq.0, error = %err, "search failed");
                self.expansion.clear();
                self.fetch = FetchState::Error(err.user_message());
            }
        }
        true
    }

    /// Apply and wait for the result in one step.
    pub async fn apply(&mut self, source: &dyn OpportunitySource) -> &FetchState {
        let pending = self.begin_apply();
        let result = source.fetch(&pending.query).await;
        self.resolve(pending.seq, result);
        &self.fetch
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            draft: self.draft.clone(),
            applied: self.applied.clone(),
            fetch: self.fetch.clone(),
            expanded: self.expansion.expanded().map(ToString::to_string),
            applied_at: self.applied_at,
            in_flight: self.in_flight,
        }
    }
}

/// Shareable controller bound to a search source. The state lock is held
/// only for transitions, never while a request is in flight.
#[derive(Clone)]
pub struct ControllerHandle {
    inner: Arc<Mutex<FilterController>>,
    source: Arc<dyn OpportunitySource>,
}

impl ControllerHandle {
    pub fn new(source: Arc<dyn OpportunitySource>) -> Self {
        Self::with_controller(FilterController::default(), source)
    }

    pub fn with_controller(controller: FilterController, source: Arc<dyn OpportunitySource>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(controller)),
            source,
        }
    }

    pub async fn update<R>(&self, f: impl FnOnce(&mut FilterController) -> R) -> R {
        let mut guard = self.inner.lock().await;
        f(&mut guard)
    }

    pub async fn snapshot(&self) -> ControllerSnapshot {
        self.inner.lock().await.snapshot()
    }

    /// Returns whether this call's result was committed.
    pub async fn apply(&self) -> bool {
        let pending = self.inner.lock().await.begin_apply();
        self.run(pending).await
    }

    pub async fn retry(&self) -> bool {
        let pending = self.inner.lock().await.begin_retry();
        self.run(pending).await
    }

    async fn run(&self, pending: PendingFetch) -> bool {
        let result = self.source.fetch(&pending.query).await;
        self.inner.lock().await.resolve(pending.seq, result)
    }
}
