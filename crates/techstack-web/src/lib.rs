//! Axum + Askama presentation layer for the TechStack opportunity finder.

use std::sync::Arc;

use askama::Template;
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::Deserialize;
use techstack_controller::{ControllerHandle, ControllerSnapshot, FetchState};
use techstack_core::{with_identifiers, CertType, Domain, FilterValue, Level, Opportunity, Platform};
use tokio::net::TcpListener;
use tracing::info;

pub const CRATE_NAME: &str = "techstack-web";

pub const WEB_PORT_VAR: &str = "TECHSTACK_WEB_PORT";
pub const DEFAULT_WEB_PORT: u16 = 8000;

const SKELETON_CARDS: usize = 6;

#[derive(Clone)]
pub struct AppState {
    pub controller: ControllerHandle,
}

impl AppState {
    pub fn new(controller: ControllerHandle) -> Self {
        Self { controller }
    }
}

#[derive(Debug, Deserialize)]
struct ValueForm {
    value: String,
}

#[derive(Debug, Deserialize)]
struct ToggleForm {
    value: String,
    included: bool,
}

#[derive(Debug, Deserialize)]
struct ExpandForm {
    id: String,
}

#[derive(Debug, Clone)]
struct OptionView {
    value: String,
    icon: String,
    selected: bool,
}

#[derive(Debug, Clone)]
struct CardView {
    id: String,
    title: String,
    url: String,
    has_url: bool,
    source_line: String,
    category: String,
    category_icon: String,
    summary: String,
    description: String,
    expectations: String,
    expanded: bool,
}

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    domains: Vec<OptionView>,
    levels: Vec<OptionView>,
    cert_types: Vec<OptionView>,
    platforms: Vec<OptionView>,
    loading: bool,
    error: String,
    has_error: bool,
    heading: String,
    showing_for: String,
    applied_at: String,
    cards: Vec<CardView>,
    show_empty_state: bool,
    skeletons: Vec<usize>,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/draft/domain", post(draft_domain_handler))
        .route("/draft/level", post(draft_level_handler))
        .route("/draft/types", post(draft_types_handler))
        .route("/draft/platforms", post(draft_platforms_handler))
        .route("/apply", post(apply_handler))
        .route("/retry", post(retry_handler))
        .route("/expand", post(expand_handler))
        .route("/api/state", get(state_json_handler))
        .route("/api/apply", post(apply_json_handler))
        .with_state(Arc::new(state))
}

pub fn port_from_env() -> anyhow::Result<u16> {
    port_from_lookup(|key| std::env::var(key).ok())
}

/// Unset means the default port; a set but unparsable value is an error.
pub fn port_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<u16> {
    match lookup(WEB_PORT_VAR) {
        None => Ok(DEFAULT_WEB_PORT),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid TECHSTACK_WEB_PORT value {raw:?}")),
    }
}

pub async fn serve(state: AppState, port: u16) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "web UI listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn index_handler(State(state): State<Arc<AppState>>) -> Response {
    let snapshot = state.controller.snapshot().await;
    render_html(index_template(&snapshot))
}

async fn draft_domain_handler(
    State(state): State<Arc<AppState>>,
    Form(form): Form<ValueForm>,
) -> Response {
    match form.value.parse::<Domain>() {
        Ok(domain) => {
            state.controller.update(|c| c.set_draft_domain(domain)).await;
            back_to_index()
        }
        Err(err) => bad_request(err),
    }
}

async fn draft_level_handler(
    State(state): State<Arc<AppState>>,
    Form(form): Form<ValueForm>,
) -> Response {
    match form.value.parse::<Level>() {
        Ok(level) => {
            state.controller.update(|c| c.set_draft_level(level)).await;
            back_to_index()
        }
        Err(err) => bad_request(err),
    }
}

async fn draft_types_handler(
    State(state): State<Arc<AppState>>,
    Form(form): Form<ToggleForm>,
) -> Response {
    match form.value.parse::<CertType>() {
        Ok(cert_type) => {
            state
                .controller
                .update(|c| c.toggle_draft_cert_type(cert_type, form.included))
                .await;
            back_to_index()
        }
        Err(err) => bad_request(err),
    }
}

async fn draft_platforms_handler(
    State(state): State<Arc<AppState>>,
    Form(form): Form<ToggleForm>,
) -> Response {
    match form.value.parse::<Platform>() {
        Ok(platform) => {
            state
                .controller
                .update(|c| c.toggle_draft_platform(platform, form.included))
                .await;
            back_to_index()
        }
        Err(err) => bad_request(err),
    }
}

async fn apply_handler(State(state): State<Arc<AppState>>) -> Response {
    let controller = state.controller.clone();
    tokio::spawn(async move {
        controller.apply().await;
    });
    back_to_index()
}

async fn retry_handler(State(state): State<Arc<AppState>>) -> Response {
    let controller = state.controller.clone();
    tokio::spawn(async move {
        controller.retry().await;
    });
    back_to_index()
}

async fn expand_handler(
    State(state): State<Arc<AppState>>,
    Form(form): Form<ExpandForm>,
) -> Response {
    state.controller.update(|c| c.toggle_expanded(&form.id)).await;
    back_to_index()
}

async fn state_json_handler(State(state): State<Arc<AppState>>) -> Response {
    Json(state.controller.snapshot().await).into_response()
}

async fn apply_json_handler(State(state): State<Arc<AppState>>) -> Response {
    state.controller.apply().await;
    Json(state.controller.snapshot().await).into_response()
}

fn back_to_index() -> Response {
    Redirect::to("/").into_response()
}

fn bad_request(err: impl std::fmt::Display) -> Response {
    (StatusCode::BAD_REQUEST, Html(format!("Bad request: {err}"))).into_response()
}

fn render_html<T: Template>(tpl: T) -> Response {
    match tpl.render() {
        Ok(html) => Html(html).into_response(),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Html(format!("Server error: {err}")),
        )
            .into_response(),
    }
}

fn options<T: FilterValue + PartialEq>(
    selected: impl Fn(&T) -> bool,
    icon: impl Fn(&T) -> &'static str,
) -> Vec<OptionView> {
    T::variants()
        .iter()
        .map(|v| OptionView {
            value: v.label().to_string(),
            icon: icon(v).to_string(),
            selected: selected(v),
        })
        .collect()
}

pub fn results_heading(count: usize) -> String {
    match count {
        0 => "No Results Found".to_string(),
        1 => "Found 1 Opportunity".to_string(),
        n => format!("Found {n} Opportunities"),
    }
}

fn card_view(id: String, opp: &Opportunity, expanded: bool) -> CardView {
    let source_line = match (&opp.platform, &opp.source) {
        (Some(platform), Some(source)) => format!("{source} \u{2022} {platform}"),
        (Some(platform), None) => format!("\u{2022} {platform}"),
        _ => String::new(),
    };
    let category = opp.category_label.clone().unwrap_or_default();
    let category_icon = opp.known_domain().map(|d| d.icon()).unwrap_or_default();
    CardView {
        id,
        title: opp.title.clone(),
        url: opp.dedup_key().unwrap_or_default().to_string(),
        has_url: opp.dedup_key().is_some(),
        source_line,
        category,
        category_icon: category_icon.to_string(),
        summary: opp.summary.clone().unwrap_or_default(),
        description: opp.description.clone().unwrap_or_default(),
        expectations: opp.expectations.clone().unwrap_or_default(),
        expanded,
    }
}

fn index_template(snapshot: &ControllerSnapshot) -> IndexTemplate {
    let draft = &snapshot.draft;
    let results = snapshot.fetch.results();
    let loading = matches!(snapshot.fetch, FetchState::Loading);
    let error = snapshot.fetch.error_message().unwrap_or_default().to_string();

    let cards = with_identifiers(results)
        .into_iter()
        .map(|(id, opp)| {
            let expanded = snapshot.expanded.as_deref() == Some(id.as_str());
            card_view(id, opp, expanded)
        })
        .collect::<Vec<_>>();

    let heading = if loading {
        "Finding the best opportunities for you...".to_string()
    } else {
        results_heading(cards.len())
    };
    let showing_for = if cards.is_empty() {
        String::new()
    } else {
        format!("{} \u{2022} {}", snapshot.applied.domain, snapshot.applied.level)
    };

    let has_error = !error.is_empty();

    IndexTemplate {
        domains: options::<Domain>(|d| *d == draft.domain, |d| d.icon()),
        levels: options::<Level>(|l| *l == draft.level, |_| ""),
        cert_types: options::<CertType>(|t| draft.cert_types.contains(t), |_| ""),
        platforms: options::<Platform>(|p| draft.platforms.contains(p), |_| ""),
        loading,
        has_error,
        error,
        heading,
        showing_for,
        applied_at: snapshot
            .applied_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_default(),
        show_empty_state: !loading && !has_error && cards.is_empty(),
        cards,
        skeletons: if loading { (0..SKELETON_CARDS).collect() } else { Vec::new() },
    }
}
