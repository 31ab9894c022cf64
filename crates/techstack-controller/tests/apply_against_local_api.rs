use std::sync::Arc;

use axum::extract::Query;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use techstack_client::{ApiConfig, OpportunityClient};
use techstack_controller::{ControllerHandle, FetchState};
use techstack_core::{Domain, Level, Platform};
use tokio::net::TcpListener;

#[derive(serde::Deserialize)]
struct DomainOnly {
    domain: String,
}

async fn search(Query(q): Query<DomainOnly>) -> Json<serde_json::Value> {
    match q.domain.as_str() {
        "cloud" => Json(json!({
            "results": [
                {"url": "a", "title": "X"},
                {"url": "a", "title": "X-dup"},
                {"url": "b", "title": "Y"}
            ]
        })),
        _ => Json(json!({})),
    }
}

async fn spawn_api() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = Router::new().route("/certifications", get(search));
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn handle_for(base: &str) -> ControllerHandle {
    let client = OpportunityClient::new(&ApiConfig::new(base)).unwrap();
    ControllerHandle::new(Arc::new(client))
}

#[tokio::test]
async fn duplicate_results_render_once() {
    let handle = handle_for(&spawn_api().await);
    handle
        .update(|c| {
            c.set_draft_domain(Domain::Cloud);
            c.set_draft_level(Level::All);
            c.toggle_draft_platform(Platform::Facebook, false);
        })
        .await;

    assert!(handle.apply().await);

    let snapshot = handle.snapshot().await;
    let titles = snapshot
        .fetch
        .results()
        .iter()
        .map(|o| o.title.as_str())
        .collect::<Vec<_>>();
    assert_eq!(titles, vec!["X", "Y"]);
    assert_eq!(snapshot.applied.platform_labels(), vec!["LinkedIn"]);
}

#[tokio::test]
async fn payload_without_results_is_empty_success() {
    let handle = handle_for(&spawn_api().await);
    handle.update(|c| c.set_draft_domain(Domain::Networking)).await;

    assert!(handle.apply().await);
    assert_eq!(handle.snapshot().await.fetch, FetchState::Success(Vec::new()));
}

#[tokio::test]
async fn network_failure_surfaces_message_and_clears_list() {
    let base = spawn_api().await;
    let handle = handle_for(&base);
    assert!(handle.apply().await);
    assert_eq!(handle.snapshot().await.fetch.results().len(), 2);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let broken = handle_for(&dead);
    assert!(broken.apply().await);
    let snapshot = broken.snapshot().await;
    assert!(matches!(snapshot.fetch, FetchState::Error(ref message) if !message.is_empty()));
    assert!(snapshot.fetch.results().is_empty());
}
