//! Page view and interaction recording through the public site router

mod common;

use axum::http::StatusCode;
use common::*;
use repdesk::analytics::{AnalyticsService, TimeRange};
use serde_json::json;
use std::sync::Arc;

fn navigation(hostname: &str, path: &str, session_id: Option<&str>) -> serde_json::Value {
    json!({
        "session_id": session_id,
        "hostname": hostname,
        "query": "",
        "path": path,
        "title": "Repdesk",
        "referrer": "https://www.google.com/search?q=sales+reps",
        "user_agent": "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 Chrome/120.0 Safari/537.36",
        "viewport_width": 1440
    })
}

#[tokio::test]
async fn development_host_writes_nothing() {
    let storage = create_test_storage().await;
    let router = site_router(Arc::clone(&storage), Arc::new(FakeCrm::default()));

    for host in ["localhost:5173", "127.0.0.1", "id-preview--1234.app.example"] {
        let response = send(&router, json_request("POST", "/api/track", navigation(host, "/", None))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["recorded"], false);
        assert!(body["session_id"].is_null());
    }

    assert!(storage.sessions_since(0).await.unwrap().is_empty());
    assert!(storage.page_views_since(0).await.unwrap().is_empty());
    assert!(storage.events_since(0).await.unwrap().is_empty());
}

#[tokio::test]
async fn preview_link_writes_nothing() {
    let storage = create_test_storage().await;
    let router = site_router(Arc::clone(&storage), Arc::new(FakeCrm::default()));

    let mut body = navigation("repdesk.example", "/services", None);
    body["query"] = json!("?preview=true");
    let response = send(&router, json_request("POST", "/api/track", body)).await;
    assert_eq!(body_json(response).await["recorded"], false);
    assert!(storage.page_views_since(0).await.unwrap().is_empty());
}

#[tokio::test]
async fn two_navigations_share_one_session() {
    let storage = create_test_storage().await;
    let router = site_router(Arc::clone(&storage), Arc::new(FakeCrm::default()));

    let first = send(
        &router,
        json_request("POST", "/api/track", navigation("repdesk.example", "/", None)),
    )
    .await;
    assert_eq!(first.status(), StatusCode::OK);
    let first = body_json(first).await;
    assert_eq!(first["recorded"], true);
    let session_id = first["session_id"].as_str().unwrap().to_string();
    assert!(uuid::Uuid::parse_str(&session_id).is_ok());

    let second = send(
        &router,
        json_request(
            "POST",
            "/api/track",
            navigation("www.repdesk.example", "/services", Some(&session_id)),
        ),
    )
    .await;
    let second = body_json(second).await;
    assert_eq!(second["session_id"], session_id.as_str());

    let sessions = storage.sessions_since(0).await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].session_id, session_id);
    assert_eq!(sessions[0].page_views_count, 2);
    assert!(!sessions[0].bounce);
    assert_eq!(sessions[0].device_type.as_deref(), Some("Desktop"));
    assert_eq!(sessions[0].browser.as_deref(), Some("Chrome"));

    let views = storage.page_views_since(0).await.unwrap();
    assert_eq!(views.len(), 2);
    assert_eq!(views[0].page_path, "/");
    assert_eq!(views[1].page_path, "/services");
    assert_eq!(views[1].operating_system.as_deref(), Some("macOS"));
    assert!(views.iter().all(|v| v.session_id == session_id));

    let events = storage.events_since(0).await.unwrap();
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e.event_type == "page_view"));
    assert_eq!(events[0].event_data.0["title"], "Repdesk");
}

#[tokio::test]
async fn internal_navigation_keeps_the_entry_source() {
    let storage = create_test_storage().await;
    let router = site_router(Arc::clone(&storage), Arc::new(FakeCrm::default()));

    let landing = send(
        &router,
        json_request("POST", "/api/track", navigation("repdesk.example", "/", None)),
    )
    .await;
    let session_id = body_json(landing).await["session_id"]
        .as_str()
        .unwrap()
        .to_string();

    for (path, referrer) in [
        ("/services", "https://repdesk.example/"),
        ("/contact", "https://www.repdesk.example/services"),
    ] {
        let mut body = navigation("repdesk.example", path, Some(&session_id));
        body["referrer"] = json!(referrer);
        send(&router, json_request("POST", "/api/track", body)).await;
    }

    let views = storage.page_views_since(0).await.unwrap();
    assert_eq!(views.len(), 3);
    assert!(views
        .iter()
        .all(|v| v.referrer.as_deref() == Some("https://www.google.com/search?q=sales+reps")));

    let summary = AnalyticsService::new(Arc::clone(&storage))
        .load(TimeRange::All, chrono::Utc::now())
        .await
        .unwrap();
    let sources: Vec<(&str, i64)> = summary
        .traffic_sources
        .iter()
        .map(|s| (s.name.as_str(), s.count))
        .collect();
    assert_eq!(sources, vec![("google.com", 3)]);
}

#[tokio::test]
async fn internal_referrer_without_session_is_direct() {
    let storage = create_test_storage().await;
    let router = site_router(Arc::clone(&storage), Arc::new(FakeCrm::default()));

    let mut body = navigation("repdesk.example", "/about", None);
    body["referrer"] = json!("https://repdesk.example/");
    send(&router, json_request("POST", "/api/track", body)).await;

    let views = storage.page_views_since(0).await.unwrap();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].referrer, None);
    assert_eq!(storage.sessions_since(0).await.unwrap()[0].referrer, None);
}

#[tokio::test]
async fn missing_viewport_is_unknown_device() {
    let storage = create_test_storage().await;
    let router = site_router(Arc::clone(&storage), Arc::new(FakeCrm::default()));

    let mut body = navigation("repdesk.example", "/", None);
    body.as_object_mut().unwrap().remove("viewport_width");
    let response = send(&router, json_request("POST", "/api/track", body)).await;
    assert_eq!(body_json(response).await["recorded"], true);

    let views = storage.page_views_since(0).await.unwrap();
    assert_eq!(views[0].device_type.as_deref(), Some("Unknown"));
    assert_eq!(
        storage.sessions_since(0).await.unwrap()[0].device_type.as_deref(),
        Some("Unknown")
    );
}

#[tokio::test]
async fn interactions_attach_to_existing_session() {
    let storage = create_test_storage().await;
    let router = site_router(Arc::clone(&storage), Arc::new(FakeCrm::default()));

    let orphan = json!({
        "hostname": "repdesk.example",
        "path": "/",
        "event_type": "hero_cta_click",
        "event_data": { "label": "Book a discovery call" }
    });
    let response = send(&router, json_request("POST", "/api/track/event", orphan.clone())).await;
    assert_eq!(body_json(response).await["recorded"], false);

    let first = send(
        &router,
        json_request("POST", "/api/track", navigation("repdesk.example", "/", None)),
    )
    .await;
    let session_id = body_json(first).await["session_id"].clone();

    let mut event = orphan;
    event["session_id"] = session_id;
    let response = send(&router, json_request("POST", "/api/track/event", event)).await;
    assert_eq!(body_json(response).await["recorded"], true);

    let events = storage.events_since(0).await.unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].event_type, "hero_cta_click");
    assert_eq!(events[1].event_data.0["label"], "Book a discovery call");
    assert_eq!(storage.sessions_since(0).await.unwrap().len(), 1);
}

#[tokio::test]
async fn malformed_track_body_is_ignored() {
    let storage = create_test_storage().await;
    let router = site_router(Arc::clone(&storage), Arc::new(FakeCrm::default()));

    let response = send(&router, json_request("POST", "/api/track", json!({ "nope": 1 }))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["recorded"], false);
}

#[tokio::test]
async fn marketing_pages_are_served() {
    let storage = create_test_storage().await;
    let router = site_router(storage, Arc::new(FakeCrm::default()));

    for path in ["/", "/services", "/about", "/contact", "/some/client/route"] {
        let response = send(&router, empty_request("GET", path)).await;
        assert_eq!(response.status(), StatusCode::OK, "{path}");
        let content_type = response.headers()["content-type"].to_str().unwrap().to_string();
        assert!(content_type.starts_with("text/html"), "{path}: {content_type}");
    }

    let services = send(&router, empty_request("GET", "/services")).await;
    let bytes = axum::body::to_bytes(services.into_body(), usize::MAX).await.unwrap();
    assert!(String::from_utf8_lossy(&bytes).contains("<title>Services"));

    let missing = send(&router, empty_request("GET", "/missing.png")).await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}
