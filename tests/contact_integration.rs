//! Contact form and CRM proxy endpoints

mod common;

use axum::{
    extract::Path,
    http::{header, Request, StatusCode},
    routing::{patch, post},
    Json, Router,
};
use common::*;
use repdesk::config::CrmConfig;
use repdesk::contact::{ContactProperties, CrmClient, HubSpotClient};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

async fn router_with(crm: Arc<FakeCrm>) -> Router {
    site_router(create_test_storage().await, crm)
}

#[tokio::test]
async fn invalid_email_is_rejected_before_upstream() {
    let crm = Arc::new(FakeCrm::default());
    let router = router_with(Arc::clone(&crm)).await;

    let response = send(
        &router,
        json_request(
            "POST",
            "/contact",
            json!({ "firstname": "Jane", "lastname": "Doe", "email": "not-an-email" }),
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Invalid email address");
    assert_eq!(crm.upsert_count(), 0);
}

#[tokio::test]
async fn missing_fields_are_rejected() {
    let crm = Arc::new(FakeCrm::default());
    let router = router_with(Arc::clone(&crm)).await;

    let response = send(&router, json_request("POST", "/contact", json!({ "email": "jane@x.com" }))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(crm.upsert_count(), 0);

    let response = send(&router, json_request("POST", "/contact", json!("just a string"))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["success"], false);
}

#[tokio::test]
async fn contact_upsert_sends_only_present_properties() {
    let crm = Arc::new(FakeCrm::default());
    let router = router_with(Arc::clone(&crm)).await;

    let response = send(
        &router,
        json_request(
            "POST",
            "/contact",
            json!({ "firstname": "Jane", "lastname": "Doe", "email": "jane@x.com", "company": "  " }),
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["contactId"], "101");

    let upserts = crm.upserts.lock().unwrap();
    assert_eq!(upserts.len(), 1);
    let sent = serde_json::to_value(&upserts[0]).unwrap();
    assert_eq!(
        sent,
        json!({ "firstname": "Jane", "lastname": "Doe", "email": "jane@x.com" })
    );
}

#[tokio::test]
async fn options_answers_with_cors_headers() {
    let router = router_with(Arc::new(FakeCrm::default())).await;

    for path in ["/contact", "/oauth/authorize", "/oauth/token", "/crm/contacts", "/crm/contacts/7"] {
        let response = send(&router, empty_request("OPTIONS", path)).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT, "{path}");
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert!(response
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_METHODS));
    }
}

#[tokio::test]
async fn wrong_method_is_405_json() {
    let router = router_with(Arc::new(FakeCrm::default())).await;

    for (method, path) in [("GET", "/contact"), ("DELETE", "/crm/contacts/7"), ("PUT", "/oauth/token")] {
        let response = send(&router, empty_request(method, path)).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED, "{method} {path}");
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Method not allowed");
    }
}

#[tokio::test]
async fn oauth_authorize_redirects() {
    let router = router_with(Arc::new(FakeCrm::default())).await;

    let response = send(&router, empty_request("GET", "/oauth/authorize?state=abc")).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    let location = response.headers()[header::LOCATION].to_str().unwrap();
    assert!(location.starts_with("https://app.crm.example/oauth/authorize"));
    assert!(location.ends_with("state=abc"));
}

#[tokio::test]
async fn oauth_token_exchange() {
    let router = router_with(Arc::new(FakeCrm::default())).await;

    let response = send(&router, json_request("POST", "/oauth/token", json!({ "code": "good-code" }))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["access_token"], "access-1");
    assert_eq!(body["refresh_token"], "refresh-1");
    assert_eq!(body["expires_in"], 1800);

    let missing = send(&router, json_request("POST", "/oauth/token", json!({}))).await;
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

    let rejected = send(&router, json_request("POST", "/oauth/token", json!({ "code": "bad" }))).await;
    assert_eq!(rejected.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn passthrough_requires_bearer() {
    let crm = Arc::new(FakeCrm::default());
    let router = router_with(Arc::clone(&crm)).await;

    let response = send(&router, empty_request("GET", "/crm/contacts")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["success"], false);
    assert!(crm.bearers.lock().unwrap().is_empty());
}

#[tokio::test]
async fn passthrough_forwards_caller_token() {
    let crm = Arc::new(FakeCrm::default());
    let router = router_with(Arc::clone(&crm)).await;

    let request = Request::builder()
        .method("GET")
        .uri("/crm/contacts?limit=10&after=20")
        .header(header::AUTHORIZATION, "Bearer caller-token")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = send(&router, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["query"], "limit=10&after=20");

    let request = Request::builder()
        .method("PATCH")
        .uri("/crm/contacts/42")
        .header(header::AUTHORIZATION, "Bearer caller-token")
        .header(header::CONTENT_TYPE, "application/json")
        .body(axum::body::Body::from(
            json!({ "properties": { "company": "Acme" } }).to_string(),
        ))
        .unwrap();
    let response = send(&router, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["id"], "42");
    assert_eq!(body["properties"]["company"], "Acme");

    assert_eq!(
        *crm.bearers.lock().unwrap(),
        vec!["caller-token".to_string(), "caller-token".to_string()]
    );
}

#[tokio::test]
async fn passthrough_rejects_path_like_contact_ids() {
    let crm = Arc::new(FakeCrm::default());
    let router = router_with(Arc::clone(&crm)).await;

    let request = Request::builder()
        .method("PATCH")
        .uri("/crm/contacts/..%2F..%2F..%2Fv1%2Fowners")
        .header(header::AUTHORIZATION, "Bearer caller-token")
        .header(header::CONTENT_TYPE, "application/json")
        .body(axum::body::Body::from(json!({ "properties": {} }).to_string()))
        .unwrap();
    let response = send(&router, request).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "Invalid contact id");
    assert!(crm.bearers.lock().unwrap().is_empty());
}

#[tokio::test]
async fn handler_panic_becomes_500_envelope() {
    let crm = Arc::new(FakeCrm {
        panic_on_list: true,
        ..Default::default()
    });
    let router = router_with(crm).await;

    let request = Request::builder()
        .uri("/crm/contacts")
        .header(header::AUTHORIZATION, "Bearer t")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = send(&router, request).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body, json!({ "success": false, "error": "Internal server error" }));
}

/// Serves a stand-in CRM API on a random local port
async fn spawn_crm(upstream: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, upstream).await.unwrap();
    });
    format!("http://{addr}")
}

fn crm_config(base: &str) -> CrmConfig {
    CrmConfig {
        api_base_url: base.to_string(),
        auth_url: format!("{base}/oauth/authorize"),
        token_url: format!("{base}/oauth/v1/token"),
        client_id: Some("client".to_string()),
        client_secret: Some("secret".to_string()),
        redirect_uri: Some("https://repdesk.example/oauth/callback".to_string()),
        scopes: vec!["crm.objects.contacts.write".to_string()],
        private_app_token: Some("private-token".to_string()),
    }
}

#[tokio::test]
async fn duplicate_email_falls_back_to_update() {
    let patched: Arc<Mutex<Vec<(String, Value)>>> = Arc::default();
    let patched_log = Arc::clone(&patched);

    let upstream = Router::new()
        .route(
            "/crm/v3/objects/contacts",
            post(|| async {
                (
                    StatusCode::CONFLICT,
                    Json(json!({
                        "status": "error",
                        "message": "Contact already exists. Existing ID: 555",
                        "category": "CONFLICT"
                    })),
                )
            }),
        )
        .route(
            "/crm/v3/objects/contacts/{id}",
            patch(move |Path(id): Path<String>, Json(body): Json<Value>| async move {
                patched_log.lock().unwrap().push((id.clone(), body));
                Json(json!({ "id": id }))
            }),
        );
    let base = spawn_crm(upstream).await;

    let client = HubSpotClient::new(crm_config(&base)).unwrap();
    let properties = ContactProperties {
        email: "jane@x.com".to_string(),
        firstname: Some("Jane".to_string()),
        lastname: Some("Doe".to_string()),
        ..Default::default()
    };

    let id = client.upsert_contact(&properties).await.unwrap();
    assert_eq!(id, "555");

    let patched = patched.lock().unwrap();
    assert_eq!(patched.len(), 1);
    assert_eq!(patched[0].0, "555");
    assert_eq!(patched[0].1["properties"]["email"], "jane@x.com");
}

#[tokio::test]
async fn new_email_is_created_once() {
    let upstream = Router::new().route(
        "/crm/v3/objects/contacts",
        post(|headers: axum::http::HeaderMap| async move {
            let auth = headers[header::AUTHORIZATION].to_str().unwrap().to_string();
            assert_eq!(auth, "Bearer private-token");
            (StatusCode::CREATED, Json(json!({ "id": "901" })))
        }),
    );
    let base = spawn_crm(upstream).await;

    let client = HubSpotClient::new(crm_config(&base)).unwrap();
    let id = client
        .upsert_contact(&ContactProperties {
            email: "new@x.com".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(id, "901");
}
