mod common;

use audit_log::AuditSink;
use common::*;
use gateway_proxy::MatchKind;
use http::{Method, Request, StatusCode};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn order_upstream() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/order"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "ok"})))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn allowed_origin_reaches_upstream() {
    let upstream = order_upstream().await;
    let router = GatewayBuilder::new(production_policy())
        .route(route("order", "/api/order", &format!("{}/order", upstream.uri())))
        .build();

    let (status, headers, body) = send(
        &router,
        browser_request(Method::POST, "/api/order", Some(SHOP_ORIGIN), r#"{"plan":"basic"}"#),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body), serde_json::json!({"status": "ok"}));
    assert_eq!(headers.get("access-control-allow-origin").unwrap(), SHOP_ORIGIN);
    assert_eq!(upstream.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn webhook_prefix_route_builds_target_from_sub_path() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/order"))
        .and(query_param("ref", "mail"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "ok"})))
        .expect(1)
        .mount(&upstream)
        .await;

    let mut rule = route("webhook", "/webhook", &upstream.uri());
    rule.match_kind = MatchKind::Prefix;
    let router = GatewayBuilder::new(production_policy()).route(rule).build();

    let (status, headers, body) = send(
        &router,
        browser_request(Method::POST, "/webhook/order?ref=mail", Some(SHOP_ORIGIN), "{}"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body), serde_json::json!({"status": "ok"}));
    assert_eq!(headers.get("access-control-allow-origin").unwrap(), SHOP_ORIGIN);

    let (status, _, _) = send(
        &router,
        browser_request(Method::POST, "/webhook/order", Some(EVIL_ORIGIN), "{}"),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(upstream.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn frontend_origin_is_trusted() {
    let upstream = order_upstream().await;
    let router = GatewayBuilder::new(production_policy())
        .route(route("order", "/api/order", &format!("{}/order", upstream.uri())))
        .build();

    let (status, _, _) = send(
        &router,
        browser_request(Method::POST, "/api/order", Some("https://app.example.com"), "{}"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn unlisted_origin_is_denied_without_upstream_call() {
    let upstream = order_upstream().await;
    let router = GatewayBuilder::new(production_policy())
        .route(route("order", "/api/order", &format!("{}/order", upstream.uri())))
        .build();

    let (status, headers, body) = send(
        &router,
        browser_request(Method::POST, "/api/order", Some(EVIL_ORIGIN), "{}"),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json(&body), serde_json::json!({"error": "origin not allowed"}));
    assert!(headers.get("access-control-allow-origin").is_none());
    assert!(upstream.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn missing_origin_depends_on_route_opt_in() {
    let upstream = order_upstream().await;
    let mut server_to_server = route("callback", "/api/callback", &format!("{}/order", upstream.uri()));
    server_to_server.allow_no_origin = true;
    let router = GatewayBuilder::new(production_policy())
        .route(route("order", "/api/order", &format!("{}/order", upstream.uri())))
        .route(server_to_server)
        .build();

    let (status, _, _) = send(&router, browser_request(Method::POST, "/api/order", None, "{}")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, headers, _) =
        send(&router, browser_request(Method::POST, "/api/callback", None, "{}")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers.get("access-control-allow-origin").is_none());
}

#[tokio::test]
async fn plaintext_is_redirected_before_any_forwarding() {
    let upstream = order_upstream().await;
    let router = GatewayBuilder::new(production_policy())
        .route(route("order", "/api/order", &format!("{}/order", upstream.uri())))
        .build();

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/order?ref=mail")
        .header("host", "gw.example.com")
        .header("x-forwarded-proto", "http")
        .header("origin", SHOP_ORIGIN)
        .body(axum::body::Body::from("{}"))
        .unwrap();
    let (status, headers, _) = send(&router, request).await;

    assert_eq!(status, StatusCode::PERMANENT_REDIRECT);
    assert_eq!(
        headers.get("location").unwrap(),
        "https://gw.example.com/api/order?ref=mail"
    );
    assert!(upstream.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn plaintext_redirect_applies_even_to_denied_origins() {
    let router = GatewayBuilder::new(production_policy()).build();
    let request = Request::builder()
        .uri("/anything")
        .header("host", "gw.example.com")
        .header("origin", EVIL_ORIGIN)
        .body(axum::body::Body::empty())
        .unwrap();
    let (status, _, _) = send(&router, request).await;
    assert_eq!(status, StatusCode::PERMANENT_REDIRECT);
}

#[tokio::test]
async fn health_is_served_over_plaintext() {
    let router = GatewayBuilder::new(production_policy()).build();
    for uri in ["/health", "/healthz"] {
        let request = Request::builder()
            .uri(uri)
            .header("host", "gw.example.com")
            .body(axum::body::Body::empty())
            .unwrap();
        let (status, _, body) = send(&router, request).await;
        assert_eq!(status, StatusCode::OK, "{uri}");
        assert_eq!(json(&body), serde_json::json!({"status": "ok"}));
    }
}

#[tokio::test]
async fn development_allows_any_origin_over_plaintext() {
    let upstream = order_upstream().await;
    let router = GatewayBuilder::new(development_policy())
        .route(route("order", "/api/order", &format!("{}/order", upstream.uri())))
        .build();

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/order")
        .header("host", "localhost:8080")
        .header("origin", EVIL_ORIGIN)
        .body(axum::body::Body::from("{}"))
        .unwrap();
    let (status, headers, _) = send(&router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get("access-control-allow-origin").unwrap(), EVIL_ORIGIN);
}

#[tokio::test]
async fn preflight_is_answered_for_allowed_origin_only() {
    let router = GatewayBuilder::new(production_policy())
        .route(route("order", "/api/order", "https://n8n.example/webhook/order"))
        .build();

    let preflight = |origin: &str| {
        Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/order")
            .header("host", "gw.example.com")
            .header("x-forwarded-proto", "https")
            .header("origin", origin)
            .header("access-control-request-method", "POST")
            .body(axum::body::Body::empty())
            .unwrap()
    };

    let (status, headers, _) = send(&router, preflight(SHOP_ORIGIN)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(headers.get("access-control-allow-origin").unwrap(), SHOP_ORIGIN);
    assert_eq!(headers.get("access-control-allow-methods").unwrap(), "POST");
    assert_eq!(headers.get("access-control-allow-credentials").unwrap(), "true");

    let (status, headers, _) = send(&router, preflight(EVIL_ORIGIN)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(headers.get("access-control-allow-origin").is_none());
}

#[tokio::test]
async fn unknown_path_and_wrong_method() {
    let router = GatewayBuilder::new(production_policy())
        .route(route("order", "/api/order", "https://n8n.example/webhook/order"))
        .build();

    let (status, _, body) =
        send(&router, browser_request(Method::POST, "/api/missing", Some(SHOP_ORIGIN), "{}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json(&body), serde_json::json!({"error": "not found"}));

    let (status, _, _) =
        send(&router, browser_request(Method::GET, "/api/order", Some(SHOP_ORIGIN), "")).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn rejected_origin_is_audited() {
    let dir = tempfile::tempdir().unwrap();
    let audit_path = dir.path().join("audit.jsonl");
    let (sink, writer) = AuditSink::start(&audit_path).await.unwrap();

    let router = GatewayBuilder::new(production_policy())
        .route(route("order", "/api/order", "https://n8n.example/webhook/order"))
        .audit(sink)
        .build();
    let (status, _, _) = send(
        &router,
        browser_request(Method::POST, "/api/order", Some(EVIL_ORIGIN), "{}"),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    drop(router);
    writer.await.unwrap();

    let contents = std::fs::read_to_string(&audit_path).unwrap();
    let entry: serde_json::Value = serde_json::from_str(contents.lines().next().unwrap()).unwrap();
    assert_eq!(entry["event_type"], "origin_rejected");
    assert_eq!(entry["source"]["origin"], EVIL_ORIGIN);
    assert_eq!(entry["policy_decision"]["decision"], "deny");
    assert_eq!(entry["policy_decision"]["reason"], "origin_not_listed");
    assert_eq!(entry["details"]["phase"], "denied");
}
