use std::collections::BTreeMap;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use actix_web::test::call_and_read_body_json;
use actix_web::test::call_service;
use actix_web::test::init_service;
use actix_web::test::read_body_json;
use actix_web::test::TestRequest;
use actix_web::web::Bytes;
use actix_web::web::Data;
use actix_web::App;
use actix_web::HttpRequest;
use actix_web::HttpResponse;
use actix_web::HttpServer;
use serde_json::json;

use authproxy_auth::identity::TokenSecrets;
use authproxy_conf::RuleConf;
use authproxy_context::Context;
use authproxy_injector::Injector;
use authproxy_models::Role;
use authproxy_store::Store;

use super::session::LoginResponse;
use super::Forwarder;

/// Requests received by the mock backend.
type Hits = Data<AtomicUsize>;

#[actix_web::get("/protected")]
async fn protected(hits: Hits) -> HttpResponse {
    hits.fetch_add(1, Ordering::SeqCst);
    HttpResponse::Ok()
        .insert_header(("etag", "\"v1\""))
        .insert_header(("x-internal", "backend-only"))
        .json(json!({"ok": true}))
}

#[actix_web::get("/slow")]
async fn slow(hits: Hits) -> HttpResponse {
    hits.fetch_add(1, Ordering::SeqCst);
    actix_web::rt::time::sleep(Duration::from_secs(3)).await;
    HttpResponse::Ok().finish()
}

#[actix_web::get("/missing")]
async fn missing(hits: Hits) -> HttpResponse {
    hits.fetch_add(1, Ordering::SeqCst);
    HttpResponse::NotFound().body("no such thing")
}

async fn echo(hits: Hits, request: HttpRequest, body: Bytes) -> HttpResponse {
    hits.fetch_add(1, Ordering::SeqCst);
    let headers: BTreeMap<String, String> = request
        .headers()
        .iter()
        .map(|(name, value)| {
            let value = value.to_str().unwrap_or_default().to_string();
            (name.as_str().to_string(), value)
        })
        .collect();
    HttpResponse::Ok().json(json!({
        "method": request.method().as_str(),
        "path": request.path(),
        "query": request.query_string(),
        "headers": headers,
        "body": String::from_utf8_lossy(&body),
    }))
}

/// Start a mock backend on an ephemeral port, returning its address and hits counter.
fn backend() -> (String, Hits) {
    let hits = Data::new(AtomicUsize::new(0));
    let server_hits = hits.clone();
    let server = HttpServer::new(move || {
        App::new()
            .app_data(server_hits.clone())
            .service(missing)
            .service(protected)
            .service(slow)
            .default_service(actix_web::web::to(echo))
    })
    .workers(1)
    .disable_signals()
    .bind(("127.0.0.1", 0))
    .expect("mock backend must bind");
    let address = format!("http://{}", server.addrs()[0]);
    actix_web::rt::spawn(server.run());
    (address, hits)
}

/// Injector for a proxy in front of the given backend, with the default users created.
async fn injector(backend: &str) -> Injector {
    let mut conf = Injector::fixture().conf;
    conf.backend.address = backend.to_string();
    conf.backend.timeout_sec = 1;
    conf.rbac.rules.push(RuleConf {
        method: None,
        path: "/ops/**".into(),
        role: Role::Ops,
    });
    let injector = Injector::build(
        conf,
        Context::fixture(),
        Store::fixture(),
        TokenSecrets::new("pipeline-tests"),
    )
    .unwrap();
    injector
        .registry
        .add_default_users(&injector.context, &injector.conf.auth.default_users)
        .await
        .unwrap();
    injector
}

fn forwarder(injector: &Injector) -> Forwarder {
    Forwarder::new(&injector.conf.backend, &injector.conf.auth.token_header).unwrap()
}

macro_rules! login {
    ($app:expr, $username:expr, $password:expr) => {{
        let request = TestRequest::post()
            .uri("/login")
            .set_json(json!({"username": $username, "password": $password}))
            .to_request();
        let response: LoginResponse = call_and_read_body_json(&$app, request).await;
        response.token
    }};
}

#[actix_web::test]
async fn login_then_forward() {
    let (backend, hits) = backend();
    let injector = injector(&backend).await;
    let app = init_service(super::app(&injector, &forwarder(&injector))).await;

    let request = TestRequest::post()
        .uri("/login")
        .set_json(json!({"username": "admin", "password": "admin"}))
        .to_request();
    let response = call_service(&app, request).await;
    assert_eq!(response.status(), 200);
    let login: LoginResponse = read_body_json(response).await;
    assert!(login.expires_at > time::OffsetDateTime::now_utc());
    let claims = injector
        .tokens
        .verify_token(&injector.context, &login.token)
        .await
        .unwrap();
    assert_eq!(claims.sub, "admin");
    assert_eq!(claims.role, Role::Admin);

    let request = TestRequest::get()
        .uri("/protected")
        .insert_header(("X-Auth-Token", login.token))
        .to_request();
    let response = call_service(&app, request).await;
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers().get("etag").unwrap(), "\"v1\"");
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "application/json"
    );
    assert!(response.headers().get("x-internal").is_none());
    let body: serde_json::Value = read_body_json(response).await;
    assert_eq!(body, json!({"ok": true}));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[actix_web::test]
async fn login_failures_are_indistinguishable() {
    let (backend, _) = backend();
    let injector = injector(&backend).await;
    let app = init_service(super::app(&injector, &forwarder(&injector))).await;

    let mut bodies = Vec::new();
    for (username, password) in [("admin", "wrong"), ("nobody", "admin"), ("../etc", "x")] {
        let request = TestRequest::post()
            .uri("/login")
            .set_json(json!({"username": username, "password": password}))
            .to_request();
        let response = call_service(&app, request).await;
        assert_eq!(response.status(), 401);
        let body: serde_json::Value = read_body_json(response).await;
        bodies.push(body);
    }
    assert_eq!(bodies[0]["error_code"], "LOGIN_FAILED");
    assert_eq!(bodies[0], bodies[1]);
    assert_eq!(bodies[1], bodies[2]);
}

#[actix_web::test]
async fn login_with_invalid_payload() {
    let (backend, _) = backend();
    let injector = injector(&backend).await;
    let app = init_service(super::app(&injector, &forwarder(&injector))).await;

    let request = TestRequest::post()
        .uri("/login")
        .insert_header(("content-type", "application/json"))
        .set_payload("{\"username\": 42")
        .to_request();
    let response = call_service(&app, request).await;
    assert_eq!(response.status(), 400);
    let body: serde_json::Value = read_body_json(response).await;
    assert_eq!(body["error_code"], "BAD_REQUEST");
}

#[actix_web::test]
async fn missing_token_never_reaches_backend() {
    let (backend, hits) = backend();
    let injector = injector(&backend).await;
    let app = init_service(super::app(&injector, &forwarder(&injector))).await;

    for method in ["GET", "POST", "PUT", "PATCH", "DELETE"] {
        let method = actix_web::http::Method::from_bytes(method.as_bytes()).unwrap();
        let request = TestRequest::default()
            .method(method)
            .uri("/protected")
            .to_request();
        let response = call_service(&app, request).await;
        assert_eq!(response.status(), 401);
    }
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[actix_web::test]
async fn lower_role_is_forbidden() {
    let (backend, hits) = backend();
    let injector = injector(&backend).await;
    let app = init_service(super::app(&injector, &forwarder(&injector))).await;
    let token = login!(app, "ops", "ops");

    let request = TestRequest::get()
        .uri("/protected")
        .insert_header(("X-Auth-Token", token.clone()))
        .to_request();
    let response = call_service(&app, request).await;
    assert_eq!(response.status(), 403);
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    let request = TestRequest::get()
        .uri("/ops/status")
        .insert_header(("X-Auth-Token", token.clone()))
        .to_request();
    let response = call_service(&app, request).await;
    assert_eq!(response.status(), 200);
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    let request = TestRequest::get()
        .uri("/api/v1/auth_proxy/local_users")
        .insert_header(("X-Auth-Token", token))
        .to_request();
    let response = call_service(&app, request).await;
    assert_eq!(response.status(), 403);
}

#[actix_web::test]
async fn top_role_is_allowed_everywhere() {
    let (backend, _) = backend();
    let injector = injector(&backend).await;
    let app = init_service(super::app(&injector, &forwarder(&injector))).await;
    let token = login!(app, "admin", "admin");

    for path in ["/ops/status", "/protected", "/any/other/path"] {
        let request = TestRequest::get()
            .uri(path)
            .insert_header(("X-Auth-Token", token.clone()))
            .to_request();
        let response = call_service(&app, request).await;
        assert_eq!(response.status(), 200, "path {} should be allowed", path);
    }
}

#[actix_web::test]
async fn revoked_tokens_are_rejected() {
    let (backend, hits) = backend();
    let injector = injector(&backend).await;
    let app = init_service(super::app(&injector, &forwarder(&injector))).await;
    let admin = login!(app, "admin", "admin");
    let ops = login!(app, "ops", "ops");
    let claims = injector
        .tokens
        .verify_token(&injector.context, &ops)
        .await
        .unwrap();

    let request = TestRequest::post()
        .uri("/api/v1/auth_proxy/tokens/revoke")
        .insert_header(("X-Auth-Token", admin.clone()))
        .set_json(json!({"token_id": claims.jti}))
        .to_request();
    let response = call_service(&app, request).await;
    assert_eq!(response.status(), 200);

    let request = TestRequest::get()
        .uri("/ops/status")
        .insert_header(("X-Auth-Token", ops))
        .to_request();
    let response = call_service(&app, request).await;
    assert_eq!(response.status(), 401);
    let body: serde_json::Value = read_body_json(response).await;
    assert_eq!(body["error_code"], "TOKEN_REVOKED");
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[actix_web::test]
async fn revocation_expiry_is_not_client_controlled() {
    let (backend, hits) = backend();
    let injector = injector(&backend).await;
    let app = init_service(super::app(&injector, &forwarder(&injector))).await;
    let admin = login!(app, "admin", "admin");
    let ops = login!(app, "ops", "ops");
    let claims = injector
        .tokens
        .verify_token(&injector.context, &ops)
        .await
        .unwrap();

    let request = TestRequest::post()
        .uri("/api/v1/auth_proxy/tokens/revoke")
        .insert_header(("X-Auth-Token", admin))
        .set_json(json!({"token_id": claims.jti, "expires_at": "2000-01-01T00:00:00Z"}))
        .to_request();
    let response = call_service(&app, request).await;
    assert_eq!(response.status(), 200);
    let entry: serde_json::Value = read_body_json(response).await;
    let expires_at = entry["expires_at"].as_str().unwrap();
    let expires_at = time::OffsetDateTime::parse(
        expires_at,
        &time::format_description::well_known::Rfc3339,
    )
    .unwrap();
    assert!(expires_at > time::OffsetDateTime::now_utc());

    let request = TestRequest::get()
        .uri("/ops/status")
        .insert_header(("X-Auth-Token", ops))
        .to_request();
    let response = call_service(&app, request).await;
    assert_eq!(response.status(), 401);
    let body: serde_json::Value = read_body_json(response).await;
    assert_eq!(body["error_code"], "TOKEN_REVOKED");
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[actix_web::test]
async fn relative_paths_never_reach_backend() {
    let (backend, hits) = backend();
    let injector = injector(&backend).await;
    let app = init_service(super::app(&injector, &forwarder(&injector))).await;

    for username in ["ops", "admin"] {
        let token = login!(app, username, username);
        for path in [
            "/ops/../protected",
            "/ops/%2e%2e/protected",
            "/ops/%2E%2e/protected",
            "/ops/./status",
            "/ops/x%2f..%2f..%2fprotected",
        ] {
            let request = TestRequest::get()
                .uri(path)
                .insert_header(("X-Auth-Token", token.clone()))
                .to_request();
            let response = call_service(&app, request).await;
            assert_eq!(response.status(), 400, "path {} should be rejected", path);
            let body: serde_json::Value = read_body_json(response).await;
            assert_eq!(body["error_code"], "INVALID_PATH");
        }
    }
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[actix_web::test]
async fn logout_revokes_own_token() {
    let (backend, _) = backend();
    let injector = injector(&backend).await;
    let app = init_service(super::app(&injector, &forwarder(&injector))).await;
    let token = login!(app, "ops", "ops");

    let request = TestRequest::post()
        .uri("/logout")
        .insert_header(("X-Auth-Token", token.clone()))
        .to_request();
    let response = call_service(&app, request).await;
    assert_eq!(response.status(), 204);

    let request = TestRequest::post()
        .uri("/logout")
        .insert_header(("X-Auth-Token", token))
        .to_request();
    let response = call_service(&app, request).await;
    assert_eq!(response.status(), 401);
}

#[actix_web::test]
async fn forward_request_details() {
    let (backend, _) = backend();
    let injector = injector(&backend).await;
    let app = init_service(super::app(&injector, &forwarder(&injector))).await;
    let token = login!(app, "admin", "admin");

    let request = TestRequest::put()
        .uri("/items/42?verbose=true")
        .insert_header(("X-Auth-Token", token))
        .insert_header(("X-Custom", "kept"))
        .insert_header(("Upgrade", "websocket"))
        .set_payload("payload-data")
        .to_request();
    let response = call_service(&app, request).await;
    assert_eq!(response.status(), 200);
    let echo: serde_json::Value = read_body_json(response).await;
    assert_eq!(echo["method"], "PUT");
    assert_eq!(echo["path"], "/items/42");
    assert_eq!(echo["query"], "verbose=true");
    assert_eq!(echo["body"], "payload-data");
    assert_eq!(echo["headers"]["x-custom"], "kept");
    assert_eq!(echo["headers"]["x-forwarded-proto"], "https");
    assert!(echo["headers"].get("x-auth-token").is_none());
    assert!(echo["headers"].get("upgrade").is_none());
}

#[actix_web::test]
async fn backend_status_is_relayed() {
    let (backend, _) = backend();
    let injector = injector(&backend).await;
    let app = init_service(super::app(&injector, &forwarder(&injector))).await;
    let token = login!(app, "admin", "admin");

    let request = TestRequest::get()
        .uri("/missing")
        .insert_header(("X-Auth-Token", token))
        .to_request();
    let response = call_service(&app, request).await;
    assert_eq!(response.status(), 404);
    let body = actix_web::test::read_body(response).await;
    assert_eq!(body, "no such thing");
}

#[actix_web::test]
async fn backend_unreachable() {
    let injector = injector("http://127.0.0.1:9").await;
    let app = init_service(super::app(&injector, &forwarder(&injector))).await;
    let token = login!(app, "admin", "admin");

    let request = TestRequest::get()
        .uri("/protected")
        .insert_header(("X-Auth-Token", token))
        .to_request();
    let response = call_service(&app, request).await;
    assert_eq!(response.status(), 502);
    let body: serde_json::Value = read_body_json(response).await;
    assert_eq!(body["error_code"], "BACKEND_UNREACHABLE");
}

#[actix_web::test]
async fn backend_timeout() {
    let (backend, _) = backend();
    let injector = injector(&backend).await;
    let app = init_service(super::app(&injector, &forwarder(&injector))).await;
    let token = login!(app, "admin", "admin");

    let request = TestRequest::get()
        .uri("/slow")
        .insert_header(("X-Auth-Token", token))
        .to_request();
    let response = call_service(&app, request).await;
    assert_eq!(response.status(), 504);
    let body: serde_json::Value = read_body_json(response).await;
    assert_eq!(body["error_code"], "BACKEND_TIMEOUT");
}

#[actix_web::test]
async fn manage_local_users() {
    let (backend, hits) = backend();
    let injector = injector(&backend).await;
    let app = init_service(super::app(&injector, &forwarder(&injector))).await;
    let token = login!(app, "admin", "admin");
    let base = "/api/v1/auth_proxy/local_users";

    // Create.
    let request = TestRequest::post()
        .uri(base)
        .insert_header(("X-Auth-Token", token.clone()))
        .set_json(json!({"username": "alice", "password": "pa55word", "role": "ops"}))
        .to_request();
    let response = call_service(&app, request).await;
    assert_eq!(response.status(), 201);
    let user: serde_json::Value = read_body_json(response).await;
    assert_eq!(user["username"], "alice");
    assert_eq!(user["role"], "ops");
    assert!(user.get("password_hash").is_none());

    let request = TestRequest::post()
        .uri(base)
        .insert_header(("X-Auth-Token", token.clone()))
        .set_json(json!({"username": "alice", "password": "other", "role": "ops"}))
        .to_request();
    let response = call_service(&app, request).await;
    assert_eq!(response.status(), 409);

    // Update and read back.
    let request = TestRequest::patch()
        .uri(&format!("{}/alice", base))
        .insert_header(("X-Auth-Token", token.clone()))
        .set_json(json!({"role": "admin"}))
        .to_request();
    let response = call_service(&app, request).await;
    assert_eq!(response.status(), 200);
    let request = TestRequest::get()
        .uri(&format!("{}/alice", base))
        .insert_header(("X-Auth-Token", token.clone()))
        .to_request();
    let user: serde_json::Value = call_and_read_body_json(&app, request).await;
    assert_eq!(user["role"], "admin");

    // List.
    let request = TestRequest::get()
        .uri(base)
        .insert_header(("X-Auth-Token", token.clone()))
        .to_request();
    let users: Vec<serde_json::Value> = call_and_read_body_json(&app, request).await;
    let names: Vec<&str> = users
        .iter()
        .map(|user| user["username"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["admin", "alice", "ops"]);

    // Delete.
    let request = TestRequest::delete()
        .uri(&format!("{}/alice", base))
        .insert_header(("X-Auth-Token", token.clone()))
        .to_request();
    let response = call_service(&app, request).await;
    assert_eq!(response.status(), 204);
    let request = TestRequest::get()
        .uri(&format!("{}/alice", base))
        .insert_header(("X-Auth-Token", token.clone()))
        .to_request();
    let response = call_service(&app, request).await;
    assert_eq!(response.status(), 404);

    // Invalid usernames.
    let request = TestRequest::post()
        .uri(base)
        .insert_header(("X-Auth-Token", token))
        .set_json(json!({"username": "not valid!", "password": "x", "role": "ops"}))
        .to_request();
    let response = call_service(&app, request).await;
    assert_eq!(response.status(), 400);
    let body: serde_json::Value = read_body_json(response).await;
    assert_eq!(body["error_code"], "INVALID_USERNAME");
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}
