use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use parlor_messaging::config::AppConfig;
use parlor_messaging::storage::BlobStore;
use parlor_messaging::{build_router, db, AppState};

const BOUNDARY: &str = "parlor-test-boundary";

struct TestApp {
    router: Router,
    _uploads: TempDir,
}

fn app() -> TestApp {
    let uploads = tempfile::tempdir().unwrap();
    let config = AppConfig {
        uploads_dir: uploads.path().to_string_lossy().into_owned(),
        ..AppConfig::default()
    };
    let state = Arc::new(AppState {
        // in-memory databases are per connection, so the pool holds exactly one
        db: db::init_pool(":memory:", 1).unwrap(),
        storage: BlobStore::local(uploads.path()),
        config,
    });

    TestApp {
        router: build_router(state),
        _uploads: uploads,
    }
}

enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a str, &'a [u8]),
}

fn multipart_body(parts: &[Part]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes());
                body.extend_from_slice(value.as_bytes());
            }
            Part::File(name, file_name, bytes) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

impl TestApp {
    async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn json(&self, method: Method, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        let mut req = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        self.send(req.body(Body::from(body.to_string())).unwrap()).await
    }

    async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        let req = Request::builder()
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        self.send(req).await
    }

    async fn delete(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        let req = Request::builder()
            .method(Method::DELETE)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        self.send(req).await
    }

    async fn form(&self, method: Method, uri: &str, token: &str, parts: &[Part<'_>]) -> (StatusCode, Value) {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(multipart_body(parts)))
            .unwrap();
        self.send(req).await
    }

    async fn login(&self, name: &str) -> String {
        let (status, body) = self.json(Method::POST, "/session", None, json!({ "username": name })).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["data"]["id"].as_str().unwrap().to_string()
    }

    async fn first_message(&self, token: &str, to: &str, text: &str) -> (StatusCode, Value) {
        self.form(
            Method::POST,
            &format!("/users/{token}/conversations/first-message"),
            token,
            &[Part::Text("recipient_username", to), Part::Text("content", text)],
        )
        .await
    }
}

#[tokio::test]
async fn health_endpoints() {
    let app = app();

    let req = Request::builder().uri("/liveness").body(Body::empty()).unwrap();
    let (status, body) = app.send(req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "parlor-messaging");

    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = app.send(req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["checks"][0]["name"], "database");
}

#[tokio::test]
async fn session_issues_stable_identity() {
    let app = app();
    let first = app.login("alice").await;
    let again = app.login("alice").await;
    assert_eq!(first, again);

    let (status, body) = app.json(Method::POST, "/session", None, json!({ "username": "al" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "E1006");
}

#[tokio::test]
async fn bearer_token_is_required() {
    let app = app();

    let req = Request::builder().uri("/search/users?username=bob").body(Body::empty()).unwrap();
    let (status, body) = app.send(req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "E1001");

    let (status, body) = app.get("/search/users?username=bob", "not-a-uuid").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "E1002");

    let (status, body) = app.get("/search/users?username=bob", "7d0c2c2e-3b8e-4f6e-9b6a-2f1d6c1e9a10").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "E1003");
}

#[tokio::test]
async fn first_message_scenario() {
    let app = app();
    let alice = app.login("alice").await;
    let bob = app.login("bob").await;

    let (status, body) = app.first_message(&alice, "bob", "hi").await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let conversation_id = body["data"]["conversation"]["id"].as_i64().unwrap();

    let (status, body) = app.get(&format!("/conversations/{conversation_id}"), &bob).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["conversation"]["name"], "alice");
    let messages = body["data"]["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["content"], "hi");
    assert_eq!(messages[0]["sender_name"], "alice");
    assert_eq!(messages[0]["status"], "sent");

    let (status, body) = app.first_message(&alice, "bob", "hi again").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "E4006");

    let (status, body) = app.get("/search/users?username=bob", &alice).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["conversation_id"].as_i64(), Some(conversation_id));

    let (status, _) = app.get(&format!("/users/{bob}/conversations"), &alice).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn group_lifecycle() {
    let app = app();
    let alice = app.login("alice").await;
    let bob = app.login("bob").await;
    let carol = app.login("carol").await;

    let (status, body) = app
        .form(
            Method::POST,
            "/groups",
            &alice,
            &[Part::Text("group_name", "team"), Part::Text("usernames", r#"["bob","carol"]"#)],
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let group_id = body["data"]["id"].as_i64().unwrap();

    let (_, body) = app.get(&format!("/users/{alice}/conversations"), &alice).await;
    assert_eq!(body["data"][0]["member_count"], 3);
    assert_eq!(body["data"][0]["name"], "team");

    let (status, body) = app.json(Method::PUT, &format!("/groups/{group_id}/name"), Some(&bob), json!({ "new_name": "crew" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "crew");

    let (_, body) = app.delete(&format!("/groups/{group_id}/leave"), &bob).await;
    assert_eq!(body["data"]["remaining_members"], 2);
    let (_, body) = app.delete(&format!("/groups/{group_id}/leave"), &carol).await;
    assert_eq!(body["data"]["remaining_members"], 1);
    let (_, body) = app.delete(&format!("/groups/{group_id}/leave"), &alice).await;
    assert_eq!(body["data"]["conversation_deleted"], true);

    let (_, body) = app.get(&format!("/users/{alice}/conversations"), &alice).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 0);

    let (status, _) = app.get(&format!("/conversations/{group_id}"), &alice).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn uploads_are_stored_and_served() {
    let app = app();
    let alice = app.login("alice").await;
    app.login("bob").await;
    let (_, body) = app.first_message(&alice, "bob", "hi").await;
    let conversation_id = body["data"]["conversation"]["id"].as_i64().unwrap();

    let (status, body) = app
        .form(
            Method::POST,
            &format!("/conversations/{conversation_id}/messages"),
            &alice,
            &[Part::File("file", "party.gif", b"GIF89a-bytes")],
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["content_type"], "gif");
    let path = body["data"]["content"].as_str().unwrap().to_string();
    assert!(path.starts_with("/uploads/"));

    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri(&path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"GIF89a-bytes");

    let (status, body) = app
        .form(
            Method::POST,
            &format!("/conversations/{conversation_id}/messages"),
            &alice,
            &[Part::File("file", "notes.txt", b"plain")],
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "E0010");
}

#[tokio::test]
async fn deleting_a_message_promotes_its_comments() {
    let app = app();
    let alice = app.login("alice").await;
    let bob = app.login("bob").await;
    let (_, body) = app.first_message(&alice, "bob", "look").await;
    let conversation_id = body["data"]["conversation"]["id"].as_i64().unwrap();
    let message_id = body["data"]["message"]["id"].as_i64().unwrap();
    let comments_uri = format!("/conversations/{conversation_id}/messages/{message_id}/comments");

    let (status, body) = app.form(Method::POST, &comments_uri, &bob, &[Part::Text("content", "nice")]).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["outcome"], "attached");

    let (_, body) = app.get(&format!("/messages/{message_id}/comments"), &alice).await;
    assert_eq!(body["data"][0]["author_name"], "bob");

    let (status, body) = app.delete(&format!("/conversations/{conversation_id}/messages/{message_id}"), &alice).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["promoted"][0]["status"], "comment-converted");

    let (_, body) = app.get(&format!("/conversations/{conversation_id}"), &alice).await;
    let messages = body["data"]["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["content"], "nice");
    assert_eq!(messages[0]["sender_name"], "bob");

    let (status, _) = app.get(&format!("/messages/{message_id}/comments"), &alice).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn forwarding_by_name_reuses_the_conversation() {
    let app = app();
    let alice = app.login("alice").await;
    app.login("bob").await;
    app.login("carol").await;
    let (_, body) = app.first_message(&alice, "bob", "news").await;
    let conversation_id = body["data"]["conversation"]["id"].as_i64().unwrap();
    let message_id = body["data"]["message"]["id"].as_i64().unwrap();
    let uri = format!("/conversations/{conversation_id}/messages/{message_id}/forward/new");

    let (status, first) = app.json(Method::POST, &uri, Some(&alice), json!({ "target_name": "carol" })).await;
    assert_eq!(status, StatusCode::OK, "{first}");
    assert_eq!(first["data"]["status"], "forwarded");

    let (_, second) = app.json(Method::POST, &uri, Some(&alice), json!({ "target_username": "carol" })).await;
    assert_eq!(first["data"]["conversation_id"], second["data"]["conversation_id"]);

    let (_, body) = app.get(&format!("/users/{alice}/conversations"), &alice).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let (status, _) = app
        .json(Method::POST, &format!("/conversations/{conversation_id}/messages/{message_id}/forward/abc"), Some(&alice), json!({}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn username_changes() {
    let app = app();
    let alice = app.login("alice").await;
    app.login("bob").await;

    let (status, body) = app.json(Method::PUT, "/users/me/username", Some(&alice), json!({ "new_name": "bob" })).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "E1005");

    let (status, body) = app.json(Method::PUT, "/users/me/username", Some(&alice), json!({ "newname": "alicia" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["username"], "alicia");

    let (_, body) = app.get(&format!("/users/{alice}"), &alice).await;
    assert_eq!(body["data"]["username"], "alicia");
}
