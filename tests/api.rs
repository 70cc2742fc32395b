use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

use circulation::config::Config;
use circulation::db::{Backend, FileBackend};
use circulation::routes::{router, ACTOR_HEADER, ROLE_HEADER};
use circulation::state::AppState;

const BOUNDARY: &str = "circulation-test-boundary";

fn app(max_upload_mb: u64) -> (TempDir, Router) {
    let temp = TempDir::new().unwrap();
    let backend = Arc::new(Backend::File(FileBackend::new(temp.path())));
    let config = Config {
        data_dir: temp.path().to_path_buf(),
        max_upload_mb,
        ..Config::default()
    };
    let state = Arc::new(AppState::new(backend, config));
    (temp, router(state))
}

fn pdf(len: usize) -> Vec<u8> {
    let mut bytes = b"%PDF-1.7\n".to_vec();
    bytes.resize(len, b' ');
    bytes
}

fn multipart(filename: Option<&str>, file: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some(name) = filename {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"filename\"\r\n\r\n{name}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"thesis.pdf\"\r\nContent-Type: application/pdf\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(file);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn request(method: &str, uri: &str, actor: (&str, &str)) -> axum::http::request::Builder {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(ACTOR_HEADER, actor.0)
        .header(ROLE_HEADER, actor.1)
}

fn json_request(method: &str, uri: &str, actor: (&str, &str), body: Value) -> Request<Body> {
    request(method, uri, actor)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn upload_request(uri: &str, actor: (&str, &str), body: Vec<u8>) -> Request<Body> {
    request("POST", uri, actor)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

const STUDENT: (&str, &str) = ("Alice Lee", "student");
const LIBRARIAN: (&str, &str) = ("marian", "librarian");
const REVIEWER: (&str, &str) = ("rhea", "reviewer");

#[tokio::test]
async fn document_travels_through_review() {
    let (_temp, app) = app(10);

    let (status, body) = send(
        &app,
        upload_request("/submissions", STUDENT, multipart(None, &pdf(64))),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["record"]["filename"], "alice_lee_Stage1.pdf");
    assert_eq!(body["record"]["state"], "submitted");

    let (_, counts) = send(&app, request("GET", "/counts", LIBRARIAN).body(Body::empty()).unwrap()).await;
    assert_eq!(counts["toReview"], 1);

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/transitions/approve",
            LIBRARIAN,
            json!({ "filename": "alice_lee_Stage1.pdf" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["record"]["filename"], "alice_lee_Stage2.pdf");

    let (_, sent) = send(&app, request("GET", "/views/sent", LIBRARIAN).body(Body::empty()).unwrap()).await;
    assert_eq!(sent["records"].as_array().unwrap().len(), 1);
    assert_eq!(sent["readOnly"], true);
    let (_, queue) = send(
        &app,
        request("GET", "/views/to-review", LIBRARIAN).body(Body::empty()).unwrap(),
    )
    .await;
    assert!(queue["records"].as_array().unwrap().is_empty());

    // Send-back is gated until confirmed.
    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/transitions/send-back",
            REVIEWER,
            json!({ "filename": "alice_lee_Stage2.pdf" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::PRECONDITION_REQUIRED);
    assert!(body["prompt"].as_str().unwrap().starts_with("CAUTION"));

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/transitions/send-back",
            REVIEWER,
            json!({ "filename": "alice_lee_Stage2.pdf", "confirmed": true }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["record"]["filename"], "alice_lee_Stage0.pdf");
    assert_eq!(body["notification"]["targetUser"], "alice_lee");

    let (_, inbox) = send(&app, request("GET", "/notifications", STUDENT).body(Body::empty()).unwrap()).await;
    assert_eq!(inbox.as_array().unwrap().len(), 1);

    let (_, back) = send(
        &app,
        request("GET", "/views/sent-back", REVIEWER).body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(back["records"][0]["filename"], "alice_lee_Stage0.pdf");
}

#[tokio::test]
async fn requests_without_actor_are_rejected() {
    let (_temp, app) = app(10);
    let req = Request::builder().uri("/counts").body(Body::empty()).unwrap();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHENTICATED");

    let (status, _) = send(&app, request("GET", "/counts", ("x", "janitor")).body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn oversize_and_foreign_uploads_fail() {
    let (_temp, app) = app(1);

    let (status, body) = send(
        &app,
        upload_request("/submissions", STUDENT, multipart(None, &pdf(1024 * 1024 + 1))),
    )
    .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(
        body["error"],
        "File size must be under 1MB. Current file size: 1.00MB"
    );

    let (status, body) = send(
        &app,
        upload_request("/submissions", STUDENT, multipart(None, b"PK\x03\x04 zip")),
    )
    .await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(body["code"], "INVALID_FILE_TYPE");

    let (status, body) = send(
        &app,
        upload_request("/uploads", LIBRARIAN, multipart(None, &pdf(32))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "SELECTION_REQUIRED");
}

#[tokio::test]
async fn replacement_is_downloadable() {
    let (_temp, app) = app(10);
    send(
        &app,
        upload_request("/submissions", STUDENT, multipart(None, &pdf(64))),
    )
    .await;

    let (status, body) = send(
        &app,
        upload_request(
            "/uploads",
            LIBRARIAN,
            multipart(Some("alice_lee_Stage1.pdf"), &pdf(128)),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["record"]["size"], 128);

    let resp = app
        .clone()
        .oneshot(
            request("GET", "/submissions/alice_lee_Stage1.pdf/download", LIBRARIAN)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/pdf");
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(bytes.len(), 128);
    assert!(bytes.starts_with(b"%PDF-"));

    // Another student cannot see it.
    let (status, _) = send(
        &app,
        request("GET", "/submissions/alice_lee_Stage1.pdf", ("Bob Ray", "student"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deadline_exports_to_calendar() {
    let (_temp, app) = app(10);
    send(
        &app,
        upload_request("/submissions", STUDENT, multipart(None, &pdf(64))),
    )
    .await;

    let (status, body) = send(
        &app,
        json_request(
            "PUT",
            "/submissions/alice_lee_Stage1.pdf/deadline",
            LIBRARIAN,
            json!({ "deadline": "2025-02-14" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["record"]["deadline"], "2025-02-14");

    let resp = app
        .clone()
        .oneshot(
            request("GET", "/submissions/alice_lee_Stage1.pdf/calendar", LIBRARIAN)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/calendar");
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let ics = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(ics.contains("DTSTART:20250214T000000Z"));
}

#[tokio::test]
async fn saved_filter_applies_until_query_overrides() {
    let (_temp, app) = app(10);
    for student in ["Alice Lee", "Bob Ray"] {
        send(
            &app,
            upload_request("/submissions", (student, "student"), multipart(None, &pdf(64))),
        )
        .await;
    }

    let (status, _) = send(
        &app,
        json_request(
            "PUT",
            "/preferences",
            LIBRARIAN,
            json!({ "confirmActions": true, "filter": { "user": "bob" } }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, filtered) = send(
        &app,
        request("GET", "/views/to-review", LIBRARIAN).body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(filtered["records"].as_array().unwrap().len(), 1);
    assert_eq!(filtered["records"][0]["filename"], "bob_ray_Stage1.pdf");

    let (_, overridden) = send(
        &app,
        request("GET", "/views/to-review?user=alice", LIBRARIAN)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(overridden["records"][0]["filename"], "alice_lee_Stage1.pdf");

    // Counts ignore filters.
    let (_, counts) = send(&app, request("GET", "/counts", LIBRARIAN).body(Body::empty()).unwrap()).await;
    assert_eq!(counts["toReview"], 2);

    // With confirmations on, approve asks first.
    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/transitions/approve",
            LIBRARIAN,
            json!({ "filename": "bob_ray_Stage1.pdf" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::PRECONDITION_REQUIRED);
    assert_eq!(body["prompt"], "Send to reviewer?");
}

#[tokio::test]
async fn sessions_report_store_version() {
    let (_temp, app) = app(10);
    let (status, body) = send(&app, request("POST", "/sessions", LIBRARIAN).body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], 0);

    let (status, _) = send(&app, request("GET", "/sessions", LIBRARIAN).body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(&app, request("DELETE", "/sessions", LIBRARIAN).body(Body::empty()).unwrap()).await;
    assert_eq!(body["loggedOut"], true);

    let (status, _) = send(&app, request("GET", "/sessions", LIBRARIAN).body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn notification_counts_are_staff_only() {
    let (_temp, app) = app(10);
    let (status, body) = send(&app, request("GET", "/notifications/counts", STUDENT).body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");

    let (status, body) = send(&app, request("GET", "/notifications/counts", LIBRARIAN).body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_object().unwrap().is_empty());
}
