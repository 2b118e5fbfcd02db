use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use reading_room::infrastructure::AppState;
use reading_room::{db, seed, server};
use serde_json::{Value, json};
use tower::util::ServiceExt; // for oneshot

async fn setup_app() -> Router {
    let db = db::init_db("sqlite::memory:")
        .await
        .expect("Failed to init DB");
    seed::seed_demo_data(&db).await.expect("Failed to seed");
    server::build_router(AppState::new(db), &[])
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json");
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn login(app: &Router, username: &str, password: &str) -> String {
    let (status, body) = send(
        app,
        json_request(
            "POST",
            "/api/auth/login",
            None,
            json!({ "username": username, "password": password }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_check() {
    let app = setup_app().await;
    let (status, body) = send(&app, get("/api/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "reading-room");

    let (status, _) = send(&app, get("/api/health/database")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_health_details_counts_rows() {
    let app = setup_app().await;
    let (status, body) = send(&app, get("/api/health/details")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!body["database_version"].as_str().unwrap().is_empty());
    assert_eq!(body["stats"]["books_count"], 5);
    assert_eq!(body["stats"]["copies_count"], 12);
    assert_eq!(body["stats"]["students_count"], 4);
    assert_eq!(body["stats"]["borrowings_count"], 5);
}

#[tokio::test]
async fn test_copies_by_call_number() {
    let app = setup_app().await;
    let (status, body) = send(&app, get("/api/copies/call-number/823.7%20AUS")).await;
    assert_eq!(status, StatusCode::OK);
    let copies = body.as_array().unwrap();
    assert_eq!(copies.len(), 4);
    assert!(copies.iter().all(|c| c["book_title"] == "Pride and Prejudice"));

    let (status, body) = send(&app, get("/api/copies/call-number/999.9%20NOPE")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_title_status_match_and_limit() {
    let app = setup_app().await;

    let (status, body) = send(&app, get("/api/copies/by-title/pro/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["books"].as_array().unwrap().len(), 2);

    let (status, body) = send(&app, get("/api/copies/by-title/pro/status?limit=1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["books"].as_array().unwrap().len(), 1);

    let (status, body) = send(
        &app,
        get("/api/copies/by-title/Calculus/status?exact_match=true"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["books"][0]["title"], "Calculus");
    assert_eq!(body["books"][0]["total_copies"], 2);

    let (status, _) = send(&app, get("/api/copies/by-title/Calc/status?exact_match=true")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_book_is_404() {
    let app = setup_app().await;
    let (status, body) = send(&app, get("/api/books/999")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
    assert!(body["error"].as_str().unwrap().contains("999"));
}

#[tokio::test]
async fn test_writes_require_token() {
    let app = setup_app().await;
    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/api/students",
            None,
            json!({
                "matric_number": "A1234567B",
                "full_name": "No Token",
                "email": "no.token@uni.example.edu"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/api/borrowings",
            Some("not-a-jwt"),
            json!({ "copy_id": 1, "matric_number": "A0000001X" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_wrong_password_rejected() {
    let app = setup_app().await;
    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/api/auth/login",
            None,
            json!({ "username": "admin", "password": "wrong" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid credentials");
}

#[tokio::test]
async fn test_only_admin_registers_accounts() {
    let app = setup_app().await;
    let librarian = login(&app, "librarian", "librarian").await;
    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/api/auth/register",
            Some(&librarian),
            json!({ "username": "desk2", "password": "long enough" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");

    let admin = login(&app, "admin", "admin").await;
    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/api/auth/register",
            Some(&admin),
            json!({ "username": "desk2", "password": "long enough" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["role"], "librarian");

    let token = login(&app, "desk2", "long enough").await;
    let request = Request::builder()
        .uri("/api/auth/me")
        .header("Authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "desk2");
}

#[tokio::test]
async fn test_borrow_flow_over_http() {
    let app = setup_app().await;
    let token = login(&app, "librarian", "librarian").await;

    let (status, student) = send(
        &app,
        json_request(
            "POST",
            "/api/students",
            Some(&token),
            json!({
                "matric_number": "A1234567B",
                "full_name": "Ada Lovelace",
                "email": "ada@uni.example.edu"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(student["status"], "active");
    assert_eq!(student["can_borrow"], true);

    let (status, duplicate) = send(
        &app,
        json_request(
            "POST",
            "/api/students",
            Some(&token),
            json!({
                "matric_number": "A1234567B",
                "full_name": "Ada Again",
                "email": "other@uni.example.edu"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(duplicate["code"], "CONFLICT");

    let (status, copies) = send(&app, get("/api/copies?status=available&limit=1")).await;
    assert_eq!(status, StatusCode::OK);
    let copy_id = copies["copies"][0]["id"].as_i64().unwrap();

    let (status, record) = send(
        &app,
        json_request(
            "POST",
            "/api/borrowings",
            Some(&token),
            json!({ "copy_id": copy_id, "matric_number": "A1234567B" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(record["status"], "borrowed");
    assert_eq!(record["days_remaining"], 14);

    // The same copy cannot go out twice
    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/api/borrowings",
            Some(&token),
            json!({ "copy_id": copy_id, "matric_number": "A0000003Z" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "COPY_UNAVAILABLE");

    let id = record["id"].as_i64().unwrap();

    // A malformed body is rejected and does not use up the single extension
    let (status, body) = send(
        &app,
        json_request(
            "POST",
            &format!("/api/borrowings/{}/extend", id),
            Some(&token),
            json!({ "days": "7" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
    let (_, unchanged) = send(&app, get(&format!("/api/borrowings/{}", id))).await;
    assert_eq!(unchanged["status"], "borrowed");
    assert!(unchanged["extension_date"].is_null());

    let (status, extended) = send(
        &app,
        json_request(
            "POST",
            &format!("/api/borrowings/{}/extend", id),
            Some(&token),
            json!({ "days": 7 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(extended["status"], "extended");
    assert_eq!(extended["due_date"], record["due_date"]);
    assert!(extended["effective_due_date"].as_str().unwrap() > record["due_date"].as_str().unwrap());

    let (status, returned) = send(
        &app,
        json_request(
            "POST",
            &format!("/api/borrowings/{}/return", id),
            Some(&token),
            Value::Null,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(returned["status"], "returned");

    let (status, copy) = send(&app, get(&format!("/api/copies/{}", copy_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(copy["status"], "available");
}

#[tokio::test]
async fn test_suspended_student_gets_403() {
    let app = setup_app().await;
    let token = login(&app, "librarian", "librarian").await;
    let (_, copies) = send(&app, get("/api/copies?status=available&limit=1")).await;
    let copy_id = copies["copies"][0]["id"].as_i64().unwrap();

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/api/borrowings",
            Some(&token),
            json!({ "copy_id": copy_id, "matric_number": "A0000004W" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");
}

#[tokio::test]
async fn test_statistics_endpoints() {
    let app = setup_app().await;

    let (status, kpi) = send(&app, get("/api/statistics/kpi")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(kpi["total_books"], 5);
    assert_eq!(kpi["total_copies"], 12);
    assert_eq!(kpi["active_borrows"], 4);

    let (status, daily) = send(&app, get("/api/statistics/daily?days=7")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(daily.as_array().unwrap().len() >= 7);

    let (status, body) = send(
        &app,
        get("/api/statistics/daily?start_date=2024-02-01&end_date=2024-01-01"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, _) = send(&app, get("/api/statistics/borrowing-trends?interval=week")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, get("/api/statistics/borrowing-trends?interval=hourly")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let app = setup_app().await;
    let (status, doc) = send(&app, get("/api-docs/openapi.json")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(doc["paths"]["/api/borrowings"].is_object());
}
