mod common;

use std::str::FromStr;
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use common::{assert_hx_redirect, assert_redirect, body_json, body_string, TestApp};
use serde_json::json;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tempfile::TempDir;

use immo::error::ApiError;
use immo::scheduling::{create_visit, BookingError, VisitRequest};

const DAY: &str = "2030-06-01";

fn booking_form(date: &str, time: &str) -> String {
    format!(
        "client_name=Ana+Silva&client_email=ana%40example.com&client_phone=0600000000\
&date={date}&time={}&notes=Ground+floor+please",
        time.replace(':', "%3A")
    )
}

fn api_booking(property_id: &str, time: &str) -> serde_json::Value {
    json!({
        "property_id": property_id,
        "client_name": "Ana Silva",
        "client_email": "ana@example.com",
        "date": DAY,
        "time": time,
    })
}

#[tokio::test]
async fn booking_form_creates_pending_visit() {
    let app = TestApp::new().await;
    let id = app.create_property("Sunny Villa", true, "available").await;

    let resp = app
        .post_form(&format!("/properties/{id}/visits"), &booking_form(DAY, "10:00"), None)
        .await;
    assert_redirect(&resp, &format!("/properties/{id}?booked=1"));

    let (status, time, phone, notes): (String, String, Option<String>, Option<String>) =
        sqlx::query_as(
            "SELECT status, visit_time, client_phone, notes FROM visits WHERE property_id = ?",
        )
        .bind(&id)
        .fetch_one(&app.db)
        .await
        .unwrap();
    assert_eq!(status, "pending");
    assert_eq!(time, "10:00");
    assert_eq!(phone.as_deref(), Some("0600000000"));
    assert_eq!(notes.as_deref(), Some("Ground floor please"));

    let html = body_string(app.get(&format!("/properties/{id}?booked=1"), None).await).await;
    assert!(html.contains("Your visit request has been received"));
}

#[tokio::test]
async fn booking_form_rejects_conflicting_slot() {
    let app = TestApp::new().await;
    let id = app.create_property("Sunny Villa", true, "available").await;
    app.insert_visit(&id, DAY, "10:00", "confirmed").await;

    let resp = app
        .post_form(&format!("/properties/{id}/visits"), &booking_form(DAY, "10:30"), None)
        .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let html = body_string(resp).await;
    assert!(html.contains("This time slot is already taken"));
    // The form keeps what the client typed and proposes free times
    assert!(html.contains("Ana Silva"));
    assert!(html.contains("11:00"));
    assert_eq!(app.visit_count(&id).await, 1);
}

#[tokio::test]
async fn booking_form_reports_invalid_fields() {
    let app = TestApp::new().await;
    let id = app.create_property("Sunny Villa", true, "available").await;

    let body = "client_name=&client_email=nope&client_phone=&date=01%2F06%2F2030&time=25%3A00&notes=";
    let resp = app
        .post_form(&format!("/properties/{id}/visits"), body, None)
        .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let html = body_string(resp).await;
    assert!(html.contains("Name is required"));
    assert!(html.contains("Email address is not valid"));
    assert!(html.contains("Date must be YYYY-MM-DD"));
    assert!(html.contains("Time must be HH:MM (24h)"));
    assert_eq!(app.visit_count(&id).await, 0);
}

#[tokio::test]
async fn booking_form_refuses_sold_property() {
    let app = TestApp::new().await;
    let id = app.create_property("Sold Villa", true, "sold").await;

    let resp = app
        .post_form(&format!("/properties/{id}/visits"), &booking_form(DAY, "10:00"), None)
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_string(resp).await.contains("no longer open for visits"));
    assert_eq!(app.visit_count(&id).await, 0);
}

#[tokio::test]
async fn api_enforces_one_hour_buffer() {
    let app = TestApp::new().await;
    let id = app.create_property("Sunny Villa", true, "available").await;
    app.insert_visit(&id, DAY, "10:00", "pending").await;

    for (time, expected) in [
        ("10:59", StatusCode::CONFLICT),
        ("09:01", StatusCode::CONFLICT),
        ("10:00", StatusCode::CONFLICT),
        ("11:00", StatusCode::CREATED),
        ("09:00", StatusCode::CREATED),
    ] {
        let resp = app
            .send_json("POST", "/api/visits", api_booking(&id, time), None)
            .await;
        assert_eq!(resp.status(), expected, "booking at {time}");
    }

    assert_eq!(app.visit_count(&id).await, 3);
}

#[tokio::test]
async fn api_booking_returns_created_visit() {
    let app = TestApp::new().await;
    let id = app.create_property("Sunny Villa", true, "available").await;

    let resp = app
        .send_json("POST", "/api/visits", api_booking(&id, "14:30"), None)
        .await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let visit = body_json(resp).await;
    assert_eq!(visit["property_id"], id.as_str());
    assert_eq!(visit["visit_date"], DAY);
    assert_eq!(visit["visit_time"], "14:30");
    assert_eq!(visit["status"], "pending");
}

#[tokio::test]
async fn api_rejects_malformed_time() {
    let app = TestApp::new().await;
    let id = app.create_property("Sunny Villa", true, "available").await;

    for time in ["9:00", "24:00", "10:60", "noon", ""] {
        let resp = app
            .send_json("POST", "/api/visits", api_booking(&id, time), None)
            .await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY, "time {time:?}");
        let json = body_json(resp).await;
        assert!(json["fields"]["time"].is_string());
    }
}

#[tokio::test]
async fn api_rejects_unknown_and_unavailable_properties() {
    let app = TestApp::new().await;
    let draft = app.create_property("Secret Draft", false, "available").await;
    let rented = app.create_property("Rented Flat", true, "rented").await;

    let resp = app
        .send_json("POST", "/api/visits", api_booking(&draft, "10:00"), None)
        .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = app
        .send_json("POST", "/api/visits", api_booking("missing", "10:00"), None)
        .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = app
        .send_json("POST", "/api/visits", api_booking(&rented, "10:00"), None)
        .await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn inactive_visits_and_other_days_do_not_block() {
    let app = TestApp::new().await;
    let id = app.create_property("Sunny Villa", true, "available").await;
    let other = app.create_property("Other Villa", true, "available").await;
    app.insert_visit(&id, DAY, "10:00", "cancelled").await;
    app.insert_visit(&id, DAY, "12:00", "completed").await;
    app.insert_visit(&id, "2030-06-02", "14:00", "confirmed").await;
    app.insert_visit(&other, DAY, "16:00", "confirmed").await;

    for time in ["10:00", "12:00", "14:00", "16:00"] {
        let resp = app
            .send_json("POST", "/api/visits", api_booking(&id, time), None)
            .await;
        assert_eq!(resp.status(), StatusCode::CREATED, "booking at {time}");
    }
}

#[tokio::test]
async fn conflict_endpoint_reports_blocking_visits() {
    let app = TestApp::new().await;
    let id = app.create_property("Sunny Villa", true, "available").await;
    let existing = app.insert_visit(&id, DAY, "10:00", "confirmed").await;

    let json = body_json(
        app.get(
            &format!("/api/visits/conflict?property_id={id}&date={DAY}&time=10:30"),
            None,
        )
        .await,
    )
    .await;
    assert_eq!(json["conflict"], true);
    assert_eq!(json["verified"], true);
    assert_eq!(json["conflicting_times"], json!(["10:00"]));
    assert!(json["message"].as_str().unwrap().contains("already taken"));

    let json = body_json(
        app.get(
            &format!("/api/visits/conflict?property_id={id}&date={DAY}&time=11:00"),
            None,
        )
        .await,
    )
    .await;
    assert_eq!(json["conflict"], false);
    assert!(json.get("message").is_none());

    // A visit never conflicts with itself when rescheduled
    let json = body_json(
        app.get(
            &format!(
                "/api/visits/conflict?property_id={id}&date={DAY}&time=10:15&exclude_visit_id={existing}"
            ),
            None,
        )
        .await,
    )
    .await;
    assert_eq!(json["conflict"], false);
}

#[tokio::test]
async fn conflict_endpoint_rejects_bad_input() {
    let app = TestApp::new().await;
    let id = app.create_property("Sunny Villa", true, "available").await;

    let resp = app
        .get(&format!("/api/visits/conflict?property_id={id}&date={DAY}&time=7pm"), None)
        .await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let resp = app
        .get(&format!("/api/visits/conflict?property_id={id}&date=June&time=10:00"), None)
        .await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn slots_endpoint_skips_taken_times() {
    let app = TestApp::new().await;
    let id = app.create_property("Sunny Villa", true, "available").await;
    app.insert_visit(&id, DAY, "10:00", "confirmed").await;

    let json = body_json(
        app.get(&format!("/api/visits/slots?property_id={id}&date={DAY}"), None)
            .await,
    )
    .await;
    assert_eq!(json["date"], DAY);

    let slots: Vec<&str> = json["slots"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s.as_str().unwrap())
        .collect();
    assert_eq!(slots.first(), Some(&"09:00"));
    assert_eq!(slots.last(), Some(&"17:00"));
    assert!(slots.contains(&"11:00"));
    for taken in ["09:30", "10:00", "10:30"] {
        assert!(!slots.contains(&taken), "{taken} should be taken");
    }
}

#[tokio::test]
async fn api_reschedule_checks_other_visits_only() {
    let app = TestApp::new().await;
    let cookie = app.agent_cookie().await;
    let id = app.create_property("Sunny Villa", true, "available").await;
    let first = app.insert_visit(&id, DAY, "10:00", "pending").await;
    app.insert_visit(&id, DAY, "13:00", "confirmed").await;

    // Moving within its own buffer is fine
    let resp = app
        .send_json("PATCH", &format!("/api/visits/{first}"), json!({"time": "10:30"}), Some(&cookie))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["visit_time"], "10:30");

    let resp = app
        .send_json("PATCH", &format!("/api/visits/{first}"), json!({"time": "12:30"}), Some(&cookie))
        .await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    // Cancelling skips the check and frees the slot
    let resp = app
        .send_json(
            "PATCH",
            &format!("/api/visits/{first}"),
            json!({"time": "12:30", "status": "cancelled"}),
            Some(&cookie),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .send_json("POST", "/api/visits", api_booking(&id, "10:30"), None)
        .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn api_reschedule_unknown_visit_is_not_found() {
    let app = TestApp::new().await;
    let cookie = app.agent_cookie().await;

    let resp = app
        .send_json("PATCH", "/api/visits/missing", json!({"time": "10:00"}), Some(&cookie))
        .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn api_delete_visit() {
    let app = TestApp::new().await;
    let cookie = app.agent_cookie().await;
    let id = app.create_property("Sunny Villa", true, "available").await;
    let visit = app.insert_visit(&id, DAY, "10:00", "pending").await;

    let resp = app.delete(&format!("/api/visits/{visit}"), Some(&cookie)).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert_eq!(app.visit_count(&id).await, 0);

    let resp = app.delete(&format!("/api/visits/{visit}"), Some(&cookie)).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn api_visit_listing_requires_agent() {
    let app = TestApp::new().await;
    let id = app.create_property("Sunny Villa", true, "available").await;
    app.insert_visit(&id, DAY, "10:00", "pending").await;
    app.insert_visit(&id, "2030-06-02", "11:00", "pending").await;

    let resp = app.get(&format!("/api/visits?property_id={id}"), None).await;
    assert_redirect(&resp, "/login");

    let cookie = app.agent_cookie().await;
    let json = body_json(app.get(&format!("/api/visits?property_id={id}"), Some(&cookie)).await).await;
    assert_eq!(json.as_array().unwrap().len(), 2);

    let json = body_json(
        app.get(&format!("/api/visits?property_id={id}&date={DAY}"), Some(&cookie))
            .await,
    )
    .await;
    assert_eq!(json.as_array().unwrap().len(), 1);
    assert_eq!(json[0]["visit_time"], "10:00");
}

#[tokio::test]
async fn agent_reschedules_from_back_office() {
    let app = TestApp::new().await;
    let cookie = app.agent_cookie().await;
    let id = app.create_property("Sunny Villa", true, "available").await;
    let visit = app.insert_visit(&id, DAY, "10:00", "pending").await;
    app.insert_visit(&id, DAY, "15:00", "confirmed").await;

    let html = body_string(app.get("/admin/visits", Some(&cookie)).await).await;
    assert!(html.contains("Sunny Villa"));
    assert!(html.contains("Existing Client"));

    let resp = app
        .get(&format!("/admin/visits/{visit}/edit"), Some(&cookie))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body = format!("date={DAY}&time=14%3A30&status=confirmed&client_phone=&notes=");
    let resp = app
        .post_form(&format!("/admin/visits/{visit}"), &body, Some(&cookie))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_string(resp).await.contains("This time slot is already taken"));

    let body = format!("date={DAY}&time=11%3A00&status=confirmed&client_phone=&notes=Keys+at+desk");
    let resp = app
        .post_form(&format!("/admin/visits/{visit}"), &body, Some(&cookie))
        .await;
    assert_redirect(&resp, "/admin/visits");

    let (time, status, notes): (String, String, Option<String>) =
        sqlx::query_as("SELECT visit_time, status, notes FROM visits WHERE id = ?")
            .bind(&visit)
            .fetch_one(&app.db)
            .await
            .unwrap();
    assert_eq!(time, "11:00");
    assert_eq!(status, "confirmed");
    assert_eq!(notes.as_deref(), Some("Keys at desk"));
}

#[tokio::test]
async fn back_office_filters_visits_by_status() {
    let app = TestApp::new().await;
    let cookie = app.agent_cookie().await;
    let id = app.create_property("Sunny Villa", true, "available").await;
    let cancelled = app.insert_visit(&id, DAY, "10:00", "cancelled").await;
    let pending = app.insert_visit(&id, DAY, "12:00", "pending").await;

    let html = body_string(app.get("/admin/visits?status=pending", Some(&cookie)).await).await;
    assert!(html.contains(&format!("visit-{pending}")));
    assert!(!html.contains(&format!("visit-{cancelled}")));
}

#[tokio::test]
async fn back_office_deletes_visit() {
    let app = TestApp::new().await;
    let cookie = app.agent_cookie().await;
    let id = app.create_property("Sunny Villa", true, "available").await;
    let visit = app.insert_visit(&id, DAY, "10:00", "pending").await;

    let resp = app.delete(&format!("/admin/visits/{visit}"), Some(&cookie)).await;
    assert_hx_redirect(&resp, "/admin/visits");
    assert_eq!(app.visit_count(&id).await, 0);
}

#[tokio::test]
async fn reactivating_visit_on_sold_property_is_refused() {
    let app = TestApp::new().await;
    let cookie = app.agent_cookie().await;
    let id = app.create_property("Sold Villa", true, "sold").await;
    let cancelled = app.insert_visit(&id, DAY, "10:00", "cancelled").await;
    let confirmed = app.insert_visit(&id, DAY, "14:00", "confirmed").await;

    let resp = app
        .send_json("PATCH", &format!("/api/visits/{cancelled}"), json!({"status": "confirmed"}), Some(&cookie))
        .await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let resp = app
        .send_json("PATCH", &format!("/api/visits/{confirmed}"), json!({"time": "16:00"}), Some(&cookie))
        .await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    // Notes on a visit already on the books can still be edited
    let resp = app
        .send_json("PATCH", &format!("/api/visits/{confirmed}"), json!({"notes": "Buyer follow-up"}), Some(&cookie))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let (status,): (String,) = sqlx::query_as("SELECT status FROM visits WHERE id = ?")
        .bind(&cancelled)
        .fetch_one(&app.db)
        .await
        .unwrap();
    assert_eq!(status, "cancelled");
}

#[tokio::test]
async fn back_office_shows_notice_when_property_closed() {
    let app = TestApp::new().await;
    let cookie = app.agent_cookie().await;
    let id = app.create_property("Rented Flat", true, "rented").await;
    let visit = app.insert_visit(&id, DAY, "10:00", "cancelled").await;

    let body = format!("date={DAY}&time=10%3A00&status=confirmed&client_phone=&notes=");
    let resp = app
        .post_form(&format!("/admin/visits/{visit}"), &body, Some(&cookie))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_string(resp).await.contains("no longer accepts visits"));
}

async fn seed_property(pool: &SqlitePool) -> String {
    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    sqlx::query(
        r#"
        INSERT INTO properties (id, title, kind, listing, price, address, city, status, published, created_at, updated_at)
        VALUES (?, 'Busy Villa', 'house', 'sale', 250000, '1 Rue Haute', 'Lyon', 'available', 1, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await
    .unwrap();
    id
}

fn request_at(property_id: &str, client: usize, time: String) -> VisitRequest {
    VisitRequest {
        property_id: property_id.to_string(),
        client_name: format!("Client {client}"),
        client_email: "client@example.com".to_string(),
        date: DAY.to_string(),
        time,
        ..VisitRequest::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_bookings_admit_exactly_one() {
    let dir = TempDir::new().unwrap();
    let url = format!("sqlite:{}", dir.path().join("immo.db").display());
    let pool = immo::db::init_pool(&url).await.unwrap();
    let property_id = seed_property(&pool).await;

    // Every slot lies within an hour of every other
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let pool = pool.clone();
            let request = request_at(&property_id, i, format!("10:{:02}", i * 5));
            tokio::spawn(async move { create_visit(&pool, request).await })
        })
        .collect();

    let mut booked = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => booked += 1,
            Err(BookingError::Conflict) => {}
            Err(e) if e.is_retryable() => {}
            Err(e) => panic!("unexpected booking error: {e}"),
        }
    }

    let (rows,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM visits")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(booked, 1);
    assert_eq!(rows, 1);
}

#[tokio::test]
async fn write_lock_contention_is_reported_as_retry() {
    let dir = TempDir::new().unwrap();
    let options = SqliteConnectOptions::from_str(&format!(
        "sqlite:{}",
        dir.path().join("immo.db").display()
    ))
    .unwrap()
    .create_if_missing(true)
    .busy_timeout(Duration::from_millis(50));
    let pool = SqlitePoolOptions::new()
        .max_connections(2)
        .connect_with(options)
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let property_id = seed_property(&pool).await;

    // Another writer holds the lock for the whole booking attempt
    let mut holder = pool.begin().await.unwrap();
    sqlx::query("UPDATE properties SET title = 'Held' WHERE id = ?")
        .bind(&property_id)
        .execute(&mut *holder)
        .await
        .unwrap();

    let err = create_visit(&pool, request_at(&property_id, 0, "10:00".to_string()))
        .await
        .unwrap_err();
    assert!(err.is_retryable(), "expected a retryable error, got {err:?}");

    let resp = ApiError::from(err).into_response();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    let json = body_json(resp).await;
    assert!(json["error"].as_str().unwrap().contains("could not verify availability"));

    holder.rollback().await.unwrap();
}
