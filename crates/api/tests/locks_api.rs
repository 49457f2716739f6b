//! HTTP-level integration tests for the `/api/locks` endpoints.
//!
//! Tests cover acquire/conflict, heartbeat ownership, release, status and
//! batch checks, expiry, cleanup, and the admin-only endpoints.

mod common;

use axum::http::StatusCode;
use common::{
    admin_token, body_json, delete_auth, get_auth, instructor_token, memory_app,
    other_admin_token, post_json, post_json_auth, send, target,
};

// ---------------------------------------------------------------------------
// Acquire
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_acquire_returns_grant() {
    let (app, _clock) = memory_app();

    let response = post_json_auth(
        app,
        "/api/locks/acquire",
        &admin_token(),
        target("section", "sec-42"),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["lock"]["ownerName"], "Registrar Ana");
    assert_eq!(json["lock"]["resourceId"], "sec-42");
    assert!(json["lock"]["expiresAt"].is_string());
}

#[tokio::test]
async fn test_second_user_gets_423_with_holder() {
    let (app, _clock) = memory_app();
    let body = target("section", "sec-42");

    let first = post_json_auth(app.clone(), "/api/locks/acquire", &admin_token(), body.clone()).await;
    assert_eq!(first.status(), StatusCode::OK);

    let second = post_json_auth(app, "/api/locks/acquire", &other_admin_token(), body).await;
    assert_eq!(second.status(), StatusCode::LOCKED);

    let json = body_json(second).await;
    assert_eq!(json["code"], "LOCKED");
    assert_eq!(json["lockedBy"], "Registrar Ana");
    assert!(json["until"].is_string());
    assert!(json["message"]
        .as_str()
        .unwrap()
        .contains("being edited by Registrar Ana"));
}

#[tokio::test]
async fn test_same_user_reacquire_is_idempotent() {
    let (app, _clock) = memory_app();
    let body = target("subject", "math-101");

    let first = post_json_auth(app.clone(), "/api/locks/acquire", &admin_token(), body.clone()).await;
    assert_eq!(first.status(), StatusCode::OK);

    let again = post_json_auth(app, "/api/locks/acquire", &admin_token(), body).await;
    assert_eq!(again.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_acquire_rejects_invalid_target() {
    let (app, _clock) = memory_app();

    let response = post_json_auth(
        app,
        "/api/locks/acquire",
        &admin_token(),
        target("course", "1"),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_acquire_requires_auth() {
    let (app, _clock) = memory_app();

    let response = post_json(app, "/api/locks/acquire", target("section", "1")).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_expired_lease_can_be_taken_over() {
    let (app, clock) = memory_app();
    let body = target("section", "sec-1");

    post_json_auth(app.clone(), "/api/locks/acquire", &admin_token(), body.clone()).await;
    clock.advance_secs(601);

    let response = post_json_auth(app, "/api/locks/acquire", &other_admin_token(), body).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["lock"]["ownerName"], "Dean Ben");
}

// ---------------------------------------------------------------------------
// Heartbeat
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_heartbeat_keeps_lease_alive_past_ttl() {
    let (app, clock) = memory_app();
    let body = target("section", "sec-1");
    post_json_auth(app.clone(), "/api/locks/acquire", &admin_token(), body.clone()).await;

    for _ in 0..3 {
        clock.advance_secs(480);
        let response =
            post_json_auth(app.clone(), "/api/locks/heartbeat", &admin_token(), body.clone()).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let contender = post_json_auth(app, "/api/locks/acquire", &other_admin_token(), body).await;
    assert_eq!(contender.status(), StatusCode::LOCKED);
}

#[tokio::test]
async fn test_heartbeat_by_non_holder_is_lock_lost() {
    let (app, _clock) = memory_app();
    let body = target("section", "sec-1");
    post_json_auth(app.clone(), "/api/locks/acquire", &admin_token(), body.clone()).await;

    let response = post_json_auth(app, "/api/locks/heartbeat", &other_admin_token(), body).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "LOCK_LOST");
}

#[tokio::test]
async fn test_heartbeat_after_expiry_is_lock_lost() {
    let (app, clock) = memory_app();
    let body = target("section", "sec-1");
    post_json_auth(app.clone(), "/api/locks/acquire", &admin_token(), body.clone()).await;
    clock.advance_secs(600);

    let response = post_json_auth(app, "/api/locks/heartbeat", &admin_token(), body).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Release
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_release_frees_the_resource() {
    let (app, _clock) = memory_app();
    let body = target("semester", "2026-1");
    post_json_auth(app.clone(), "/api/locks/acquire", &admin_token(), body.clone()).await;

    let response =
        post_json_auth(app.clone(), "/api/locks/release", &admin_token(), body.clone()).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["released"], true);

    let next = post_json_auth(app, "/api/locks/acquire", &other_admin_token(), body).await;
    assert_eq!(next.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_release_by_non_holder_keeps_lock() {
    let (app, _clock) = memory_app();
    let body = target("semester", "2026-1");
    post_json_auth(app.clone(), "/api/locks/acquire", &admin_token(), body.clone()).await;

    let response =
        post_json_auth(app.clone(), "/api/locks/release", &other_admin_token(), body.clone()).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["released"], false);

    let contender = post_json_auth(app, "/api/locks/acquire", &other_admin_token(), body).await;
    assert_eq!(contender.status(), StatusCode::LOCKED);
}

#[tokio::test]
async fn test_release_accepts_query_token() {
    let (app, _clock) = memory_app();
    let body = target("section", "sec-9");
    post_json_auth(app.clone(), "/api/locks/acquire", &admin_token(), body.clone()).await;

    let uri = format!("/api/locks/release?access_token={}", admin_token());
    let response = post_json(app, &uri, body).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["released"], true);
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_status_distinguishes_holder_from_others() {
    let (app, _clock) = memory_app();
    post_json_auth(
        app.clone(),
        "/api/locks/acquire",
        &admin_token(),
        target("section", "sec-42"),
    )
    .await;

    let mine = body_json(
        get_auth(
            app.clone(),
            "/api/locks/sec-42?resourceType=section",
            &admin_token(),
        )
        .await,
    )
    .await;
    assert_eq!(mine["locked"], true);
    assert_eq!(mine["isYou"], true);

    let theirs = body_json(
        get_auth(
            app.clone(),
            "/api/locks/sec-42?resourceType=section",
            &other_admin_token(),
        )
        .await,
    )
    .await;
    assert_eq!(theirs["locked"], true);
    assert_eq!(theirs["isYou"], false);
    assert_eq!(theirs["by"], "Registrar Ana");

    let free = body_json(
        get_auth(app, "/api/locks/sec-43?resourceType=section", &admin_token()).await,
    )
    .await;
    assert_eq!(free["locked"], false);
    assert!(free["by"].is_null());
}

#[tokio::test]
async fn test_status_requires_resource_type() {
    let (app, _clock) = memory_app();

    let response = get_auth(app, "/api/locks/sec-42", &admin_token()).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// Batch check
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_check_batch_reports_every_requested_resource() {
    let (app, _clock) = memory_app();
    post_json_auth(
        app.clone(),
        "/api/locks/acquire",
        &admin_token(),
        target("section", "a"),
    )
    .await;

    let body = serde_json::json!({
        "resources": [target("section", "a"), target("section", "b")]
    });

    let theirs = body_json(
        post_json_auth(
            app.clone(),
            "/api/locks/check-batch",
            &other_admin_token(),
            body.clone(),
        )
        .await,
    )
    .await;
    assert_eq!(theirs["locks"]["section-a"]["locked"], true);
    assert_eq!(theirs["locks"]["section-a"]["isYou"], false);
    assert_eq!(theirs["locks"]["section-a"]["by"], "Registrar Ana");
    assert_eq!(theirs["locks"]["section-b"]["locked"], false);

    let mine = body_json(
        post_json_auth(app, "/api/locks/check-batch", &admin_token(), body).await,
    )
    .await;
    assert_eq!(mine["locks"]["section-a"]["isYou"], true);
}

#[tokio::test]
async fn test_check_batch_rejects_oversized_request() {
    let (app, _clock) = memory_app();
    let resources: Vec<_> = (0..201).map(|i| target("section", &i.to_string())).collect();

    let response = post_json_auth(
        app,
        "/api/locks/check-batch",
        &admin_token(),
        serde_json::json!({ "resources": resources }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// Cleanup
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_cleanup_reports_swept_leases() {
    let (app, clock) = memory_app();
    post_json_auth(
        app.clone(),
        "/api/locks/acquire",
        &admin_token(),
        target("section", "a"),
    )
    .await;
    clock.advance_secs(601);

    let response = send(
        app,
        axum::http::Method::POST,
        "/api/locks/cleanup",
        Some(&instructor_token()),
        None,
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["cleaned"], 1);
}

// ---------------------------------------------------------------------------
// Admin endpoints
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_admin_lists_active_locks() {
    let (app, _clock) = memory_app();
    post_json_auth(
        app.clone(),
        "/api/locks/acquire",
        &instructor_token(),
        target("subject", "eng-1"),
    )
    .await;

    let response = get_auth(app, "/api/locks", &admin_token()).await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let locks = json["locks"].as_array().unwrap();
    assert_eq!(locks.len(), 1);
    assert_eq!(locks[0]["ownerName"], "Prof. Cruz");
    assert_eq!(locks[0]["ownerId"], 3);
}

#[tokio::test]
async fn test_list_requires_admin() {
    let (app, _clock) = memory_app();

    let response = get_auth(app, "/api/locks", &instructor_token()).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_force_release() {
    let (app, _clock) = memory_app();
    post_json_auth(
        app.clone(),
        "/api/locks/acquire",
        &instructor_token(),
        target("subject", "eng-1"),
    )
    .await;

    let released = delete_auth(app.clone(), "/api/locks/subject/eng-1", &other_admin_token())
        .await;
    assert_eq!(released.status(), StatusCode::OK);
    assert_eq!(body_json(released).await["released"], true);

    let denied = delete_auth(app, "/api/locks/subject/eng-1", &instructor_token()).await;
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);
}
