/// Integration tests for the Boardly API
///
/// Drive the full router (auth, rate limiting, handlers) against the
/// in-memory store:
/// - board and task lifecycle with dense ordering
/// - plan caps and read-only lockdown
/// - subscription cancellation, admin grants and revocations
/// - exports, cron jobs, settings and billing webhooks

mod common;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use boardly_shared::auth::webhook::sign;
use boardly_shared::models::entitlement::{EnforcementState, Plan, PlanLimits};
use boardly_shared::notify::Message;
use chrono::{Duration, Utc};
use common::{split, TestContext, TestUser, CRON_SECRET, PADDLE_SECRET};
use serde_json::json;

fn id_of(value: &serde_json::Value) -> String {
    value["id"].as_str().unwrap().to_string()
}

async fn make_pro(ctx: &TestContext, user_id: uuid::Uuid, upgraded_days_ago: i64, period_end_in_days: i64) {
    let now = Utc::now();
    let mut ent = ctx.entitlement(user_id).await;
    ent.plan = Plan::Pro;
    ent.apply_limits(PlanLimits::for_plan(Plan::Pro));
    ent.upgraded_at = Some(now - Duration::days(upgraded_days_ago));
    ent.current_period_end = Some(now + Duration::days(period_end_in_days));
    ctx.save_entitlement(&ent).await;
}

#[tokio::test]
async fn test_health_is_public() {
    let ctx = TestContext::new().await;
    let response = ctx
        .send(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await;
    let (status, body) = split(response).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_requires_session() {
    let ctx = TestContext::new().await;

    let response = ctx
        .send(Request::builder().uri("/api/boards").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = ctx
        .send(
            Request::builder()
                .uri("/api/boards")
                .header(header::AUTHORIZATION, "Bearer not-a-jwt")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_free_plan_board_cap() {
    let ctx = TestContext::new().await;

    let board = ctx.create_board("Personal").await;
    assert_eq!(board["columns"].as_array().unwrap().len(), 3);

    let (status, body) = ctx
        .call(Method::POST, "/api/boards", Some(json!({ "title": "Second" })))
        .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "cap_exceeded");
    assert_eq!(body["current"], 1);
    assert_eq!(body["limit"], 1);
    assert_eq!(body["reason"], "limit_reached");
    assert_eq!(body["upgrade"], true);
}

#[tokio::test]
async fn test_move_task_renumbers_column() {
    let ctx = TestContext::new().await;
    let board = ctx.create_board("Sprint").await;
    let board_id = id_of(&board["board"]);
    let column_id = id_of(&board["columns"][0]);

    // New tasks go on top: c, b, a
    let a = ctx.create_task(&board_id, &column_id, "a").await;
    ctx.create_task(&board_id, &column_id, "b").await;
    ctx.create_task(&board_id, &column_id, "c").await;
    assert_eq!(a["position"], 0);

    let (status, moved) = ctx
        .call(
            Method::POST,
            &format!("/api/tasks/{}/move", id_of(&a)),
            Some(json!({ "targetColumnId": column_id, "targetIndex": 0 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(moved["position"], 0);

    assert_eq!(
        ctx.column_titles(&board_id, 0).await,
        vec![("a".to_string(), 0), ("c".to_string(), 1), ("b".to_string(), 2)]
    );
}

#[tokio::test]
async fn test_move_onto_current_slot_writes_nothing() {
    let ctx = TestContext::new().await;
    let board = ctx.create_board("Sprint").await;
    let board_id = id_of(&board["board"]);
    let column_id = id_of(&board["columns"][0]);
    ctx.create_task(&board_id, &column_id, "x").await;
    let top = ctx.create_task(&board_id, &column_id, "y").await;

    let writes_before = ctx.store.write_count();
    let (status, moved) = ctx
        .call(
            Method::POST,
            &format!("/api/tasks/{}/move", id_of(&top)),
            Some(json!({ "targetColumnId": column_id, "targetIndex": 0 })),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(moved["updated"], 0);
    assert_eq!(ctx.store.write_count(), writes_before);
}

#[tokio::test]
async fn test_move_across_columns() {
    let ctx = TestContext::new().await;
    let board = ctx.create_board("Sprint").await;
    let board_id = id_of(&board["board"]);
    let todo = id_of(&board["columns"][0]);
    let doing = id_of(&board["columns"][1]);
    let task = ctx.create_task(&board_id, &todo, "ship it").await;
    ctx.create_task(&board_id, &todo, "plan").await;

    let (status, _) = ctx
        .call(
            Method::POST,
            &format!("/api/tasks/{}/move", id_of(&task)),
            Some(json!({ "targetColumnId": doing })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(ctx.column_titles(&board_id, 0).await, vec![("plan".to_string(), 0)]);
    assert_eq!(ctx.column_titles(&board_id, 1).await, vec![("ship it".to_string(), 0)]);
}

#[tokio::test]
async fn test_archive_compacts_and_lists_archived() {
    let ctx = TestContext::new().await;
    let board = ctx.create_board("Sprint").await;
    let board_id = id_of(&board["board"]);
    let column_id = id_of(&board["columns"][0]);
    ctx.create_task(&board_id, &column_id, "bottom").await;
    let middle = ctx.create_task(&board_id, &column_id, "middle").await;
    ctx.create_task(&board_id, &column_id, "top").await;

    let (status, archived) = ctx
        .call(Method::POST, &format!("/api/tasks/{}/archive", id_of(&middle)), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(archived["archived"], true);

    assert_eq!(
        ctx.column_titles(&board_id, 0).await,
        vec![("top".to_string(), 0), ("bottom".to_string(), 1)]
    );

    let (status, body) = ctx
        .call(Method::GET, &format!("/api/boards/{}/archived", board_id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tasks"][0]["title"], "middle");

    let (status, restored) = ctx
        .call(Method::POST, &format!("/api/tasks/{}/unarchive", id_of(&middle)), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(restored["position"], 2);
}

#[tokio::test]
async fn test_foreign_board_is_not_found() {
    let ctx = TestContext::new().await;
    let board = ctx.create_board("Mine").await;
    let intruder = TestUser::new("intruder@example.com");

    let (status, _) = ctx
        .call_as(
            &intruder,
            Method::GET,
            &format!("/api/boards/{}", id_of(&board["board"])),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_read_only_lockdown_blocks_writes() {
    let ctx = TestContext::new().await;
    let board = ctx.create_board("Locked").await;
    let board_id = id_of(&board["board"]);
    let column_id = id_of(&board["columns"][0]);

    let mut ent = ctx.entitlement(ctx.user.id).await;
    ent.enforcement_state = EnforcementState::Enforced;
    ctx.save_entitlement(&ent).await;

    let (status, body) = ctx
        .call(
            Method::POST,
            &format!("/api/boards/{}/tasks", board_id),
            Some(json!({ "columnId": column_id, "title": "nope" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["reason"], "read_only");

    // Reads still work
    let (status, _) = ctx
        .call(Method::GET, &format!("/api/boards/{}", board_id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_usage_provisions_free_entitlement() {
    let ctx = TestContext::new().await;

    let (status, body) = ctx.call(Method::GET, "/api/usage", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["plan"], "free");
    assert_eq!(body["board_count"], 0);
    assert_eq!(body["limits"]["board_cap"], 1);
}

#[tokio::test]
async fn test_immediate_cancel_outside_windows_rejected() {
    let ctx = TestContext::new().await;
    make_pro(&ctx, ctx.user.id, 40, 20).await;

    let (status, body) = ctx
        .call(Method::POST, "/api/subscription/cancel", Some(json!({ "cancelNow": true })))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");
    assert_eq!(ctx.entitlement(ctx.user.id).await.plan, Plan::Pro);
}

#[tokio::test]
async fn test_scheduled_cancel_and_undo() {
    let ctx = TestContext::new().await;
    make_pro(&ctx, ctx.user.id, 40, 20).await;

    let (status, body) = ctx
        .call(Method::POST, "/api/subscription/cancel", Some(json!({ "cancelNow": false })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "cancel_scheduled");
    assert_eq!(body["cancel_at_period_end"], true);

    let (status, _) = ctx
        .call(Method::POST, "/api/subscription/cancel", Some(json!({ "cancelNow": false })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = ctx.call(Method::POST, "/api/subscription/undo-cancel", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "active");
    assert!(body["courtesy_until"].is_null());
}

#[tokio::test]
async fn test_over_limit_wizard() {
    let ctx = TestContext::new().await;
    make_pro(&ctx, ctx.user.id, 2, 28).await;
    let keep = ctx.create_board("Keep").await;
    ctx.create_board("Drop").await;
    let keep_id = id_of(&keep["board"]);

    let (status, body) = ctx
        .call(Method::POST, "/api/subscription/cancel", Some(json!({ "cancelNow": true })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["enforcement_state"], "soft_warn");

    let (status, preview) = ctx
        .call(
            Method::GET,
            &format!("/api/subscription/over-limit?primaryBoardId={}", keep_id),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(preview["boards_to_delete"][0]["title"], "Drop");

    let (status, _) = ctx
        .call(
            Method::POST,
            "/api/subscription/resolve-over-limit",
            Some(json!({ "primaryBoardId": keep_id })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, boards) = ctx.call(Method::GET, "/api/boards", None).await;
    assert_eq!(boards["boards"].as_array().unwrap().len(), 1);
    assert_eq!(
        ctx.entitlement(ctx.user.id).await.enforcement_state,
        EnforcementState::None
    );
}

#[tokio::test]
async fn test_admin_routes_require_admin() {
    let ctx = TestContext::new().await;

    let (status, _) = ctx
        .call(Method::POST, "/api/admin/grant-pro", Some(json!({ "userId": ctx.user.id })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_grant_pro_by_email_then_revoke_conflict() {
    let ctx = TestContext::new().await;
    let admin = ctx.admin().await;
    ctx.create_board("First").await;

    let (status, body) = ctx
        .call_as(
            &admin,
            Method::POST,
            "/api/admin/grant-pro",
            Some(json!({ "email": "OWNER@example.com" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["plan"], "pro");

    ctx.create_board("Second").await;

    let (status, _) = ctx
        .call_as(
            &admin,
            Method::POST,
            "/api/admin/revoke-pro",
            Some(json!({ "userId": ctx.user.id })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(ctx.entitlement(ctx.user.id).await.plan, Plan::Pro);

    let audit = ctx.store.admin_audit_log().await;
    assert_eq!(audit.len(), 1);
}

#[tokio::test]
async fn test_grant_pro_unknown_user() {
    let ctx = TestContext::new().await;
    let admin = ctx.admin().await;

    let (status, _) = ctx
        .call_as(
            &admin,
            Method::POST,
            "/api/admin/grant-pro",
            Some(json!({ "email": "nobody@example.com" })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_board_export_is_single_use() {
    let ctx = TestContext::new().await;
    let board = ctx.create_board("Exported").await;
    let board_id = id_of(&board["board"]);
    let column_id = id_of(&board["columns"][0]);
    ctx.create_task(&board_id, &column_id, "Write, \"quoted\" title").await;

    let (status, ticket) = ctx
        .call(
            Method::POST,
            "/api/export/request",
            Some(json!({ "type": "csv", "boardId": board_id })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ticket["status"], "ready");
    let url = ticket["download_url"].as_str().unwrap().to_string();

    let response = ctx
        .send(Request::builder().uri(&url).body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/csv"));
    let (_, body) = split(response).await;
    assert!(body.as_str().unwrap().contains("\"Write, \"\"quoted\"\" title\""));

    let response = ctx
        .send(Request::builder().uri(&url).body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::GONE);
}

#[tokio::test]
async fn test_account_export_waits_for_worker() {
    let ctx = TestContext::new().await;
    ctx.create_board("All").await;

    let (status, ticket) = ctx
        .call(Method::POST, "/api/export/request", Some(json!({ "type": "json" })))
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let url = ticket["download_url"].as_str().unwrap().to_string();

    let response = ctx
        .send(Request::builder().uri(&url).body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let (status, body) = ctx.cron("/api/cron/prepare-exports", CRON_SECRET).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["prepared"], 1);

    let (status, body) = split(
        ctx.send(Request::builder().uri(&url).body(Body::empty()).unwrap())
            .await,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["boards"][0]["title"], "All");
}

#[tokio::test]
async fn test_cron_requires_secret() {
    let ctx = TestContext::new().await;

    let (status, _) = ctx.cron("/api/cron/prune-archives", "wrong-secret").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = ctx.cron("/api/cron/prune-archives", CRON_SECRET).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], 0);

    let (status, body) = ctx.cron("/api/cron/enforce-grace", CRON_SECRET).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["enforced"], 0);
}

#[tokio::test]
async fn test_slack_settings_connect() {
    let ctx = TestContext::new().await;

    let (status, _) = ctx
        .call(
            Method::POST,
            "/api/slack/settings",
            Some(json!({ "webhookUrl": "https://example.com/hook" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = ctx
        .call(
            Method::POST,
            "/api/slack/settings",
            Some(json!({
                "webhookUrl": "https://hooks.slack.com/services/T0/B0/abc",
                "staleCardAlerts": true
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["connected"], true);
    assert_eq!(body["stale_card_alerts"], true);

    let sent = ctx.notifier.sent().await;
    assert!(matches!(&sent[0], Message::Slack { .. }));
}

#[tokio::test]
async fn test_email_settings_toggle() {
    let ctx = TestContext::new().await;

    let (status, body) = ctx.call(Method::GET, "/api/email/settings", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "owner@example.com");
    assert_eq!(body["email_notifications"], true);

    let (status, body) = ctx
        .call(
            Method::POST,
            "/api/email/settings",
            Some(json!({ "emailNotifications": false })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email_notifications"], false);
}

#[tokio::test]
async fn test_paddle_webhook_signature() {
    let ctx = TestContext::new().await;
    let payload = json!({ "event_type": "subscription.updated", "data": {} }).to_string();

    let unsigned = Request::builder()
        .method(Method::POST)
        .uri("/api/webhooks/paddle")
        .body(Body::from(payload.clone()))
        .unwrap();
    assert_eq!(ctx.send(unsigned).await.status(), StatusCode::UNAUTHORIZED);

    let ts = Utc::now().timestamp();
    let signature = format!("ts={};h1={}", ts, sign(PADDLE_SECRET, ts, payload.as_bytes()));
    let signed = Request::builder()
        .method(Method::POST)
        .uri("/api/webhooks/paddle")
        .header("paddle-signature", signature)
        .body(Body::from(payload))
        .unwrap();
    let (status, body) = split(ctx.send(signed).await).await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["event_type"], "subscription.updated");
    let events = ctx.store.subscription_events().await;
    assert_eq!(events[0].event_type, "paddle.subscription.updated");
}

#[tokio::test]
async fn test_rate_limit_returns_retry_after() {
    let ctx = TestContext::with_rate_limit(2).await;

    for _ in 0..2 {
        let (status, _) = ctx.call(Method::GET, "/api/boards", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    let response = ctx
        .send(
            Request::builder()
                .uri("/api/boards")
                .header(header::AUTHORIZATION, ctx.user.bearer())
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key(header::RETRY_AFTER));

    // Another user has their own window
    let other = TestUser::new("other@example.com");
    let (status, _) = ctx.call_as(&other, Method::GET, "/api/boards", None).await;
    assert_eq!(status, StatusCode::OK);
}
