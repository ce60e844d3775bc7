//! 节点层集成测试：会话管理 + 签名客户端 + 限流 + 会话存储，对接模拟的 bunq 服务

use bunqflow_core::signer;
use bunqflow_core::HttpMethod;
use bunqflow_credential::{MemorySessionStore, SqliteSessionStore};
use bunqflow_lib::{
    accounts, callbacks, payments, run_items, Amount, BunqError, ExecutionContext, ItemOutcome,
    NotificationFilter, PageOptions, PaymentRequest, Pointer,
};
use bunqflow_providers::client::{HEADER_AUTHENTICATION, HEADER_SIGNATURE};
use bunqflow_providers::rate_limit::normalize_path;
use bunqflow_providers::testing::{
    error_response, fake_client, json_response, test_credential, FakeBunq,
};
use bunqflow_providers::transport::{TransportRequest, TransportResponse};
use bunqflow_providers::SessionManager;
use serde_json::{json, Value};
use std::sync::Arc;

const USER: i64 = 4242;

/// 模拟业务接口
fn business(request: &TransportRequest) -> TransportResponse {
    let path = normalize_path(&request.url);
    match (request.method, path.as_str()) {
        (HttpMethod::Get, "/user/4242/monetary-account") => json_response(
            200,
            json!({
                "Response": [
                    {"MonetaryAccountBank": {"id": 10, "description": "Main", "status": "ACTIVE", "currency": "EUR",
                        "balance": {"value": "120.50", "currency": "EUR"}}},
                    {"MonetaryAccountSavings": {"id": 11, "description": "Savings", "status": "ACTIVE", "currency": "EUR"}}
                ],
                "Pagination": {"older_url": null}
            }),
        ),
        (HttpMethod::Get, "/user/4242/monetary-account/10/payment") => {
            if request.url.contains("older_id=") {
                json_response(
                    200,
                    json!({
                        "Response": [{"Payment": {"id": 1, "created": "2026-10-01 08:00:00.000000",
                            "amount": {"value": "-3.00", "currency": "EUR"}, "description": "coffee"}}],
                        "Pagination": {"older_url": null}
                    }),
                )
            } else {
                json_response(
                    200,
                    json!({
                        "Response": [
                            {"Payment": {"id": 3, "created": "2026-10-18 08:00:00.000000",
                                "amount": {"value": "-12.00", "currency": "EUR"}, "description": "lunch", "type": "BUNQ"}},
                            {"Payment": {"id": 2, "created": "2026-10-10 08:00:00.000000",
                                "amount": {"value": "250.00", "currency": "EUR"}, "description": "salary"}}
                        ],
                        "Pagination": {"older_url": "/v1/user/4242/monetary-account/10/payment?count=200&older_id=2"}
                    }),
                )
            }
        }
        (HttpMethod::Post, "/user/4242/monetary-account/10/payment") => {
            json_response(200, json!({"Response": [{"Id": {"id": 501}}]}))
        }
        (HttpMethod::Get, "/user/4242/notification-filter-url") => json_response(
            200,
            json!({
                "Response": [
                    {"NotificationFilterUrl": {"category": "PAYMENT", "notification_target": "https://hooks.example.com/a"}},
                    {"NotificationFilterUrl": {"category": "MUTATION", "notification_target": "https://hooks.example.com/b"}}
                ]
            }),
        ),
        (HttpMethod::Post, "/user/4242/notification-filter-url") => {
            json_response(200, json!({"Response": []}))
        }
        _ => error_response(404, "Route not found."),
    }
}

fn setup(identity: &str) -> (ExecutionContext, Arc<FakeBunq>) {
    let fake = Arc::new(FakeBunq::new().with_fallback(business));
    let (client, _) = fake_client(fake.clone());
    let sessions = Arc::new(SessionManager::new(Arc::new(MemorySessionStore::new()), client));
    (ExecutionContext::new(test_credential(identity), sessions), fake)
}

fn business_requests(fake: &FakeBunq) -> Vec<TransportRequest> {
    fake.requests()
        .into_iter()
        .filter(|r| normalize_path(&r.url).starts_with("/user/"))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_operations_share_one_handshake() {
    let (ctx, fake) = setup("it-share");

    let accounts = accounts::list_monetary_accounts(&ctx, &PageOptions::default())
        .await
        .unwrap();
    assert_eq!(accounts.len(), 2);
    assert_eq!(accounts[0].balance, Some(Amount::eur("120.50")));

    let payments = payments::list_payments(&ctx, 10, &PageOptions::default())
        .await
        .unwrap();
    let ids: Vec<i64> = payments.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![3, 2, 1]);
    assert_eq!(payments[0].payment_type.as_deref(), Some("BUNQ"));

    assert_eq!(fake.handshake_calls(), 3);
    let session = ctx.session().await.unwrap();
    for request in business_requests(&fake) {
        assert_eq!(
            request.header(HEADER_AUTHENTICATION),
            Some(session.session_token.as_str())
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_create_payment_is_signed() {
    let (ctx, fake) = setup("it-payment");
    let request = PaymentRequest {
        amount: Amount::eur("5.00"),
        counterparty_alias: Pointer::iban("NL02BUNQ0000000000", "Test Person"),
        description: "invoice 7".to_string(),
    };

    let id = payments::create_payment(&ctx, 10, &request).await.unwrap();
    assert_eq!(id, 501);

    let post = business_requests(&fake)
        .into_iter()
        .find(|r| r.method == HttpMethod::Post)
        .unwrap();
    let body = post.body.as_deref().unwrap();
    let signature = post.header(HEADER_SIGNATURE).unwrap();
    assert!(signer::verify(body, signature, ctx.credential().public_key_pem()).unwrap());

    let sent: Value = serde_json::from_slice(body).unwrap();
    assert_eq!(sent["amount"]["value"], "5.00");
    assert_eq!(sent["counterparty_alias"]["type"], "IBAN");
}

#[tokio::test(start_paused = true)]
async fn test_remove_callback_url_is_idempotent() {
    let (ctx, fake) = setup("it-callbacks");

    let removed = callbacks::remove_callback_url(&ctx, "https://hooks.example.com/missing")
        .await
        .unwrap();
    assert!(!removed);
    assert!(business_requests(&fake)
        .iter()
        .all(|r| r.method == HttpMethod::Get));

    let removed = callbacks::remove_callback_url(&ctx, "https://hooks.example.com/a")
        .await
        .unwrap();
    assert!(removed);
    let post = business_requests(&fake)
        .into_iter()
        .find(|r| r.method == HttpMethod::Post)
        .unwrap();
    let body: Value = serde_json::from_slice(post.body.as_deref().unwrap()).unwrap();
    let remaining: Vec<NotificationFilter> =
        serde_json::from_value(body["notification_filters"].clone()).unwrap();
    assert_eq!(
        remaining,
        vec![NotificationFilter::url("MUTATION", "https://hooks.example.com/b")]
    );
}

#[tokio::test(start_paused = true)]
async fn test_remove_callback_tolerates_not_found() {
    let (ctx, fake) = setup("it-callbacks-404");
    ctx.session().await.unwrap();
    fake.inject(
        "/user/4242/notification-filter-url",
        json_response(
            200,
            json!({"Response": [{"NotificationFilterUrl": {"category": "PAYMENT", "notification_target": "https://x"}}]}),
        ),
    );
    fake.inject(
        "/user/4242/notification-filter-url",
        error_response(404, "Not found."),
    );

    let removed = callbacks::remove_callback_url(&ctx, "https://x").await.unwrap();
    assert!(!removed);
}

#[tokio::test(start_paused = true)]
async fn test_batch_continue_on_fail() {
    let (ctx, fake) = setup("it-batch");
    ctx.session().await.unwrap();
    fake.inject(
        "/user/4242/monetary-account/10/payment",
        error_response(400, "Insufficient balance."),
    );

    let request = PaymentRequest {
        amount: Amount::eur("1.00"),
        counterparty_alias: Pointer::iban("NL02BUNQ0000000000", "Test Person"),
        description: "batch".to_string(),
    };
    let outcomes = run_items(vec![10, 10, 10], true, |_, account| {
        let ctx = ctx.clone();
        let request = request.clone();
        async move { payments::create_payment(&ctx, account, &request).await }
    })
    .await
    .unwrap();

    assert_eq!(outcomes.len(), 3);
    match &outcomes[0] {
        ItemOutcome::Failed { error, .. } => {
            let failure = error.api_failure().unwrap();
            assert_eq!(failure.status_code, 400);
            assert_eq!(failure.message, "Insufficient balance.");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(outcomes[1].is_success());
    assert!(outcomes[2].is_success());
}

#[tokio::test(start_paused = true)]
async fn test_get_calls_are_throttled_per_credential() {
    let (ctx, _) = setup("it-throttle");
    ctx.session().await.unwrap();

    let start = tokio::time::Instant::now();
    let page = PageOptions::default();
    let calls = (0..4).map(|_| accounts::list_monetary_accounts(&ctx, &page));
    for result in futures::future::join_all(calls).await {
        assert_eq!(result.unwrap().len(), 2);
    }
    assert!(start.elapsed() >= std::time::Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn test_sqlite_store_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sessions.db");
    let fake = Arc::new(FakeBunq::new().with_fallback(business));
    let credential = test_credential("it-sqlite");

    let first = {
        let (client, _) = fake_client(fake.clone());
        let store = Arc::new(SqliteSessionStore::open(&path).unwrap());
        SessionManager::new(store, client)
            .ensure_session(&credential, false)
            .await
            .unwrap()
    };

    let (client, _) = fake_client(fake.clone());
    let store = Arc::new(SqliteSessionStore::open(&path).unwrap());
    let second = SessionManager::new(store, client)
        .ensure_session(&credential, false)
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(fake.handshake_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_handshake_failure_surfaces_to_operation() {
    let (ctx, fake) = setup("it-handshake-fail");
    fake.inject("/installation", error_response(503, "Service unavailable."));

    let err = accounts::list_monetary_accounts(&ctx, &PageOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, BunqError::ApiCallFailed(_)));
    assert!(err.is_retryable());
    assert!(business_requests(&fake).is_empty());
}
