mod support;

use std::sync::Arc;

use serde_json::json;
use support::{Harness, ScriptedTransport, error_json, task_json, token_for};
use tasklane_core::client::{ApiClient, Method};
use tasklane_core::error::ApiError;
use tasklane_core::session::{FileTokenStore, RecordingNavigator, Route, Session, TokenStore};
use tempfile::tempdir;

#[tokio::test]
async fn bearer_token_rides_on_every_request() {
    let harness = Harness::signed_in("u1");
    harness.transport.respond(200, task_json("t1", "One", false));

    let task = harness.client.get_task("u1", "t1").await.expect("get task");
    assert_eq!(task.title, "One");

    let request = harness.transport.last_request();
    assert_eq!(request.method, Method::Get);
    assert_eq!(request.path, "/users/u1/tasks/t1");
    assert_eq!(request.bearer, harness.session.token());
    assert_eq!(request.body, None);
}

#[tokio::test]
async fn unauthorized_response_ends_the_session() {
    let harness = Harness::signed_in("u1");
    harness
        .transport
        .respond(401, json!({"detail": "Could not validate credentials"}));

    let err = harness
        .client
        .list_tasks("u1", 1, 10)
        .await
        .expect_err("unauthorized");
    assert!(matches!(err, ApiError::Unauthorized { .. }));
    assert_eq!(
        err.server_message(),
        Some("Could not validate credentials")
    );

    assert!(harness.session.token().is_none());
    assert_eq!(harness.navigator.routes(), vec![Route::SignIn]);
}

#[tokio::test]
async fn unauthorized_clears_the_persisted_token() {
    let temp = tempdir().expect("tempdir");
    let store: Arc<dyn TokenStore> =
        Arc::new(FileTokenStore::open(temp.path()).expect("open token store"));
    store.save(&token_for("u1")).expect("seed token");

    let transport = Arc::new(ScriptedTransport::default());
    let navigator = Arc::new(RecordingNavigator::default());
    let session = Session::restore(store.clone()).expect("restore");
    assert!(session.is_authenticated());
    let client = ApiClient::new(transport.clone(), session.clone(), navigator.clone());

    transport.respond(401, json!({}));
    client
        .delete_task("u1", "t1")
        .await
        .expect_err("unauthorized");

    assert!(store.load().expect("load").is_none());
    assert_eq!(navigator.last(), Some(Route::SignIn));
}

#[tokio::test]
async fn other_rejections_keep_the_session() {
    let harness = Harness::signed_in("u1");
    harness
        .transport
        .respond(403, error_json("FORBIDDEN", "Access denied"));

    let err = harness
        .client
        .get_task("u1", "t1")
        .await
        .expect_err("forbidden");
    assert!(matches!(err, ApiError::ServerRejected { status: 403, .. }));
    assert_eq!(err.server_code(), Some("FORBIDDEN"));
    assert_eq!(err.server_message(), Some("Access denied"));
    assert!(harness.session.is_authenticated());
    assert!(harness.navigator.routes().is_empty());
}

#[tokio::test]
async fn anonymous_endpoint_401_does_not_sign_out() {
    let harness = Harness::signed_in("u1");
    harness.transport.respond(401, json!({}));

    let err = harness
        .client
        .sign_in(&tasklane_shared::Credentials {
            email: "a@example.com".to_string(),
            password: "pw".to_string(),
        })
        .await
        .expect_err("rejected");
    assert!(matches!(err, ApiError::ServerRejected { status: 401, .. }));
    assert!(harness.session.is_authenticated());
    assert!(harness.navigator.routes().is_empty());
}

#[tokio::test]
async fn malformed_success_body_is_reported() {
    let harness = Harness::signed_in("u1");
    harness.transport.respond(200, json!({"unexpected": true}));

    let err = harness
        .client
        .get_task("u1", "t1")
        .await
        .expect_err("bad body");
    assert!(matches!(err, ApiError::Unknown(_)));
    assert!(err.to_string().starts_with("invalid response from server"));
}
