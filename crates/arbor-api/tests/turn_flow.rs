//! End-to-end turn scenarios over the full router: new thread,
//! continuation, missing parent, mid-stream upstream failure, and client
//! disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, Method, StatusCode};
use futures::StreamExt;
use serde_json::Value;
use tower::ServiceExt;

use arbor_persist::ConversationStore;
use arbor_types::ROOT_PARENT;

mod common;
use common::{
    authed_request, sse_payloads, test_app, turn_body, ScriptedGenerator, Step, TEST_USER,
};

async fn read_body(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_new_thread_creates_conversation_and_streams_answer() {
    let generator = ScriptedGenerator::new(vec![Step::Frame("Hello"), Step::Frame(" world")]);
    let (app, store) = test_app(Arc::new(generator));

    let response = app
        .oneshot(authed_request(
            Method::POST,
            "/new-message",
            Some(turn_body("c1", "m1", ROOT_PARENT)),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok()),
        Some("text/event-stream")
    );
    assert_eq!(
        response
            .headers()
            .get(header::CACHE_CONTROL)
            .and_then(|v| v.to_str().ok()),
        Some("no-cache")
    );

    let payloads = sse_payloads(&read_body(response).await);
    assert_eq!(payloads[0], r#"{"type":"meta","conversation_id":"c1"}"#);
    assert_eq!(payloads[1], "Hello");
    assert_eq!(payloads[2], " world");
    assert_eq!(payloads.last().map(String::as_str), Some("[DONE]"));

    // User message persisted as the root of the tree.
    let user_message = store.find_message("c1", "m1").await.unwrap().unwrap();
    assert_eq!(user_message.parent, ROOT_PARENT);
    assert_eq!(user_message.children.len(), 1);

    // Assistant message persisted under it with the accumulated text, and
    // the conversation advanced to it.
    let assistant_id = user_message.children[0].clone();
    let assistant = store
        .find_message("c1", &assistant_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(assistant.message.text, "Hello world");

    let conversation = store.find_conversation(TEST_USER, "c1").await.unwrap().unwrap();
    assert_eq!(conversation.current_node, assistant_id);
    assert_eq!(conversation.title, "New Chat");
}

#[tokio::test]
async fn test_continuation_branches_from_named_parent() {
    let generator = Arc::new(ScriptedGenerator::new(vec![Step::Frame("answer")]));
    let (app, store) = test_app(generator);

    let first = app
        .clone()
        .oneshot(authed_request(
            Method::POST,
            "/new-message",
            Some(turn_body("c1", "m1", ROOT_PARENT)),
        ))
        .await
        .unwrap();
    read_body(first).await;

    let second = app
        .oneshot(authed_request(
            Method::POST,
            "/new-message",
            Some(turn_body("c1", "m2", "m1")),
        ))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    read_body(second).await;

    // m1 now has two children: the first turn's assistant and m2.
    let m1 = store.find_message("c1", "m1").await.unwrap().unwrap();
    assert_eq!(m1.children.len(), 2);
    assert!(m1.children.contains(&"m2".to_string()));

    // current_node is the assistant answer of the second turn.
    let m2 = store.find_message("c1", "m2").await.unwrap().unwrap();
    assert_eq!(m2.children.len(), 1);
    let conversation = store.find_conversation(TEST_USER, "c1").await.unwrap().unwrap();
    assert_eq!(conversation.current_node, m2.children[0]);
}

#[tokio::test]
async fn test_missing_parent_rejects_turn_without_writes() {
    let generator = Arc::new(ScriptedGenerator::new(vec![Step::Frame("answer")]));
    let (app, store) = test_app(generator);

    let first = app
        .clone()
        .oneshot(authed_request(
            Method::POST,
            "/new-message",
            Some(turn_body("c1", "m1", ROOT_PARENT)),
        ))
        .await
        .unwrap();
    read_body(first).await;
    let before = store.find_conversation(TEST_USER, "c1").await.unwrap().unwrap();

    let response = app
        .oneshot(authed_request(
            Method::POST,
            "/new-message",
            Some(turn_body("c1", "m9", "m-ghost")),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(store.find_message("c1", "m9").await.unwrap().is_none());
    let after = store.find_conversation(TEST_USER, "c1").await.unwrap().unwrap();
    assert_eq!(after.current_node, before.current_node);
}

#[tokio::test]
async fn test_continuation_against_unknown_conversation_is_not_found() {
    let generator = Arc::new(ScriptedGenerator::new(vec![Step::Frame("answer")]));
    let (app, _store) = test_app(generator);

    let response = app
        .oneshot(authed_request(
            Method::POST,
            "/new-message",
            Some(turn_body("ghost", "m1", "m0")),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_duplicate_message_id_is_rejected() {
    let generator = Arc::new(ScriptedGenerator::new(vec![Step::Frame("answer")]));
    let (app, store) = test_app(generator);

    let first = app
        .clone()
        .oneshot(authed_request(
            Method::POST,
            "/new-message",
            Some(turn_body("c1", "m1", ROOT_PARENT)),
        ))
        .await
        .unwrap();
    read_body(first).await;

    let response = app
        .oneshot(authed_request(
            Method::POST,
            "/new-message",
            Some(turn_body("c1", "m1", ROOT_PARENT)),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    // Still exactly one m1 plus its assistant answer.
    assert_eq!(store.list_messages("c1").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_upstream_failure_mid_stream_is_reported_in_band() {
    let generator = ScriptedGenerator::new(vec![
        Step::Frame("one"),
        Step::Frame("two"),
        Step::Fail,
    ]);
    let (app, store) = test_app(Arc::new(generator));

    let response = app
        .oneshot(authed_request(
            Method::POST,
            "/new-message",
            Some(turn_body("c1", "m1", ROOT_PARENT)),
        ))
        .await
        .unwrap();

    // The status line was committed before the failure.
    assert_eq!(response.status(), StatusCode::OK);

    let payloads = sse_payloads(&read_body(response).await);
    assert_eq!(payloads[1], "one");
    assert_eq!(payloads[2], "two");
    let error: Value = serde_json::from_str(&payloads[3]).unwrap();
    assert_eq!(error["type"], "error");
    assert!(!payloads.contains(&"[DONE]".to_string()));

    // No assistant message; the conversation stays at the user message.
    let user_message = store.find_message("c1", "m1").await.unwrap().unwrap();
    assert!(user_message.children.is_empty());
    let conversation = store.find_conversation(TEST_USER, "c1").await.unwrap().unwrap();
    assert_eq!(conversation.current_node, "m1");
}

#[tokio::test]
async fn test_client_disconnect_stops_turn_without_persisting_assistant() {
    let generator = ScriptedGenerator::new(vec![Step::Frame("one")]).hanging();
    let (app, store) = test_app(Arc::new(generator));

    let response = app
        .oneshot(authed_request(
            Method::POST,
            "/new-message",
            Some(turn_body("c1", "m1", ROOT_PARENT)),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Read until the first fragment arrives, then drop the body: the
    // drop guard cancels the producer.
    let mut body = response.into_body().into_data_stream();
    let mut seen = String::new();
    while let Some(chunk) = body.next().await {
        seen.push_str(&String::from_utf8(chunk.unwrap().to_vec()).unwrap());
        if seen.contains("data: one") {
            break;
        }
    }
    drop(body);

    tokio::time::sleep(Duration::from_millis(100)).await;

    // The user message is durable; no assistant branch was written.
    let user_message = store.find_message("c1", "m1").await.unwrap().unwrap();
    assert!(user_message.children.is_empty());
    let conversation = store.find_conversation(TEST_USER, "c1").await.unwrap().unwrap();
    assert_eq!(conversation.current_node, "m1");
}

#[tokio::test]
async fn test_turn_requires_session() {
    let generator = Arc::new(ScriptedGenerator::new(vec![Step::Frame("answer")]));
    let (app, _store) = test_app(generator);

    let request = axum::http::Request::builder()
        .uri("/new-message")
        .method(Method::POST)
        .header(header::CONTENT_TYPE, "application/json")
        .body(axum::body::Body::from(
            serde_json::to_vec(&turn_body("c1", "m1", ROOT_PARENT)).unwrap(),
        ))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_empty_text_is_rejected_before_any_write() {
    let generator = Arc::new(ScriptedGenerator::new(vec![Step::Frame("answer")]));
    let (app, store) = test_app(generator);

    let mut body = turn_body("c1", "m1", ROOT_PARENT);
    body["message"]["text"] = Value::String(String::new());

    let response = app
        .oneshot(authed_request(Method::POST, "/new-message", Some(body)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(store.find_message("c1", "m1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_knowledge_base_snapshot_reaches_generation_request() {
    let generator = Arc::new(ScriptedGenerator::new(vec![Step::Frame("answer")]));
    let mut knowledge = common::StaticKnowledge::default();
    knowledge
        .bases
        .insert(7, vec!["101".to_string(), "102".to_string()]);
    let (app, _store) = common::test_app_with_knowledge(generator.clone(), knowledge);

    let mut body = turn_body("c1", "m1", ROOT_PARENT);
    body["base_id"] = Value::from(7);

    let response = app
        .oneshot(authed_request(Method::POST, "/new-message", Some(body)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    read_body(response).await;

    let request = generator.last_request().unwrap();
    assert_eq!(request.conversation_id, "c1");
    assert_eq!(request.current_node, "m1");
    assert_eq!(
        request.doc_ids,
        Some(vec!["101".to_string(), "102".to_string()])
    );
}

#[tokio::test]
async fn test_unknown_knowledge_base_is_not_found() {
    let generator = Arc::new(ScriptedGenerator::new(vec![Step::Frame("answer")]));
    let (app, store) = test_app(generator);

    let mut body = turn_body("c1", "m1", ROOT_PARENT);
    body["base_id"] = Value::from(99);

    let response = app
        .oneshot(authed_request(Method::POST, "/new-message", Some(body)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    // Rejected before any tree mutation.
    assert!(store.find_message("c1", "m1").await.unwrap().is_none());
}
