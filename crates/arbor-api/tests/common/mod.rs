//! Shared fixtures: in-memory store, static collaborator fakes, and a
//! scripted generator standing in for the gRPC service.

// Each test binary compiles this module; not all of them use every fixture.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request};
use axum::Router;
use serde_json::{json, Value};

use arbor_api::collab::{KnowledgeResolver, SessionVerifier};
use arbor_api::config::{
    CollaboratorConfig, Config, CorsConfig, LoggingConfig, MongoDbConfig, RelayConfig,
    ServerConfig, UpstreamConfig,
};
use arbor_api::state::AppState;
use arbor_api::build_router;
use arbor_gen::{FrameStream, GenError, GenRequest, Generator};
use arbor_persist::MemoryStore;

pub const TEST_TOKEN: &str = "session-token-1";
pub const TEST_USER: i64 = 42;

pub fn test_config() -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        cors: CorsConfig {
            enabled: false,
            origins: vec![],
        },
        mongodb: MongoDbConfig {
            database: "test".to_string(),
        },
        upstream: UpstreamConfig {
            endpoint: "http://localhost:50051".to_string(),
            connect_timeout_ms: 1000,
        },
        relay: RelayConfig {
            channel_capacity: 4,
            turn_timeout_secs: 5,
        },
        collaborator: CollaboratorConfig {
            base_url: "http://localhost:9000".to_string(),
            timeout_ms: 1000,
        },
        logging: LoggingConfig {
            level: "debug".to_string(),
            format: "pretty".to_string(),
        },
        mongodb_uri: String::new(),
    }
}

/// Accepts exactly `TEST_TOKEN` as `TEST_USER`.
pub struct StaticSessions;

#[async_trait]
impl SessionVerifier for StaticSessions {
    async fn verify(&self, token: &str) -> anyhow::Result<Option<i64>> {
        Ok((token == TEST_TOKEN).then_some(TEST_USER))
    }
}

#[derive(Default)]
pub struct StaticKnowledge {
    pub bases: HashMap<i64, Vec<String>>,
}

#[async_trait]
impl KnowledgeResolver for StaticKnowledge {
    async fn enabled_doc_ids(&self, _user_id: i64, base_id: i64) -> anyhow::Result<Option<Vec<String>>> {
        Ok(self.bases.get(&base_id).cloned())
    }
}

#[derive(Clone)]
pub enum Step {
    Frame(&'static str),
    Fail,
}

/// Generator whose streams replay a fixed script; optionally hangs after the
/// script so cancellation paths can be exercised. Remembers the last request
/// so tests can assert what the backend sent upstream.
pub struct ScriptedGenerator {
    steps: Vec<Step>,
    hang_after: bool,
    last_request: std::sync::Mutex<Option<GenRequest>>,
}

impl ScriptedGenerator {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps,
            hang_after: false,
            last_request: std::sync::Mutex::new(None),
        }
    }

    pub fn hanging(mut self) -> Self {
        self.hang_after = true;
        self
    }

    pub fn last_request(&self) -> Option<GenRequest> {
        self.last_request.lock().unwrap().clone()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn open_stream(&self, request: GenRequest) -> Result<FrameStream, GenError> {
        *self.last_request.lock().unwrap() = Some(request);
        let steps = self.steps.clone();
        let hang_after = self.hang_after;
        Ok(Box::pin(async_stream::stream! {
            for step in steps {
                match step {
                    Step::Frame(text) => yield Ok(text.to_string()),
                    Step::Fail => {
                        yield Err(GenError::Transport(tonic::Status::internal("boom")));
                        return;
                    }
                }
            }
            if hang_after {
                futures::future::pending::<()>().await;
            }
        }))
    }
}

pub fn test_app(generator: Arc<dyn Generator>) -> (Router, Arc<MemoryStore>) {
    test_app_with_knowledge(generator, StaticKnowledge::default())
}

pub fn test_app_with_knowledge(
    generator: Arc<dyn Generator>,
    knowledge: StaticKnowledge,
) -> (Router, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let state = Arc::new(AppState::new(
        test_config(),
        store.clone(),
        generator,
        Arc::new(StaticSessions),
        Arc::new(knowledge),
    ));
    (build_router(state), store)
}

pub fn turn_body(conversation_id: &str, message_id: &str, parent: &str) -> Value {
    json!({
        "action": "next",
        "message": {
            "author_role": "user",
            "content_type": "text",
            "text": format!("text of {message_id}"),
        },
        "message_id": message_id,
        "conversation_id": conversation_id,
        "parent": parent,
        "model": "auto",
        "use_deep_think": false,
    })
}

pub fn authed_request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .uri(uri)
        .method(method)
        .header(header::AUTHORIZATION, TEST_TOKEN);
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// The `data:` payloads of an SSE body, in order.
pub fn sse_payloads(body: &str) -> Vec<String> {
    body.split("\n\n")
        .filter_map(|event| event.trim().strip_prefix("data: ").map(str::to_string))
        .collect()
}
