pub mod collab;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod relay;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::middleware as axum_middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::Config;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::health::health_check,
        handlers::turn::new_message,
        routes::conversations::list_conversations,
        routes::conversations::get_conversation,
        routes::conversations::list_messages,
        routes::conversations::update_conversation,
        routes::conversations::delete_conversation,
        routes::conversations::delete_all_conversations,
    ),
    components(schemas(
        handlers::turn::NewMessageRequest,
        routes::conversations::UpdateConversationRequest,
    )),
    tags(
        (name = "turns", description = "User turns and answer streaming"),
        (name = "conversations", description = "Conversation maintenance"),
        (name = "messages", description = "Conversation history"),
        (name = "health", description = "Liveness")
    )
)]
pub struct ApiDoc;

/// The full application router. Auth-scoped routes sit behind the session
/// middleware; health and docs stay open.
pub fn build_router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/new-message", post(handlers::turn::new_message))
        .route(
            "/conversations",
            get(routes::conversations::list_conversations)
                .delete(routes::conversations::delete_all_conversations),
        )
        .route(
            "/conversations/:conversation_id",
            get(routes::conversations::get_conversation)
                .patch(routes::conversations::update_conversation)
                .delete(routes::conversations::delete_conversation),
        )
        .route(
            "/conversations/:conversation_id/messages",
            get(routes::conversations::list_messages),
        )
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::session::auth_session,
        ));

    Router::new()
        .route("/health", get(routes::health::health_check))
        .merge(SwaggerUi::new("/api/docs").url("/api/openapi.json", ApiDoc::openapi()))
        .merge(protected)
        .layer(axum_middleware::from_fn(middleware::logging::log_request))
        .layer(TimeoutLayer::new(std::time::Duration::from_secs(300)))
        .layer(CompressionLayer::new())
        .layer(build_cors_layer(&state.config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn build_cors_layer(config: &Config) -> CorsLayer {
    if config.cors.enabled {
        let mut cors = CorsLayer::new()
            .allow_methods([
                axum::http::Method::GET,
                axum::http::Method::POST,
                axum::http::Method::PATCH,
                axum::http::Method::DELETE,
                axum::http::Method::OPTIONS,
            ])
            .allow_headers(Any);

        if config.cors.origins.iter().any(|o| o == "*") {
            cors = cors.allow_origin(Any);
        } else {
            for origin in &config.cors.origins {
                if let Ok(parsed_origin) = origin.parse::<axum::http::HeaderValue>() {
                    cors = cors.allow_origin(parsed_origin);
                }
            }
        }

        cors
    } else {
        CorsLayer::permissive()
    }
}
