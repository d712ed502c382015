//! Router assembly. `/health` is open; everything under `/api/v1` passes the
//! bearer-auth middleware.

pub mod agents;
pub mod analytics;
pub mod decay;
pub mod edges;
pub mod health;
pub mod items;
pub mod keys;
pub mod search;
pub mod sessions;

use axum::middleware;
use axum::routing::{delete, get, patch, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use crate::auth;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        // Agents
        .route("/agents", post(agents::create).get(agents::list))
        .route("/agents/{id}", get(agents::get).patch(agents::update))
        .route("/agents/{id}/core-memory", patch(agents::core_memory))
        // API keys
        .route("/keys", post(keys::create).get(keys::list))
        .route("/keys/{id}", delete(keys::revoke))
        // Sessions & the ingestion hot path
        .route("/sessions", post(sessions::create).get(sessions::list))
        .route("/sessions/{id}", get(sessions::get))
        .route(
            "/sessions/{id}/messages",
            post(sessions::add_message).get(sessions::list_messages),
        )
        .route("/sessions/{id}/end", post(sessions::end))
        // Typed memory items
        .route("/facts", post(items::create_fact).get(items::list_facts))
        .route(
            "/facts/{id}",
            get(items::get_fact).put(items::update_fact).delete(items::delete_fact),
        )
        .route(
            "/decisions",
            post(items::create_decision).get(items::list_decisions),
        )
        .route(
            "/decisions/{id}",
            get(items::get_decision)
                .put(items::update_decision)
                .delete(items::delete_decision),
        )
        .route("/tasks", post(items::create_task).get(items::list_tasks))
        .route(
            "/tasks/{id}",
            get(items::get_task).put(items::update_task).delete(items::delete_task),
        )
        .route("/events", post(items::create_event).get(items::list_events))
        .route(
            "/events/{id}",
            get(items::get_event).put(items::update_event).delete(items::delete_event),
        )
        .route(
            "/projects",
            post(items::create_project).get(items::list_projects),
        )
        .route(
            "/projects/{id}",
            get(items::get_project)
                .put(items::update_project)
                .delete(items::delete_project),
        )
        // Retrieval
        .route("/search", post(search::search))
        .route("/recall", post(search::recall))
        // Edge graph
        .route("/edges", post(edges::create).get(edges::list))
        .route("/edges/graph/{node_type}/{id}", get(edges::graph))
        .route("/edges/{id}", delete(edges::remove))
        // Decay
        .route("/decay/status", get(decay::status))
        .route("/decay/sweep", post(decay::sweep))
        // Analytics
        .route("/analytics/queries", get(analytics::queries))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ));

    Router::new()
        .route("/health", get(health::health))
        .nest("/api/v1", api)
        .layer(
            ServiceBuilder::new()
                .concurrency_limit(64)
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
