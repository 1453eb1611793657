pub mod auth;
pub mod error;
mod events;
mod group_messages;
mod messages;
pub mod rate_limit;
mod registrations;
mod users;
mod validation;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let auth_routes = Router::new()
        .route(
            "/register",
            post(auth::register).layer(middleware::from_fn_with_state(
                state.clone(),
                rate_limit::limit_register,
            )),
        )
        .route(
            "/login",
            post(auth::login).layer(middleware::from_fn_with_state(
                state.clone(),
                rate_limit::limit_login,
            )),
        )
        .route("/refresh-token", post(auth::refresh_token))
        .route("/logout", post(auth::logout))
        .route("/forgot-password", post(auth::forgot_password))
        .route("/reset-password", post(auth::reset_password))
        .route("/me", get(users::me))
        .route("/me", put(users::update_profile))
        .route("/admin/users", get(users::admin_list_users))
        .route("/admin/users/:id", put(users::admin_update_user))
        .route("/admin/users/:id", delete(users::admin_delete_user));

    let event_routes = Router::new()
        .route("/", get(events::list_events))
        .route("/", post(events::create_event))
        .route("/registered/me", get(events::registered_events))
        .route("/hosted/me", get(events::hosted_events))
        .route("/:id", get(events::get_event))
        .route("/:id", put(events::update_event))
        .route("/:id", delete(events::delete_event))
        .route("/:id/register", post(registrations::register))
        .route("/:id/register", delete(registrations::deregister))
        .route("/:id/attendees", get(registrations::list_attendees))
        .route(
            "/:id/attendees/:user_id",
            put(registrations::update_attendee_status),
        );

    let message_routes = Router::new()
        .route("/", post(messages::send))
        .route("/unread/count", get(messages::unread_count))
        .route("/conversations/me", get(messages::conversations))
        .route(
            "/group/:event_id/:time_slot_id",
            get(group_messages::history).post(group_messages::send),
        )
        .route(
            "/group/:event_id/:time_slot_id/members",
            get(group_messages::members),
        )
        .route("/:other_user_id", get(messages::thread));

    // Uploads are multipart with several files per request
    let upload_limit =
        state.config.storage.max_file_bytes * state.config.storage.max_files + 64 * 1024;

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/auth", auth_routes)
        .nest("/api/events", event_routes)
        .nest("/api/messages", message_routes)
        .nest_service(
            "/media",
            ServeDir::new(&state.config.storage.media_dir),
        )
        .layer(DefaultBodyLimit::max(upload_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
