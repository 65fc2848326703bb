mod health;
mod post;
mod user;

use crate::{errors::ApiError, states::AppState};
use axum::{
    Router,
    extract::{Request, State},
    middleware::{self, Next},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use tower::limit::ConcurrencyLimitLayer;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, warn};

/// Builds the full route surface.
///
/// Private routes sit behind [`require_session`]; everything sits behind the
/// global rate limit and a cap on concurrent requests.
pub fn router(state: AppState, max_concurrent_requests: usize) -> Router {
    // Configure CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let private = Router::new()
        .route("/", get(post::home))
        .route("/explore", get(post::explore))
        .route("/explore/next", post(post::explore_next))
        .route("/saved", get(post::saved))
        .route("/all-users", get(user::all_users))
        .route("/create-post", post(post::create_post))
        .route(
            "/update-post/{id}",
            get(post::edit_post).post(post::update_post),
        )
        .route("/posts/{id}", get(post::post_details).delete(post::delete_post))
        .route("/posts/{id}/like", post(post::like_post))
        .route(
            "/posts/{id}/save",
            post(post::save_post).delete(post::unsave_post),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_session));

    Router::new()
        // Public routes
        .route("/health", get(health::health_check))
        .route("/sign-in", get(user::sign_in_page).post(user::sign_in))
        .route("/sign-up", get(user::sign_up_page).post(user::sign_up))
        .route("/sign-out", post(user::sign_out))
        .merge(private)
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit))
        .with_state(state)
        .layer(cors)
        .layer(ConcurrencyLimitLayer::new(max_concurrent_requests))
        .layer(TraceLayer::new_for_http())
}

/// Sends anyone without an authenticated session to `/sign-in`.
async fn require_session(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if state.session.is_authenticated() {
        return next.run(request).await;
    }

    debug!(path = %request.uri().path(), "No session, redirecting to sign-in");
    Redirect::to("/sign-in").into_response()
}

async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if state.limiter.check().is_err() {
        warn!(path = %request.uri().path(), "Rate limit exceeded");
        return ApiError::RateLimited.into_response();
    }

    next.run(request).await
}
