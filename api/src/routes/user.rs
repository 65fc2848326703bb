use crate::{
    dto::{AuthResponse, FormPage, SignInForm, SignUpForm, UsersView},
    errors::ApiError,
    query::QueryResult,
    states::AppState,
};
use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Redirect, Response},
};

/// GET /sign-in
/// Already signed in: redirect to `/`.
pub async fn sign_in_page(State(state): State<AppState>) -> Response {
    if state.session.is_authenticated() {
        return Redirect::to("/").into_response();
    }
    Json(FormPage { form: "sign-in" }).into_response()
}

/// GET /sign-up
pub async fn sign_up_page(State(state): State<AppState>) -> Response {
    if state.session.is_authenticated() {
        return Redirect::to("/").into_response();
    }
    Json(FormPage { form: "sign-up" }).into_response()
}

/// POST /sign-up
/// Body: { "name": "...", "username": "...", "email": "...", "password": "..." }
pub async fn sign_up(
    State(state): State<AppState>,
    Json(payload): Json<SignUpForm>,
) -> Result<Json<AuthResponse>, ApiError> {
    let user = state.session.sign_up(&payload).await?;

    Ok(Json(AuthResponse { user, redirect: "/" }))
}

/// POST /sign-in
/// Body: { "email": "...", "password": "..." }
pub async fn sign_in(
    State(state): State<AppState>,
    Json(payload): Json<SignInForm>,
) -> Result<Json<AuthResponse>, ApiError> {
    let user = state.session.sign_in(&payload).await?;

    Ok(Json(AuthResponse { user, redirect: "/" }))
}

/// POST /sign-out
pub async fn sign_out(State(state): State<AppState>) -> Result<Redirect, ApiError> {
    state.session.sign_out().await?;
    Ok(Redirect::to("/sign-in"))
}

/// GET /all-users
pub async fn all_users(State(state): State<AppState>) -> Result<Json<UsersView>, ApiError> {
    match state.queries().users().await {
        QueryResult::Ready(users) => Ok(Json(UsersView { users })),
        _ => Err(ApiError::RetryLater("Could not load people. Please try again.".into())),
    }
}
