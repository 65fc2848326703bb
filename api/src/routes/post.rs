use crate::{
    dto::{
        EditPostView, ExploreParams, ExploreView, HomeView, PostDetailView, PostForm, PostsView,
        SearchView,
    },
    errors::ApiError,
    models::{NewPost, Post, UpdatePost, User},
    query::QueryResult,
    states::AppState,
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use tracing::{info, warn};

const RETRY: &str = "Please try again.";

fn retry() -> ApiError {
    ApiError::RetryLater(RETRY.into())
}

/// The signed-in user as the query layer currently knows them, saves included.
async fn current_user(state: &AppState) -> Result<User, ApiError> {
    state
        .queries()
        .current_user()
        .await
        .ready()
        .or_else(|| state.session.user())
        .ok_or(ApiError::Unauthorized)
}

async fn find_post(state: &AppState, id: &str) -> Result<Post, ApiError> {
    match state.queries().post_by_id(id).await {
        QueryResult::Ready(post) => Ok(post),
        // The gateway does not tell "missing" from "unreachable".
        _ => Err(ApiError::NotFound),
    }
}

/// Loads the post and checks that `user` created it.
async fn own_post(state: &AppState, user: &User, id: &str) -> Result<Post, ApiError> {
    let post = find_post(state, id).await?;
    if post.creator_id != user.id {
        warn!(post_id = %id, user_id = %user.id, "Not the creator");
        return Err(ApiError::Unauthorized);
    }
    Ok(post)
}

/// GET /
pub async fn home(State(state): State<AppState>) -> Result<Json<HomeView>, ApiError> {
    let user = current_user(&state).await?;
    let posts = state.queries().recent_posts().await.ready().ok_or_else(retry)?;

    Ok(Json(HomeView { user, posts }))
}

/// GET /explore?q=
/// With a term: search results. Without: the paginated feed.
pub async fn explore(
    State(state): State<AppState>,
    Query(params): Query<ExploreParams>,
) -> Json<ExploreView> {
    let term = params.q.trim().to_string();

    if term.is_empty() {
        return Json(ExploreView::feed(state.queries().infinite_posts().await));
    }

    let search = SearchView::from(state.queries().search_posts(&term).await);
    Json(ExploreView::Search { term, search })
}

/// POST /explore/next
pub async fn explore_next(State(state): State<AppState>) -> Json<ExploreView> {
    Json(ExploreView::feed(state.queries().fetch_next_posts_page().await))
}

/// GET /saved
pub async fn saved(State(state): State<AppState>) -> Result<Json<PostsView>, ApiError> {
    let user = current_user(&state).await?;
    let posts = state
        .queries()
        .saved_posts(&user.id)
        .await
        .ready()
        .ok_or_else(retry)?;

    Ok(Json(PostsView { posts }))
}

/// POST /create-post
/// Body: { "caption": "...", "tags": "a,b", "file": [{ "name", "contentType", "data" }] }
pub async fn create_post(
    State(state): State<AppState>,
    Json(payload): Json<PostForm>,
) -> Result<(StatusCode, Json<Post>), ApiError> {
    let files = payload.checked_files().map_err(ApiError::ValidationError)?;
    let user = current_user(&state).await?;

    let new_post = NewPost {
        user_id: user.id.clone(),
        caption: payload.caption,
        tags: payload.tags,
        files,
    };
    let post = state
        .queries()
        .create_post(&new_post)
        .await
        .ok_or_else(retry)?;

    Ok((StatusCode::CREATED, Json(post)))
}

/// GET /update-post/{id}
pub async fn edit_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<EditPostView>, ApiError> {
    let user = current_user(&state).await?;
    let post = own_post(&state, &user, &id).await?;

    Ok(Json(post.into()))
}

/// POST /update-post/{id}
/// Body as for `/create-post`; an empty file list keeps the current image.
pub async fn update_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<PostForm>,
) -> Result<Json<Post>, ApiError> {
    let files = payload.checked_files().map_err(ApiError::ValidationError)?;
    let user = current_user(&state).await?;
    let post = own_post(&state, &user, &id).await?;

    let update = UpdatePost {
        post_id: post.id,
        caption: payload.caption,
        tags: payload.tags,
        image_id: post.image_id,
        image_url: post.image_url,
        files,
    };
    let updated = state
        .queries()
        .update_post(&update)
        .await
        .ok_or_else(retry)?;

    info!("Post updated: {} by user {}", updated.id, user.id);

    Ok(Json(updated))
}

/// GET /posts/{id}
pub async fn post_details(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PostDetailView>, ApiError> {
    let user = current_user(&state).await?;
    let post = find_post(&state, &id).await?;

    Ok(Json(PostDetailView {
        liked: post.is_liked_by(&user.id),
        saved: user.saved_record_for(&post.id).is_some(),
        is_creator: post.creator_id == user.id,
        post,
    }))
}

/// DELETE /posts/{id}
/// Creator only.
pub async fn delete_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let user = current_user(&state).await?;
    let post = own_post(&state, &user, &id).await?;

    state
        .queries()
        .delete_post(&post.id, &post.image_id)
        .await
        .ok_or_else(retry)?;

    Ok(StatusCode::NO_CONTENT)
}

/// POST /posts/{id}/like
/// Toggles the current user in the post's likes.
pub async fn like_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Post>, ApiError> {
    let user = current_user(&state).await?;
    let post = find_post(&state, &id).await?;

    let likes = post.toggled_likes(&user.id);
    let liked = state
        .queries()
        .like_post(&post.id, &likes)
        .await
        .ok_or_else(retry)?;

    Ok(Json(liked))
}

/// POST /posts/{id}/save
pub async fn save_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let user = current_user(&state).await?;
    if user.saved_record_for(&id).is_some() {
        return Ok(StatusCode::NO_CONTENT);
    }

    state
        .queries()
        .save_post(&user.id, &id)
        .await
        .ok_or_else(retry)?;

    Ok(StatusCode::CREATED)
}

/// DELETE /posts/{id}/save
pub async fn unsave_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let user = current_user(&state).await?;
    let record = user.saved_record_for(&id).ok_or(ApiError::NotFound)?;

    state
        .queries()
        .delete_saved_post(&record.id)
        .await
        .ok_or_else(retry)?;

    Ok(StatusCode::NO_CONTENT)
}
