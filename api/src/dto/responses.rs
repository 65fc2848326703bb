use crate::{
    models::{Post, User},
    query::{InfiniteSnapshot, QueryResult},
};
use serde::Serialize;

/// Where the client should go after a successful auth form.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: User,
    pub redirect: &'static str,
}

#[derive(Debug, Serialize)]
pub struct FormPage {
    pub form: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HomeView {
    pub user: User,
    pub posts: Vec<Post>,
}

/// What the search panel shows.
#[derive(Debug, PartialEq, Serialize)]
#[serde(tag = "state", content = "posts", rename_all = "camelCase")]
pub enum SearchView {
    /// Empty term: neither a spinner nor "no results".
    Idle,
    NoResults,
    Results(Vec<Post>),
    Failed,
}

impl From<QueryResult<Vec<Post>>> for SearchView {
    fn from(result: QueryResult<Vec<Post>>) -> Self {
        match result {
            QueryResult::Disabled => SearchView::Idle,
            QueryResult::Failed => SearchView::Failed,
            QueryResult::Ready(posts) if posts.is_empty() => SearchView::NoResults,
            QueryResult::Ready(posts) => SearchView::Results(posts),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "mode", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ExploreView {
    Search { term: String, search: SearchView },
    Feed { feed: InfiniteSnapshot, has_next_page: bool },
}

impl ExploreView {
    pub fn feed(feed: InfiniteSnapshot) -> Self {
        let has_next_page = feed.has_next_page();
        ExploreView::Feed { feed, has_next_page }
    }
}

#[derive(Debug, Serialize)]
pub struct PostsView {
    pub posts: Vec<Post>,
}

#[derive(Debug, Serialize)]
pub struct UsersView {
    pub users: Vec<User>,
}

/// Initial values of the edit form.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditPostView {
    pub post_id: String,
    pub caption: String,
    pub tags: String,
    pub image_url: String,
}

impl From<Post> for EditPostView {
    fn from(post: Post) -> Self {
        Self {
            post_id: post.id,
            caption: post.caption,
            tags: post.tags.join(","),
            image_url: post.image_url,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostDetailView {
    pub post: Post,
    pub liked: bool,
    pub saved: bool,
    pub is_creator: bool,
}
