//! Client-side synchronization layer.
//!
//! Reads are cached under a [`QueryKey`]. Mutations mark the keys they affect
//! stale through the central table in [`invalidation`], so the next read of
//! such a key goes back to the backend.

mod client;
mod hooks;
mod infinite;
pub mod invalidation;

pub use client::{QueryClient, QuerySnapshot};
pub use hooks::Queries;
pub use infinite::{InfinitePosts, InfiniteSnapshot, PageParam};
pub use invalidation::{MutationKind, Target};

use crate::models::{Post, User};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    RecentPosts,
    InfinitePosts,
    PostById(String),
    SearchPosts(String),
    CurrentUser,
    Users,
    SavedPosts(String),
}

/// A key with its parameter erased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum KeyFamily {
    RecentPosts,
    InfinitePosts,
    PostById,
    SearchPosts,
    CurrentUser,
    Users,
    SavedPosts,
}

impl QueryKey {
    pub fn family(&self) -> KeyFamily {
        match self {
            QueryKey::RecentPosts => KeyFamily::RecentPosts,
            QueryKey::InfinitePosts => KeyFamily::InfinitePosts,
            QueryKey::PostById(_) => KeyFamily::PostById,
            QueryKey::SearchPosts(_) => KeyFamily::SearchPosts,
            QueryKey::CurrentUser => KeyFamily::CurrentUser,
            QueryKey::Users => KeyFamily::Users,
            QueryKey::SavedPosts(_) => KeyFamily::SavedPosts,
        }
    }

    /// The same family narrowed to one parameter, when the family has one.
    pub fn with_subject(family: KeyFamily, subject: &str) -> Option<QueryKey> {
        match family {
            KeyFamily::PostById => Some(QueryKey::PostById(subject.to_string())),
            KeyFamily::SearchPosts => Some(QueryKey::SearchPosts(subject.to_string())),
            KeyFamily::SavedPosts => Some(QueryKey::SavedPosts(subject.to_string())),
            _ => None,
        }
    }
}

/// What a cache entry holds.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryData {
    Posts(Vec<Post>),
    Post(Post),
    User(User),
    Users(Vec<User>),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
    #[default]
    Idle,
    Fetching,
    Fulfilled,
    Failed,
}

/// Outcome of a typed read.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult<T> {
    /// The query's guard held it back; no request was made.
    Disabled,
    Failed,
    Ready(T),
}

impl<T> QueryResult<T> {
    pub fn ready(self) -> Option<T> {
        match self {
            QueryResult::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_disabled(&self) -> bool {
        matches!(self, QueryResult::Disabled)
    }
}
