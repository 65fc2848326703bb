//! Cursor-paginated explore feed.

use super::QueryStatus;
use crate::models::Post;
use serde::Serialize;
use std::{
    future::Future,
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
};
use tokio::sync::Mutex;
use tracing::debug;

/// Where the next page starts.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "kind", content = "cursor", rename_all = "camelCase")]
pub enum PageParam {
    /// Nothing fetched yet.
    #[default]
    Initial,
    /// After the post with this id.
    After(String),
    /// An empty page came back; there is nothing more to ask for.
    Exhausted,
}

impl PageParam {
    /// Token following `page`: its last post's id, or `Exhausted` when empty.
    pub fn after(page: &[Post]) -> Self {
        match page.last() {
            Some(post) => PageParam::After(post.id.clone()),
            None => PageParam::Exhausted,
        }
    }

    fn cursor(&self) -> Option<String> {
        match self {
            PageParam::After(id) => Some(id.clone()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InfiniteSnapshot {
    pub pages: Vec<Vec<Post>>,
    pub next: PageParam,
    pub status: QueryStatus,
    pub stale: bool,
}

impl InfiniteSnapshot {
    pub fn posts(&self) -> impl Iterator<Item = &Post> {
        self.pages.iter().flatten()
    }

    pub fn has_next_page(&self) -> bool {
        self.next != PageParam::Exhausted
    }
}

#[derive(Default)]
struct State {
    /// Non-empty pages, in fetch order.
    pages: Vec<Vec<Post>>,
    next: PageParam,
    status: QueryStatus,
}

/// Pages are fetched one at a time under a lock. A caller that queued behind
/// another fetch of the same next page gets that page instead of a second
/// request.
#[derive(Default)]
pub struct InfinitePosts {
    state: Mutex<State>,
    stale: AtomicBool,
    fetched: AtomicU64,
}

impl InfinitePosts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invalidate(&self) {
        self.stale.store(true, Ordering::SeqCst);
    }

    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::SeqCst)
    }

    pub async fn snapshot(&self) -> InfiniteSnapshot {
        let state = self.state.lock().await;
        self.snapshot_of(&state)
    }

    fn snapshot_of(&self, state: &State) -> InfiniteSnapshot {
        InfiniteSnapshot {
            pages: state.pages.clone(),
            next: state.next.clone(),
            status: state.status,
            stale: self.is_stale(),
        }
    }

    /// Loaded pages. Fetches the first page on first use; after an
    /// invalidation, reloads from the start as many pages as were shown.
    pub async fn load<F, Fut>(&self, fetch: F) -> InfiniteSnapshot
    where
        F: Fn(Option<String>) -> Fut,
        Fut: Future<Output = Option<Vec<Post>>>,
    {
        let mut state = self.state.lock().await;

        if self.stale.swap(false, Ordering::SeqCst) {
            self.reload(&mut state, &fetch).await;
        } else if state.pages.is_empty() && state.next == PageParam::Initial {
            self.append_page(&mut state, &fetch).await;
        }

        self.snapshot_of(&state)
    }

    /// Fetches the page after the last one loaded. A stale feed is rebuilt
    /// first, so the cursor always comes from the current ordering. Once the
    /// feed is exhausted no request is made.
    pub async fn fetch_next_page<F, Fut>(&self, fetch: F) -> InfiniteSnapshot
    where
        F: Fn(Option<String>) -> Fut,
        Fut: Future<Output = Option<Vec<Post>>>,
    {
        let seen = self.fetched.load(Ordering::SeqCst);
        let mut state = self.state.lock().await;

        if self.stale.swap(false, Ordering::SeqCst) {
            if self.reload(&mut state, &fetch).await && state.next != PageParam::Exhausted {
                self.append_page(&mut state, &fetch).await;
            }
        } else if self.fetched.load(Ordering::SeqCst) != seen {
            debug!("Next page already fetched while waiting");
        } else if state.next == PageParam::Exhausted {
            debug!("Feed exhausted, no request made");
        } else {
            self.append_page(&mut state, &fetch).await;
        }

        self.snapshot_of(&state)
    }

    /// Refetches from the first page as many pages as were loaded. On failure
    /// the previous pages stay, marked failed and still stale.
    async fn reload<F, Fut>(&self, state: &mut State, fetch: &F) -> bool
    where
        F: Fn(Option<String>) -> Fut,
        Fut: Future<Output = Option<Vec<Post>>>,
    {
        let wanted = state.pages.len().max(1);
        let previous = std::mem::take(state);
        debug!(pages = wanted, "Reloading stale feed");

        while state.pages.len() < wanted && state.next != PageParam::Exhausted {
            if !self.append_page(state, fetch).await {
                *state = State {
                    status: QueryStatus::Failed,
                    ..previous
                };
                self.stale.store(true, Ordering::SeqCst);
                return false;
            }
        }
        true
    }

    async fn append_page<F, Fut>(&self, state: &mut State, fetch: &F) -> bool
    where
        F: Fn(Option<String>) -> Fut,
        Fut: Future<Output = Option<Vec<Post>>>,
    {
        state.status = QueryStatus::Fetching;

        match fetch(state.next.cursor()).await {
            Some(page) => {
                state.next = PageParam::after(&page);
                if !page.is_empty() {
                    state.pages.push(page);
                }
                state.status = QueryStatus::Fulfilled;
                self.fetched.fetch_add(1, Ordering::SeqCst);
                true
            }
            None => {
                state.status = QueryStatus::Failed;
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::{Arc, Mutex as StdMutex};

    fn post(id: usize) -> Post {
        let now = Utc::now();
        Post {
            id: format!("p{}", id),
            creator_id: "u1".into(),
            caption: format!("post {}", id),
            image_url: String::new(),
            image_id: format!("f{}", id),
            tags: vec![],
            likes: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    /// Serves `total` posts newest first in pages of `size`, recording cursors.
    fn feed(
        total: usize,
        size: usize,
        cursors: Arc<StdMutex<Vec<Option<String>>>>,
    ) -> impl Fn(Option<String>) -> std::future::Ready<Option<Vec<Post>>> {
        move |cursor: Option<String>| {
            cursors.lock().unwrap().push(cursor.clone());
            let all: Vec<Post> = (0..total).rev().map(post).collect();
            let start = match cursor {
                Some(id) => all.iter().position(|p| p.id == id).map(|i| i + 1).unwrap_or(all.len()),
                None => 0,
            };
            std::future::ready(Some(all.into_iter().skip(start).take(size).collect()))
        }
    }

    #[tokio::test]
    async fn pages_are_disjoint_until_an_empty_page() {
        let cursors = Arc::new(StdMutex::new(Vec::new()));
        let fetch = feed(25, 10, cursors.clone());
        let query = InfinitePosts::new();

        let mut snapshot = query.load(&fetch).await;
        while snapshot.has_next_page() {
            snapshot = query.fetch_next_page(&fetch).await;
        }

        let sizes: Vec<_> = snapshot.pages.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![10, 10, 5]);

        let mut ids: Vec<_> = snapshot.posts().map(|p| p.id.clone()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 25);

        assert_eq!(
            *cursors.lock().unwrap(),
            vec![None, Some("p15".into()), Some("p5".into()), Some("p0".into())]
        );

        // Exhausted: no further request.
        query.fetch_next_page(&fetch).await;
        assert_eq!(cursors.lock().unwrap().len(), 4);
        assert_eq!(snapshot.next, PageParam::Exhausted);
    }

    #[tokio::test]
    async fn load_without_invalidation_uses_loaded_pages() {
        let cursors = Arc::new(StdMutex::new(Vec::new()));
        let fetch = feed(5, 10, cursors.clone());
        let query = InfinitePosts::new();

        query.load(&fetch).await;
        query.load(&fetch).await;

        assert_eq!(cursors.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn stale_feed_reloads_as_many_pages_as_shown() {
        let cursors = Arc::new(StdMutex::new(Vec::new()));
        let fetch = feed(30, 10, cursors.clone());
        let query = InfinitePosts::new();

        query.load(&fetch).await;
        query.fetch_next_page(&fetch).await;
        cursors.lock().unwrap().clear();

        query.invalidate();
        let snapshot = query.load(&fetch).await;

        assert_eq!(snapshot.pages.len(), 2);
        assert!(!snapshot.stale);
        assert_eq!(*cursors.lock().unwrap(), vec![None, Some("p20".into())]);
    }

    #[tokio::test]
    async fn failed_reload_keeps_previous_pages() {
        let cursors = Arc::new(StdMutex::new(Vec::new()));
        let fetch = feed(5, 10, cursors);
        let query = InfinitePosts::new();
        query.load(&fetch).await;

        query.invalidate();
        let snapshot = query.load(|_| std::future::ready(None)).await;

        assert_eq!(snapshot.status, QueryStatus::Failed);
        assert_eq!(snapshot.pages.len(), 1);
        assert!(snapshot.stale);
    }

    #[tokio::test]
    async fn next_page_of_stale_feed_rebuilds_first() {
        let cursors = Arc::new(StdMutex::new(Vec::new()));
        let fetch = feed(25, 10, cursors.clone());
        let query = InfinitePosts::new();
        query.load(&fetch).await;
        cursors.lock().unwrap().clear();

        query.invalidate();
        let snapshot = query.fetch_next_page(&fetch).await;

        assert_eq!(snapshot.pages.len(), 2);
        assert!(!snapshot.stale);
        assert_eq!(*cursors.lock().unwrap(), vec![None, Some("p15".into())]);
    }

    #[test]
    fn next_token_is_last_id_or_exhausted() {
        assert_eq!(PageParam::after(&[post(3), post(2)]), PageParam::After("p2".into()));
        assert_eq!(PageParam::after(&[]), PageParam::Exhausted);
    }
}
