use super::{
    KeyFamily, QueryData, QueryKey, QueryStatus,
    infinite::InfinitePosts,
    invalidation::{Invalidation, MutationKind, resolve},
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};
use tokio::time::Instant;
use tracing::{debug, error};

/// How long an entry nobody reads is kept before it is dropped.
pub const DEFAULT_GC_TIME: Duration = Duration::from_secs(5 * 60);

type InFlight = Shared<BoxFuture<'static, Option<QueryData>>>;

struct Entry {
    status: QueryStatus,
    data: Option<QueryData>,
    stale: bool,
    /// Bumped by every invalidation. A fetch started under an older
    /// generation lands stale.
    generation: u64,
    in_flight: Option<(u64, InFlight)>,
    updated_at: Option<DateTime<Utc>>,
    last_access: Instant,
}

impl Entry {
    fn new() -> Self {
        Self {
            status: QueryStatus::Idle,
            data: None,
            stale: false,
            generation: 0,
            in_flight: None,
            updated_at: None,
            last_access: Instant::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuerySnapshot {
    pub status: QueryStatus,
    pub data: Option<QueryData>,
    pub stale: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Keyed read cache shared by every view.
///
/// A fresh, fulfilled entry is answered from memory. Anything else triggers a
/// fetch, and there is never more than one fetch per key: callers arriving
/// while one runs wait on it instead. Fetches run on their own task, so a
/// caller that goes away does not cancel them.
///
/// Entries not read for `gc_time` are dropped on the next fetch, unless a
/// fetch for them is still running.
#[derive(Clone)]
pub struct QueryClient {
    entries: Arc<DashMap<QueryKey, Entry>>,
    infinite: Arc<InfinitePosts>,
    fetch_ids: Arc<AtomicU64>,
    gc_time: Duration,
}

impl Default for QueryClient {
    fn default() -> Self {
        Self {
            entries: Arc::default(),
            infinite: Arc::default(),
            fetch_ids: Arc::default(),
            gc_time: DEFAULT_GC_TIME,
        }
    }
}

fn settle(
    entries: &DashMap<QueryKey, Entry>,
    key: &QueryKey,
    fetch_id: u64,
    generation: u64,
    data: &Option<QueryData>,
) {
    let Some(mut entry) = entries.get_mut(key) else {
        return;
    };
    if !matches!(&entry.in_flight, Some((id, _)) if *id == fetch_id) {
        return;
    }

    entry.in_flight = None;
    match data {
        Some(data) => {
            entry.status = QueryStatus::Fulfilled;
            entry.data = Some(data.clone());
            entry.stale = entry.generation != generation;
            entry.updated_at = Some(Utc::now());
        }
        // An empty result leaves the entry unfulfilled; earlier data stays
        // visible in snapshots.
        None => entry.status = QueryStatus::Failed,
    }
}

impl QueryClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_gc_time(mut self, gc_time: Duration) -> Self {
        self.gc_time = gc_time;
        self
    }

    /// Drops entries unread for longer than `gc_time`.
    pub fn collect_garbage(&self) {
        let gc_time = self.gc_time;
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.in_flight.is_some() || entry.last_access.elapsed() < gc_time);

        let dropped = before.saturating_sub(self.entries.len());
        if dropped > 0 {
            debug!(dropped, "Dropped unused queries");
        }
    }

    /// Paginated explore feed (`QueryKey::InfinitePosts`).
    pub fn infinite_posts(&self) -> &InfinitePosts {
        &self.infinite
    }

    /// Cached data for `key`, fetching it with `fetcher` when missing, stale
    /// or failed. `None` means the fetch came back empty.
    pub async fn fetch<F, Fut>(&self, key: QueryKey, fetcher: F) -> Option<QueryData>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Option<QueryData>> + Send + 'static,
    {
        self.collect_garbage();

        let in_flight = {
            let mut entry = self.entries.entry(key.clone()).or_insert_with(Entry::new);
            entry.last_access = Instant::now();

            if entry.status == QueryStatus::Fulfilled && !entry.stale {
                debug!(?key, "Query served from cache");
                return entry.data.clone();
            }

            let joined = entry.in_flight.as_ref().map(|(_, shared)| shared.clone());
            match joined {
                Some(shared) => {
                    debug!(?key, "Joining in-flight query");
                    shared
                }
                None => {
                    let shared = self.spawn_fetch(&key, entry.generation, fetcher());
                    entry.status = QueryStatus::Fetching;
                    entry.in_flight = Some(shared.clone());
                    shared.1
                }
            }
        };

        in_flight.await
    }

    fn spawn_fetch<Fut>(&self, key: &QueryKey, generation: u64, fut: Fut) -> (u64, InFlight)
    where
        Fut: Future<Output = Option<QueryData>> + Send + 'static,
    {
        let fetch_id = self.fetch_ids.fetch_add(1, Ordering::SeqCst);
        debug!(?key, fetch_id, "Fetching query");

        let entries = self.entries.clone();
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            let data = fut.await;
            settle(&entries, &task_key, fetch_id, generation, &data);
            data
        });

        let entries = self.entries.clone();
        let task_key = key.clone();
        let shared = handle
            .map(move |joined| match joined {
                Ok(data) => data,
                Err(err) => {
                    error!(key = ?task_key, error = %err, "Query task failed");
                    settle(&entries, &task_key, fetch_id, generation, &None);
                    None
                }
            })
            .boxed()
            .shared();

        (fetch_id, shared)
    }

    pub fn snapshot(&self, key: &QueryKey) -> Option<QuerySnapshot> {
        self.entries.get(key).map(|entry| QuerySnapshot {
            status: entry.status,
            data: entry.data.clone(),
            stale: entry.stale,
            updated_at: entry.updated_at,
        })
    }

    pub fn status(&self, key: &QueryKey) -> QueryStatus {
        self.entries
            .get(key)
            .map(|entry| entry.status)
            .unwrap_or_default()
    }

    pub fn is_stale(&self, key: &QueryKey) -> bool {
        if *key == QueryKey::InfinitePosts {
            return self.infinite.is_stale();
        }
        self.entries.get(key).is_some_and(|entry| entry.stale)
    }

    pub fn invalidate(&self, target: &Invalidation) {
        match target {
            Invalidation::Key(key) => {
                if let Some(mut entry) = self.entries.get_mut(key) {
                    mark_stale(&mut entry);
                }
                if key.family() == KeyFamily::InfinitePosts {
                    self.infinite.invalidate();
                }
            }
            Invalidation::Family(family) => {
                for mut entry in self.entries.iter_mut() {
                    if entry.key().family() == *family {
                        mark_stale(entry.value_mut());
                    }
                }
                if *family == KeyFamily::InfinitePosts {
                    self.infinite.invalidate();
                }
            }
        }
    }

    /// Marks stale everything `kind` affects. `subject` narrows per-item
    /// targets to the item the mutation touched.
    pub fn apply(&self, kind: MutationKind, subject: Option<&str>) {
        for target in resolve(kind, subject) {
            debug!(?kind, ?target, "Invalidating");
            self.invalidate(&target);
        }
    }
}

fn mark_stale(entry: &mut Entry) {
    entry.stale = true;
    entry.generation += 1;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::User;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    fn user(name: &str) -> QueryData {
        QueryData::User(User {
            id: name.to_string(),
            account_id: format!("acc-{}", name),
            email: format!("{}@example.sk", name),
            name: name.to_string(),
            username: name.to_string(),
            image_url: String::new(),
            saves: vec![],
        })
    }

    #[tokio::test]
    async fn fresh_entry_is_served_from_cache() {
        let client = QueryClient::new();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = calls.clone();
            let data = client
                .fetch(QueryKey::CurrentUser, move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Some(user("anna"))
                })
                .await;
            assert_eq!(data, Some(user("anna")));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(client.status(&QueryKey::CurrentUser), QueryStatus::Fulfilled);
    }

    #[tokio::test]
    async fn invalidated_entry_refetches() {
        let client = QueryClient::new();
        client
            .fetch(QueryKey::CurrentUser, || async { Some(user("anna")) })
            .await;

        client.apply(MutationKind::SignIn, None);
        assert!(client.is_stale(&QueryKey::CurrentUser));

        let data = client
            .fetch(QueryKey::CurrentUser, || async { Some(user("boris")) })
            .await;
        assert_eq!(data, Some(user("boris")));
        assert!(!client.is_stale(&QueryKey::CurrentUser));
    }

    #[tokio::test]
    async fn failed_fetch_is_not_cached() {
        let client = QueryClient::new();
        let data = client.fetch(QueryKey::Users, || async { None }).await;
        assert_eq!(data, None);
        assert_eq!(client.status(&QueryKey::Users), QueryStatus::Failed);

        let data = client
            .fetch(QueryKey::Users, || async { Some(QueryData::Users(vec![])) })
            .await;
        assert_eq!(data, Some(QueryData::Users(vec![])));
    }

    #[tokio::test]
    async fn concurrent_reads_share_one_fetch() {
        let client = QueryClient::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Notify::new());

        let first = {
            let client = client.clone();
            let calls = calls.clone();
            let gate = gate.clone();
            tokio::spawn(async move {
                client
                    .fetch(QueryKey::RecentPosts, move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        gate.notified().await;
                        Some(QueryData::Posts(vec![]))
                    })
                    .await
            })
        };

        while client.status(&QueryKey::RecentPosts) != QueryStatus::Fetching {
            tokio::task::yield_now().await;
        }

        let second = {
            let client = client.clone();
            let calls = calls.clone();
            tokio::spawn(async move {
                client
                    .fetch(QueryKey::RecentPosts, move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Some(QueryData::Posts(vec![]))
                    })
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        gate.notify_one();

        assert_eq!(first.await.unwrap(), Some(QueryData::Posts(vec![])));
        assert_eq!(second.await.unwrap(), Some(QueryData::Posts(vec![])));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidation_during_fetch_keeps_entry_stale() {
        let client = QueryClient::new();
        let gate = Arc::new(Notify::new());

        let pending = {
            let client = client.clone();
            let gate = gate.clone();
            tokio::spawn(async move {
                client
                    .fetch(QueryKey::RecentPosts, move || async move {
                        gate.notified().await;
                        Some(QueryData::Posts(vec![]))
                    })
                    .await
            })
        };

        while client.status(&QueryKey::RecentPosts) != QueryStatus::Fetching {
            tokio::task::yield_now().await;
        }
        client.apply(MutationKind::CreatePost, None);
        gate.notify_one();
        pending.await.unwrap();

        let snapshot = client.snapshot(&QueryKey::RecentPosts).unwrap();
        assert_eq!(snapshot.status, QueryStatus::Fulfilled);
        assert!(snapshot.stale);
    }

    #[tokio::test]
    async fn unread_entries_are_dropped_after_gc_time() {
        let client = QueryClient::new().with_gc_time(Duration::from_millis(20));
        client
            .fetch(QueryKey::SearchPosts("hory".into()), || async {
                Some(QueryData::Posts(vec![]))
            })
            .await;

        tokio::time::sleep(Duration::from_millis(40)).await;
        client
            .fetch(QueryKey::SearchPosts("more".into()), || async {
                Some(QueryData::Posts(vec![]))
            })
            .await;

        assert!(client.snapshot(&QueryKey::SearchPosts("hory".into())).is_none());
        assert!(client.snapshot(&QueryKey::SearchPosts("more".into())).is_some());
    }

    #[tokio::test]
    async fn running_fetch_is_never_dropped() {
        let client = QueryClient::new().with_gc_time(Duration::ZERO);
        let gate = Arc::new(Notify::new());

        let pending = {
            let client = client.clone();
            let gate = gate.clone();
            tokio::spawn(async move {
                client
                    .fetch(QueryKey::Users, move || async move {
                        gate.notified().await;
                        Some(QueryData::Users(vec![]))
                    })
                    .await
            })
        };
        while client.status(&QueryKey::Users) != QueryStatus::Fetching {
            tokio::task::yield_now().await;
        }

        client.collect_garbage();
        assert_eq!(client.status(&QueryKey::Users), QueryStatus::Fetching);

        gate.notify_one();
        assert_eq!(pending.await.unwrap(), Some(QueryData::Users(vec![])));
    }

    #[tokio::test]
    async fn subject_invalidation_leaves_other_items_fresh() {
        let client = QueryClient::new();
        for id in ["p1", "p2"] {
            client
                .fetch(QueryKey::PostById(id.into()), || async { Some(user("x")) })
                .await;
        }

        client.apply(MutationKind::UpdatePost, Some("p1"));

        assert!(client.is_stale(&QueryKey::PostById("p1".into())));
        assert!(!client.is_stale(&QueryKey::PostById("p2".into())));
    }
}
