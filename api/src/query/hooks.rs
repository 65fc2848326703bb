use super::{
    InfiniteSnapshot, MutationKind, QueryClient, QueryData, QueryKey, QueryResult,
};
use crate::{
    gateway::Gateway,
    models::{NewPost, NewUser, Post, SavedPost, Session, UpdatePost, User},
};
use dashmap::DashMap;
use std::sync::Arc;

/// How many profiles the people directory shows.
pub const USERS_LIMIT: usize = 50;

/// Typed reads and writes over the gateway, cached by a [`QueryClient`].
pub struct Queries {
    gateway: Arc<Gateway>,
    client: QueryClient,
    pending: DashMap<MutationKind, usize>,
}

/// Counts a mutation as running until dropped.
struct Pending<'a> {
    pending: &'a DashMap<MutationKind, usize>,
    kind: MutationKind,
}

impl Drop for Pending<'_> {
    fn drop(&mut self) {
        if let Some(mut count) = self.pending.get_mut(&self.kind) {
            *count = count.saturating_sub(1);
        }
    }
}

fn posts(data: Option<QueryData>) -> QueryResult<Vec<Post>> {
    match data {
        Some(QueryData::Posts(posts)) => QueryResult::Ready(posts),
        _ => QueryResult::Failed,
    }
}

fn post(data: Option<QueryData>) -> QueryResult<Post> {
    match data {
        Some(QueryData::Post(post)) => QueryResult::Ready(post),
        _ => QueryResult::Failed,
    }
}

fn user(data: Option<QueryData>) -> QueryResult<User> {
    match data {
        Some(QueryData::User(user)) => QueryResult::Ready(user),
        _ => QueryResult::Failed,
    }
}

fn users(data: Option<QueryData>) -> QueryResult<Vec<User>> {
    match data {
        Some(QueryData::Users(users)) => QueryResult::Ready(users),
        _ => QueryResult::Failed,
    }
}

impl Queries {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self {
            gateway,
            client: QueryClient::new(),
            pending: DashMap::new(),
        }
    }

    pub fn client(&self) -> &QueryClient {
        &self.client
    }

    pub fn is_pending(&self, kind: MutationKind) -> bool {
        self.pending.get(&kind).is_some_and(|count| *count > 0)
    }

    fn begin(&self, kind: MutationKind) -> Pending<'_> {
        *self.pending.entry(kind).or_insert(0) += 1;
        Pending {
            pending: &self.pending,
            kind,
        }
    }

    // ---- reads ----

    pub async fn recent_posts(&self) -> QueryResult<Vec<Post>> {
        let gateway = self.gateway.clone();
        posts(
            self.client
                .fetch(QueryKey::RecentPosts, move || async move {
                    gateway.get_recent_posts().await.map(QueryData::Posts)
                })
                .await,
        )
    }

    /// Disabled for an empty id.
    pub async fn post_by_id(&self, post_id: &str) -> QueryResult<Post> {
        if post_id.is_empty() {
            return QueryResult::Disabled;
        }

        let gateway = self.gateway.clone();
        let id = post_id.to_string();
        post(
            self.client
                .fetch(QueryKey::PostById(post_id.to_string()), move || async move {
                    gateway.get_post_by_id(&id).await.map(QueryData::Post)
                })
                .await,
        )
    }

    /// Disabled for an empty term: nothing is requested and no earlier result
    /// is reported.
    pub async fn search_posts(&self, term: &str) -> QueryResult<Vec<Post>> {
        if term.is_empty() {
            return QueryResult::Disabled;
        }

        let gateway = self.gateway.clone();
        let owned = term.to_string();
        posts(
            self.client
                .fetch(QueryKey::SearchPosts(term.to_string()), move || async move {
                    gateway.search_posts(&owned).await.map(QueryData::Posts)
                })
                .await,
        )
    }

    pub async fn current_user(&self) -> QueryResult<User> {
        let gateway = self.gateway.clone();
        user(
            self.client
                .fetch(QueryKey::CurrentUser, move || async move {
                    gateway.get_current_user().await.map(QueryData::User)
                })
                .await,
        )
    }

    pub async fn users(&self) -> QueryResult<Vec<User>> {
        let gateway = self.gateway.clone();
        users(
            self.client
                .fetch(QueryKey::Users, move || async move {
                    gateway.get_users(USERS_LIMIT).await.map(QueryData::Users)
                })
                .await,
        )
    }

    pub async fn saved_posts(&self, user_id: &str) -> QueryResult<Vec<Post>> {
        if user_id.is_empty() {
            return QueryResult::Disabled;
        }

        let gateway = self.gateway.clone();
        let owned = user_id.to_string();
        posts(
            self.client
                .fetch(QueryKey::SavedPosts(user_id.to_string()), move || async move {
                    gateway.get_saved_posts(&owned).await.map(QueryData::Posts)
                })
                .await,
        )
    }

    pub async fn infinite_posts(&self) -> InfiniteSnapshot {
        let gateway = &self.gateway;
        self.client
            .infinite_posts()
            .load(move |cursor| async move { gateway.get_infinite_posts(cursor.as_deref()).await })
            .await
    }

    pub async fn fetch_next_posts_page(&self) -> InfiniteSnapshot {
        let gateway = &self.gateway;
        self.client
            .infinite_posts()
            .fetch_next_page(move |cursor| async move { gateway.get_infinite_posts(cursor.as_deref()).await })
            .await
    }

    // ---- mutations ----

    pub async fn create_user_account(&self, user: &NewUser) -> Option<User> {
        let _pending = self.begin(MutationKind::CreateUserAccount);
        let created = self.gateway.create_user_account(user).await;
        if created.is_some() {
            self.client.apply(MutationKind::CreateUserAccount, None);
        }
        created
    }

    pub async fn sign_in_account(&self, email: &str, password: &str) -> Option<Session> {
        let _pending = self.begin(MutationKind::SignIn);
        let session = self.gateway.sign_in_account(email, password).await;
        if session.is_some() {
            self.client.apply(MutationKind::SignIn, None);
        }
        session
    }

    pub async fn sign_out_account(&self) -> Option<()> {
        let _pending = self.begin(MutationKind::SignOut);
        let done = self.gateway.sign_out_account().await;
        if done.is_some() {
            self.client.apply(MutationKind::SignOut, None);
        }
        done
    }

    pub async fn create_post(&self, new_post: &NewPost) -> Option<Post> {
        let _pending = self.begin(MutationKind::CreatePost);
        let created = self.gateway.create_post(new_post).await;
        if let Some(created) = &created {
            self.client.apply(MutationKind::CreatePost, Some(&created.id));
        }
        created
    }

    pub async fn like_post(&self, post_id: &str, likes: &[String]) -> Option<Post> {
        let _pending = self.begin(MutationKind::LikePost);
        let liked = self.gateway.like_post(post_id, likes).await;
        if let Some(liked) = &liked {
            self.client.apply(MutationKind::LikePost, Some(&liked.id));
        }
        liked
    }

    pub async fn save_post(&self, user_id: &str, post_id: &str) -> Option<SavedPost> {
        let _pending = self.begin(MutationKind::SavePost);
        let saved = self.gateway.save_post(user_id, post_id).await;
        if saved.is_some() {
            self.client.apply(MutationKind::SavePost, Some(post_id));
        }
        saved
    }

    pub async fn delete_saved_post(&self, saved_record_id: &str) -> Option<()> {
        let _pending = self.begin(MutationKind::DeleteSavedPost);
        let done = self.gateway.delete_saved_post(saved_record_id).await;
        if done.is_some() {
            self.client.apply(MutationKind::DeleteSavedPost, None);
        }
        done
    }

    pub async fn update_post(&self, update: &UpdatePost) -> Option<Post> {
        let _pending = self.begin(MutationKind::UpdatePost);
        let updated = self.gateway.update_post(update).await;
        if let Some(updated) = &updated {
            self.client.apply(MutationKind::UpdatePost, Some(&updated.id));
        }
        updated
    }

    pub async fn delete_post(&self, post_id: &str, image_id: &str) -> Option<()> {
        let _pending = self.begin(MutationKind::DeletePost);
        let done = self.gateway.delete_post(post_id, image_id).await;
        if done.is_some() {
            self.client.apply(MutationKind::DeletePost, Some(post_id));
        }
        done
    }
}
