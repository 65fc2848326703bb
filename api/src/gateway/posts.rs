use super::{Gateway, Saga, attributes, post_from_document, saved_from_document, swallow};
use crate::{
    backend::{CREATED_AT, Query, UPDATED_AT, unique_id},
    errors::BackendError,
    models::{FileUpload, NewPost, Post, SavedPost, StoredFile, UpdatePost, parse_tags},
};
use serde_json::json;
use std::future::Future;
use tracing::{info, warn};

/// Home feed size.
pub const RECENT_POSTS_LIMIT: usize = 20;
/// Explore feed page size.
pub const POSTS_PAGE_SIZE: usize = 10;

impl Gateway {
    pub async fn upload_file(&self, file: FileUpload) -> Option<StoredFile> {
        swallow("upload_file", self.try_upload_file(file).await)
    }

    async fn try_upload_file(&self, file: FileUpload) -> Result<StoredFile, BackendError> {
        self.backend
            .storage
            .create_file(&self.config.media_bucket, &unique_id(), file)
            .await
    }

    pub async fn get_file_preview(&self, file_id: &str) -> Option<String> {
        swallow("get_file_preview", self.try_file_preview(file_id).await)
    }

    async fn try_file_preview(&self, file_id: &str) -> Result<String, BackendError> {
        self.backend
            .storage
            .get_file_preview(&self.config.media_bucket, file_id, self.config.preview)
            .await
    }

    pub async fn delete_file(&self, file_id: &str) -> Option<()> {
        swallow("delete_file", self.delete_file_action(file_id.to_string()).await)
    }

    /// Owned deletion future, usable as a saga action.
    fn delete_file_action(&self, file_id: String) -> impl Future<Output = Result<(), BackendError>> + Send + 'static {
        let storage = self.backend.storage.clone();
        let bucket = self.config.media_bucket.clone();
        async move { storage.delete_file(&bucket, &file_id).await }
    }

    fn delete_document_action(&self, collection: String, id: String) -> impl Future<Output = Result<(), BackendError>> + Send + 'static {
        let databases = self.backend.databases.clone();
        async move { databases.delete_document(&collection, &id).await }
    }

    /// Uploads the image, then persists the post pointing at it. The upload is
    /// removed again if any later step fails.
    pub async fn create_post(&self, post: &NewPost) -> Option<Post> {
        swallow("create_post", self.try_create_post(post).await)
    }

    async fn try_create_post(&self, post: &NewPost) -> Result<Post, BackendError> {
        let file = post
            .files
            .first()
            .cloned()
            .ok_or_else(|| BackendError::InvalidInput("No file provided for upload".into()))?;

        let mut saga = Saga::new("create_post");

        let uploaded = self.try_upload_file(file).await?;
        saga.compensate_with("delete uploaded file", self.delete_file_action(uploaded.id.clone()));

        let image_url = saga.check(self.try_file_preview(&uploaded.id).await).await?;

        let data = attributes(json!({
            "creator": post.user_id,
            "caption": post.caption,
            "imageUrl": image_url,
            "imageId": uploaded.id,
            "tags": parse_tags(&post.tags),
            "likes": [],
        }));
        let document = saga
            .check(
                self.backend
                    .databases
                    .create_document(&self.config.posts_collection, &unique_id(), data)
                    .await,
            )
            .await?;
        saga.compensate_with(
            "delete post document",
            self.delete_document_action(self.config.posts_collection.clone(), document.id.clone()),
        );

        let created = saga.check(post_from_document(document)).await?;
        saga.commit().await;

        info!("Post created: {} by user {}", created.id, created.creator_id);
        Ok(created)
    }

    /// Newest posts for the home feed.
    pub async fn get_recent_posts(&self) -> Option<Vec<Post>> {
        swallow(
            "get_recent_posts",
            self.list_posts(&[Query::order_desc(CREATED_AT), Query::limit(RECENT_POSTS_LIMIT)])
                .await,
        )
    }

    async fn list_posts(&self, queries: &[Query]) -> Result<Vec<Post>, BackendError> {
        self.backend
            .databases
            .list_documents(&self.config.posts_collection, queries)
            .await?
            .documents
            .into_iter()
            .map(post_from_document)
            .collect()
    }

    /// Replaces the whole liker list. Last write wins.
    pub async fn like_post(&self, post_id: &str, likes: &[String]) -> Option<Post> {
        swallow("like_post", self.try_like_post(post_id, likes).await)
    }

    async fn try_like_post(&self, post_id: &str, likes: &[String]) -> Result<Post, BackendError> {
        let document = self
            .backend
            .databases
            .update_document(
                &self.config.posts_collection,
                post_id,
                attributes(json!({ "likes": likes })),
            )
            .await?;
        post_from_document(document)
    }

    pub async fn save_post(&self, user_id: &str, post_id: &str) -> Option<SavedPost> {
        swallow("save_post", self.try_save_post(user_id, post_id).await)
    }

    async fn try_save_post(&self, user_id: &str, post_id: &str) -> Result<SavedPost, BackendError> {
        let document = self
            .backend
            .databases
            .create_document(
                &self.config.saves_collection,
                &unique_id(),
                attributes(json!({ "user": user_id, "post": post_id })),
            )
            .await?;
        saved_from_document(document)
    }

    pub async fn delete_saved_post(&self, saved_record_id: &str) -> Option<()> {
        swallow(
            "delete_saved_post",
            self.backend
                .databases
                .delete_document(&self.config.saves_collection, saved_record_id)
                .await,
        )
    }

    pub async fn get_post_by_id(&self, post_id: &str) -> Option<Post> {
        swallow("get_post_by_id", self.try_get_post(post_id).await)
    }

    async fn try_get_post(&self, post_id: &str) -> Result<Post, BackendError> {
        let document = self
            .backend
            .databases
            .get_document(&self.config.posts_collection, post_id)
            .await?;
        post_from_document(document)
    }

    /// Rewrites caption and tags, optionally swapping the image. A new image
    /// is uploaded first; the old one is only deleted once the document
    /// points at the new one, and the new one is deleted if that write fails.
    pub async fn update_post(&self, update: &UpdatePost) -> Option<Post> {
        swallow("update_post", self.try_update_post(update).await)
    }

    async fn try_update_post(&self, update: &UpdatePost) -> Result<Post, BackendError> {
        let mut saga = Saga::new("update_post");

        let (image_id, image_url) = match update.files.first() {
            Some(file) => {
                let uploaded = self.try_upload_file(file.clone()).await?;
                saga.compensate_with(
                    "delete replacement file",
                    self.delete_file_action(uploaded.id.clone()),
                );

                let image_url = saga.check(self.try_file_preview(&uploaded.id).await).await?;

                if !update.image_id.is_empty() {
                    saga.after_commit(
                        "delete replaced file",
                        self.delete_file_action(update.image_id.clone()),
                    );
                }
                (uploaded.id, image_url)
            }
            None => (update.image_id.clone(), update.image_url.clone()),
        };

        let data = attributes(json!({
            "caption": update.caption,
            "imageUrl": image_url,
            "imageId": image_id,
            "tags": parse_tags(&update.tags),
        }));
        let document = saga
            .check(
                self.backend
                    .databases
                    .update_document(&self.config.posts_collection, &update.post_id, data)
                    .await,
            )
            .await?;
        saga.commit().await;

        post_from_document(document)
    }

    /// Deletes the post document. The image stays in storage unless
    /// `purge_files_on_delete` is set.
    pub async fn delete_post(&self, post_id: &str, image_id: &str) -> Option<()> {
        swallow("delete_post", self.try_delete_post(post_id, image_id).await)
    }

    async fn try_delete_post(&self, post_id: &str, image_id: &str) -> Result<(), BackendError> {
        if post_id.is_empty() || image_id.is_empty() {
            return Err(BackendError::InvalidInput(
                "Post id and image id are required".into(),
            ));
        }

        let mut saga = Saga::new("delete_post");
        if self.config.purge_files_on_delete {
            saga.after_commit("delete post image", self.delete_file_action(image_id.to_string()));
        }

        saga.check(
            self.backend
                .databases
                .delete_document(&self.config.posts_collection, post_id)
                .await,
        )
        .await?;
        saga.commit().await;

        if !self.config.purge_files_on_delete {
            warn!(post_id, image_id, "Post deleted, its image is kept in storage");
        }
        info!("Post deleted: {}", post_id);
        Ok(())
    }

    /// One page of the explore feed, most recently updated first. `page_param`
    /// is the id of the last post already shown.
    pub async fn get_infinite_posts(&self, page_param: Option<&str>) -> Option<Vec<Post>> {
        let mut queries = vec![Query::order_desc(UPDATED_AT), Query::limit(POSTS_PAGE_SIZE)];
        if let Some(cursor) = page_param.filter(|cursor| !cursor.is_empty()) {
            queries.push(Query::cursor_after(cursor));
        }

        swallow("get_infinite_posts", self.list_posts(&queries).await)
    }

    pub async fn search_posts(&self, term: &str) -> Option<Vec<Post>> {
        swallow(
            "search_posts",
            self.list_posts(&[Query::search("caption", term)]).await,
        )
    }

    /// Posts the user saved, newest save first. Saves whose post is gone are
    /// skipped.
    pub async fn get_saved_posts(&self, user_id: &str) -> Option<Vec<Post>> {
        swallow("get_saved_posts", self.try_get_saved_posts(user_id).await)
    }

    async fn try_get_saved_posts(&self, user_id: &str) -> Result<Vec<Post>, BackendError> {
        let saves = self
            .backend
            .databases
            .list_documents(
                &self.config.saves_collection,
                &[Query::equal("user", user_id), Query::order_desc(CREATED_AT)],
            )
            .await?;

        let mut posts = Vec::with_capacity(saves.documents.len());
        for document in saves.documents {
            let save = saved_from_document(document)?;
            match self.try_get_post(&save.post_id).await {
                Ok(post) => posts.push(post),
                Err(BackendError::NotFound(_)) => {
                    warn!(save_id = %save.id, post_id = %save.post_id, "Saved post no longer exists")
                }
                Err(err) => return Err(err),
            }
        }
        Ok(posts)
    }
}
