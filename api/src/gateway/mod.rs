//! Stateless wrappers around the backend clients.
//!
//! Every public call returns `Option<T>`: a backend failure is logged here and
//! reaches the caller as `None`, meaning "failed, nothing committed". Not
//! found, permission denied and network errors are not told apart.

mod posts;
mod saga;

pub use saga::Saga;

use crate::{
    backend::{Backend, Document, Query},
    config::GatewayConfig,
    errors::BackendError,
    models::{NewUser, Post, SavedPost, Session, User},
};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{error, info, warn};

/// Upper bound on the save records loaded with the current user.
const SAVES_LIMIT: usize = 5000;

#[derive(Clone)]
pub struct Gateway {
    backend: Backend,
    config: GatewayConfig,
}

/// Logs a failed backend call and hands the caller an empty result.
pub(crate) fn swallow<T>(operation: &'static str, result: Result<T, BackendError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            error!(operation, error = %err, "Backend call failed");
            None
        }
    }
}

pub(crate) fn attributes(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn decode<T: for<'de> Deserialize<'de>>(document: Document) -> Result<(Document, T), BackendError> {
    let attrs = serde_json::from_value(Value::Object(document.data.clone())).map_err(|e| {
        BackendError::Internal(format!(
            "malformed {} document {}: {}",
            document.collection, document.id, e
        ))
    })?;
    Ok((document, attrs))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserAttributes {
    account_id: String,
    email: String,
    name: String,
    username: String,
    #[serde(default)]
    image_url: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostAttributes {
    creator: String,
    caption: String,
    image_url: String,
    image_id: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    likes: Vec<String>,
}

#[derive(Deserialize)]
struct SaveAttributes {
    user: String,
    post: String,
}

pub(crate) fn user_from_document(document: Document) -> Result<User, BackendError> {
    let (document, attrs) = decode::<UserAttributes>(document)?;
    Ok(User {
        id: document.id,
        account_id: attrs.account_id,
        email: attrs.email,
        name: attrs.name,
        username: attrs.username,
        image_url: attrs.image_url,
        saves: Vec::new(),
    })
}

pub(crate) fn post_from_document(document: Document) -> Result<Post, BackendError> {
    let (document, attrs) = decode::<PostAttributes>(document)?;
    Ok(Post {
        id: document.id,
        creator_id: attrs.creator,
        caption: attrs.caption,
        image_url: attrs.image_url,
        image_id: attrs.image_id,
        tags: attrs.tags,
        likes: attrs.likes,
        created_at: document.created_at,
        updated_at: document.updated_at,
    })
}

pub(crate) fn saved_from_document(document: Document) -> Result<SavedPost, BackendError> {
    let (document, attrs) = decode::<SaveAttributes>(document)?;
    Ok(SavedPost {
        id: document.id,
        user_id: attrs.user,
        post_id: attrs.post,
    })
}

impl Gateway {
    pub fn new(backend: Backend, config: GatewayConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Creates the auth identity, then the profile document that points at it.
    pub async fn create_user_account(&self, user: &NewUser) -> Option<User> {
        swallow("create_user_account", self.try_create_user_account(user).await)
    }

    async fn try_create_user_account(&self, user: &NewUser) -> Result<User, BackendError> {
        let account = self
            .backend
            .account
            .create(&user.email, &user.password, &user.name)
            .await?;

        let avatar_url = self.backend.storage.initials_avatar(&user.name);

        // The SDK cannot delete an account, so a failed profile save leaves
        // the identity behind without a compensation.
        self.try_save_user_to_db(&account.id, &account.email, &user.name, &user.username, &avatar_url)
            .await
            .inspect_err(|_| {
                warn!(account_id = %account.id, "Profile save failed, account left without a profile")
            })
    }

    pub async fn save_user_to_db(
        &self,
        account_id: &str,
        email: &str,
        name: &str,
        username: &str,
        image_url: &str,
    ) -> Option<User> {
        swallow(
            "save_user_to_db",
            self.try_save_user_to_db(account_id, email, name, username, image_url)
                .await,
        )
    }

    async fn try_save_user_to_db(
        &self,
        account_id: &str,
        email: &str,
        name: &str,
        username: &str,
        image_url: &str,
    ) -> Result<User, BackendError> {
        let data = attributes(json!({
            "accountId": account_id,
            "email": email,
            "name": name,
            "username": username,
            "imageUrl": image_url,
        }));

        let document = self
            .backend
            .databases
            .create_document(&self.config.users_collection, &crate::backend::unique_id(), data)
            .await?;

        let user = user_from_document(document)?;
        info!("New user registered: {}", user.email);
        Ok(user)
    }

    pub async fn sign_in_account(&self, email: &str, password: &str) -> Option<Session> {
        let result = self
            .backend
            .account
            .create_email_password_session(email, password)
            .await;

        swallow("sign_in_account", result).inspect(|_| info!("User logged in: {}", email))
    }

    /// Profile of the account behind the current session, with its saves.
    pub async fn get_current_user(&self) -> Option<User> {
        swallow("get_current_user", self.try_get_current_user().await)
    }

    async fn try_get_current_user(&self) -> Result<User, BackendError> {
        let account = self.backend.account.get().await?;

        let profiles = self
            .backend
            .databases
            .list_documents(
                &self.config.users_collection,
                &[Query::equal("accountId", account.id.as_str()), Query::limit(1)],
            )
            .await?;

        let document = profiles
            .documents
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::NotFound(format!("profile of account {}", account.id)))?;
        let mut user = user_from_document(document)?;

        let saves = self
            .backend
            .databases
            .list_documents(
                &self.config.saves_collection,
                &[Query::equal("user", user.id.as_str()), Query::limit(SAVES_LIMIT)],
            )
            .await?;
        user.saves = saves
            .documents
            .into_iter()
            .map(saved_from_document)
            .collect::<Result<_, _>>()?;

        Ok(user)
    }

    pub async fn sign_out_account(&self) -> Option<()> {
        swallow(
            "sign_out_account",
            self.backend.account.delete_session("current").await,
        )
    }

    /// Profiles for the people directory, newest first.
    pub async fn get_users(&self, limit: usize) -> Option<Vec<User>> {
        swallow("get_users", self.try_get_users(limit).await)
    }

    async fn try_get_users(&self, limit: usize) -> Result<Vec<User>, BackendError> {
        self.backend
            .databases
            .list_documents(
                &self.config.users_collection,
                &[Query::order_desc(crate::backend::CREATED_AT), Query::limit(limit)],
            )
            .await?
            .documents
            .into_iter()
            .map(user_from_document)
            .collect()
    }
}
