//! The hosted backend as seen from the client: accounts, documents and files.
//!
//! The service itself is opaque. These traits carry only the CRUD-shaped calls
//! the gateway makes; [`MemoryBackend`] implements all three in process.

mod memory;

pub use memory::{FaultPoint, MemoryBackend};

use crate::{
    errors::BackendError,
    models::{Account, FileUpload, Session, StoredFile},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Sortable system attributes every document carries.
pub const CREATED_AT: &str = "$createdAt";
pub const UPDATED_AT: &str = "$updatedAt";

/// Applied by `list_documents` when no `Query::Limit` is given.
pub const DEFAULT_LIST_LIMIT: usize = 25;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub collection: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub data: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentList {
    pub total: usize,
    pub documents: Vec<Document>,
}

/// One clause of a `list_documents` call.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Equal(String, Value),
    /// Array attribute holds the value.
    Contains(String, Value),
    /// Case-insensitive text match on a string attribute.
    Search(String, String),
    OrderDesc(String),
    OrderAsc(String),
    Limit(usize),
    CursorAfter(String),
}

impl Query {
    pub fn equal(field: &str, value: impl Into<Value>) -> Self {
        Query::Equal(field.to_string(), value.into())
    }

    pub fn contains(field: &str, value: impl Into<Value>) -> Self {
        Query::Contains(field.to_string(), value.into())
    }

    pub fn search(field: &str, term: &str) -> Self {
        Query::Search(field.to_string(), term.to_string())
    }

    pub fn order_desc(field: &str) -> Self {
        Query::OrderDesc(field.to_string())
    }

    pub fn order_asc(field: &str) -> Self {
        Query::OrderAsc(field.to_string())
    }

    pub fn limit(n: usize) -> Self {
        Query::Limit(n)
    }

    pub fn cursor_after(id: &str) -> Self {
        Query::CursorAfter(id.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageGravity {
    Center,
    Top,
    Bottom,
    Left,
    Right,
}

impl ImageGravity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageGravity::Center => "center",
            ImageGravity::Top => "top",
            ImageGravity::Bottom => "bottom",
            ImageGravity::Left => "left",
            ImageGravity::Right => "right",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviewOptions {
    pub width: u32,
    pub height: u32,
    pub gravity: ImageGravity,
    pub quality: u8,
}

impl Default for PreviewOptions {
    fn default() -> Self {
        Self {
            width: 2000,
            height: 2000,
            gravity: ImageGravity::Top,
            quality: 100,
        }
    }
}

#[async_trait]
pub trait AccountService: Send + Sync {
    async fn create(&self, email: &str, password: &str, name: &str) -> Result<Account, BackendError>;

    /// Opens a session and makes it the client's current one.
    async fn create_email_password_session(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, BackendError>;

    /// Account behind the current session.
    async fn get(&self) -> Result<Account, BackendError>;

    /// `"current"` names the current session.
    async fn delete_session(&self, session_id: &str) -> Result<(), BackendError>;
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn create_document(
        &self,
        collection: &str,
        id: &str,
        data: Map<String, Value>,
    ) -> Result<Document, BackendError>;

    async fn get_document(&self, collection: &str, id: &str) -> Result<Document, BackendError>;

    /// Merges `patch` into the stored attributes.
    async fn update_document(
        &self,
        collection: &str,
        id: &str,
        patch: Map<String, Value>,
    ) -> Result<Document, BackendError>;

    async fn delete_document(&self, collection: &str, id: &str) -> Result<(), BackendError>;

    async fn list_documents(
        &self,
        collection: &str,
        queries: &[Query],
    ) -> Result<DocumentList, BackendError>;
}

#[async_trait]
pub trait FileStorage: Send + Sync {
    async fn create_file(&self, bucket: &str, id: &str, file: FileUpload) -> Result<StoredFile, BackendError>;

    async fn get_file(&self, bucket: &str, id: &str) -> Result<StoredFile, BackendError>;

    async fn get_file_preview(
        &self,
        bucket: &str,
        id: &str,
        options: PreviewOptions,
    ) -> Result<String, BackendError>;

    async fn delete_file(&self, bucket: &str, id: &str) -> Result<(), BackendError>;

    /// Avatar URL rendering the initials of `name`.
    fn initials_avatar(&self, name: &str) -> String;
}

/// The three service clients, shared by every gateway call.
#[derive(Clone)]
pub struct Backend {
    pub account: Arc<dyn AccountService>,
    pub databases: Arc<dyn DocumentStore>,
    pub storage: Arc<dyn FileStorage>,
}

impl Backend {
    pub fn new(
        account: Arc<dyn AccountService>,
        databases: Arc<dyn DocumentStore>,
        storage: Arc<dyn FileStorage>,
    ) -> Self {
        Self {
            account,
            databases,
            storage,
        }
    }

    /// All three clients backed by one in-process service.
    pub fn in_memory(service: Arc<MemoryBackend>) -> Self {
        Self {
            account: service.clone(),
            databases: service.clone(),
            storage: service,
        }
    }
}

/// Fresh unique id, the client-side `ID.unique()`.
pub fn unique_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
