use super::{
    AccountService, CREATED_AT, DEFAULT_LIST_LIMIT, Document, DocumentList, DocumentStore,
    FileStorage, PreviewOptions, Query, UPDATED_AT, unique_id,
};
use crate::{
    auth::{create_token, hash_password, validate_token, verify_password},
    errors::BackendError,
    models::{Account, FileUpload, Session, StoredFile},
};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use dashmap::{DashMap, mapref::entry::Entry};
use serde_json::{Map, Value};
use std::{
    cmp::Ordering,
    sync::atomic::{AtomicU64, Ordering as AtomicOrdering},
};
use tokio::sync::RwLock;
use tracing::debug;

/// Calls that can be made to fail on purpose.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    CreateAccount,
    CreateSession,
    CreateDocument(String),
    UpdateDocument(String),
    DeleteDocument(String),
    ListDocuments(String),
    CreateFile,
    FilePreview,
    DeleteFile,
}

struct AccountRecord {
    account: Account,
    hashed_password: String,
}

#[derive(Clone)]
struct StoredDocument {
    document: Document,
    created_seq: u64,
    updated_seq: u64,
}

struct StoredBlob {
    file: StoredFile,
    bytes: Vec<u8>,
}

/// In-process stand-in for the hosted backend.
///
/// `DashMap` tables keep it usable from many tasks at once. The client-side
/// session (what the SDK keeps in a cookie) is the `current_session` token.
pub struct MemoryBackend {
    accounts: DashMap<String, AccountRecord>,
    email_index: DashMap<String, String>, // Quick Lookup by Email
    sessions: DashMap<String, Session>,
    current_session: RwLock<Option<String>>,
    collections: DashMap<String, DashMap<String, StoredDocument>>,
    files: DashMap<(String, String), StoredBlob>,
    faults: DashMap<FaultPoint, usize>,
    sequence: AtomicU64,
    jwt_secret: String,
    session_ttl: Duration,
    hash_cost: u32,
    endpoint: String,
}

impl MemoryBackend {
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            accounts: DashMap::new(),
            email_index: DashMap::new(),
            sessions: DashMap::new(),
            current_session: RwLock::new(None),
            collections: DashMap::new(),
            files: DashMap::new(),
            faults: DashMap::new(),
            sequence: AtomicU64::new(0),
            jwt_secret: jwt_secret.into(),
            session_ttl: Duration::hours(24),
            hash_cost: bcrypt::DEFAULT_COST,
            endpoint: "memory://snapgram/v1".to_string(),
        }
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// bcrypt cost; tests drop it to the minimum of 4.
    pub fn with_hash_cost(mut self, cost: u32) -> Self {
        self.hash_cost = cost;
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Makes the next call at `point` fail.
    pub fn fail_next(&self, point: FaultPoint) {
        self.fail_times(point, 1);
    }

    pub fn fail_times(&self, point: FaultPoint, times: usize) {
        *self.faults.entry(point).or_insert(0) += times;
    }

    pub fn file_exists(&self, bucket: &str, id: &str) -> bool {
        self.files.contains_key(&(bucket.to_string(), id.to_string()))
    }

    pub fn file_bytes(&self, bucket: &str, id: &str) -> Option<Vec<u8>> {
        self.files
            .get(&(bucket.to_string(), id.to_string()))
            .map(|blob| blob.bytes.clone())
    }

    pub fn file_count(&self, bucket: &str) -> usize {
        self.files.iter().filter(|entry| entry.key().0 == bucket).count()
    }

    pub fn document_count(&self, collection: &str) -> usize {
        self.collections
            .get(collection)
            .map(|table| table.len())
            .unwrap_or(0)
    }

    fn trip(&self, point: FaultPoint) -> Result<(), BackendError> {
        if let Some(mut remaining) = self.faults.get_mut(&point) {
            if *remaining > 0 {
                *remaining -= 1;
                debug!("Injected failure at {:?}", point);
                return Err(BackendError::Injected(format!("{:?}", point)));
            }
        }
        Ok(())
    }

    fn next_seq(&self) -> u64 {
        self.sequence.fetch_add(1, AtomicOrdering::SeqCst) + 1
    }

    async fn current_claims(&self) -> Result<crate::auth::Claims, BackendError> {
        let token = self
            .current_session
            .read()
            .await
            .clone()
            .ok_or(BackendError::Unauthorized)?;
        let claims = validate_token(&token, &self.jwt_secret)?;
        if !self.sessions.contains_key(&claims.sid) {
            return Err(BackendError::Unauthorized);
        }
        Ok(claims)
    }
}

#[async_trait]
impl AccountService for MemoryBackend {
    async fn create(&self, email: &str, password: &str, name: &str) -> Result<Account, BackendError> {
        self.trip(FaultPoint::CreateAccount)?;

        if !email.contains('@') {
            return Err(BackendError::InvalidInput("Invalid email".into()));
        }
        if password.chars().count() < 8 {
            return Err(BackendError::InvalidInput(
                "Password must be at least 8 characters".into(),
            ));
        }
        if self.email_index.contains_key(email) {
            return Err(BackendError::Conflict("User already exists".into()));
        }

        let account = Account {
            id: unique_id(),
            email: email.to_string(),
            name: name.to_string(),
            created_at: Utc::now(),
        };
        let hashed_password = hash_password(password, self.hash_cost)?;

        // The index slot stays locked until the account is stored.
        match self.email_index.entry(account.email.clone()) {
            Entry::Occupied(_) => Err(BackendError::Conflict("User already exists".into())),
            Entry::Vacant(slot) => {
                self.accounts.insert(
                    account.id.clone(),
                    AccountRecord {
                        account: account.clone(),
                        hashed_password,
                    },
                );
                slot.insert(account.id.clone());
                Ok(account)
            }
        }
    }

    async fn create_email_password_session(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, BackendError> {
        self.trip(FaultPoint::CreateSession)?;

        let session_id = unique_id();
        let (account_id, token, expires_at) = {
            let account_id = self
                .email_index
                .get(email)
                .map(|id| id.value().clone())
                .ok_or(BackendError::Unauthorized)?;
            let record = self
                .accounts
                .get(&account_id)
                .ok_or(BackendError::Unauthorized)?;

            if !verify_password(password, &record.hashed_password)? {
                return Err(BackendError::Unauthorized);
            }

            let (token, expires_at) = create_token(
                &account_id,
                &session_id,
                &record.account.email,
                &self.jwt_secret,
                self.session_ttl,
            )?;
            (account_id, token, expires_at)
        };

        let session = Session {
            id: session_id,
            account_id,
            token: token.clone(),
            expires_at,
        };
        self.sessions.insert(session.id.clone(), session.clone());
        *self.current_session.write().await = Some(token);

        Ok(session)
    }

    async fn get(&self) -> Result<Account, BackendError> {
        let claims = self.current_claims().await?;
        self.accounts
            .get(&claims.sub)
            .map(|record| record.account.clone())
            .ok_or(BackendError::Unauthorized)
    }

    async fn delete_session(&self, session_id: &str) -> Result<(), BackendError> {
        let current = self.current_claims().await.ok();

        let target = if session_id == "current" {
            current
                .as_ref()
                .map(|claims| claims.sid.clone())
                .ok_or(BackendError::Unauthorized)?
        } else {
            session_id.to_string()
        };

        self.sessions
            .remove(&target)
            .ok_or_else(|| BackendError::NotFound(format!("session {}", target)))?;

        if current.is_some_and(|claims| claims.sid == target) {
            *self.current_session.write().await = None;
        }
        Ok(())
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        _ => Ordering::Equal,
    }
}

fn compare_field(a: &StoredDocument, b: &StoredDocument, field: &str) -> Ordering {
    match field {
        CREATED_AT => a.created_seq.cmp(&b.created_seq),
        UPDATED_AT => a.updated_seq.cmp(&b.updated_seq),
        _ => compare_values(a.document.data.get(field), b.document.data.get(field)),
    }
}

fn matches(doc: &Document, query: &Query) -> bool {
    match query {
        Query::Equal(field, value) => doc.data.get(field) == Some(value),
        Query::Contains(field, value) => doc
            .data
            .get(field)
            .and_then(Value::as_array)
            .is_some_and(|items| items.contains(value)),
        Query::Search(field, term) => doc
            .data
            .get(field)
            .and_then(Value::as_str)
            .is_some_and(|text| text.to_lowercase().contains(&term.to_lowercase())),
        _ => true,
    }
}

#[async_trait]
impl DocumentStore for MemoryBackend {
    async fn create_document(
        &self,
        collection: &str,
        id: &str,
        data: Map<String, Value>,
    ) -> Result<Document, BackendError> {
        self.trip(FaultPoint::CreateDocument(collection.to_string()))?;

        let table = self.collections.entry(collection.to_string()).or_default();
        if table.contains_key(id) {
            return Err(BackendError::Conflict(format!("document {} already exists", id)));
        }

        let now = Utc::now();
        let seq = self.next_seq();
        let document = Document {
            id: id.to_string(),
            collection: collection.to_string(),
            created_at: now,
            updated_at: now,
            data,
        };
        table.insert(
            id.to_string(),
            StoredDocument {
                document: document.clone(),
                created_seq: seq,
                updated_seq: seq,
            },
        );

        Ok(document)
    }

    async fn get_document(&self, collection: &str, id: &str) -> Result<Document, BackendError> {
        self.collections
            .get(collection)
            .and_then(|table| table.get(id).map(|stored| stored.document.clone()))
            .ok_or_else(|| BackendError::NotFound(format!("document {}", id)))
    }

    async fn update_document(
        &self,
        collection: &str,
        id: &str,
        patch: Map<String, Value>,
    ) -> Result<Document, BackendError> {
        self.trip(FaultPoint::UpdateDocument(collection.to_string()))?;

        let table = self
            .collections
            .get(collection)
            .ok_or_else(|| BackendError::NotFound(format!("document {}", id)))?;
        let mut stored = table
            .get_mut(id)
            .ok_or_else(|| BackendError::NotFound(format!("document {}", id)))?;

        stored.document.data.extend(patch);
        stored.document.updated_at = Utc::now();
        stored.updated_seq = self.next_seq();

        Ok(stored.document.clone())
    }

    async fn delete_document(&self, collection: &str, id: &str) -> Result<(), BackendError> {
        self.trip(FaultPoint::DeleteDocument(collection.to_string()))?;

        self.collections
            .get(collection)
            .and_then(|table| table.remove(id))
            .map(|_| ())
            .ok_or_else(|| BackendError::NotFound(format!("document {}", id)))
    }

    async fn list_documents(
        &self,
        collection: &str,
        queries: &[Query],
    ) -> Result<DocumentList, BackendError> {
        self.trip(FaultPoint::ListDocuments(collection.to_string()))?;

        let mut rows: Vec<StoredDocument> = match self.collections.get(collection) {
            Some(table) => table
                .iter()
                .filter(|entry| queries.iter().all(|q| matches(&entry.document, q)))
                .map(|entry| entry.value().clone())
                .collect(),
            None => Vec::new(),
        };

        let orders: Vec<(&str, bool)> = queries
            .iter()
            .filter_map(|q| match q {
                Query::OrderDesc(field) => Some((field.as_str(), true)),
                Query::OrderAsc(field) => Some((field.as_str(), false)),
                _ => None,
            })
            .collect();

        rows.sort_by(|a, b| {
            for (field, desc) in &orders {
                let ord = compare_field(a, b, field);
                let ord = if *desc { ord.reverse() } else { ord };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            a.created_seq.cmp(&b.created_seq)
        });

        let total = rows.len();

        let start = match queries.iter().rev().find_map(|q| match q {
            Query::CursorAfter(id) => Some(id),
            _ => None,
        }) {
            Some(cursor) => {
                let position = rows
                    .iter()
                    .position(|row| &row.document.id == cursor)
                    .ok_or_else(|| BackendError::NotFound(format!("cursor document {}", cursor)))?;
                position + 1
            }
            None => 0,
        };

        let limit = queries
            .iter()
            .rev()
            .find_map(|q| match q {
                Query::Limit(n) => Some(*n),
                _ => None,
            })
            .unwrap_or(DEFAULT_LIST_LIMIT);

        let documents = rows
            .into_iter()
            .skip(start)
            .take(limit)
            .map(|row| row.document)
            .collect();

        Ok(DocumentList { total, documents })
    }
}

#[async_trait]
impl FileStorage for MemoryBackend {
    async fn create_file(&self, bucket: &str, id: &str, file: FileUpload) -> Result<StoredFile, BackendError> {
        self.trip(FaultPoint::CreateFile)?;

        if file.bytes.is_empty() {
            return Err(BackendError::InvalidInput("File is empty".into()));
        }
        let key = (bucket.to_string(), id.to_string());
        if self.files.contains_key(&key) {
            return Err(BackendError::Conflict(format!("file {} already exists", id)));
        }

        let stored = StoredFile {
            id: id.to_string(),
            name: file.name,
            content_type: file.content_type,
            size: file.bytes.len(),
        };
        self.files.insert(
            key,
            StoredBlob {
                file: stored.clone(),
                bytes: file.bytes,
            },
        );

        Ok(stored)
    }

    async fn get_file(&self, bucket: &str, id: &str) -> Result<StoredFile, BackendError> {
        self.files
            .get(&(bucket.to_string(), id.to_string()))
            .map(|blob| blob.file.clone())
            .ok_or_else(|| BackendError::NotFound(format!("file {}", id)))
    }

    async fn get_file_preview(
        &self,
        bucket: &str,
        id: &str,
        options: PreviewOptions,
    ) -> Result<String, BackendError> {
        self.trip(FaultPoint::FilePreview)?;

        if !self.file_exists(bucket, id) {
            return Err(BackendError::NotFound(format!("file {}", id)));
        }

        Ok(format!(
            "{}/storage/buckets/{}/files/{}/preview?width={}&height={}&gravity={}&quality={}",
            self.endpoint,
            bucket,
            id,
            options.width,
            options.height,
            options.gravity.as_str(),
            options.quality
        ))
    }

    async fn delete_file(&self, bucket: &str, id: &str) -> Result<(), BackendError> {
        self.trip(FaultPoint::DeleteFile)?;

        self.files
            .remove(&(bucket.to_string(), id.to_string()))
            .map(|_| ())
            .ok_or_else(|| BackendError::NotFound(format!("file {}", id)))
    }

    fn initials_avatar(&self, name: &str) -> String {
        let initials: String = name
            .split_whitespace()
            .take(2)
            .filter_map(|word| word.chars().next())
            .flat_map(char::to_uppercase)
            .collect();

        format!("{}/avatars/initials?name={}", self.endpoint, initials)
    }
}
