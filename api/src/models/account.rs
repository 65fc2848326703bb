use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Auth identity held by the backend, separate from the profile document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    pub email: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub account_id: String,
    #[serde(skip_serializing)]
    pub token: String,
    pub expires_at: DateTime<Utc>,
}
