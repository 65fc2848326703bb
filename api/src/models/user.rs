use super::SavedPost;
use serde::{Deserialize, Serialize};

/// Profile document stored next to the auth account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub account_id: String,
    pub email: String,
    pub name: String,
    pub username: String,
    pub image_url: String,
    /// Only filled in for the signed-in user.
    #[serde(default)]
    pub saves: Vec<SavedPost>,
}

impl User {
    pub fn saved_record_for(&self, post_id: &str) -> Option<&SavedPost> {
        self.saves.iter().find(|save| save.post_id == post_id)
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub username: String,
    pub email: String,
    pub password: String,
}
