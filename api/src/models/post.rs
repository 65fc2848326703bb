use super::FileUpload;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    pub creator_id: String,
    pub caption: String,
    pub image_url: String,
    pub image_id: String,
    pub tags: Vec<String>,
    /// Ids of the users who liked the post.
    pub likes: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Post {
    pub fn is_liked_by(&self, user_id: &str) -> bool {
        self.likes.iter().any(|id| id == user_id)
    }

    /// Liker list with `user_id` toggled in or out.
    pub fn toggled_likes(&self, user_id: &str) -> Vec<String> {
        if self.is_liked_by(user_id) {
            self.likes.iter().filter(|id| *id != user_id).cloned().collect()
        } else {
            let mut likes = self.likes.clone();
            likes.push(user_id.to_string());
            likes
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedPost {
    pub id: String,
    pub user_id: String,
    pub post_id: String,
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub user_id: String,
    pub caption: String,
    /// Comma separated, as typed in the form.
    pub tags: String,
    pub files: Vec<FileUpload>,
}

#[derive(Debug, Clone)]
pub struct UpdatePost {
    pub post_id: String,
    pub caption: String,
    pub tags: String,
    pub image_id: String,
    pub image_url: String,
    /// Empty keeps the current image.
    pub files: Vec<FileUpload>,
}

/// Splits the comma separated tag input. Spaces are dropped, as are empty
/// segments left by stray commas.
pub fn parse_tags(raw: &str) -> Vec<String> {
    raw.replace(' ', "")
        .split(',')
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_split_and_stripped() {
        assert_eq!(parse_tags("Umenie,Škola"), vec!["Umenie", "Škola"]);
        assert_eq!(parse_tags(" Umenie , Škola "), vec!["Umenie", "Škola"]);
        assert_eq!(parse_tags("a,,b,"), vec!["a", "b"]);
        assert!(parse_tags("").is_empty());
    }

    #[test]
    fn toggling_likes_adds_then_removes() {
        let now = Utc::now();
        let mut post = Post {
            id: "p1".into(),
            creator_id: "u1".into(),
            caption: "caption".into(),
            image_url: "url".into(),
            image_id: "f1".into(),
            tags: vec![],
            likes: vec!["u2".into()],
            created_at: now,
            updated_at: now,
        };

        assert_eq!(post.toggled_likes("u3"), vec!["u2", "u3"]);
        post.likes = post.toggled_likes("u2");
        assert!(post.likes.is_empty());
    }
}
