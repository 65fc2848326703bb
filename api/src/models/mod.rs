mod account;
mod file;
mod post;
mod user;

pub use account::{Account, Session};
pub use file::{FileUpload, StoredFile};
pub use post::{NewPost, Post, SavedPost, UpdatePost, parse_tags};
pub use user::{NewUser, User};
