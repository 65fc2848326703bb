//! Which reads go stale after which writes.
//!
//! Every mutation has exactly one row in [`TABLE`]; the tests below hold the
//! table to that.

use super::{KeyFamily, QueryKey};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MutationKind {
    CreateUserAccount,
    SignIn,
    SignOut,
    CreatePost,
    LikePost,
    SavePost,
    DeleteSavedPost,
    UpdatePost,
    DeletePost,
}

impl MutationKind {
    pub const ALL: [MutationKind; 9] = [
        MutationKind::CreateUserAccount,
        MutationKind::SignIn,
        MutationKind::SignOut,
        MutationKind::CreatePost,
        MutationKind::LikePost,
        MutationKind::SavePost,
        MutationKind::DeleteSavedPost,
        MutationKind::UpdatePost,
        MutationKind::DeletePost,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Every key of the family.
    Family(KeyFamily),
    /// The family's key for the mutation's subject (e.g. the post just liked).
    Subject(KeyFamily),
}

use KeyFamily::*;
use Target::{Family, Subject};

pub const TABLE: &[(MutationKind, &[Target])] = &[
    (MutationKind::CreateUserAccount, &[Family(Users)]),
    (MutationKind::SignIn, &[Family(CurrentUser)]),
    (MutationKind::SignOut, &[Family(CurrentUser), Family(SavedPosts)]),
    (MutationKind::CreatePost, &[Family(RecentPosts), Family(SearchPosts)]),
    (
        MutationKind::LikePost,
        &[
            Subject(PostById),
            Family(RecentPosts),
            Family(InfinitePosts),
            Family(CurrentUser),
            Family(SearchPosts),
        ],
    ),
    (
        MutationKind::SavePost,
        &[
            Family(RecentPosts),
            Family(InfinitePosts),
            Family(CurrentUser),
            Family(SavedPosts),
        ],
    ),
    (
        MutationKind::DeleteSavedPost,
        &[
            Family(RecentPosts),
            Family(InfinitePosts),
            Family(CurrentUser),
            Family(SavedPosts),
        ],
    ),
    (MutationKind::UpdatePost, &[Subject(PostById), Family(SearchPosts)]),
    (
        MutationKind::DeletePost,
        &[
            Family(RecentPosts),
            Subject(PostById),
            Family(InfinitePosts),
            Family(SearchPosts),
        ],
    ),
];

/// A concrete thing to mark stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invalidation {
    Family(KeyFamily),
    Key(QueryKey),
}

pub fn targets(kind: MutationKind) -> &'static [Target] {
    TABLE
        .iter()
        .find(|(row, _)| *row == kind)
        .map(|(_, targets)| *targets)
        .unwrap_or(&[])
}

/// Resolves the row for `kind`. A subject target without a subject widens to
/// the whole family.
pub fn resolve(kind: MutationKind, subject: Option<&str>) -> Vec<Invalidation> {
    targets(kind)
        .iter()
        .map(|target| match *target {
            Target::Family(family) => Invalidation::Family(family),
            Target::Subject(family) => subject
                .and_then(|id| QueryKey::with_subject(family, id))
                .map(Invalidation::Key)
                .unwrap_or(Invalidation::Family(family)),
        })
        .collect()
}
