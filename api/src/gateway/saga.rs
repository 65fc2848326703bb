//! Multi-step writes with compensating actions.
//!
//! Creating or updating a post touches file storage and the document store,
//! which share no transaction. A [`Saga`] remembers how to undo every step
//! that already succeeded and unwinds them, newest first, when a later step
//! fails. Cleanup that must only happen once everything succeeded (dropping a
//! replaced image) is queued with [`Saga::after_commit`].
//!
//! Actions are plain futures, so nothing runs until the saga decides to.
//! Dropping a saga without calling [`Saga::commit`] discards both queues.

use crate::errors::BackendError;
use futures_util::future::{BoxFuture, FutureExt};
use std::future::Future;
use tracing::{error, warn};

type Action = BoxFuture<'static, Result<(), BackendError>>;

pub struct Saga {
    name: &'static str,
    compensations: Vec<(&'static str, Action)>,
    after_commit: Vec<(&'static str, Action)>,
}

impl Saga {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            compensations: Vec::new(),
            after_commit: Vec::new(),
        }
    }

    /// Registers the undo action of a step that just succeeded.
    pub fn compensate_with<F>(&mut self, label: &'static str, action: F)
    where
        F: Future<Output = Result<(), BackendError>> + Send + 'static,
    {
        self.compensations.push((label, action.boxed()));
    }

    pub fn after_commit<F>(&mut self, label: &'static str, action: F)
    where
        F: Future<Output = Result<(), BackendError>> + Send + 'static,
    {
        self.after_commit.push((label, action.boxed()));
    }

    /// Passes a step's result through, rolling back first if it failed.
    pub async fn check<T>(&mut self, result: Result<T, BackendError>) -> Result<T, BackendError> {
        match result {
            Ok(value) => Ok(value),
            Err(err) => {
                self.rollback(&err).await;
                Err(err)
            }
        }
    }

    async fn rollback(&mut self, cause: &BackendError) {
        warn!(saga = self.name, error = %cause, "Step failed, compensating");
        self.after_commit.clear();

        while let Some((label, action)) = self.compensations.pop() {
            if let Err(err) = action.await {
                error!(saga = self.name, step = label, error = %err, "Compensation failed");
            }
        }
    }

    /// Runs the post-commit cleanup. A failure there is logged and leaves the
    /// committed write in place.
    pub async fn commit(self) {
        for (label, action) in self.after_commit {
            if let Err(err) = action.await {
                warn!(saga = self.name, step = label, error = %err, "Post-commit cleanup failed");
            }
        }
    }
}
