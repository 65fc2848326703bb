//! Who is signed in, derived from the backend rather than stored as a flag.

use crate::{
    dto::{FieldErrors, SignInForm, SignUpForm, field_errors},
    models::{NewUser, User},
    query::{QueryKey, QueryResult, Queries, invalidation::Invalidation},
};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};
use validator::Validate;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "user", rename_all = "camelCase")]
pub enum SessionState {
    Anonymous,
    Authenticating,
    Authenticated(User),
    SignedOut,
}

/// Shown to the user as a notification; nothing more specific is known.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid form")]
    Invalid(FieldErrors),
    #[error("Account creation failed. Please try again.")]
    AccountCreation,
    #[error("Sign in failed. Please try again.")]
    SignIn,
    #[error("Sign out failed. Please try again.")]
    SignOut,
}

pub struct SessionContext {
    queries: Arc<Queries>,
    state: watch::Sender<SessionState>,
}

impl SessionContext {
    pub fn new(queries: Arc<Queries>) -> Self {
        let (state, _) = watch::channel(SessionState::Anonymous);
        Self { queries, state }
    }

    pub fn queries(&self) -> &Arc<Queries> {
        &self.queries
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(*self.state.borrow(), SessionState::Authenticated(_))
    }

    pub fn user(&self) -> Option<User> {
        match &*self.state.borrow() {
            SessionState::Authenticated(user) => Some(user.clone()),
            _ => None,
        }
    }

    /// Picks up a session that outlived a restart.
    pub async fn restore(&self) -> SessionState {
        self.check_auth_user().await;
        self.state()
    }

    /// Re-reads the current user and moves to `Authenticated` when there is
    /// one. Returns whether that happened. An authenticated session stays
    /// authenticated while the check runs.
    pub async fn check_auth_user(&self) -> bool {
        let previous = self.state();
        if !matches!(previous, SessionState::Authenticated(_)) {
            self.set(SessionState::Authenticating);
        }

        self.queries
            .client()
            .invalidate(&Invalidation::Key(QueryKey::CurrentUser));

        match self.queries.current_user().await {
            QueryResult::Ready(user) => {
                info!(user_id = %user.id, "Session authenticated");
                self.set(SessionState::Authenticated(user));
                true
            }
            _ => {
                let next = match previous {
                    SessionState::Authenticated(_) | SessionState::SignedOut => {
                        SessionState::SignedOut
                    }
                    _ => SessionState::Anonymous,
                };
                self.set(next);
                false
            }
        }
    }

    /// Publishes `next` unless it is already the current state.
    fn set(&self, next: SessionState) {
        self.state.send_if_modified(|state| {
            if *state == next {
                return false;
            }
            *state = next;
            true
        });
    }

    pub async fn sign_up(&self, form: &SignUpForm) -> Result<User, SessionError> {
        form.validate()
            .map_err(|e| SessionError::Invalid(field_errors(&e)))?;

        let new_user = NewUser {
            name: form.name.clone(),
            username: form.username.clone(),
            email: form.email.clone(),
            password: form.password.clone(),
        };

        if self.queries.create_user_account(&new_user).await.is_none() {
            return Err(SessionError::AccountCreation);
        }

        self.sign_in(&SignInForm {
            email: form.email.clone(),
            password: form.password.clone(),
        })
        .await
    }

    pub async fn sign_in(&self, form: &SignInForm) -> Result<User, SessionError> {
        form.validate()
            .map_err(|e| SessionError::Invalid(field_errors(&e)))?;

        if self
            .queries
            .sign_in_account(&form.email, &form.password)
            .await
            .is_none()
        {
            return Err(SessionError::SignIn);
        }

        if !self.check_auth_user().await {
            warn!(email = %form.email, "Session created but no current user");
            return Err(SessionError::SignIn);
        }

        self.user().ok_or(SessionError::SignIn)
    }

    pub async fn sign_out(&self) -> Result<(), SessionError> {
        self.queries
            .sign_out_account()
            .await
            .ok_or(SessionError::SignOut)?;

        self.set(SessionState::SignedOut);
        info!("Signed out");
        Ok(())
    }
}
