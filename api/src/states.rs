use crate::{config::ConfigError, query::Queries, session::SessionContext};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::{num::NonZeroU32, sync::Arc};

// ============================================================================
// APPLICATION STATE - Shared data across all requests
// ============================================================================
/// The session owns the query layer, which owns the gateway; handlers reach
/// everything through it.
///
/// `DefaultDirectRateLimiter` is one token bucket for the whole server.
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<SessionContext>,
    pub limiter: Arc<DefaultDirectRateLimiter>,
}

impl AppState {
    pub fn new(session: Arc<SessionContext>, requests_per_second: u32) -> Result<Self, ConfigError> {
        let rate = NonZeroU32::new(requests_per_second).ok_or(ConfigError::Invalid {
            key: "RATE_LIMIT_PER_SECOND",
            value: requests_per_second.to_string(),
        })?;

        Ok(Self {
            session,
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(rate))),
        })
    }

    pub fn queries(&self) -> &Queries {
        self.session.queries()
    }
}
