//! Rate limiting for actor messages

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter type alias
pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Create a rate limiter with the specified requests per second
pub fn create_limiter(requests_per_second: u32) -> Arc<Limiter> {
    let quota = Quota::per_second(NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::direct(quota))
}

/// Movement/aim/fire intents per second, per actor
pub const INTENT_RATE_LIMIT: u32 = 60;

/// Seat requests per second, per actor
pub const SEAT_RATE_LIMIT: u32 = 4;

/// Per-actor rate limiter state
#[derive(Clone)]
pub struct ActorRateLimiter {
    intent_limiter: Arc<Limiter>,
    seat_limiter: Arc<Limiter>,
}

impl ActorRateLimiter {
    pub fn new() -> Self {
        Self {
            intent_limiter: create_limiter(INTENT_RATE_LIMIT),
            seat_limiter: create_limiter(SEAT_RATE_LIMIT),
        }
    }

    /// Check if a control intent is allowed (returns true if allowed)
    pub fn check_intent(&self) -> bool {
        self.intent_limiter.check().is_ok()
    }

    /// Check if a seat request is allowed
    pub fn check_seat_request(&self) -> bool {
        self.seat_limiter.check().is_ok()
    }
}

impl Default for ActorRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
