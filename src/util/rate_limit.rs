//! Rate limiting utilities

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter type alias
pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Caps the damage invocations one room member may submit.
///
/// A quota of zero disables the cap, so every hit is relayed.
#[derive(Clone, Default)]
pub struct DamageGuard {
    limiter: Option<Arc<Limiter>>,
}

impl DamageGuard {
    pub fn new(per_second: u32) -> Self {
        let limiter = NonZeroU32::new(per_second)
            .map(|quota| Arc::new(RateLimiter::direct(Quota::per_second(quota))));
        Self { limiter }
    }

    /// True if the next damage invocation may be relayed
    pub fn allows(&self) -> bool {
        self.limiter
            .as_ref()
            .map_or(true, |limiter| limiter.check().is_ok())
    }
}
