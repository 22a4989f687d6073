//! Reentrancy guards.
//!
//! Elements wrap their run functions in a guard so overlapping triggers never
//! execute the same element twice at once:
//!
//! - [`MutexGuard`]: calls arriving while one is in flight are dropped.
//! - [`SingletonGuard`]: same, but in trailing mode the first dropped call is
//!   turned into one extra run after the current one finishes.
//!
//! Both are front-ends over one lock state machine (`idle`, `running`,
//! `running + trailing queued`). A dropped call yields `None`, never an error.

mod mutex;
mod singleton;
mod state;

pub use mutex::MutexGuard;
pub use singleton::{SingletonGuard, SingletonOptions};
pub use state::GuardPhase;
