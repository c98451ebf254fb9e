//! Rate limiting algorithms, limiter construction and per-identity state.

mod fixed_window;
mod identity;
mod leaky_bucket;
mod limiter;
mod registry;
mod rules;
mod sliding_window_counter;
mod sliding_window_log;
mod token_bucket;

pub use fixed_window::FixedWindowCounter;
pub use identity::Identity;
pub use leaky_bucket::LeakyBucket;
pub use limiter::{Algorithm, Limiter, LimiterKind, LockedLimiter};
pub use registry::IdentityRegistry;
pub use rules::LimiterConfig;
pub use sliding_window_counter::SlidingWindowCounter;
pub use sliding_window_log::SlidingWindowLog;
pub use token_bucket::TokenBucket;
