//! Session security: tokens, pairing codes, rate limiting, input screening

pub mod pairing;
pub mod ratelimit;
pub mod screen;
pub mod token;

pub use pairing::PairingCodeManager;
pub use ratelimit::RateLimiter;
pub use screen::{classify, sanitize, Suspicion};
pub use token::TokenManager;
