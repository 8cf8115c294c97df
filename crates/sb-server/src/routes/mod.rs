//! Route handlers.

pub mod bridge;
pub mod health;
pub mod range;
pub mod sessions;
