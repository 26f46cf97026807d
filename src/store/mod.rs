//! Durable storage for resolved exchange rates

pub mod disk;

pub use disk::{CacheStats, RateCache};
