//! Blobvault Core Business Logic
//!
//! This crate provides the cache/origin store composition with eviction and
//! synchronization, and the claim-aware blob service that layers quotas and
//! per-user visibility over any blob store.

pub mod cache;
pub mod error;
pub mod service;

pub use cache::{spawn_flush_task, CacheConfig, CacheStore, EvictionPolicy};
pub use error::CoreError;
pub use service::{BlobService, PutOutcome};
