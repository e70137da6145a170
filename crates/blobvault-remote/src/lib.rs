//! Blobvault Remote Backend
//!
//! This crate provides the blob store implementation backed by another
//! blobvault server over HTTP, including digest re-verification of every
//! download.

pub mod client;
pub mod error;

pub use client::{RemoteConfig, RemoteStore};
pub use error::RemoteError;
