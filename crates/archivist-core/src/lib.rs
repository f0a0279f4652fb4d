//! Core types and trait definitions for the chat archive.
//!
//! This crate is deliberately free of HTTP and database dependencies. It owns
//! the data model, the search query language, the directory cache used for
//! name resolution and access control, and the search executor. Storage
//! backends and platform clients plug in through the [`store::ArchiveStore`]
//! and [`platform::Platform`] traits.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod directory;
pub mod error;
pub mod event;
pub mod model;
pub mod platform;
pub mod query;
pub mod search;
pub mod store;

pub use error::{Error, Result};
