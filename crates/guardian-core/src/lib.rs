//! Core types and the normalization/reconciliation pipeline for Guardian.
//!
//! Raw store rows flow through the fallback resolver ([`resolve`]), are
//! canonicalised by the shape normalizer ([`normalize`]) and merged into a
//! timeline ([`timeline`]). This crate is free of HTTP and database
//! dependencies; stores are reached through the traits in [`store`].

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod catalog;
pub mod entity;
pub mod error;
pub mod event;
pub mod live;
pub mod load;
pub mod normalize;
pub mod resolve;
pub mod session;
pub mod shape;
pub mod store;
pub mod timeline;

pub use error::{Error, Result};
