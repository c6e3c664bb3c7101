//! Palaver is a multi-provider chat session core: named conversation
//! threads, per-provider credentials and model catalogs, and token-by-token
//! streaming of assistant responses into observable session state.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns session state: thread, credential, catalog, and
//!   capability stores, provider resolution, and streaming orchestration.
//! - [`api`] defines the chat/model wire payloads and the per-provider
//!   catalog fetchers.
//! - [`utils`] holds URL plumbing shared by every HTTP call site.
//!
//! The binary (`src/main.rs`) wraps [`core::session::ChatSession`] in a
//! minimal line-oriented terminal driver.

pub mod api;
pub mod core;
pub mod utils;
