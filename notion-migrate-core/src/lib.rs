#![doc = "notion-migrate-core: engine migrating a markdown export tree into Notion."]

//! This crate holds the migration engine: the rate-limited scheduler, the
//! destination client and block materializer, the content transformer and the
//! two-phase tree walker, plus the HTTP collaborators they talk to.
//!
//! # Usage
//! Build a [`synchronise::TreeWalker`] from a [`client::DestinationClient`] and a
//! [`transform::Transformer`], then call [`synchronise::TreeWalker::migrate`].
//! The `notion-migrate` binary crate does exactly this from a YAML config.

pub mod assets;
pub mod blocks;
pub mod client;
pub mod config;
pub mod contract;
pub mod error;
pub mod location;
pub mod materialize;
pub mod notion;
pub mod parse;
pub mod policy;
pub mod scheduler;
pub mod synchronise;
pub mod transform;
