#![doc = "notion-mirror-core: reconciliation and commit engine for notion-mirror."]

//! This crate holds all sync logic for notion-mirror: attribute normalization,
//! path resolution, change detection, the location ledger, the fetch pool and
//! the batch commit builder. Transport clients (Notion, GitHub) live in the
//! CLI crate and plug in through the traits in [`contract`].
//!
//! # Usage
//! Build a [`config::SyncOptions`], hand a [`contract::ContentSource`] and a
//! [`contract::DestinationStore`] to [`synchronise::synchronise`], and read the
//! returned [`synchronise::SyncReport`].

pub mod attributes;
pub mod cache;
pub mod change;
pub mod commit;
pub mod config;
pub mod contract;
pub mod error;
pub mod ledger;
pub mod path;
pub mod pool;
pub mod render;
pub mod retry;
pub mod suitability;
pub mod synchronise;
