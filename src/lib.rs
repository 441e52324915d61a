#![doc = "readwise-migrate-core: core logic library for readwise-migrate."]

//! This crate contains the data models and pipelines that move highlights and
//! Reader documents from a source Readwise account into a target account.
//! The CLI crate only parses arguments, loads config and wires the clients.
//!
//! # Usage
//! Build a [`synchronise::SyncConfig`], construct one [`client::ReadwiseClient`]
//! per account and hand both to [`synchronise::synchronise`].

pub mod cache;
pub mod client;
pub mod contract;
pub mod fetch;
pub mod model;
pub mod retry;
pub mod synchronise;
pub mod transform;
pub mod upload;
