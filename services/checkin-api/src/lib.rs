//! Event check-in service.
//!
//! This crate primarily ships a `checkin-api` binary, but we expose a small
//! library surface to enable integration testing and reuse.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod engine;
pub mod notifier;
pub mod seed;
pub mod state;
