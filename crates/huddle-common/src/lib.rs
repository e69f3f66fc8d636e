//! # huddle-common
//!
//! Shared types, configuration, error handling, and utilities used across all
//! Huddle crates. This is the foundation layer — no business logic, just
//! primitives and contracts.

pub mod config;
pub mod error;
pub mod event;
pub mod id;
pub mod models;
