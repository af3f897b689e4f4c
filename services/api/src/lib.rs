//! Verba API Library Crate
//!
//! HTTP surface of the tutor: configuration, the PostgreSQL learner store,
//! request handlers and routing. The `api` binary is a thin wrapper around
//! this library.

pub mod config;
pub mod db;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
