//! Activity coordination backend: a user-scoped activity feed, the host-only
//! mutation gate, and the realtime comment hub.

pub mod config;
pub mod database;
pub mod error;
pub mod models;
pub mod services;
pub mod web;
