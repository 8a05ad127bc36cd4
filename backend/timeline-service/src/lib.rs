//! Timeline Service
//!
//! Fans new posts out to follower timelines and keeps a per-day cache of
//! post snapshots for each user's timeline, backed by Postgres references.

pub mod clients;
pub mod codec;
pub mod config;
pub mod consumers;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod repository;
pub mod services;

pub use config::Config;
pub use error::{TimelineError, TimelineResult};
