//! Frontier - distributed discovery crawler for community platforms.
//!
//! Expands a frontier of communities by walking from each one to the other
//! communities its active authors post in, then renders engagement metrics
//! for the communities it has explored.

pub mod cli;
pub mod config;
pub mod discovery;
pub mod error;
pub mod identity;
pub mod llm;
pub mod models;
pub mod repository;
pub mod scrapers;
pub mod services;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use error::{CrawlError, CrawlResult};
