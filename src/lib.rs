//! Pre-game betting value pipeline: odds ingestion, sport models,
//! opportunity selection, persistence, and alerting.

pub mod config;
pub mod db;
pub mod markets;
pub mod models;
pub mod pipeline;
pub mod sharp;
pub mod sources;
pub mod teams;
