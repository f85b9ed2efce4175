//! HTTP surface for the BlogCrew pipeline.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;
