//! Strategy-agnostic data types.

pub mod config;
pub mod query;
pub mod retrieval;
pub mod routing;
pub mod workflow;
