//! Per-entity database queries for copydesk-server
//!
//! Schema creation lives in copydesk-common; these modules hold the queries
//! the service actually runs, one module per entity.

pub mod articles;
pub mod contents;
pub mod profile;
pub mod supervisor;
pub mod translations;
