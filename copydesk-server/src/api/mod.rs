//! HTTP API handlers for copydesk-server
//!
//! Thin route layer; the components under `crate::services` and
//! `crate::lifecycle` do the actual work.

pub mod articles;
pub mod health;
pub mod images;
pub mod publish;
pub mod settings;
pub mod sse;
pub mod supervisor;
pub mod translations;
pub mod webhook;

pub use health::health_routes;
pub use sse::event_stream;
