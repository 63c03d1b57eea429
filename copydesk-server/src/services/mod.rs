//! External collaborators and pipeline orchestration
//!
//! Provider clients are narrow capability types; the pipelines depend on
//! the traits in `provider`, never on a concrete wire format.

pub mod cms_client;
pub mod engine_client;
pub mod fingerprint;
pub mod image_backends;
pub mod image_pipeline;
pub mod learning;
pub mod llm_client;
pub mod provider;
pub mod supervisor;
pub mod translation_client;
pub mod translation_pipeline;
pub mod watchdog;
