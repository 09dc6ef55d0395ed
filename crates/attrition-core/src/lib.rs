//! attrition-core: attrition-risk inference and per-feature attribution.
//!
//! This crate loads two pretrained gradient-boosted pipelines (one driven by
//! demographic/employment attributes, one by survey answers), validates
//! request records against a fixed per-variant schema, computes calibrated
//! probabilities and risk buckets, and decomposes every prediction into
//! exact per-feature contributions with TreeSHAP.
//!
//! All model state lives in an immutable [`registry::ModelRegistry`] built
//! once at startup and shared behind an `Arc`; request handling goes through
//! [`service::AttritionService`].
pub mod baseline;
pub mod config;
pub mod error;
pub mod explain;
pub mod inference;
pub mod io;
pub mod models;
pub mod normalize;
pub mod preprocessing;
pub mod registry;
pub mod schema;
pub mod service;

pub use error::{AttritionError, ErrorResponse};
pub use schema::Variant;
pub use service::AttritionService;
