//! BizOS Shared Types and Utilities
//!
//! This crate contains types, errors, and utilities shared across the BizOS platform.

pub mod db;
pub mod error;
pub mod trial;
pub mod types;

pub use db::*;
pub use error::*;
pub use trial::{is_in_grace_period, is_past_grace_period, is_trial_expired, GracePolicy};
pub use types::*;
