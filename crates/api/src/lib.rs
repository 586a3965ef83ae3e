//! BizOS API Library
//!
//! HTTP surface of the BizOS payments and provisioning service: payment
//! endpoints, provider webhooks, checkout claims, booking cancellation,
//! trial removal, and custom-domain tenant resolution.

pub mod auth;
pub mod config;
pub mod email;
pub mod error;
pub mod routes;
pub mod routing;
pub mod state;

pub use config::Config;
pub use error::{ApiError, ApiResult, AppJson};
pub use routing::{DomainCache, HostResolver};
pub use state::AppState;
