//! Host-to-tenant routing

pub mod cache;
pub mod host_resolver;

pub use cache::DomainCache;
pub use host_resolver::{HostResolveError, HostResolver, RESERVED_SUBDOMAINS};
