//! Host-to-Tenant Resolution
//!
//! Resolves incoming Host headers to tenant slugs for custom-domain routing.
//! Supports:
//! - Platform subdomains: acme.bizos.app -> tenant lookup by slug
//! - Custom domains: booking.acme-salon.com -> tenant lookup by custom_domain

use sqlx::PgPool;
use std::sync::Arc;

use super::DomainCache;

/// Reserved subdomains that cannot belong to tenants
pub const RESERVED_SUBDOMAINS: &[&str] = &[
    "api", "www", "admin", "mail", "app", "dashboard", "console", "portal", "docs", "help",
    "support", "status", "blog", "cdn", "static", "assets", "staging", "dev", "test", "demo",
];

/// Host resolver with caching
#[derive(Clone)]
pub struct HostResolver {
    pool: PgPool,
    cache: Arc<DomainCache>,
    base_domain: String,
}

impl HostResolver {
    /// Create a new host resolver
    pub fn new(pool: PgPool, base_domain: String) -> Self {
        Self {
            pool,
            cache: Arc::new(DomainCache::new()),
            base_domain,
        }
    }

    /// Resolve a host header to a tenant slug
    pub async fn resolve(&self, host: &str) -> Result<String, HostResolveError> {
        let host = normalize_host(host);

        if host.is_empty() || is_platform_host(&host, &self.base_domain) {
            return Err(HostResolveError::NotFound(host));
        }

        // Check cache first
        if let Some(cached) = self.cache.get(&host) {
            return match cached {
                Some(slug) => Ok(slug),
                None => Err(HostResolveError::NotFound(host)),
            };
        }

        // Subdomain of the platform base domain
        let base_suffix = format!(".{}", self.base_domain);
        if let Some(subdomain) = host.strip_suffix(&base_suffix) {
            if RESERVED_SUBDOMAINS.contains(&subdomain) {
                self.cache.set(&host, None);
                return Err(HostResolveError::ReservedSubdomain(subdomain.to_string()));
            }

            if let Some(slug) = self.resolve_slug(subdomain).await? {
                self.cache.set(&host, Some(slug.clone()));
                return Ok(slug);
            }

            self.cache.set(&host, None);
            return Err(HostResolveError::NotFound(host));
        }

        // Custom domain lookup
        if let Some(slug) = self.resolve_custom_domain(&host).await? {
            self.cache.set(&host, Some(slug.clone()));
            return Ok(slug);
        }

        self.cache.set(&host, None);
        Err(HostResolveError::NotFound(host))
    }

    /// Look up an active tenant by its slug (platform subdomain)
    async fn resolve_slug(&self, subdomain: &str) -> Result<Option<String>, HostResolveError> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT slug FROM tenants WHERE slug = $1 AND status = 'active'",
        )
        .bind(subdomain)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| HostResolveError::Database(e.to_string()))?;

        Ok(row.map(|(slug,)| slug))
    }

    /// Look up an active tenant by a verified custom domain
    async fn resolve_custom_domain(
        &self,
        domain: &str,
    ) -> Result<Option<String>, HostResolveError> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT slug FROM tenants WHERE custom_domain = $1 AND status = 'active'",
        )
        .bind(domain)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| HostResolveError::Database(e.to_string()))?;

        Ok(row.map(|(slug,)| slug))
    }

    /// Invalidate cache for a specific host
    pub fn invalidate_host(&self, host: &str) {
        let host = normalize_host(host);
        self.cache.invalidate(&host);
    }
}

/// Normalize a host header value: strip the port, lowercase
fn normalize_host(host: &str) -> String {
    let host = host.split(':').next().unwrap_or(host);
    host.trim().to_lowercase()
}

/// The bare platform host and its api subdomain never map to a tenant
fn is_platform_host(host: &str, base_domain: &str) -> bool {
    host == base_domain || host == format!("api.{base_domain}")
}

/// Errors that can occur during host resolution
#[derive(Debug, thiserror::Error)]
pub enum HostResolveError {
    #[error("Host not found: {0}")]
    NotFound(String),

    #[error("Reserved subdomain: {0}")]
    ReservedSubdomain(String),

    #[error("Database error: {0}")]
    Database(String),
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_host() {
        assert_eq!(normalize_host("Acme.Bizos.APP"), "acme.bizos.app");
        assert_eq!(normalize_host("acme.bizos.app:8080"), "acme.bizos.app");
        assert_eq!(normalize_host(" booking.acme.com:443"), "booking.acme.com");
    }

    #[test]
    fn test_is_platform_host() {
        assert!(is_platform_host("bizos.app", "bizos.app"));
        assert!(is_platform_host("api.bizos.app", "bizos.app"));
        assert!(!is_platform_host("acme.bizos.app", "bizos.app"));
        assert!(!is_platform_host("booking.acme.com", "bizos.app"));
    }

    #[test]
    fn test_reserved_subdomains() {
        assert!(RESERVED_SUBDOMAINS.contains(&"api"));
        assert!(RESERVED_SUBDOMAINS.contains(&"www"));
        assert!(RESERVED_SUBDOMAINS.contains(&"admin"));
        assert!(!RESERVED_SUBDOMAINS.contains(&"acme"));
    }
}
