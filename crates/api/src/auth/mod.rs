//! Authentication for BizOS API
//!
//! Users authenticate with HS256 bearer tokens issued by the platform auth
//! service; the trial sweep trigger authenticates with the service-role key.

pub mod jwt;
pub mod middleware;

pub use jwt::{JwtError, JwtManager, UserClaims};
pub use middleware::{require_auth, require_service_role, AuthState, AuthUser};
