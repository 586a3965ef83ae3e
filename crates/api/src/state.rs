//! Shared application state

use std::sync::Arc;

use bizos_payments::{ClaimService, CredentialResolver, TrialService, WebhookService};
use bizos_shared::GracePolicy;
use sqlx::PgPool;

use crate::auth::{AuthState, JwtManager};
use crate::config::Config;
use crate::email::BookingMailer;
use crate::routing::HostResolver;

/// Everything handlers need, constructed once at startup and injected.
/// No service reads a process-wide singleton.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub credentials: CredentialResolver,
    pub webhooks: WebhookService,
    pub claims: ClaimService,
    pub trials: TrialService,
    pub mailer: BookingMailer,
    pub host_resolver: HostResolver,
    jwt: JwtManager,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> Self {
        let jwt = JwtManager::new(&config.auth_jwt_secret);
        let mailer = BookingMailer::new(&config.resend_api_key, &config.resend_from_email);
        let host_resolver = HostResolver::new(pool.clone(), config.base_domain.clone());

        Self {
            credentials: CredentialResolver::new(pool.clone()),
            webhooks: WebhookService::new(pool.clone()),
            claims: ClaimService::new(pool.clone()),
            trials: TrialService::new(pool.clone(), GracePolicy::from_env()),
            mailer,
            host_resolver,
            jwt,
            config: Arc::new(config),
            pool,
        }
    }

    /// The slice of state the auth middleware runs on
    pub fn auth_state(&self) -> AuthState {
        AuthState {
            jwt: self.jwt.clone(),
            service_role_key: self.config.service_role_key.clone(),
        }
    }
}
