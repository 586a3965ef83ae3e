//! BizOS Payments
//!
//! Payment-provider clients (Stripe, PayPal, M-Pesa Daraja), tenant-scoped
//! credential resolution, idempotent tenant provisioning from payment events,
//! the checkout-to-tenant claim ledger, and trial-expiry removal.

pub mod claims;
pub mod credentials;
pub mod error;
pub mod mpesa;
pub mod paypal;
pub mod provisioning;
pub mod stripe;
pub mod trials;
pub mod webhooks;

pub use claims::ClaimService;
pub use credentials::CredentialResolver;
pub use error::{PaymentError, PaymentResult};
pub use mpesa::{MpesaClient, MpesaConfig, MpesaEnv};
pub use paypal::{PayPalClient, PayPalConfig, PayPalMode};
pub use provisioning::{IdempotencyKey, ProvisioningService};
pub use stripe::{StripeClient, StripeConfig};
pub use trials::{SweepOutcome, TrialService};
pub use webhooks::WebhookService;
