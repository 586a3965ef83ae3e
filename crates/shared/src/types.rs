//! Common types used across BizOS

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// ID Wrappers
// =============================================================================

/// Tenant ID wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub Uuid);

impl TenantId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TenantId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for TenantId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// User ID wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for UserId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Booking ID wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookingId(pub Uuid);

impl BookingId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BookingId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for BookingId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

// =============================================================================
// Enums
// =============================================================================

/// Subscription plan for a tenant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionPlan {
    Free,
    Starter,
    Lifetime,
}

impl Default for SubscriptionPlan {
    fn default() -> Self {
        Self::Free
    }
}

impl SubscriptionPlan {
    /// Whether this plan expires via trial logic.
    /// Only `free` carries a trial; paid plans never expire this way.
    pub fn expires_by_trial(&self) -> bool {
        matches!(self, Self::Free)
    }

    /// Fixed platform price in minor units (cents) for purchasable plans.
    /// `free` has no price.
    pub fn platform_price_minor_units(&self) -> Option<i64> {
        match self {
            Self::Free => None,
            Self::Starter => Some(2_900),
            Self::Lifetime => Some(50_000),
        }
    }

    /// Infer a plan from a payment amount in minor units when the provider
    /// event carries no explicit plan metadata.
    /// At or above $500.00 (50000 minor units) the purchase is lifetime.
    pub fn infer_from_minor_units(amount: i64) -> Self {
        if amount >= 50_000 {
            Self::Lifetime
        } else {
            Self::Starter
        }
    }
}

impl std::fmt::Display for SubscriptionPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Free => write!(f, "free"),
            Self::Starter => write!(f, "starter"),
            Self::Lifetime => write!(f, "lifetime"),
        }
    }
}

impl std::str::FromStr for SubscriptionPlan {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "starter" => Ok(Self::Starter),
            "lifetime" => Ok(Self::Lifetime),
            _ => Err(format!("Invalid subscription plan: {}", s)),
        }
    }
}

/// Tenant account status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TenantStatus {
    Active,
    Suspended,
    Inactive,
}

impl Default for TenantStatus {
    fn default() -> Self {
        Self::Active
    }
}

impl std::fmt::Display for TenantStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Suspended => write!(f, "suspended"),
            Self::Inactive => write!(f, "inactive"),
        }
    }
}

/// Where a tenant's workspace runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DeploymentType {
    Hosted,
    External,
}

impl Default for DeploymentType {
    fn default() -> Self {
        Self::Hosted
    }
}

impl std::fmt::Display for DeploymentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hosted => write!(f, "hosted"),
            Self::External => write!(f, "external"),
        }
    }
}

/// Tenant onboarding progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OnboardingStatus {
    Pending,
    Completed,
}

impl Default for OnboardingStatus {
    fn default() -> Self {
        Self::Pending
    }
}

/// Role granted to a user, optionally scoped to a tenant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RoleKind {
    TenantOwner,
    PlatformOwner,
    Staff,
    Customer,
}

impl RoleKind {
    /// Whether this role owns a tenant workspace
    pub fn is_tenant_owner(&self) -> bool {
        matches!(self, Self::TenantOwner)
    }
}

impl std::fmt::Display for RoleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TenantOwner => write!(f, "tenant_owner"),
            Self::PlatformOwner => write!(f, "platform_owner"),
            Self::Staff => write!(f, "staff"),
            Self::Customer => write!(f, "customer"),
        }
    }
}

impl std::str::FromStr for RoleKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tenant_owner" => Ok(Self::TenantOwner),
            "platform_owner" => Ok(Self::PlatformOwner),
            "staff" => Ok(Self::Staff),
            "customer" => Ok(Self::Customer),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

/// Booking lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Confirmed,
    Cancelled,
    NoShow,
    Completed,
}

impl Default for BookingStatus {
    fn default() -> Self {
        Self::Confirmed
    }
}

impl BookingStatus {
    /// Whether the booking can still be cancelled by the customer
    pub fn is_cancellable(&self) -> bool {
        matches!(self, Self::Confirmed)
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Confirmed => write!(f, "confirmed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::NoShow => write!(f, "no_show"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// Payment provider identifier for webhook dedup and logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentProvider {
    Stripe,
    Paypal,
    Mpesa,
}

impl std::fmt::Display for PaymentProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stripe => write!(f, "stripe"),
            Self::Paypal => write!(f, "paypal"),
            Self::Mpesa => write!(f, "mpesa"),
        }
    }
}

/// Outcome recorded for a processed webhook event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ProcessingResult {
    Processing,
    Success,
    Failed,
    Skipped,
}

impl std::fmt::Display for ProcessingResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Processing => write!(f, "processing"),
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

// =============================================================================
// Database Models
// =============================================================================

/// Tenant model
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Tenant {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub business_type: String,
    pub deployment_type: DeploymentType,
    pub status: TenantStatus,
    pub subscription_plan: SubscriptionPlan,
    pub onboarding_status: OnboardingStatus,
    pub custom_domain: Option<String>,
    /// Hours before the appointment after which cancellation is refused
    pub cancel_by_hours: i32,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Tenant subscription model
///
/// Invariant: a `free` plan always carries a non-null `trial_ends_at`;
/// paid plans do not expire by trial logic.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TenantSubscription {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub plan: SubscriptionPlan,
    pub status: String,
    pub trial_ends_at: Option<OffsetDateTime>,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Deployment configuration for a tenant
///
/// Invariant: `external_db_url`/`external_db_key` are required and non-null
/// when `deployment_type = external` (also enforced by a check constraint).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DeploymentConfig {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub deployment_type: DeploymentType,
    pub external_db_url: Option<String>,
    pub external_db_key: Option<String>,
    pub created_at: OffsetDateTime,
}

/// Checkout claim row shared by the Stripe and PayPal ledgers.
/// The external key column differs per table; both map onto `external_key`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CheckoutClaim {
    pub id: Uuid,
    pub external_key: String,
    pub tenant_id: Uuid,
    pub customer_email: String,
    pub plan_type: SubscriptionPlan,
    /// Write-once: set by the first successful claim, never reassigned
    pub claimed_by_user_id: Option<Uuid>,
    pub created_at: OffsetDateTime,
}

/// Role grant row
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserRole {
    pub id: Uuid,
    pub user_id: Uuid,
    pub role: RoleKind,
    pub tenant_id: Option<Uuid>,
    pub created_at: OffsetDateTime,
}

/// Booking model
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Booking {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub customer_name: String,
    pub customer_email: String,
    pub service_name: String,
    pub starts_at: OffsetDateTime,
    pub status: BookingStatus,
    pub cancel_token: String,
    pub created_at: OffsetDateTime,
}

/// Webhook processing ledger row
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WebhookEvent {
    pub id: Uuid,
    pub provider: PaymentProvider,
    pub event_id: String,
    pub event_type: String,
    pub processing_result: ProcessingResult,
    pub tenant_id: Option<Uuid>,
    pub error_message: Option<String>,
    pub processing_started_at: OffsetDateTime,
    pub processed_at: Option<OffsetDateTime>,
}
