//! Customer-facing booking endpoints.
//!
//! Cancellation is driven by an unguessable token mailed to the customer,
//! not by an authenticated session. Each tenant sets its own cancellation
//! cutoff in hours before the appointment.

use axum::{
    extract::{Query, State},
    Json,
};
use bizos_shared::types::BookingStatus;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::{
    email::{BookingDetails, BookingEmailKind, TenantDetails},
    error::{ApiError, ApiResult, AppJson},
    state::AppState,
};

#[derive(Debug, sqlx::FromRow)]
struct BookingByToken {
    id: Uuid,
    customer_name: String,
    customer_email: String,
    service_name: String,
    starts_at: OffsetDateTime,
    status: BookingStatus,
    tenant_name: String,
    cancel_by_hours: i32,
}

#[derive(Debug, Serialize)]
struct BookingView {
    id: Uuid,
    customer_name: String,
    service_name: String,
    #[serde(with = "time::serde::rfc3339")]
    starts_at: OffsetDateTime,
    status: BookingStatus,
}

const BOOKING_BY_TOKEN_SQL: &str = r#"
SELECT b.id, b.customer_name, b.customer_email, b.service_name,
       b.starts_at, b.status, t.name AS tenant_name, t.cancel_by_hours
FROM bookings b
JOIN tenants t ON t.id = b.tenant_id
WHERE b.cancel_token = $1
"#;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CancelTokenQuery {
    pub token: String,
}

/// GET /api/v1/get-booking-by-cancel-token?token=...
pub async fn get_booking_by_cancel_token(
    State(state): State<AppState>,
    Query(query): Query<CancelTokenQuery>,
) -> ApiResult<Json<Value>> {
    let booking = fetch_booking(&state, &query.token).await?;
    let now = OffsetDateTime::now_utc();
    let allowed = booking.status.is_cancellable()
        && cancel_allowed(now, booking.starts_at, booking.cancel_by_hours);

    Ok(Json(json!({
        "booking": BookingView {
            id: booking.id,
            customer_name: booking.customer_name,
            service_name: booking.service_name,
            starts_at: booking.starts_at,
            status: booking.status,
        },
        "tenant_name": booking.tenant_name,
        "cancel_allowed": allowed,
        "cancel_message": if allowed {
            Value::Null
        } else {
            json!(cutoff_message(&booking.status, booking.cancel_by_hours))
        },
    })))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CancelBookingRequest {
    pub cancel_token: String,
}

/// POST /api/v1/cancel-booking
///
/// Rejections inside the cutoff window are a normal outcome, not an error:
/// the response stays 200 with `success: false` and a customer-readable
/// message.
pub async fn cancel_booking(
    State(state): State<AppState>,
    AppJson(req): AppJson<CancelBookingRequest>,
) -> ApiResult<Json<Value>> {
    let booking = fetch_booking(&state, &req.cancel_token).await?;

    let now = OffsetDateTime::now_utc();
    if !booking.status.is_cancellable()
        || !cancel_allowed(now, booking.starts_at, booking.cancel_by_hours)
    {
        return Ok(Json(json!({
            "success": false,
            "message": cutoff_message(&booking.status, booking.cancel_by_hours),
        })));
    }

    sqlx::query("UPDATE bookings SET status = 'cancelled' WHERE id = $1")
        .bind(booking.id)
        .execute(&state.pool)
        .await?;
    tracing::info!(booking_id = %booking.id, "booking cancelled via token");

    // Best-effort; the cancellation already happened.
    state
        .mailer
        .send_booking_email(
            BookingEmailKind::Cancellation,
            &BookingDetails {
                customer_name: booking.customer_name,
                customer_email: booking.customer_email,
                service_name: booking.service_name,
                starts_at: booking.starts_at,
            },
            &TenantDetails {
                name: booking.tenant_name,
            },
        )
        .await;

    Ok(Json(json!({ "success": true })))
}

async fn fetch_booking(state: &AppState, token: &str) -> ApiResult<BookingByToken> {
    let token = token.trim();
    if token.is_empty() {
        return Err(ApiError::InputInvalid("cancel token is required".into()));
    }

    sqlx::query_as::<_, BookingByToken>(BOOKING_BY_TOKEN_SQL)
        .bind(token)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| ApiError::NotFound("booking not found".into()))
}

/// A booking can be cancelled strictly before the tenant's cutoff.
fn cancel_allowed(now: OffsetDateTime, starts_at: OffsetDateTime, cancel_by_hours: i32) -> bool {
    now < starts_at - Duration::hours(i64::from(cancel_by_hours))
}

fn cutoff_message(status: &BookingStatus, cancel_by_hours: i32) -> String {
    if !status.is_cancellable() {
        format!("This booking is already {status} and cannot be cancelled.")
    } else {
        format!(
            "Bookings can only be cancelled at least {cancel_by_hours} hours before the appointment."
        )
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendBookingEmailRequest {
    pub booking: BookingDetails,
    pub tenant: TenantDetails,
}

/// POST /api/v1/send-booking-confirmation
pub async fn send_booking_confirmation(
    State(state): State<AppState>,
    AppJson(req): AppJson<SendBookingEmailRequest>,
) -> ApiResult<Json<Value>> {
    send_email(&state, BookingEmailKind::Confirmation, req).await
}

/// POST /api/v1/send-booking-cancellation
pub async fn send_booking_cancellation(
    State(state): State<AppState>,
    AppJson(req): AppJson<SendBookingEmailRequest>,
) -> ApiResult<Json<Value>> {
    send_email(&state, BookingEmailKind::Cancellation, req).await
}

/// POST /api/v1/send-booking-no-show
pub async fn send_booking_no_show(
    State(state): State<AppState>,
    AppJson(req): AppJson<SendBookingEmailRequest>,
) -> ApiResult<Json<Value>> {
    send_email(&state, BookingEmailKind::NoShow, req).await
}

/// POST /api/v1/send-booking-reminder
pub async fn send_booking_reminder(
    State(state): State<AppState>,
    AppJson(req): AppJson<SendBookingEmailRequest>,
) -> ApiResult<Json<Value>> {
    send_email(&state, BookingEmailKind::Reminder, req).await
}

/// Delivery problems never fail the caller's request; unsent mail is logged
/// inside the mailer.
async fn send_email(
    state: &AppState,
    kind: BookingEmailKind,
    req: SendBookingEmailRequest,
) -> ApiResult<Json<Value>> {
    state
        .mailer
        .send_booking_email(kind, &req.booking, &req.tenant)
        .await;
    Ok(Json(json!({ "success": true })))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_cancel_allowed_before_cutoff() {
        let starts = datetime!(2026-06-10 12:00 UTC);
        assert!(cancel_allowed(datetime!(2026-06-09 11:59 UTC), starts, 24));
    }

    #[test]
    fn test_cancel_rejected_at_and_after_cutoff() {
        let starts = datetime!(2026-06-10 12:00 UTC);
        assert!(!cancel_allowed(datetime!(2026-06-09 12:00 UTC), starts, 24));
        assert!(!cancel_allowed(datetime!(2026-06-10 11:00 UTC), starts, 24));
        assert!(!cancel_allowed(datetime!(2026-06-11 12:00 UTC), starts, 24));
    }

    #[test]
    fn test_zero_hour_cutoff_allows_until_start() {
        let starts = datetime!(2026-06-10 12:00 UTC);
        assert!(cancel_allowed(datetime!(2026-06-10 11:59 UTC), starts, 0));
        assert!(!cancel_allowed(datetime!(2026-06-10 12:00 UTC), starts, 0));
    }

    #[test]
    fn test_cutoff_message_names_the_window() {
        let message = cutoff_message(&BookingStatus::Confirmed, 48);
        assert!(message.contains("48 hours"));
    }

    #[test]
    fn test_cutoff_message_for_terminal_status() {
        let message = cutoff_message(&BookingStatus::Cancelled, 24);
        assert!(message.contains("cancelled"));
        assert!(!message.contains("24 hours"));
    }
}
