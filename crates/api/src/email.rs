//! Booking notification emails
//!
//! Sends transactional booking emails via the Resend API. Sending is
//! non-fatal by contract: an unconfigured mailer or a provider rejection is
//! logged and swallowed, never failing the parent operation.

use serde::Deserialize;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::OffsetDateTime;

const RESEND_API_BASE: &str = "https://api.resend.com";

const DISPLAY_FORMAT: &[FormatItem<'_>] =
    format_description!("[weekday repr:long], [month repr:long] [day] [year] at [hour repr:12]:[minute] [period]");

/// Booking fields the notification templates render
#[derive(Debug, Clone, Deserialize)]
pub struct BookingDetails {
    pub customer_name: String,
    pub customer_email: String,
    #[serde(default)]
    pub service_name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub starts_at: OffsetDateTime,
}

/// Tenant fields the notification templates render
#[derive(Debug, Clone, Deserialize)]
pub struct TenantDetails {
    pub name: String,
}

/// Which booking notification to send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingEmailKind {
    Confirmation,
    Cancellation,
    NoShow,
    Reminder,
}

impl BookingEmailKind {
    fn subject(&self, tenant_name: &str) -> String {
        match self {
            Self::Confirmation => format!("Booking confirmed - {tenant_name}"),
            Self::Cancellation => format!("Booking cancelled - {tenant_name}"),
            Self::NoShow => format!("We missed you - {tenant_name}"),
            Self::Reminder => format!("Upcoming appointment reminder - {tenant_name}"),
        }
    }

    fn lead_line(&self) -> &'static str {
        match self {
            Self::Confirmation => "Your booking is confirmed.",
            Self::Cancellation => "Your booking has been cancelled.",
            Self::NoShow => "You were marked as a no-show for your recent appointment.",
            Self::Reminder => "This is a reminder of your upcoming appointment.",
        }
    }
}

/// Booking notification sender backed by Resend
#[derive(Clone)]
pub struct BookingMailer {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    from_email: String,
}

impl BookingMailer {
    pub fn new(api_key: &str, from_email: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: RESEND_API_BASE.to_string(),
            api_key: api_key.to_string(),
            from_email: from_email.to_string(),
        }
    }

    #[cfg(test)]
    fn with_base_url(api_key: &str, from_email: &str, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key: api_key.to_string(),
            from_email: from_email.to_string(),
        }
    }

    /// Whether a Resend key is configured
    pub fn is_enabled(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// Render and dispatch one booking notification. Never fails the caller.
    pub async fn send_booking_email(
        &self,
        kind: BookingEmailKind,
        booking: &BookingDetails,
        tenant: &TenantDetails,
    ) {
        let subject = kind.subject(&tenant.name);

        if !self.is_enabled() {
            tracing::warn!(
                to = %booking.customer_email,
                subject = %subject,
                "Email not configured, skipping"
            );
            return;
        }

        let html = render_booking_html(kind, booking, tenant);
        self.send_email(&booking.customer_email, &subject, &html)
            .await;
    }

    async fn send_email(&self, to: &str, subject: &str, html: &str) {
        let body = serde_json::json!({
            "from": self.from_email,
            "to": [to],
            "subject": subject,
            "html": html,
        });

        let response = self
            .client
            .post(format!("{}/emails", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                tracing::info!(to = %to, subject = %subject, "Booking email sent");
            }
            Ok(resp) => {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                tracing::error!(
                    status = %status,
                    body = %body,
                    "Failed to send booking email"
                );
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to send booking email");
            }
        }
    }
}

fn render_booking_html(
    kind: BookingEmailKind,
    booking: &BookingDetails,
    tenant: &TenantDetails,
) -> String {
    let when = booking
        .starts_at
        .format(DISPLAY_FORMAT)
        .unwrap_or_else(|_| booking.starts_at.to_string());
    let service = if booking.service_name.is_empty() {
        "your appointment".to_string()
    } else {
        booking.service_name.clone()
    };

    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"></head>
<body style="font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; line-height: 1.6; color: #333; max-width: 600px; margin: 0 auto; padding: 20px;">
    <h2 style="color: #1f2937;">{tenant_name}</h2>
    <p>Hi {customer_name},</p>
    <p>{lead}</p>
    <div style="background-color: #f9fafb; border-left: 4px solid #6366f1; padding: 16px; margin: 20px 0;">
        <p style="margin: 0;"><strong>{service}</strong></p>
        <p style="margin: 8px 0 0 0;">{when}</p>
    </div>
    <p style="color: #666; font-size: 14px;">
        If you have questions, reply to this email to reach {tenant_name}.
    </p>
    <hr style="border: none; border-top: 1px solid #eee; margin: 20px 0;">
    <p style="color: #999; font-size: 12px;">{tenant_name}</p>
</body>
</html>"#,
        tenant_name = tenant.name,
        customer_name = booking.customer_name,
        lead = kind.lead_line(),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn sample_booking() -> BookingDetails {
        BookingDetails {
            customer_name: "Jane".to_string(),
            customer_email: "jane@x.com".to_string(),
            service_name: "Haircut".to_string(),
            starts_at: datetime!(2025-06-01 14:30:00 UTC),
        }
    }

    fn sample_tenant() -> TenantDetails {
        TenantDetails {
            name: "Acme Salon".to_string(),
        }
    }

    #[test]
    fn test_subjects_name_the_tenant() {
        assert_eq!(
            BookingEmailKind::Confirmation.subject("Acme Salon"),
            "Booking confirmed - Acme Salon"
        );
        assert_eq!(
            BookingEmailKind::Reminder.subject("Acme Salon"),
            "Upcoming appointment reminder - Acme Salon"
        );
    }

    #[test]
    fn test_rendered_html_carries_booking_details() {
        let html = render_booking_html(
            BookingEmailKind::Confirmation,
            &sample_booking(),
            &sample_tenant(),
        );
        assert!(html.contains("Jane"));
        assert!(html.contains("Haircut"));
        assert!(html.contains("Acme Salon"));
        assert!(html.contains("Your booking is confirmed."));
        assert!(html.contains("June"));
    }

    #[test]
    fn test_empty_service_name_gets_a_fallback() {
        let mut booking = sample_booking();
        booking.service_name = String::new();
        let html =
            render_booking_html(BookingEmailKind::Reminder, &booking, &sample_tenant());
        assert!(html.contains("your appointment"));
    }

    #[test]
    fn test_unconfigured_mailer_is_disabled() {
        let mailer = BookingMailer::new("", "BizOS <noreply@localhost>");
        assert!(!mailer.is_enabled());

        let mailer = BookingMailer::new("re_123", "BizOS <noreply@localhost>");
        assert!(mailer.is_enabled());
    }

    #[tokio::test]
    async fn test_send_posts_to_resend() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/emails")
            .match_header("authorization", "Bearer re_test_key")
            .with_status(200)
            .with_body(r#"{"id":"email_1"}"#)
            .create_async()
            .await;

        let mailer = BookingMailer::with_base_url(
            "re_test_key",
            "BizOS <noreply@bizos.app>",
            server.url(),
        );
        mailer
            .send_booking_email(
                BookingEmailKind::Cancellation,
                &sample_booking(),
                &sample_tenant(),
            )
            .await;

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_provider_rejection_is_swallowed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/emails")
            .with_status(422)
            .with_body(r#"{"message":"invalid from address"}"#)
            .create_async()
            .await;

        let mailer = BookingMailer::with_base_url("re_test_key", "bad-from", server.url());
        // Must not panic or propagate
        mailer
            .send_booking_email(
                BookingEmailKind::NoShow,
                &sample_booking(),
                &sample_tenant(),
            )
            .await;
    }
}
