//! Turns processor notifications into booking transitions.
//!
//! The notification body is only a trigger: the payment is always re-fetched from
//! the processor and that record decides what happens.

use axum::http::StatusCode;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use std::sync::Arc;
use thiserror::Error;

use crate::booking::BookingService;
use crate::error::BookingError;
use crate::gateway::{GatewayError, PaymentGateway, ProcessorStatus};
use crate::models::Transition;

type HmacSha256 = Hmac<Sha256>;

const BOOKING_ID_KEYS: &[&str] = &["booking_id", "bookingID", "bookingId"];
const PAYMENT_ID_KEYS: &[&str] = &["payment_id", "paymentID", "paymentId"];

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("invalid webhook signature")]
    Unauthorized,
    #[error("malformed notification: {0}")]
    Malformed(String),
    #[error("missing or invalid metadata: {0}")]
    MissingMetadata(String),
    #[error("payment {0} not found at processor")]
    ProcessorNotFound(String),
    #[error("processor error: {0}")]
    Processor(String),
    #[error(transparent)]
    Booking(#[from] BookingError),
}

impl WebhookError {
    pub fn status(&self) -> StatusCode {
        match self {
            WebhookError::Unauthorized => StatusCode::UNAUTHORIZED,
            WebhookError::Malformed(_) | WebhookError::MissingMetadata(_) => {
                StatusCode::BAD_REQUEST
            }
            WebhookError::ProcessorNotFound(_) => StatusCode::NOT_FOUND,
            WebhookError::Processor(_) => StatusCode::BAD_GATEWAY,
            WebhookError::Booking(e) => e.status(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Not a payment notification.
    Ignored,
    /// Processor still has the payment in flight.
    Pending,
    Applied,
    AlreadyResolved,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub data_id: String,
    pub kind: Option<String>,
}

pub fn parse_notification(body: &[u8]) -> Result<Notification, WebhookError> {
    let value: Value =
        serde_json::from_slice(body).map_err(|e| WebhookError::Malformed(e.to_string()))?;

    let data_id = match value.pointer("/data/id") {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return Err(WebhookError::Malformed("missing data.id".into())),
    };
    if data_id.is_empty()
        || !data_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(WebhookError::Malformed(format!("invalid data.id {:?}", data_id)));
    }

    let kind = value
        .get("type")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    Ok(Notification { data_id, kind })
}

/// Checks an `x-signature: ts=<ts>,v1=<hex hmac>` header against
/// `id:{data_id};request-id:{request_id};ts:{ts};`.
pub fn verify_signature(
    secret: &str,
    data_id: &str,
    signature: Option<&str>,
    request_id: Option<&str>,
) -> bool {
    let Some(signature) = signature else {
        return false;
    };

    let mut ts = None;
    let mut v1 = None;
    for part in signature.split(',') {
        if let Some((key, value)) = part.split_once('=') {
            match key.trim() {
                "ts" => ts = Some(value.trim()),
                "v1" => v1 = Some(value.trim()),
                _ => {}
            }
        }
    }
    let (Some(ts), Some(v1)) = (ts, v1) else {
        return false;
    };
    let Ok(expected) = hex::decode(v1) else {
        return false;
    };

    let manifest = format!(
        "id:{};request-id:{};ts:{};",
        data_id,
        request_id.unwrap_or_default(),
        ts
    );
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(manifest.as_bytes());
    mac.verify_slice(&expected).is_ok()
}

/// First of `keys` present in `metadata` as an integer or a numeric string.
pub fn metadata_id(metadata: &Value, keys: &[&str]) -> Option<i64> {
    keys.iter().find_map(|key| match metadata.get(*key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

pub struct Reconciler {
    bookings: Arc<BookingService>,
    gateway: Arc<dyn PaymentGateway>,
    webhook_secret: Option<String>,
}

impl Reconciler {
    pub fn new(
        bookings: Arc<BookingService>,
        gateway: Arc<dyn PaymentGateway>,
        webhook_secret: Option<String>,
    ) -> Self {
        Self {
            bookings,
            gateway,
            webhook_secret,
        }
    }

    pub async fn handle_notification(
        &self,
        body: &[u8],
        signature: Option<&str>,
        request_id: Option<&str>,
    ) -> Result<WebhookOutcome, WebhookError> {
        let notification = parse_notification(body)?;

        if let Some(secret) = &self.webhook_secret {
            if !verify_signature(secret, &notification.data_id, signature, request_id) {
                return Err(WebhookError::Unauthorized);
            }
        }

        if let Some(kind) = notification.kind.as_deref() {
            if kind != "payment" {
                tracing::info!("Ignoring {} notification {}", kind, notification.data_id);
                return Ok(WebhookOutcome::Ignored);
            }
        }

        let fetched = self
            .gateway
            .get_payment(&notification.data_id)
            .await
            .map_err(|e| match e {
                GatewayError::NotFound(id) => WebhookError::ProcessorNotFound(id),
                other => WebhookError::Processor(other.to_string()),
            })?;

        let booking_id = metadata_id(&fetched.metadata, BOOKING_ID_KEYS)
            .ok_or_else(|| WebhookError::MissingMetadata("booking_id".into()))?;
        let payment_id = metadata_id(&fetched.metadata, PAYMENT_ID_KEYS)
            .ok_or_else(|| WebhookError::MissingMetadata("payment_id".into()))?;

        let payment = self
            .bookings
            .payment(payment_id)
            .await?
            .filter(|p| p.booking_id == booking_id)
            .ok_or_else(|| {
                WebhookError::MissingMetadata(format!(
                    "payment {} does not belong to booking {}",
                    payment_id, booking_id
                ))
            })?;

        tracing::info!(
            booking_id,
            payment_id,
            external_id = %fetched.id,
            status = ?fetched.status,
            "Processor notification"
        );

        if fetched.status == ProcessorStatus::Pending {
            return Ok(WebhookOutcome::Pending);
        }

        let outcome = match self
            .bookings
            .apply_processor_status(&payment, fetched.status, &fetched.id)
            .await?
        {
            Transition::Applied => WebhookOutcome::Applied,
            Transition::AlreadyResolved => WebhookOutcome::AlreadyResolved,
        };
        Ok(outcome)
    }
}
