//! Payment processor port and its checkout-API implementation.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::config::PaymentConfig;

/// Processor-reported payment state, collapsed to what the booking engine acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorStatus {
    Approved,
    Rejected,
    Pending,
    Refunded,
}

impl ProcessorStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "approved" => ProcessorStatus::Approved,
            "rejected" | "cancelled" => ProcessorStatus::Rejected,
            "refunded" | "charged_back" => ProcessorStatus::Refunded,
            // in_process, authorized, in_mediation, ...
            _ => ProcessorStatus::Pending,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PaymentIntentRequest {
    pub booking_id: i64,
    pub payment_id: i64,
    pub amount: i64,
    pub title: String,
}

#[derive(Debug, Clone)]
pub struct PaymentIntent {
    pub id: String,
    pub redirect_url: String,
}

/// Authoritative payment record fetched from the processor.
#[derive(Debug, Clone)]
pub struct ProcessorPayment {
    pub id: String,
    pub status: ProcessorStatus,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("payment {0} not found at processor")]
    NotFound(String),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected processor response: {0}")]
    Unexpected(String),
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_intent(&self, req: &PaymentIntentRequest) -> Result<PaymentIntent, GatewayError>;

    async fn get_payment(&self, external_id: &str) -> Result<ProcessorPayment, GatewayError>;
}

pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: Url,
    access_token: String,
    public_url: String,
}

#[derive(Deserialize)]
struct PreferenceResponse {
    id: String,
    init_point: String,
}

#[derive(Deserialize)]
struct PaymentResponse {
    id: serde_json::Value,
    status: String,
    #[serde(default)]
    metadata: serde_json::Value,
}

impl HttpPaymentGateway {
    pub fn new(config: &PaymentConfig, public_url: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        let base_url = Url::parse(&config.api_url)?;
        Ok(Self {
            client,
            base_url,
            access_token: config.access_token.clone(),
            public_url: public_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, GatewayError> {
        self.base_url
            .join(path)
            .map_err(|e| GatewayError::Unexpected(format!("bad endpoint {}: {}", path, e)))
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn create_intent(&self, req: &PaymentIntentRequest) -> Result<PaymentIntent, GatewayError> {
        let body = serde_json::json!({
            "items": [{
                "title": req.title,
                "quantity": 1,
                "unit_price": req.amount as f64 / 100.0
            }],
            "metadata": {
                "booking_id": req.booking_id,
                "payment_id": req.payment_id
            },
            "external_reference": format!("booking-{}-payment-{}", req.booking_id, req.payment_id),
            "notification_url": format!("{}/api/payments/webhook", self.public_url),
            "back_urls": {
                "success": format!("{}/bookings/{}", self.public_url, req.booking_id),
                "failure": format!("{}/bookings/{}", self.public_url, req.booking_id),
                "pending": format!("{}/bookings/{}", self.public_url, req.booking_id)
            },
            "auto_return": "approved"
        });

        let resp = self
            .client
            .post(self.endpoint("/checkout/preferences")?)
            .bearer_auth(&self.access_token)
            // One intent per payment row, however often the call is retried.
            .header("X-Idempotency-Key", format!("payment-{}", req.payment_id))
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            tracing::error!("Payment intent creation failed: {} - {}", status, text);
            return Err(GatewayError::Unexpected(format!("intent API returned {}", status)));
        }

        let pref: PreferenceResponse = resp
            .json()
            .await
            .map_err(|e| GatewayError::Unexpected(e.to_string()))?;

        tracing::info!(
            "Payment intent {} created for booking {} (payment {})",
            pref.id,
            req.booking_id,
            req.payment_id
        );

        Ok(PaymentIntent {
            id: pref.id,
            redirect_url: pref.init_point,
        })
    }

    async fn get_payment(&self, external_id: &str) -> Result<ProcessorPayment, GatewayError> {
        let resp = self
            .client
            .get(self.endpoint(&format!("/v1/payments/{}", external_id))?)
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(GatewayError::NotFound(external_id.to_string()));
        }
        if !resp.status().is_success() {
            return Err(GatewayError::Unexpected(format!(
                "payment API returned {}",
                resp.status()
            )));
        }

        let payment: PaymentResponse = resp
            .json()
            .await
            .map_err(|e| GatewayError::Unexpected(e.to_string()))?;

        let id = match payment.id {
            serde_json::Value::String(s) => s,
            serde_json::Value::Number(n) => n.to_string(),
            other => return Err(GatewayError::Unexpected(format!("payment id {}", other))),
        };

        Ok(ProcessorPayment {
            id,
            status: ProcessorStatus::parse(&payment.status),
            metadata: payment.metadata,
        })
    }
}
