use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::booking::domain::BookingId;
use crate::config::PaymentConfig;

use super::{GatewayError, PaymentGateway, PaymentIntent, PaymentOutcome, PaymentReceipt};

/// Khalti ePayment client: `initiate` opens a payment and returns the hosted
/// checkout url, `verify` looks the intent up by `pidx`. Amounts are in paisa
/// as the provider requires.
pub struct KhaltiGateway {
    client: reqwest::Client,
    base_url: String,
    secret_key: String,
    return_url: String,
    website_url: String,
}

impl KhaltiGateway {
    pub fn new(config: &PaymentConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| GatewayError::Protocol(err.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            secret_key: config.secret_key.clone(),
            return_url: config.return_url.clone(),
            website_url: config.website_url.clone(),
        })
    }

    fn map_transport(err: reqwest::Error) -> GatewayError {
        if err.is_timeout() || err.is_connect() {
            GatewayError::Timeout
        } else {
            GatewayError::Protocol(err.to_string())
        }
    }
}

#[derive(Debug, Deserialize)]
struct InitiateResponse {
    pidx: String,
    payment_url: String,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    status: String,
    transaction_id: Option<String>,
    #[serde(default)]
    total_amount: u64,
}

#[async_trait]
impl PaymentGateway for KhaltiGateway {
    async fn initiate(
        &self,
        booking_id: &BookingId,
        amount_paisa: u64,
    ) -> Result<PaymentIntent, GatewayError> {
        let body = json!({
            "amount": amount_paisa,
            "purchase_order_id": booking_id.0,
            "purchase_order_name": "Hostel room security deposit",
            "return_url": self.return_url,
            "website_url": self.website_url,
        });

        let response = self
            .client
            .post(format!("{}/epayment/initiate/", self.base_url))
            .header("Authorization", format!("Key {}", self.secret_key))
            .json(&body)
            .send()
            .await
            .map_err(Self::map_transport)?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(GatewayError::Protocol(format!(
                "initiate returned {status}: {detail}"
            )));
        }

        let parsed: InitiateResponse = response
            .json()
            .await
            .map_err(|err| GatewayError::Protocol(err.to_string()))?;

        Ok(PaymentIntent {
            intent_id: parsed.pidx,
            redirect_url: parsed.payment_url,
        })
    }

    async fn verify(&self, intent_id: &str) -> Result<PaymentOutcome, GatewayError> {
        let response = self
            .client
            .post(format!("{}/epayment/lookup/", self.base_url))
            .header("Authorization", format!("Key {}", self.secret_key))
            .json(&json!({ "pidx": intent_id }))
            .send()
            .await
            .map_err(Self::map_transport)?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(GatewayError::Protocol(format!(
                "lookup returned {status}: {detail}"
            )));
        }

        let parsed: LookupResponse = response
            .json()
            .await
            .map_err(|err| GatewayError::Protocol(err.to_string()))?;

        match (parsed.status.as_str(), parsed.transaction_id) {
            ("Completed", Some(transaction_id)) => Ok(PaymentOutcome::Succeeded(PaymentReceipt {
                reference: transaction_id,
                amount_paisa: parsed.total_amount,
            })),
            (status, _) => Ok(PaymentOutcome::Declined {
                reason: format!("provider reported status '{status}'"),
            }),
        }
    }
}
