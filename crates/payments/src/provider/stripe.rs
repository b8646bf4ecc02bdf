use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::{
    Confirmation, PaymentIntent, PaymentProvider, ProviderError, RefundOutcome, to_minor_units,
};

pub const DEFAULT_API_BASE: &str = "https://api.stripe.com";

/// Payment provider backed by the Stripe REST API.
///
/// Requests are form-encoded and authenticated with the secret key as a
/// bearer token. The transaction id stored on a payment is the payment intent
/// id, which is also what refunds are issued against.
#[derive(Clone)]
pub struct StripeProvider {
    http_client: Client,
    secret_key: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct IntentResponse {
    id: String,
    #[serde(default)]
    client_secret: Option<String>,
    status: String,
    #[serde(default)]
    last_payment_error: Option<LastPaymentError>,
}

#[derive(Debug, Deserialize)]
struct LastPaymentError {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefundResponse {
    id: String,
    status: String,
    #[serde(default)]
    failure_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

impl StripeProvider {
    /// Creates a provider talking to `base_url` (normally [`DEFAULT_API_BASE`]).
    pub fn new(
        secret_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let secret_key = secret_key.into();
        if secret_key.is_empty() {
            return Err(ProviderError::Config("missing Stripe secret key".into()));
        }
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Http(e.to_string()))?;

        Ok(Self {
            http_client,
            secret_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        form: &[(&str, String)],
    ) -> Result<T, ProviderError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.secret_key)
            .form(form)
            .send()
            .await
            .map_err(|e| ProviderError::Http(e.to_string()))?;

        Self::handle_response(response).await
    }

    async fn handle_response<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ProviderError> {
        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| ProviderError::Parse(e.to_string()));
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|body| body.error.message)
            .unwrap_or(text);
        Err(ProviderError::Api {
            status_code: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl PaymentProvider for StripeProvider {
    fn name(&self) -> &'static str {
        "stripe"
    }

    #[tracing::instrument(skip(self))]
    async fn create_payment_intent(
        &self,
        amount: Decimal,
        currency: &str,
    ) -> Result<PaymentIntent, ProviderError> {
        let form = [
            ("amount", to_minor_units(amount, currency)?.to_string()),
            ("currency", currency.to_lowercase()),
        ];
        let intent: IntentResponse = self.post("/v1/payment_intents", &form).await?;
        let client_secret = intent
            .client_secret
            .ok_or_else(|| ProviderError::Parse("intent without client_secret".into()))?;

        Ok(PaymentIntent {
            intent_id: intent.id,
            client_secret,
        })
    }

    #[tracing::instrument(skip(self))]
    async fn confirm_payment(&self, intent_id: &str) -> Result<Confirmation, ProviderError> {
        let path = format!("/v1/payment_intents/{intent_id}/confirm");
        let intent: IntentResponse = match self.post(&path, &[]).await {
            Ok(intent) => intent,
            // Card errors come back as 402 and are a decline, not an outage.
            Err(ProviderError::Api {
                status_code: 402,
                message,
            }) => return Ok(Confirmation::Declined { reason: message }),
            Err(e) => return Err(e),
        };

        if intent.status == "succeeded" {
            return Ok(Confirmation::Succeeded {
                transaction_id: intent.id,
            });
        }
        let reason = intent
            .last_payment_error
            .and_then(|e| e.message)
            .unwrap_or_else(|| format!("payment intent status {}", intent.status));
        Ok(Confirmation::Declined { reason })
    }

    #[tracing::instrument(skip(self))]
    async fn refund(
        &self,
        transaction_id: &str,
        amount: Decimal,
        currency: &str,
    ) -> Result<RefundOutcome, ProviderError> {
        let form = [
            ("payment_intent", transaction_id.to_string()),
            ("amount", to_minor_units(amount, currency)?.to_string()),
        ];
        let refund: RefundResponse = self.post("/v1/refunds", &form).await?;

        match refund.status.as_str() {
            "succeeded" | "pending" => Ok(RefundOutcome::Refunded {
                refund_id: refund.id,
            }),
            other => Ok(RefundOutcome::Rejected {
                reason: refund
                    .failure_reason
                    .unwrap_or_else(|| format!("refund status {other}")),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::extract::Path;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Form, Json, Router};
    use serde_json::{Value, json};

    use super::*;

    const KEY: &str = "sk_test_123";

    fn authorized(headers: &HeaderMap) -> bool {
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            == Some("Bearer sk_test_123")
    }

    async fn create_intent(
        headers: HeaderMap,
        Form(form): Form<HashMap<String, String>>,
    ) -> (StatusCode, Json<Value>) {
        if !authorized(&headers) {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": {"message": "Invalid API Key provided"}})),
            );
        }
        let id = format!("pi_{}_{}", form["amount"], form["currency"]);
        (
            StatusCode::OK,
            Json(json!({"id": id, "client_secret": format!("{id}_secret"), "status": "requires_confirmation"})),
        )
    }

    async fn confirm_intent(Path(id): Path<String>) -> (StatusCode, Json<Value>) {
        match id.as_str() {
            "pi_declined" => (
                StatusCode::PAYMENT_REQUIRED,
                Json(json!({"error": {"message": "Your card was declined."}})),
            ),
            "pi_action" => (
                StatusCode::OK,
                Json(json!({"id": id, "status": "requires_action"})),
            ),
            _ => (
                StatusCode::OK,
                Json(json!({"id": id, "status": "succeeded"})),
            ),
        }
    }

    async fn refund(Form(form): Form<HashMap<String, String>>) -> Json<Value> {
        if form["payment_intent"] == "pi_refused" {
            return Json(json!({"id": "re_2", "status": "failed", "failure_reason": "expired_or_canceled_card"}));
        }
        Json(json!({"id": format!("re_{}", form["amount"]), "status": "succeeded"}))
    }

    async fn fake_stripe() -> String {
        let app = Router::new()
            .route("/v1/payment_intents", post(create_intent))
            .route("/v1/payment_intents/{id}/confirm", post(confirm_intent))
            .route("/v1/refunds", post(refund));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}")
    }

    async fn provider(key: &str) -> StripeProvider {
        StripeProvider::new(key, fake_stripe().await, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_missing_key_is_a_config_error() {
        let result = StripeProvider::new("", DEFAULT_API_BASE, Duration::from_secs(1));
        assert!(matches!(result, Err(ProviderError::Config(_))));
    }

    #[tokio::test]
    async fn test_create_intent_sends_minor_units() {
        let provider = provider(KEY).await;
        let intent = provider
            .create_payment_intent(Decimal::new(6497, 2), "USD")
            .await
            .unwrap();
        assert_eq!(intent.intent_id, "pi_6497_usd");
        assert_eq!(intent.client_secret, "pi_6497_usd_secret");
    }

    #[tokio::test]
    async fn test_bad_key_surfaces_api_error() {
        let provider = provider("sk_wrong").await;
        let err = provider
            .create_payment_intent(Decimal::ONE, "USD")
            .await
            .unwrap_err();
        match err {
            ProviderError::Api {
                status_code,
                message,
            } => {
                assert_eq!(status_code, 401);
                assert_eq!(message, "Invalid API Key provided");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_confirm_outcomes() {
        let provider = provider(KEY).await;
        assert_eq!(
            provider.confirm_payment("pi_ok").await.unwrap(),
            Confirmation::Succeeded {
                transaction_id: "pi_ok".into()
            }
        );
        assert_eq!(
            provider.confirm_payment("pi_declined").await.unwrap(),
            Confirmation::Declined {
                reason: "Your card was declined.".into()
            }
        );
        assert!(matches!(
            provider.confirm_payment("pi_action").await.unwrap(),
            Confirmation::Declined { .. }
        ));
    }

    #[tokio::test]
    async fn test_refund_outcomes() {
        let provider = provider(KEY).await;
        assert_eq!(
            provider
                .refund("pi_ok", Decimal::new(1000, 2), "USD")
                .await
                .unwrap(),
            RefundOutcome::Refunded {
                refund_id: "re_1000".into()
            }
        );
        assert_eq!(
            provider
                .refund("pi_refused", Decimal::ONE, "USD")
                .await
                .unwrap(),
            RefundOutcome::Rejected {
                reason: "expired_or_canceled_card".into()
            }
        );
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_http_error() {
        let provider =
            StripeProvider::new(KEY, "http://127.0.0.1:1", Duration::from_millis(500)).unwrap();
        assert!(matches!(
            provider.confirm_payment("pi_ok").await,
            Err(ProviderError::Http(_))
        ));
    }
}
