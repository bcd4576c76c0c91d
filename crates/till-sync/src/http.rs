//! # HTTP Sale Submitter
//!
//! [`SaleSubmitter`] for the backend's REST endpoint.
//!
//! ## Wire Contract
//! ```text
//! POST {base_url}/api/pos/sales
//! Idempotency-Key: <sale id>
//! Authorization: Bearer <token>          (optional)
//! X-Device-Id: <device id>               (optional)
//!
//! { "client_id": "...", "created_at": "...", "payload": { ... } }
//!
//! ┌──────────────────────────────┬────────────────────────────────────────┐
//! │ Response                     │ Outcome                                │
//! ├──────────────────────────────┼────────────────────────────────────────┤
//! │ 2xx { sale_number, ... }     │ Confirmation                           │
//! │ 2xx unparseable body         │ Transient                              │
//! │ 408, 425, 429, 5xx           │ Transient                              │
//! │ 401, 403                     │ Transient (credentials, not the sale)  │
//! │ other 4xx                    │ Permanent                              │
//! │ connect error / timeout      │ Transient                              │
//! └──────────────────────────────┴────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use till_core::{Confirmation, FailureKind, PendingSale, SalePayload};

use crate::config::QueueConfig;
use crate::error::QueueResult;
use crate::submitter::{SaleSubmitter, SubmitError};

/// Timeout for the lightweight health probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Serialize)]
struct SubmitSaleRequest<'a> {
    client_id: &'a str,
    created_at: DateTime<Utc>,
    payload: &'a SalePayload,
}

#[derive(Debug, Deserialize)]
struct SubmitSaleResponse {
    sale_number: String,
    #[serde(default)]
    confirmed_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Status Classification
// =============================================================================

/// Classifies a non-success HTTP status.
pub fn classify_status(status: StatusCode) -> FailureKind {
    match status.as_u16() {
        408 | 425 | 429 => FailureKind::Transient,
        401 | 403 => FailureKind::Transient,
        s if s >= 500 => FailureKind::Transient,
        _ => FailureKind::Permanent,
    }
}

fn status_error(status: StatusCode) -> String {
    match status.as_u16() {
        401 => "API token is invalid or expired".to_string(),
        403 => "Register not authorized".to_string(),
        404 => "Sale endpoint not found".to_string(),
        409 => "Sale conflicts with an existing record".to_string(),
        429 => "Backend is rate limiting".to_string(),
        s if s >= 500 => "Backend server error".to_string(),
        _ => "Unexpected response from backend".to_string(),
    }
}

/// Extracts `error` or `message` from a JSON error body.
fn rejection_message(status: StatusCode, body: &str) -> String {
    let message = serde_json::from_str::<Value>(body).ok().and_then(|json| {
        json.get("error")
            .or_else(|| json.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
    });

    match message {
        Some(message) => format!("{message} (HTTP {})", status.as_u16()),
        None => format!("{} (HTTP {})", status_error(status), status.as_u16()),
    }
}

fn friendly_error(url: &str, err: &reqwest::Error) -> String {
    if err.is_connect() {
        return format!("Cannot reach backend at {url}");
    }
    if err.is_timeout() {
        return format!("Connection to {url} timed out");
    }
    format!("Network error communicating with {url}: {err}")
}

/// Strips trailing slashes so paths can be appended.
fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

// =============================================================================
// Submitter
// =============================================================================

/// Submits sales over HTTP with reqwest.
#[derive(Debug, Clone)]
pub struct HttpSaleSubmitter {
    client: Client,
    base_url: String,
    api_token: Option<String>,
    device_id: Option<String>,
}

impl HttpSaleSubmitter {
    /// Creates a submitter for `base_url` with a per-request timeout.
    pub fn new(base_url: &str, timeout: Duration) -> QueueResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(HttpSaleSubmitter {
            client,
            base_url: normalize_base_url(base_url),
            api_token: None,
            device_id: None,
        })
    }

    /// Creates a submitter from the backend and device sections of a config.
    pub fn from_config(config: &QueueConfig) -> QueueResult<Self> {
        let mut submitter = Self::new(&config.backend.base_url, config.submit_timeout())?
            .with_device_id(config.device_id());
        if let Some(token) = &config.backend.api_token {
            submitter = submitter.with_token(token);
        }
        Ok(submitter)
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns true if `GET /api/health` answers with a success status.
    pub async fn probe(&self) -> bool {
        let url = format!("{}/api/health", self.base_url);
        match self.client.get(&url).timeout(PROBE_TIMEOUT).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!(error = %friendly_error(&self.base_url, &e), "Backend probe failed");
                false
            }
        }
    }
}

#[async_trait]
impl SaleSubmitter for HttpSaleSubmitter {
    async fn submit(&self, sale: &PendingSale) -> Result<Confirmation, SubmitError> {
        let url = format!("{}/api/pos/sales", self.base_url);
        let body = SubmitSaleRequest {
            client_id: &sale.id,
            created_at: sale.created_at,
            payload: &sale.payload,
        };

        let mut req = self
            .client
            .post(&url)
            .header("Idempotency-Key", &sale.id)
            .json(&body);
        if let Some(token) = &self.api_token {
            req = req.bearer_auth(token);
        }
        if let Some(device_id) = &self.device_id {
            req = req.header("X-Device-Id", device_id);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| SubmitError::Transient(friendly_error(&self.base_url, &e)))?;
        let status = resp.status();

        if status.is_success() {
            let text = resp
                .text()
                .await
                .map_err(|e| SubmitError::Transient(friendly_error(&self.base_url, &e)))?;
            let parsed: SubmitSaleResponse = serde_json::from_str(&text).map_err(|e| {
                warn!(sale_id = %sale.id, error = %e, "Unreadable confirmation body");
                SubmitError::Transient(format!("Invalid confirmation from backend: {e}"))
            })?;

            return Ok(Confirmation {
                sale_number: parsed.sale_number,
                confirmed_at: parsed.confirmed_at.unwrap_or_else(Utc::now),
            });
        }

        let text = resp.text().await.unwrap_or_default();
        let message = rejection_message(status, &text);
        debug!(sale_id = %sale.id, status = status.as_u16(), %message, "Backend refused sale");

        match classify_status(status) {
            FailureKind::Transient => Err(SubmitError::Transient(message)),
            FailureKind::Permanent => Err(SubmitError::Permanent(message)),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;
    use till_core::{SaleLine, SaleTotals};
    use tokio::net::TcpListener;

    async fn serve(app: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/", addr)
    }

    fn sale() -> PendingSale {
        let payload = SalePayload {
            customer: None,
            lines: vec![SaleLine {
                sku: "CASE".into(),
                name: "Phone case".into(),
                quantity: 1,
                unit_price_cents: 1500,
                discount_cents: 0,
            }],
            totals: SaleTotals {
                subtotal_cents: 1500,
                discount_cents: 0,
                tax_cents: 0,
                total_cents: 1500,
            },
            note: None,
        };
        PendingSale::new("sale-abc", payload, Utc::now())
    }

    fn submitter(base: &str) -> HttpSaleSubmitter {
        HttpSaleSubmitter::new(base, Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn test_classify_status() {
        use FailureKind::*;
        for (code, kind) in [
            (400, Permanent),
            (404, Permanent),
            (409, Permanent),
            (422, Permanent),
            (401, Transient),
            (403, Transient),
            (408, Transient),
            (429, Transient),
            (500, Transient),
            (503, Transient),
        ] {
            assert_eq!(classify_status(StatusCode::from_u16(code).unwrap()), kind, "HTTP {}", code);
        }
    }

    #[test]
    fn test_rejection_message() {
        let msg = rejection_message(StatusCode::CONFLICT, r#"{"error":"duplicate sale number"}"#);
        assert_eq!(msg, "duplicate sale number (HTTP 409)");

        let msg = rejection_message(StatusCode::UNPROCESSABLE_ENTITY, r#"{"message":"bad sku"}"#);
        assert_eq!(msg, "bad sku (HTTP 422)");

        let msg = rejection_message(StatusCode::BAD_GATEWAY, "<html>");
        assert_eq!(msg, "Backend server error (HTTP 502)");
    }

    #[tokio::test]
    async fn test_success_sends_idempotency_key_and_token() {
        let app = Router::new().route(
            "/api/pos/sales",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                let key = headers
                    .get("Idempotency-Key")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                let auth = headers
                    .get("Authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                assert_eq!(auth, "Bearer t0ken");
                assert_eq!(body["client_id"], key.as_str());
                assert_eq!(body["payload"]["totals"]["total_cents"], 1500);
                Json(json!({ "sale_number": format!("S-{}", key) }))
            }),
        );
        let base = serve(app).await;

        let confirmation = submitter(&base)
            .with_token("t0ken")
            .submit(&sale())
            .await
            .unwrap();
        assert_eq!(confirmation.sale_number, "S-sale-abc");
    }

    #[tokio::test]
    async fn test_conflict_is_permanent() {
        let app = Router::new().route(
            "/api/pos/sales",
            post(|| async {
                (
                    axum::http::StatusCode::CONFLICT,
                    Json(json!({ "error": "duplicate sale number" })),
                )
            }),
        );
        let base = serve(app).await;

        let err = submitter(&base).submit(&sale()).await.unwrap_err();
        assert_eq!(
            err,
            SubmitError::Permanent("duplicate sale number (HTTP 409)".into())
        );
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let app = Router::new().route(
            "/api/pos/sales",
            post(|| async { axum::http::StatusCode::SERVICE_UNAVAILABLE }),
        );
        let base = serve(app).await;

        let err = submitter(&base).submit(&sale()).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::Transient);
    }

    #[tokio::test]
    async fn test_garbled_confirmation_is_transient() {
        let app = Router::new().route("/api/pos/sales", post(|| async { "ok" }));
        let base = serve(app).await;

        let err = submitter(&base).submit(&sale()).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::Transient);
    }

    #[tokio::test]
    async fn test_slow_backend_times_out_as_transient() {
        let app = Router::new().route(
            "/api/pos/sales",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({ "sale_number": "late" }))
            }),
        );
        let base = serve(app).await;

        let slow = HttpSaleSubmitter::new(&base, Duration::from_millis(200)).unwrap();
        let err = slow.submit(&sale()).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::Transient);
    }

    #[tokio::test]
    async fn test_unreachable_is_transient() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let s = submitter(&format!("http://{}", addr));
        let err = s.submit(&sale()).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::Transient);
        assert!(!s.probe().await);
    }

    #[tokio::test]
    async fn test_probe() {
        let app = Router::new().route("/api/health", get(|| async { "ok" }));
        let base = serve(app).await;
        assert!(submitter(&base).probe().await);
    }

    #[test]
    fn test_from_config_normalizes_url() {
        let mut config = QueueConfig::default();
        config.backend.base_url = "https://api.example.com///".into();
        let s = HttpSaleSubmitter::from_config(&config).unwrap();
        assert_eq!(s.base_url(), "https://api.example.com");
    }
}
