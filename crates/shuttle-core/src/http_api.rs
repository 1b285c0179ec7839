#![cfg(feature = "http-api")]
//! Bearer-authenticated JSON client for the fare backend.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::api::{BalanceDecision, BalanceOracle, FareRateSource, InspectionSubmitter};
use crate::errors::ApiError;
use crate::types::{
    InspectionRecord, InspectionSummary, PassengerType, ShuttleAssignment, SubmitReceipt,
};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BalanceCheckRequest<'a> {
    tag_id: &'a str,
    fare: Decimal,
}

#[derive(Clone)]
pub struct HttpApiClient {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl HttpApiClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self, ApiError> {
        Self::with_timeout(base_url, token, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn send(&self, req: RequestBuilder) -> Result<Response, ApiError> {
        self.authorize(req).send().await.map_err(map_transport)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        debug!(path, "GET");
        let resp = self.send(self.client.get(self.url(path))).await?;
        let resp = ensure_success(resp).await?;
        resp.json::<T>()
            .await
            .map_err(|e| ApiError::BadResponse(e.to_string()))
    }

    /// `GET /shuttles`
    pub async fn list_shuttles(&self) -> Result<Vec<ShuttleAssignment>, ApiError> {
        self.get_json("/shuttles").await
    }

    /// `GET /inspection-logs`
    pub async fn list_inspections(&self) -> Result<Vec<InspectionSummary>, ApiError> {
        self.get_json("/inspection-logs").await
    }

    /// `GET /inspections/{id}`
    pub async fn get_inspection(&self, inspection_id: &str) -> Result<InspectionRecord, ApiError> {
        self.get_json(&format!("/inspections/{}", inspection_id)).await
    }
}

#[async_trait]
impl FareRateSource for HttpApiClient {
    async fn fetch_fare_rates(&self) -> Result<Vec<PassengerType>, ApiError> {
        self.get_json("/passenger-types").await
    }
}

#[async_trait]
impl BalanceOracle for HttpApiClient {
    async fn check_balance(&self, tag_id: &str, fare: Decimal) -> Result<BalanceDecision, ApiError> {
        debug!(tag_id, %fare, "POST /check-balance");
        let req = self
            .client
            .post(self.url("/check-balance"))
            .json(&BalanceCheckRequest { tag_id, fare });
        let resp = self.send(req).await?;

        let status = resp.status();
        if status.is_success() {
            return Ok(BalanceDecision::Approved);
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized(error_message(resp).await));
        }
        if status == StatusCode::REQUEST_TIMEOUT {
            return Err(ApiError::Timeout);
        }
        if is_denial(status) {
            return Ok(BalanceDecision::Denied {
                message: error_message(resp).await,
            });
        }
        Err(ApiError::Server {
            status: status.as_u16(),
            message: error_message(resp).await,
        })
    }
}

#[async_trait]
impl InspectionSubmitter for HttpApiClient {
    async fn submit_inspection(&self, record: &InspectionRecord) -> Result<SubmitReceipt, ApiError> {
        debug!(plate = %record.plate, entries = record.logs.len(), "POST /inspections");
        let req = self.client.post(self.url("/inspections")).json(record);
        let resp = self.send(req).await?;
        let resp = ensure_success(resp).await?;
        resp.json::<SubmitReceipt>()
            .await
            .map_err(|e| ApiError::BadResponse(e.to_string()))
    }
}

/// Statuses the backend uses to refuse a card for the requested fare.
fn is_denial(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::BAD_REQUEST
            | StatusCode::PAYMENT_REQUIRED
            | StatusCode::FORBIDDEN
            | StatusCode::UNPROCESSABLE_ENTITY
    )
}

fn map_transport(e: reqwest::Error) -> ApiError {
    if e.is_timeout() {
        ApiError::Timeout
    } else {
        ApiError::Network(e.to_string())
    }
}

async fn ensure_success(resp: Response) -> Result<Response, ApiError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let message = error_message(resp).await;
    if status == StatusCode::UNAUTHORIZED {
        Err(ApiError::Unauthorized(message))
    } else {
        Err(ApiError::Server {
            status: status.as_u16(),
            message,
        })
    }
}

/// Pull a human-readable message from an error body: `{"message": ..}`,
/// `{"error": ..}`, or the raw text.
async fn error_message(resp: Response) -> String {
    let status = resp.status();
    let text = resp.text().await.unwrap_or_default();
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) {
        for key in ["message", "error"] {
            if let Some(msg) = value.get(key).and_then(|v| v.as_str()) {
                return msg.to_string();
            }
        }
    }
    if text.trim().is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        text
    }
}
