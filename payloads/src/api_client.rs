use crate::{
    Envelope, NotificationId, Period, requests,
    responses::{
        AreaPoint, DistributionSlice, Notification, Preferences, RevenuePoint,
        SalesPoint, Stat, UserProfile,
    },
};
use reqwest::StatusCode;
use serde::{Serialize, de::DeserializeOwned};
use std::time::Duration;

type ReqwestResult = Result<reqwest::Response, reqwest::Error>;

/// An API client for the dashboard backend.
///
/// Every endpoint resolves to an [`Envelope`]. A non-success status is an
/// answer from the backend and becomes a failed envelope; connection and
/// decoding problems never produced an answer and are returned as
/// [`ClientError`] so callers can tell the two apart.
pub struct APIClient {
    pub address: String,
    pub inner_client: reqwest::Client,
}

impl APIClient {
    pub fn new(
        address: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let inner_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            address: address.into().trim_end_matches('/').to_string(),
            inner_client,
        })
    }
}

/// Helper methods for http actions
impl APIClient {
    fn format_url(&self, path: &str) -> String {
        format!("{}/api/{path}", &self.address)
    }

    async fn get(&self, path: &str) -> ReqwestResult {
        self.inner_client.get(self.format_url(path)).send().await
    }

    async fn get_with_query(
        &self,
        path: &str,
        query: &impl Serialize,
    ) -> ReqwestResult {
        self.inner_client
            .get(self.format_url(path))
            .query(query)
            .send()
            .await
    }

    async fn patch(&self, path: &str, body: &impl Serialize) -> ReqwestResult {
        self.inner_client
            .patch(self.format_url(path))
            .json(body)
            .send()
            .await
    }

    async fn empty_patch(&self, path: &str) -> ReqwestResult {
        self.inner_client.patch(self.format_url(path)).send().await
    }
}

/// Methods on the dashboard API
impl APIClient {
    pub async fn stats(&self) -> Result<Envelope<Vec<Stat>>, ClientError> {
        let response = self.get("stats").await?;
        envelope_body(response).await
    }

    pub async fn revenue(
        &self,
        period: Period,
    ) -> Result<Envelope<Vec<RevenuePoint>>, ClientError> {
        let query = requests::ChartQuery { period };
        let response = self.get_with_query("charts/revenue", &query).await?;
        envelope_body(response).await
    }

    pub async fn sales(
        &self,
        period: Period,
    ) -> Result<Envelope<Vec<SalesPoint>>, ClientError> {
        let query = requests::ChartQuery { period };
        let response = self.get_with_query("charts/sales", &query).await?;
        envelope_body(response).await
    }

    pub async fn distribution(
        &self,
    ) -> Result<Envelope<Vec<DistributionSlice>>, ClientError> {
        let response = self.get("charts/distribution").await?;
        envelope_body(response).await
    }

    pub async fn area(&self) -> Result<Envelope<Vec<AreaPoint>>, ClientError> {
        let response = self.get("charts/area").await?;
        envelope_body(response).await
    }

    pub async fn notifications(
        &self,
    ) -> Result<Envelope<Vec<Notification>>, ClientError> {
        let response = self.get("notifications").await?;
        envelope_body(response).await
    }

    pub async fn mark_notification_read(
        &self,
        id: NotificationId,
    ) -> Result<Envelope<()>, ClientError> {
        let response =
            self.empty_patch(&format!("notifications/{id}/read")).await?;
        envelope_empty(response).await
    }

    /// Get the current user's profile information.
    pub async fn user_profile(
        &self,
    ) -> Result<Envelope<UserProfile>, ClientError> {
        let response = self.get("user/profile").await?;
        envelope_body(response).await
    }

    pub async fn update_preferences(
        &self,
        preferences: &Preferences,
    ) -> Result<Envelope<()>, ClientError> {
        let body = requests::UpdatePreferences {
            preferences: preferences.clone(),
        };
        let response = self.patch("user/preferences", &body).await?;
        envelope_empty(response).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Network error. Please check your connection.")]
    Network(#[from] reqwest::Error),
}

fn status_failure<T>(status: StatusCode) -> Envelope<T> {
    Envelope::failure(format!("API Error: {status}"))
}

/// Wrap a successful response body in an envelope, or turn a non-success
/// status into a failed envelope.
pub async fn envelope_body<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<Envelope<T>, ClientError> {
    if !response.status().is_success() {
        return Ok(status_failure(response.status()));
    }
    Ok(Envelope::ok(response.json::<T>().await?))
}

/// Like [`envelope_body`] for endpoints that answer without a body.
pub async fn envelope_empty(
    response: reqwest::Response,
) -> Result<Envelope<()>, ClientError> {
    if !response.status().is_success() {
        return Ok(status_failure(response.status()));
    }
    Ok(Envelope::ok(()))
}
