//! API Client Module
//!
//! Typed calls for each attendance server operation. No call retries or
//! caches; the outcome is handed straight back to the caller.

use std::sync::Arc;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::auth::TokenStore;
use crate::interceptor::AuthInterceptor;
use crate::models::{
    ChangePasswordRequest, History, PasswordChange, Period, PhotoPunch, Profile, ProfileUpdate,
    PunchRequest, PunchResult, TokenRequest, TokenResponse,
};

const PHOTO_FIELD: &str = "face_image";
const PHOTO_FILE_NAME: &str = "face.jpg";
const PHOTO_MIME: &str = "image/jpeg";

/// API client for the attendance backend
#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
    interceptor: AuthInterceptor,
}

impl ApiClient {
    /// Create a new API client; `timeout` bounds every request
    pub fn new(
        base_url: &str,
        timeout: Duration,
        tokens: Arc<TokenStore>,
    ) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Network(describe(&e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            interceptor: AuthInterceptor::new(tokens),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Exchange username/password for a credential pair.
    ///
    /// Token issuance is the one call sent without the bearer header.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<TokenResponse, ApiError> {
        let url = self.url("api/token/");
        debug!("Requesting token at: {}", url);

        let request = self
            .client
            .post(&url)
            .json(&TokenRequest { username, password });

        let data: TokenResponse = send_json(request).await?;
        info!("Authenticated user: {}", username);
        Ok(data)
    }

    /// Multipart punch with the face photo
    pub async fn submit_photo_punch(&self, punch: PhotoPunch) -> Result<PunchResult, ApiError> {
        let url = self.url("api/clock/");
        info!(
            "Submitting photo punch at ({:.5}, {:.5}), location {:?}, {} bytes",
            punch.fix.latitude,
            punch.fix.longitude,
            punch.work_location_id,
            punch.photo.len()
        );

        let photo = Part::bytes(punch.photo)
            .file_name(PHOTO_FILE_NAME)
            .mime_str(PHOTO_MIME)
            .map_err(|e| ApiError::Multipart(e.to_string()))?;

        let mut form = Form::new()
            .text("latitude", punch.fix.latitude.to_string())
            .text("longitude", punch.fix.longitude.to_string());
        if let Some(id) = punch.work_location_id {
            form = form.text("work_location_id", id.to_string());
        }
        let form = form.part(PHOTO_FIELD, photo);

        let request = self.interceptor.intercept(self.client.post(&url)).multipart(form);
        let result: PunchResult = send_json(request).await?;

        info!("Punch accepted: {}", result.summary());
        Ok(result)
    }

    /// JSON punch for callers without a photo; same endpoint as the photo punch
    pub async fn submit_punch(&self, punch: &PunchRequest) -> Result<PunchResult, ApiError> {
        let url = self.url("api/clock/");
        info!(
            "Submitting punch at ({:.5}, {:.5})",
            punch.latitude, punch.longitude
        );

        let request = self.interceptor.intercept(self.client.post(&url)).json(punch);
        send_json(request).await
    }

    pub async fn fetch_profile(&self) -> Result<Profile, ApiError> {
        let url = self.url("api/employee/me/");
        debug!("Fetching profile");

        send_json(self.interceptor.intercept(self.client.get(&url))).await
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<Profile, ApiError> {
        let url = self.url("api/employee/me/");
        info!("Updating profile");

        send_json(self.interceptor.intercept(self.client.patch(&url)).json(update)).await
    }

    /// Change the password; a 400 comes back as a typed rejection
    pub async fn change_password(
        &self,
        new_password: &str,
        confirmation: &str,
    ) -> Result<PasswordChange, ApiError> {
        let url = self.url("api/employee/change-password/");
        info!("Changing password");

        let request = self
            .interceptor
            .intercept(self.client.post(&url))
            .json(&ChangePasswordRequest {
                new_password1: new_password,
                new_password2: confirmation,
            });

        match send(request).await {
            Ok(_) => Ok(PasswordChange::Changed),
            Err(ApiError::Server { status: 400, body }) => {
                warn!("Password change rejected");
                Ok(PasswordChange::from_rejection(&body))
            }
            Err(e) => Err(e),
        }
    }

    /// Grouped attendance history for `period`, anchored at `date` (server default: today)
    pub async fn fetch_history(
        &self,
        period: Period,
        date: Option<chrono::NaiveDate>,
    ) -> Result<History, ApiError> {
        let url = self.url("api/attendance/history/");
        debug!("Fetching history: period={} date={:?}", period.as_str(), date);

        let mut query = vec![("period", period.as_str().to_string())];
        if let Some(date) = date {
            query.push(("date", date.format("%Y-%m-%d").to_string()));
        }

        send_json(self.interceptor.intercept(self.client.get(&url)).query(&query)).await
    }
}

/// Send and split transport failures from non-2xx responses
async fn send(request: RequestBuilder) -> Result<Response, ApiError> {
    let response = request
        .send()
        .await
        .map_err(|e| ApiError::Network(describe(&e)))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        warn!("Server rejected request: {}", status);
        return Err(ApiError::Server {
            status: status.as_u16(),
            body,
        });
    }

    Ok(response)
}

async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, ApiError> {
    send(request)
        .await?
        .json::<T>()
        .await
        .map_err(|e| ApiError::Parse(describe(&e)))
}

/// Flatten an error and its sources into one line
fn describe(error: &dyn std::error::Error) -> String {
    let mut text = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

/// API errors
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// No response was received
    #[error("Network error: {0}")]
    Network(String),

    /// Non-2xx response; `body` is the server's text, untouched
    #[error("Server error {status}: {body}")]
    Server { status: u16, body: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Multipart error: {0}")]
    Multipart(String),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Server { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("error sending request")]
    struct Outer(#[source] std::io::Error);

    #[test]
    fn describe_includes_source_chain() {
        let inner = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "connection refused");
        assert_eq!(
            describe(&Outer(inner)),
            "error sending request: connection refused"
        );
    }

    #[test]
    fn status_only_for_server_errors() {
        let server = ApiError::Server {
            status: 403,
            body: "{}".into(),
        };
        assert_eq!(server.status(), Some(403));
        assert_eq!(ApiError::Network("down".into()).status(), None);
    }
}
