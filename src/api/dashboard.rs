//! Personal account endpoints under `/me`

use super::client::ApiClient;
use super::transport::ApiRequest;
use super::types::{DatabaseRecord, MessageResponse, UpdateProfileRequest, UserProfile};
use crate::error::Result;
use crate::upload::UploadRecord;
use crate::validate::{validate_email, ValidationError};

impl ApiClient {
    pub async fn me(&self) -> Result<UserProfile> {
        self.call(ApiRequest::get("/me")).await
    }

    pub async fn databases(&self) -> Result<Vec<DatabaseRecord>> {
        self.call(ApiRequest::get("/me/databases")).await
    }

    /// Upload history, newest first as returned by the server
    pub async fn uploads(&self) -> Result<Vec<UploadRecord>> {
        self.call(ApiRequest::get("/me/uploads")).await
    }

    pub async fn update_profile(&self, update: &UpdateProfileRequest) -> Result<MessageResponse> {
        if let Some(email) = update.email.as_deref() {
            if !validate_email(email) {
                return Err(ValidationError::Email(email.to_string()).into());
            }
        }

        let response: MessageResponse = self.call(ApiRequest::patch("/me").json(update)?).await?;
        tracing::info!("Profile updated");
        Ok(response)
    }
}
