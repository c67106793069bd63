//! Passwordless auth flow: phone + SMS code
//!
//! 1. `send_code` texts a code to the phone
//! 2. `verify_code` either logs an existing user in or returns a
//!    temporary token for a new one
//! 3. `complete_registration` creates the user and organization by INN

use std::collections::HashMap;

use uuid::Uuid;

use super::client::ApiClient;
use super::transport::ApiRequest;
use super::types::{
    AcceptInviteRequest, CompleteRegistrationRequest, CompleteRegistrationResponse,
    MessageResponse, SendCodeRequest, SendCodeResponse, UserStatus, VerifyCodeRequest,
    VerifyCodeResponse,
};
use crate::error::{ClientError, Result};
use crate::session::Tokens;
use crate::validate::{checked_inn, checked_phone, validate_otp_code, ValidationError};

/// Result of checking an SMS code
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// Existing user; tokens are stored
    LoggedIn,
    /// New user; pass the token to `complete_registration`
    NeedsRegistration { temp_token: String },
    /// Wrong or expired code
    InvalidCode,
}

impl ApiClient {
    pub async fn send_code(&self, phone: &str) -> Result<SendCodeResponse> {
        let phone = checked_phone(phone)?;

        let request = ApiRequest::post("/auth/send-code")
            .json(&SendCodeRequest { phone })?
            .unauthenticated();
        let response: SendCodeResponse = self.call(request).await?;

        tracing::info!(is_new_user = response.is_new_user, ttl = response.ttl, "Confirmation code sent");
        Ok(response)
    }

    pub async fn verify_code(&self, phone: &str, code: &str) -> Result<VerifyOutcome> {
        let phone = checked_phone(phone)?;
        let code = code.trim();
        if !validate_otp_code(code) {
            return Err(ValidationError::OtpCode.into());
        }

        let request = ApiRequest::post("/auth/verify-code")
            .json(&VerifyCodeRequest {
                phone,
                code: code.to_string(),
            })?
            .unauthenticated();
        let response: VerifyCodeResponse = self.call(request).await?;

        if !response.verified {
            return Ok(VerifyOutcome::InvalidCode);
        }

        match response {
            VerifyCodeResponse {
                access_token: Some(access_token),
                refresh_token: Some(refresh_token),
                ..
            } => {
                self.session().login(&Tokens {
                    access_token,
                    refresh_token,
                })?;
                Ok(VerifyOutcome::LoggedIn)
            }
            VerifyCodeResponse {
                needs_registration: true,
                temp_token: Some(temp_token),
                ..
            } => Ok(VerifyOutcome::NeedsRegistration { temp_token }),
            _ => Err(ClientError::Api {
                status: 200,
                detail: "verification succeeded without tokens".to_string(),
            }),
        }
    }

    /// Register a new user with the temporary token from `verify_code`
    pub async fn complete_registration(
        &self,
        temp_token: &str,
        inn: &str,
        referral_code: Option<&str>,
        org_data: Option<HashMap<String, Option<String>>>,
    ) -> Result<CompleteRegistrationResponse> {
        let inn = checked_inn(inn)?;

        let request = ApiRequest::post("/auth/complete-registration")
            .json(&CompleteRegistrationRequest {
                inn,
                referral_code: referral_code
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(str::to_string),
                org_data,
            })?
            .with_bearer(temp_token);
        let response: CompleteRegistrationResponse = self.call(request).await?;

        self.session().login(&Tokens {
            access_token: response.access_token.clone(),
            refresh_token: response.refresh_token.clone(),
        })?;

        tracing::info!(user_id = %response.user_id, "Registration completed");
        Ok(response)
    }

    pub async fn accept_invite(&self, invite_id: Uuid) -> Result<MessageResponse> {
        let request = ApiRequest::post("/auth/accept-invite").json(&AcceptInviteRequest {
            invite_id: invite_id.to_string(),
        })?;
        let response = self.call(request).await?;

        tracing::info!(invite_id = %invite_id, "Invite accepted");
        Ok(response)
    }

    /// End the session on the server and locally.
    ///
    /// Local tokens are dropped even when the server call fails.
    pub async fn logout(&self) -> Result<()> {
        if self.session().is_authenticated() {
            if let Err(e) = self.execute(ApiRequest::post("/auth/logout")).await {
                tracing::warn!("Server-side logout failed: {}", e);
            }
        }
        self.session().logout()?;
        Ok(())
    }

    /// Personalization for the current user, `None` when logged out
    pub async fn auth_status(&self) -> Result<Option<UserStatus>> {
        if !self.session().is_authenticated() {
            return Ok(None);
        }

        match self.call(ApiRequest::get("/auth/me")).await {
            Ok(status) => Ok(Some(status)),
            Err(ClientError::Unauthorized) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
