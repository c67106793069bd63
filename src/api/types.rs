//! Request/response bodies of the 1C24 REST API

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Auth
// ============================================================================

/// Body of `POST /auth/send-code`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendCodeRequest {
    /// `+7XXXXXXXXXX`
    pub phone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendCodeResponse {
    pub sent: bool,
    pub is_new_user: bool,
    /// Code lifetime in seconds
    #[serde(default = "default_ttl")]
    pub ttl: u32,
}

fn default_ttl() -> u32 {
    300
}

/// Body of `POST /auth/verify-code`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyCodeRequest {
    pub phone: String,
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyCodeResponse {
    pub verified: bool,
    #[serde(default)]
    pub needs_registration: bool,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    /// Short-lived token authorizing `complete-registration`
    pub temp_token: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Body of `POST /auth/complete-registration`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompleteRegistrationRequest {
    pub inn: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referral_code: Option<String>,
    /// Organization fields the user confirmed after the INN lookup
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_data: Option<HashMap<String, Option<String>>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizationSummary {
    pub name_short: String,
    pub slug: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteRegistrationResponse {
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub organization: Option<OrganizationSummary>,
}

/// Body of `POST /auth/accept-invite`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptInviteRequest {
    pub invite_id: String,
}

/// Body of `POST /auth/refresh`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

/// Generic `{"message": ...}` acknowledgement
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub message: String,
}

/// Landing-page personalization from `GET /auth/me`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserStatus {
    pub user_id: String,
    pub phone: String,
    pub role: String,
    pub status: AccountStatus,
    #[serde(default)]
    pub trial_days_left: i64,
    pub trial_started_at: Option<DateTime<Utc>>,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub org_name: String,
    pub org_inn: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub patronymic: Option<String>,
    pub display_name: String,
    pub referral_code: Option<String>,
    pub tariff: Option<String>,
    pub tariff_active_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    TrialNotStarted,
    Trial,
    TrialEnding,
    Expired,
    Active,
}

// ============================================================================
// INN
// ============================================================================

/// Body of `POST /inn/lookup`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InnLookupRequest {
    pub inn: String,
}

/// Registry data for an organization or sole proprietor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizationResponse {
    pub inn: String,
    pub kpp: Option<String>,
    pub ogrn: Option<String>,
    pub name_short: String,
    pub name_full: Option<String>,
    /// `LEGAL` or `INDIVIDUAL`
    #[serde(rename = "type")]
    pub org_type: String,
    pub director_name: Option<String>,
    pub address: Option<String>,
    pub okved: Option<String>,
    #[serde(default)]
    pub okved_name: Option<String>,
    /// `ACTIVE`, `LIQUIDATING`, `LIQUIDATED`
    pub status: String,
}

impl OrganizationResponse {
    pub fn is_active(&self) -> bool {
        self.status.eq_ignore_ascii_case("active")
    }

    /// Fields forwarded as `org_data` when completing registration
    pub fn to_org_data(&self) -> HashMap<String, Option<String>> {
        HashMap::from([
            ("name_short".to_string(), Some(self.name_short.clone())),
            ("name_full".to_string(), self.name_full.clone()),
            ("kpp".to_string(), self.kpp.clone()),
            ("ogrn".to_string(), self.ogrn.clone()),
            ("type".to_string(), Some(self.org_type.clone())),
            ("director_name".to_string(), self.director_name.clone()),
            ("address".to_string(), self.address.clone()),
        ])
    }
}

// ============================================================================
// Dashboard
// ============================================================================

/// Full profile from `GET /me`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub phone: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub patronymic: Option<String>,
    pub display_name: String,
    pub role: String,
    pub status: String,
    pub referral_code: String,
    pub organization: OrganizationResponse,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Body of `PATCH /me`; unset fields are left unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patronymic: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseStatus {
    Preparing,
    Active,
    Readonly,
    Blocked,
    Deleted,
}

/// Hosted database from `GET /me/databases`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseRecord {
    pub id: String,
    pub name: String,
    pub db_name: String,
    pub config_code: String,
    pub config_name: String,
    pub status: DatabaseStatus,
    pub web_url: Option<String>,
    pub rdp_url: Option<String>,
    /// Serialized as a decimal; may arrive as a number or a string
    #[serde(default, deserialize_with = "de_opt_decimal")]
    pub size_gb: Option<f64>,
    pub last_backup_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

fn de_opt_decimal<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;

    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::Number(n)) => Ok(n.as_f64()),
        Some(serde_json::Value::String(s)) => s.parse().map(Some).map_err(D::Error::custom),
        Some(other) => Err(D::Error::custom(format!("expected decimal, got {}", other))),
    }
}

impl DatabaseRecord {
    pub fn is_reachable(&self) -> bool {
        matches!(self.status, DatabaseStatus::Active | DatabaseStatus::Readonly)
            && (self.web_url.is_some() || self.rdp_url.is_some())
    }
}
