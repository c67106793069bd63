//! Organization lookup by INN

use super::client::ApiClient;
use super::transport::ApiRequest;
use super::types::{InnLookupRequest, OrganizationResponse};
use crate::error::{ClientError, Result};
use crate::validate::checked_inn;

impl ApiClient {
    /// Look up registry data for a validated INN.
    ///
    /// An INN the registry does not know is `Ok(None)`, not an error.
    pub async fn lookup_inn(&self, inn: &str) -> Result<Option<OrganizationResponse>> {
        let inn = checked_inn(inn)?;

        let request = ApiRequest::post("/inn/lookup")
            .json(&InnLookupRequest { inn: inn.clone() })?
            .unauthenticated();

        match self.call::<OrganizationResponse>(request).await {
            Ok(org) => {
                tracing::debug!(inn = %inn, status = %org.status, "Organization found");
                Ok(Some(org))
            }
            Err(ClientError::NotFound(detail)) => {
                tracing::debug!(inn = %inn, "Organization not found: {}", detail);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
