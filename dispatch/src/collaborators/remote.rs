use super::{CampaignRedirect, Destination, RedirectPartner, RejectionCache};
use crate::errors::CollaboratorError;
use async_trait::async_trait;
use refdata::types::{CampaignId, CountryCode, OperatorCode};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

#[derive(Deserialize)]
struct RejectedResponse {
    rejected: bool,
}

#[derive(Serialize)]
struct SeenRequest<'a> {
    key: &'a str,
    msisdn: &'a str,
}

#[derive(Deserialize)]
struct NextCampaignResponse {
    campaign_id: CampaignId,
}

#[derive(Serialize)]
struct LastCampaignRequest<'a> {
    campaign_id: CampaignId,
    msisdn: &'a str,
}

/// Client for an HTTP/JSON collaborator service implementing all three
/// collaborator interfaces:
///
/// - `GET  rejected?key=&msisdn=` -> `{"rejected": bool}`
/// - `POST seen` with `{"key", "msisdn"}`
/// - `GET  next-campaign?campaign_id=&msisdn=` -> `{"campaign_id": n}`
/// - `POST last-campaign` with `{"campaign_id", "msisdn"}`
/// - `GET  destination?country_code=&operator_code=` -> destination, 404 if none
pub struct RemoteCollaborators {
    client: reqwest::Client,
    base_url: Url,
}

impl RemoteCollaborators {
    pub fn new(mut base_url: Url, timeout: Duration) -> Result<Self, CollaboratorError> {
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(RemoteCollaborators { client, base_url })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>, CollaboratorError> {
        let url = self.base_url.join(endpoint)?;
        let response = self.client.get(url).query(query).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let body = response.bytes().await?;
                Ok(Some(serde_json::from_slice(&body)?))
            }
            status => Err(CollaboratorError::Status(status)),
        }
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<(), CollaboratorError> {
        let url = self.base_url.join(endpoint)?;
        let response = self.client.post(url).json(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CollaboratorError::Status(status));
        }
        Ok(())
    }

    async fn get_required<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<T, CollaboratorError> {
        self.get(endpoint, query)
            .await?
            .ok_or(CollaboratorError::Status(StatusCode::NOT_FOUND))
    }
}

#[async_trait]
impl RejectionCache for RemoteCollaborators {
    async fn is_rejected(&self, key: &str, msisdn: &str) -> Result<bool, CollaboratorError> {
        let response: RejectedResponse = self
            .get_required(
                "rejected",
                &[("key", key.to_string()), ("msisdn", msisdn.to_string())],
            )
            .await?;
        Ok(response.rejected)
    }

    async fn set_seen(&self, key: &str, msisdn: &str) -> Result<(), CollaboratorError> {
        self.post("seen", &SeenRequest { key, msisdn }).await
    }
}

#[async_trait]
impl CampaignRedirect for RemoteCollaborators {
    async fn get_next_campaign(
        &self,
        current: CampaignId,
        msisdn: &str,
    ) -> Result<CampaignId, CollaboratorError> {
        let response: NextCampaignResponse = self
            .get_required(
                "next-campaign",
                &[
                    ("campaign_id", current.to_string()),
                    ("msisdn", msisdn.to_string()),
                ],
            )
            .await?;
        Ok(response.campaign_id)
    }

    async fn set_last_campaign(
        &self,
        campaign: CampaignId,
        msisdn: &str,
    ) -> Result<(), CollaboratorError> {
        let body = LastCampaignRequest {
            campaign_id: campaign,
            msisdn,
        };
        self.post("last-campaign", &body).await
    }
}

#[async_trait]
impl RedirectPartner for RemoteCollaborators {
    async fn get_destination(
        &self,
        country_code: CountryCode,
        operator_code: OperatorCode,
    ) -> Result<Option<Destination>, CollaboratorError> {
        self.get(
            "destination",
            &[
                ("country_code", country_code.to_string()),
                ("operator_code", operator_code.to_string()),
            ],
        )
        .await
    }
}
