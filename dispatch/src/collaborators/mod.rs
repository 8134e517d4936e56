//! External services consulted by the dispatch policy.
//!
//! Every call may fail or hang. The dispatcher bounds each one with a timeout
//! and treats any error as "no answer".

pub mod memory;
pub mod remote;

use crate::config::CollaboratorsConfig;
use crate::errors::CollaboratorError;
use async_trait::async_trait;
use refdata::types::{CampaignId, CountryCode, OperatorCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Remembers which subscribers already went through a service funnel.
#[async_trait]
pub trait RejectionCache: Send + Sync {
    async fn is_rejected(&self, key: &str, msisdn: &str) -> Result<bool, CollaboratorError>;

    async fn set_seen(&self, key: &str, msisdn: &str) -> Result<(), CollaboratorError>;
}

/// Rotates a subscriber through campaigns they have not been served yet.
#[async_trait]
pub trait CampaignRedirect: Send + Sync {
    /// Returns `current` when no redirect is needed and 0 when the subscriber
    /// has exhausted every campaign.
    async fn get_next_campaign(
        &self,
        current: CampaignId,
        msisdn: &str,
    ) -> Result<CampaignId, CollaboratorError>;

    async fn set_last_campaign(
        &self,
        campaign: CampaignId,
        msisdn: &str,
    ) -> Result<(), CollaboratorError>;
}

/// Monetization partners that buy rejected traffic.
#[async_trait]
pub trait RedirectPartner: Send + Sync {
    async fn get_destination(
        &self,
        country_code: CountryCode,
        operator_code: OperatorCode,
    ) -> Result<Option<Destination>, CollaboratorError>;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    pub url: String,
    pub destination_id: u64,
    pub partner_id: u64,
    #[serde(default)]
    pub price_per_hit: f64,
}

#[derive(Clone)]
pub struct Collaborators {
    pub rejection: Arc<dyn RejectionCache>,
    pub campaign_redirect: Arc<dyn CampaignRedirect>,
    pub partner: Arc<dyn RedirectPartner>,
}

impl Collaborators {
    pub fn from_config(config: &CollaboratorsConfig) -> Result<Self, CollaboratorError> {
        match config {
            CollaboratorsConfig::Memory {
                rejection_ttl_secs,
                campaign_rotation,
                partners,
            } => {
                let ttl = Duration::from_secs(*rejection_ttl_secs);
                Ok(Collaborators {
                    rejection: Arc::new(memory::MemoryRejectionCache::new(ttl)),
                    campaign_redirect: Arc::new(memory::MemoryCampaignRedirect::new(
                        campaign_rotation.clone(),
                        ttl,
                    )),
                    partner: Arc::new(memory::StaticPartners::new(partners.clone())),
                })
            }
            CollaboratorsConfig::Remote { url, timeout_ms } => {
                let client = Arc::new(remote::RemoteCollaborators::new(
                    url.clone(),
                    Duration::from_millis(*timeout_ms),
                )?);
                Ok(Collaborators {
                    rejection: client.clone(),
                    campaign_redirect: client.clone(),
                    partner: client,
                })
            }
        }
    }
}
