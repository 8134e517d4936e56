// In-process collaborators. State lives in this instance only and is lost on restart.
use super::{CampaignRedirect, Destination, RedirectPartner, RejectionCache};
use crate::config::PartnerConfig;
use crate::errors::CollaboratorError;
use async_trait::async_trait;
use moka::sync::Cache;
use refdata::types::{CampaignId, CountryCode, OperatorCode};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

const MAX_SUBSCRIBERS: u64 = 1_000_000;

pub struct MemoryRejectionCache {
    seen: Cache<String, ()>,
}

impl MemoryRejectionCache {
    pub fn new(ttl: Duration) -> Self {
        let seen = Cache::builder()
            .max_capacity(MAX_SUBSCRIBERS)
            .time_to_live(ttl)
            .build();

        MemoryRejectionCache { seen }
    }
}

fn seen_key(key: &str, msisdn: &str) -> String {
    format!("{key}:{msisdn}")
}

#[async_trait]
impl RejectionCache for MemoryRejectionCache {
    async fn is_rejected(&self, key: &str, msisdn: &str) -> Result<bool, CollaboratorError> {
        Ok(self.seen.contains_key(&seen_key(key, msisdn)))
    }

    async fn set_seen(&self, key: &str, msisdn: &str) -> Result<(), CollaboratorError> {
        self.seen.insert(seen_key(key, msisdn), ());
        Ok(())
    }
}

/// Offers campaigns from a fixed rotation, skipping the ones a subscriber
/// was already served.
pub struct MemoryCampaignRedirect {
    rotation: Vec<CampaignId>,
    served: Cache<String, Arc<BTreeSet<CampaignId>>>,
}

impl MemoryCampaignRedirect {
    pub fn new(rotation: Vec<CampaignId>, ttl: Duration) -> Self {
        let served = Cache::builder()
            .max_capacity(MAX_SUBSCRIBERS)
            .time_to_live(ttl)
            .build();

        MemoryCampaignRedirect { rotation, served }
    }
}

#[async_trait]
impl CampaignRedirect for MemoryCampaignRedirect {
    async fn get_next_campaign(
        &self,
        current: CampaignId,
        msisdn: &str,
    ) -> Result<CampaignId, CollaboratorError> {
        let Some(served) = self.served.get(msisdn) else {
            return Ok(current);
        };
        if !served.contains(&current) {
            return Ok(current);
        }

        Ok(self
            .rotation
            .iter()
            .copied()
            .find(|id| *id != 0 && !served.contains(id))
            .unwrap_or(0))
    }

    async fn set_last_campaign(
        &self,
        campaign: CampaignId,
        msisdn: &str,
    ) -> Result<(), CollaboratorError> {
        self.served
            .entry(msisdn.to_string())
            .and_upsert_with(|existing| {
                let mut set = existing
                    .map(|entry| entry.into_value().as_ref().clone())
                    .unwrap_or_default();
                set.insert(campaign);
                Arc::new(set)
            });
        Ok(())
    }
}

/// Fixed partner list. An operator-specific partner beats a country-wide one,
/// which beats a wildcard. Ties go to the first configured partner.
pub struct StaticPartners {
    partners: Vec<PartnerConfig>,
}

impl StaticPartners {
    pub fn new(partners: Vec<PartnerConfig>) -> Self {
        StaticPartners { partners }
    }

    fn specificity(
        partner: &PartnerConfig,
        country_code: CountryCode,
        operator_code: OperatorCode,
    ) -> Option<u8> {
        if partner.country_code.is_some_and(|c| c != country_code) {
            return None;
        }
        match partner.operator_code {
            Some(code) if code == operator_code => Some(2),
            Some(_) => None,
            None if partner.country_code.is_some() => Some(1),
            None => Some(0),
        }
    }
}

#[async_trait]
impl RedirectPartner for StaticPartners {
    async fn get_destination(
        &self,
        country_code: CountryCode,
        operator_code: OperatorCode,
    ) -> Result<Option<Destination>, CollaboratorError> {
        let mut best: Option<(u8, &PartnerConfig)> = None;
        for partner in &self.partners {
            if let Some(score) = Self::specificity(partner, country_code, operator_code)
                && best.is_none_or(|(best_score, _)| score > best_score)
            {
                best = Some((score, partner));
            }
        }

        Ok(best.map(|(_, partner)| Destination {
            url: partner.url.clone(),
            destination_id: partner.destination_id,
            partner_id: partner.partner_id,
            price_per_hit: partner.price_per_hit,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rejection_cache() {
        let cache = MemoryRejectionCache::new(Duration::from_secs(60));

        assert!(!cache.is_rejected("svc", "923001234567").await.unwrap());
        cache.set_seen("svc", "923001234567").await.unwrap();
        assert!(cache.is_rejected("svc", "923001234567").await.unwrap());

        // Scoped by key and subscriber.
        assert!(!cache.is_rejected("other", "923001234567").await.unwrap());
        assert!(!cache.is_rejected("svc", "923009999999").await.unwrap());
    }

    #[tokio::test]
    async fn test_rejection_cache_expiry() {
        let cache = MemoryRejectionCache::new(Duration::from_millis(50));
        cache.set_seen("svc", "1").await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!cache.is_rejected("svc", "1").await.unwrap());
    }

    #[tokio::test]
    async fn test_campaign_rotation() {
        let redirect = MemoryCampaignRedirect::new(vec![1, 2, 3], Duration::from_secs(60));
        let msisdn = "923001234567";

        // Never served: stay.
        assert_eq!(redirect.get_next_campaign(1, msisdn).await.unwrap(), 1);

        redirect.set_last_campaign(1, msisdn).await.unwrap();
        assert_eq!(redirect.get_next_campaign(1, msisdn).await.unwrap(), 2);
        // A campaign outside the served set needs no redirect.
        assert_eq!(redirect.get_next_campaign(3, msisdn).await.unwrap(), 3);

        redirect.set_last_campaign(2, msisdn).await.unwrap();
        redirect.set_last_campaign(3, msisdn).await.unwrap();
        assert_eq!(redirect.get_next_campaign(1, msisdn).await.unwrap(), 0);

        // Other subscribers are unaffected.
        assert_eq!(redirect.get_next_campaign(1, "923009999999").await.unwrap(), 1);
    }

    fn partner(id: u64, country: Option<u32>, operator: Option<u32>) -> PartnerConfig {
        PartnerConfig {
            partner_id: id,
            destination_id: id * 10,
            url: format!("https://partner{id}.example/x"),
            price_per_hit: 0.01,
            country_code: country,
            operator_code: operator,
        }
    }

    #[tokio::test]
    async fn test_partner_specificity() {
        let partners = StaticPartners::new(vec![
            partner(1, None, None),
            partner(2, Some(92), None),
            partner(3, Some(92), Some(100)),
            partner(4, Some(93), None),
        ]);

        let dest = partners.get_destination(92, 100).await.unwrap().unwrap();
        assert_eq!(dest.partner_id, 3);
        assert_eq!(dest.destination_id, 30);
        assert_eq!(dest.url, "https://partner3.example/x");

        let dest = partners.get_destination(92, 300).await.unwrap().unwrap();
        assert_eq!(dest.partner_id, 2);

        let dest = partners.get_destination(44, 1).await.unwrap().unwrap();
        assert_eq!(dest.partner_id, 1);
    }

    #[tokio::test]
    async fn test_no_partner() {
        let partners = StaticPartners::new(vec![partner(4, Some(93), None)]);
        assert_eq!(partners.get_destination(92, 100).await.unwrap(), None);

        let partners = StaticPartners::new(vec![]);
        assert_eq!(partners.get_destination(92, 100).await.unwrap(), None);
    }
}
