use crate::snapshot::{LoadError, Snapshot, TableSnapshot};
use crate::source::ReferenceSource;
use crate::types::{Campaign, CampaignId, CampaignStatus};
use std::collections::HashMap;
use std::sync::Arc;

/// The three campaign indexes. They are built together and published
/// together, so they always describe the same snapshot.
#[derive(Default)]
pub(crate) struct CampaignSnapshot {
    by_id: HashMap<CampaignId, Arc<Campaign>>,
    by_link: HashMap<String, Arc<Campaign>>,
    by_hash: HashMap<String, Arc<Campaign>>,
}

impl CampaignSnapshot {
    fn build(rows: Vec<Campaign>) -> Self {
        let mut snapshot = CampaignSnapshot::default();
        for campaign in rows {
            if campaign.status == CampaignStatus::Active {
                snapshot.insert(Arc::new(campaign));
            }
        }
        snapshot
    }

    /// Later rows win. A campaign whose id, link or hash is taken over by a
    /// later row is dropped from every index, so each live campaign stays
    /// reachable by both its link and its hash.
    fn insert(&mut self, campaign: Arc<Campaign>) {
        let replaced = [
            self.by_id.get(&campaign.id).cloned(),
            self.by_link.get(&campaign.link).cloned(),
            self.by_hash.get(&campaign.hash).cloned(),
        ];
        for previous in replaced.into_iter().flatten() {
            tracing::debug!(
                id = previous.id,
                replaced_by = campaign.id,
                "Duplicate campaign key, keeping the later row"
            );
            self.remove(&previous);
        }

        self.by_id.insert(campaign.id, campaign.clone());
        self.by_link.insert(campaign.link.clone(), campaign.clone());
        self.by_hash.insert(campaign.hash.clone(), campaign);
    }

    fn remove(&mut self, campaign: &Arc<Campaign>) {
        let same = |entry: Option<&Arc<Campaign>>| entry.is_some_and(|e| Arc::ptr_eq(e, campaign));

        if same(self.by_id.get(&campaign.id)) {
            self.by_id.remove(&campaign.id);
        }
        if same(self.by_link.get(&campaign.link)) {
            self.by_link.remove(&campaign.link);
        }
        if same(self.by_hash.get(&campaign.hash)) {
            self.by_hash.remove(&campaign.hash);
        }
    }
}

impl TableSnapshot for CampaignSnapshot {
    fn len(&self) -> usize {
        self.by_id.len()
    }
}

/// Active campaigns, resolvable by id, public link or hash.
pub struct CampaignCache {
    snapshot: Snapshot<CampaignSnapshot>,
}

impl Default for CampaignCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CampaignCache {
    pub fn new() -> Self {
        CampaignCache {
            snapshot: Snapshot::new("campaigns", CampaignSnapshot::default()),
        }
    }

    pub async fn reload(&self, source: &dyn ReferenceSource) -> Result<usize, LoadError> {
        self.snapshot
            .reload_with(|_| async move { Ok(CampaignSnapshot::build(source.campaigns().await?)) })
            .await
    }

    pub fn resolve_by_link(&self, link: &str) -> Option<Arc<Campaign>> {
        self.snapshot.load().by_link.get(link).cloned()
    }

    /// Callers validate the hash length before calling.
    pub fn resolve_by_hash(&self, hash: &str) -> Option<Arc<Campaign>> {
        self.snapshot.load().by_hash.get(hash).cloned()
    }

    pub fn resolve_by_id(&self, id: CampaignId) -> Option<Arc<Campaign>> {
        self.snapshot.load().by_id.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.snapshot.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_loaded(&self) -> bool {
        self.snapshot.is_loaded()
    }
}
