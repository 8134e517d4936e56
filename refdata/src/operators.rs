use crate::snapshot::{LoadError, Snapshot, TableSnapshot};
use crate::source::ReferenceSource;
use crate::types::{Operator, OperatorCode};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
pub(crate) struct OperatorSnapshot {
    by_code: HashMap<OperatorCode, Arc<Operator>>,
}

impl TableSnapshot for OperatorSnapshot {
    fn len(&self) -> usize {
        self.by_code.len()
    }
}

/// Operator metadata keyed by code. Used for display and policy, never for matching.
pub struct OperatorDirectory {
    snapshot: Snapshot<OperatorSnapshot>,
}

impl Default for OperatorDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl OperatorDirectory {
    pub fn new() -> Self {
        OperatorDirectory {
            snapshot: Snapshot::new("operators", OperatorSnapshot::default()),
        }
    }

    pub async fn reload(&self, source: &dyn ReferenceSource) -> Result<usize, LoadError> {
        self.snapshot
            .reload_with(|_| async move {
                let by_code = source
                    .operators()
                    .await?
                    .into_iter()
                    .map(|operator| (operator.code, Arc::new(operator)))
                    .collect();
                Ok(OperatorSnapshot { by_code })
            })
            .await
    }

    pub fn get_by_code(&self, code: OperatorCode) -> Option<Arc<Operator>> {
        self.snapshot.load().by_code.get(&code).cloned()
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
