use crate::snapshot::{LoadError, Snapshot, TableSnapshot};
use crate::source::ReferenceSource;
use crate::types::{OperatorCode, PrefixEntry};
use std::collections::HashMap;

#[derive(Default)]
pub(crate) struct PrefixSnapshot {
    prefixes: HashMap<String, OperatorCode>,
    longest: usize,
}

impl PrefixSnapshot {
    fn build(rows: Vec<PrefixEntry>) -> Self {
        let mut snapshot = PrefixSnapshot::default();
        let mut duplicates = 0;

        for row in rows {
            let prefix = row.prefix.trim().trim_start_matches('+');
            if prefix.is_empty() {
                continue;
            }
            // Two entries with the same prefix both match the same numbers.
            // The first one in table order is kept.
            if snapshot.prefixes.contains_key(prefix) {
                duplicates += 1;
                continue;
            }
            snapshot.longest = snapshot.longest.max(prefix.len());
            snapshot.prefixes.insert(prefix.to_string(), row.operator_code);
        }

        if duplicates > 0 {
            tracing::warn!(duplicates, "Ignored duplicate MSISDN prefixes");
        }
        snapshot
    }

    fn lookup(&self, msisdn: &str) -> Option<OperatorCode> {
        let msisdn = msisdn.trim().trim_start_matches('+');
        let max = self.longest.min(msisdn.len());

        (1..=max).rev().find_map(|len| {
            msisdn
                .get(..len)
                .and_then(|candidate| self.prefixes.get(candidate))
                .copied()
        })
    }
}

impl TableSnapshot for PrefixSnapshot {
    fn len(&self) -> usize {
        self.prefixes.len()
    }
}

/// MSISDN prefix to operator mapping, matched longest-prefix first.
pub struct PrefixTable {
    snapshot: Snapshot<PrefixSnapshot>,
}

impl Default for PrefixTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PrefixTable {
    pub fn new() -> Self {
        PrefixTable {
            snapshot: Snapshot::new("prefixes", PrefixSnapshot::default()),
        }
    }

    pub async fn reload(&self, source: &dyn ReferenceSource) -> Result<usize, LoadError> {
        self.snapshot
            .reload_with(|_| async move { Ok(PrefixSnapshot::build(source.prefixes().await?)) })
            .await
    }

    /// Returns the operator of the longest stored prefix of `msisdn`. A leading
    /// `+` on either side is ignored.
    pub fn lookup(&self, msisdn: &str) -> Option<OperatorCode> {
        self.snapshot.load().lookup(msisdn)
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{MemoryData, MemorySource};
    use std::sync::Arc;
    use std::time::Duration;

    fn entry(prefix: &str, operator_code: u32) -> PrefixEntry {
        PrefixEntry {
            prefix: prefix.into(),
            operator_code,
        }
    }

    async fn loaded_table(rows: Vec<PrefixEntry>) -> PrefixTable {
        let source = MemorySource::new(MemoryData {
            prefixes: rows,
            ..Default::default()
        });
        let table = PrefixTable::new();
        table.reload(&source).await.unwrap();
        table
    }

    #[tokio::test]
    async fn test_longest_prefix_wins() {
        let table = loaded_table(vec![
            entry("92", 1),
            entry("92300", 100),
            entry("923", 3),
        ])
        .await;

        assert_eq!(table.lookup("923001234567"), Some(100));
        assert_eq!(table.lookup("923101234567"), Some(3));
        assert_eq!(table.lookup("921234"), Some(1));
        assert_eq!(table.lookup("+923001234567"), Some(100));
        assert_eq!(table.lookup("441234"), None);
        assert_eq!(table.lookup(""), None);
    }

    #[tokio::test]
    async fn test_duplicate_prefix_first_in_table_order() {
        let table = loaded_table(vec![entry("92300", 100), entry("92300", 200)]).await;
        assert_eq!(table.len(), 1);
        assert_eq!(table.lookup("923001234567"), Some(100));
    }

    #[tokio::test]
    async fn test_short_msisdn_and_non_ascii() {
        let table = loaded_table(vec![entry("92300", 100), entry("+44", 44)]).await;

        // Shorter than the stored prefix.
        assert_eq!(table.lookup("9230"), None);
        // The stored prefix had its `+` stripped.
        assert_eq!(table.lookup("447700900000"), Some(44));
        // Slicing never lands inside a multi-byte character.
        assert_eq!(table.lookup("9é2300"), None);
    }

    #[tokio::test]
    async fn test_reload_is_idempotent() {
        let source = MemorySource::new(MemoryData {
            prefixes: vec![entry("92300", 100), entry("92", 1)],
            ..Default::default()
        });
        let table = PrefixTable::new();
        table.reload(&source).await.unwrap();
        let first = table.lookup("923001234567");
        table.reload(&source).await.unwrap();

        assert_eq!(table.lookup("923001234567"), first);
        assert_eq!(table.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_readers_never_see_mixed_snapshots() {
        let rows = |operator_code| -> Vec<PrefixEntry> {
            (0..200)
                .map(|i| entry(&format!("92{i:03}"), operator_code))
                .collect()
        };
        let source = MemorySource::new(MemoryData {
            prefixes: rows(100),
            ..Default::default()
        });
        let table = Arc::new(PrefixTable::new());
        table.reload(&source).await.unwrap();

        let mut readers = Vec::new();
        for _ in 0..8 {
            let table = table.clone();
            readers.push(tokio::spawn(async move {
                for _ in 0..2000 {
                    let snapshot = table.snapshot.load();
                    assert_eq!(snapshot.len(), 200);
                    let first = snapshot.lookup("920001234567");
                    let last = snapshot.lookup("921991234567");
                    assert!(first.is_some());
                    assert_eq!(first, last);

                    assert!(table.lookup("921001234567").is_some());
                    tokio::task::yield_now().await;
                }
            }));
        }

        for round in 0..20 {
            let operator_code = if round % 2 == 0 { 200 } else { 100 };
            source.update(|data| data.prefixes = rows(operator_code));
            table.reload(&source).await.unwrap();
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        for reader in readers {
            reader.await.unwrap();
        }
    }
}
