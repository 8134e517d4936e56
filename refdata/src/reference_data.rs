use crate::campaigns::CampaignCache;
use crate::carrier::CarrierResolver;
use crate::operators::OperatorDirectory;
use crate::prefix_table::PrefixTable;
use crate::range_table::RangeTable;
use crate::snapshot::LoadError;
use crate::source::ReferenceSource;
use http::StatusCode;
use ipnet::Ipv4Net;
use parking_lot::Mutex;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

// Retry period while the initial load has not succeeded yet.
const INITIAL_RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    IpRanges,
    Prefixes,
    Operators,
    Campaigns,
}

impl Table {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Table::IpRanges => "ip_ranges",
            Table::Prefixes => "prefixes",
            Table::Operators => "operators",
            Table::Campaigns => "campaigns",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Table {
    type Err = ReloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ip_ranges" | "ranges" => Ok(Table::IpRanges),
            "prefixes" => Ok(Table::Prefixes),
            "operators" => Ok(Table::Operators),
            "campaigns" => Ok(Table::Campaigns),
            other => Err(ReloadError::UnknownTable(other.to_string())),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ReloadError {
    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error("reload of {table} failed: {source}")]
    Load {
        table: Table,
        #[source]
        source: LoadError,
    },
}

impl ReloadError {
    /// Status reported by the administrative reload trigger.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ReloadError::UnknownTable(_) => StatusCode::NOT_FOUND,
            ReloadError::Load {
                source: LoadError::DataSource(_),
                ..
            } => StatusCode::BAD_GATEWAY,
            ReloadError::Load {
                source: LoadError::ConcurrentLoad(_),
                ..
            } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

#[derive(Debug)]
pub enum Command {
    // Reload every table outside of the normal interval.
    // The worker replies when the attempt finishes.
    Refresh(oneshot::Sender<Result<usize, ReloadError>>),
    // Stop the loader worker.
    Shutdown,
}

struct ReferenceDataInner {
    ranges: Arc<RangeTable>,
    prefixes: Arc<PrefixTable>,
    operators: Arc<OperatorDirectory>,
    campaigns: Arc<CampaignCache>,
    source: Arc<dyn ReferenceSource>,
    tx: mpsc::Sender<Command>,
    // Taken by the loader worker when it starts.
    rx: Mutex<Option<mpsc::Receiver<Command>>>,
}

/// Owns the four reference tables and the source they reload from.
/// Cloning is cheap; every clone shares the same tables.
#[derive(Clone)]
pub struct ReferenceData {
    inner: Arc<ReferenceDataInner>,
}

impl ReferenceData {
    pub fn new(source: Arc<dyn ReferenceSource>, private_networks: Vec<Ipv4Net>) -> Self {
        // Channel to send commands to the loader worker.
        let (tx, rx) = mpsc::channel::<Command>(16);

        ReferenceData {
            inner: Arc::new(ReferenceDataInner {
                ranges: Arc::new(RangeTable::new(private_networks)),
                prefixes: Arc::new(PrefixTable::new()),
                operators: Arc::new(OperatorDirectory::new()),
                campaigns: Arc::new(CampaignCache::new()),
                source,
                tx,
                rx: Mutex::new(Some(rx)),
            }),
        }
    }

    /// Spawns the loader worker. It performs the initial load of every table
    /// (retrying until it succeeds), then reloads everything each
    /// `reload_interval` until `shutdown` is called. A zero interval disables
    /// periodic reloads. Returns `None` if the worker was already started.
    pub fn start(&self, reload_interval: Duration) -> Option<tokio::task::JoinHandle<()>> {
        let rx = self.inner.rx.lock().take()?;
        let this = self.clone();
        let interval = (!reload_interval.is_zero()).then_some(reload_interval);

        Some(tokio::spawn(async move {
            this.run_loader_worker(rx, interval).await;
        }))
    }

    async fn run_loader_worker(&self, mut rx: mpsc::Receiver<Command>, interval: Option<Duration>) {
        let mut loaded = self.reload_all().await.is_ok();

        loop {
            let wait = if loaded {
                interval
            } else {
                Some(INITIAL_RETRY_DELAY)
            };

            tokio::select! {
                _ = sleep_or_pending(wait) => {
                    loaded = self.reload_all().await.is_ok() || loaded;
                }
                cmd = rx.recv() => match cmd {
                    Some(Command::Refresh(reply)) => {
                        let result = self.reload_all().await;
                        loaded = loaded || result.is_ok();
                        let _ = reply.send(result);
                    }
                    Some(Command::Shutdown) | None => {
                        tracing::info!("Reference data loader stopped");
                        return;
                    }
                },
            }
        }
    }

    /// Reloads a single table by name, or every table for `"all"`.
    /// Returns the number of live entries after the reload.
    pub async fn reload(&self, table: &str) -> Result<usize, ReloadError> {
        if table == "all" {
            return self.reload_all().await;
        }
        self.reload_table(table.parse()?).await
    }

    pub async fn reload_table(&self, table: Table) -> Result<usize, ReloadError> {
        let source = self.inner.source.as_ref();
        let result = match table {
            Table::IpRanges => self.inner.ranges.reload(source).await,
            Table::Prefixes => self.inner.prefixes.reload(source).await,
            Table::Operators => self.inner.operators.reload(source).await,
            Table::Campaigns => self.inner.campaigns.reload(source).await,
        };
        result.map_err(|source| ReloadError::Load { table, source })
    }

    /// Reloads every table concurrently. A failure of one table does not stop
    /// the others; the first error is returned.
    pub async fn reload_all(&self) -> Result<usize, ReloadError> {
        let (ranges, prefixes, operators, campaigns) = tokio::join!(
            self.reload_table(Table::IpRanges),
            self.reload_table(Table::Prefixes),
            self.reload_table(Table::Operators),
            self.reload_table(Table::Campaigns),
        );

        let mut total = 0;
        for result in [ranges, prefixes, operators, campaigns] {
            total += result?;
        }
        Ok(total)
    }

    /// Asks the loader worker to reload everything and waits for the result.
    pub async fn refresh(&self) -> Result<usize, ReloadError> {
        let (reply, response) = oneshot::channel();
        if self.inner.tx.send(Command::Refresh(reply)).await.is_err() {
            // Worker not running; reload inline.
            return self.reload_all().await;
        }
        match response.await {
            Ok(result) => result,
            Err(_) => self.reload_all().await,
        }
    }

    pub async fn shutdown(&self) {
        let _ = self.inner.tx.send(Command::Shutdown).await;
    }

    /// True once every table has been loaded at least once.
    pub fn is_ready(&self) -> bool {
        self.inner.ranges.is_loaded()
            && self.inner.prefixes.is_loaded()
            && self.inner.operators.is_loaded()
            && self.inner.campaigns.is_loaded()
    }

    pub fn resolver(&self) -> CarrierResolver {
        CarrierResolver::new(
            self.inner.ranges.clone(),
            self.inner.prefixes.clone(),
            self.inner.operators.clone(),
        )
    }

    pub fn campaigns(&self) -> Arc<CampaignCache> {
        self.inner.campaigns.clone()
    }

    pub fn prefixes(&self) -> Arc<PrefixTable> {
        self.inner.prefixes.clone()
    }
}

async fn sleep_or_pending(wait: Option<Duration>) {
    match wait {
        Some(wait) => tokio::time::sleep(wait).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{MemoryData, MemorySource, SourceError};
    use crate::types::{Campaign, CampaignStatus, IpRange, PrefixEntry};
    use std::net::{IpAddr, Ipv4Addr};

    fn data() -> MemoryData {
        MemoryData {
            ip_ranges: vec![IpRange {
                id: 1,
                operator_code: 100,
                country_code: 92,
                ip_from: Ipv4Addr::new(41, 2, 0, 0),
                ip_to: Ipv4Addr::new(41, 2, 255, 255),
                msisdn_headers: vec![],
            }],
            prefixes: vec![PrefixEntry {
                prefix: "92300".into(),
                operator_code: 100,
            }],
            operators: vec![],
            campaigns: vec![Campaign {
                id: 1,
                link: "summer-promo".into(),
                hash: "hash1".into(),
                welcome_page_id: 1,
                success_page_id: 2,
                error_page_id: 3,
                can_auto_click: false,
                status: CampaignStatus::Active,
                service_code: None,
            }],
            private_networks: None,
        }
    }

    fn reference_data(source: Arc<MemorySource>) -> ReferenceData {
        ReferenceData::new(source, crate::config::default_private_networks())
    }

    #[tokio::test]
    async fn test_reload_by_name() {
        let source = Arc::new(MemorySource::new(data()));
        let refdata = reference_data(source.clone());
        assert!(!refdata.is_ready());

        assert_eq!(refdata.reload("campaigns").await.unwrap(), 1);
        assert!(!refdata.is_ready());
        assert_eq!(refdata.reload("ranges").await.unwrap(), 1);

        let err = refdata.reload("nope").await.unwrap_err();
        assert!(matches!(err, ReloadError::UnknownTable(_)));
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        assert_eq!(refdata.reload("all").await.unwrap(), 3);
        assert!(refdata.is_ready());
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_tables_live() {
        let source = Arc::new(MemorySource::new(data()));
        let refdata = reference_data(source.clone());
        refdata.reload_all().await.unwrap();

        source.set_unavailable(true);
        let err = refdata.reload("campaigns").await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert!(matches!(
            err,
            ReloadError::Load {
                table: Table::Campaigns,
                source: LoadError::DataSource(SourceError::Unavailable),
            }
        ));

        assert!(refdata.campaigns().resolve_by_link("summer-promo").is_some());
        assert!(refdata.is_ready());
    }

    #[tokio::test]
    async fn test_worker_initial_load_and_refresh() {
        let source = Arc::new(MemorySource::new(data()));
        let refdata = reference_data(source.clone());
        let handle = refdata.start(Duration::ZERO).unwrap();
        assert!(refdata.start(Duration::ZERO).is_none());

        // The refresh is queued behind the initial load.
        source.update(|data| data.campaigns[0].link = "winter-promo".into());
        refdata.refresh().await.unwrap();
        assert!(refdata.is_ready());
        assert!(refdata.campaigns().resolve_by_link("winter-promo").is_some());

        let info = refdata.resolver().resolve(&[IpAddr::from([41, 2, 3, 4])], "");
        assert_eq!(info.operator_code, 100);

        refdata.shutdown().await;
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_worker_retries_initial_load() {
        tokio::time::pause();
        let source = Arc::new(MemorySource::new(data()));
        source.set_unavailable(true);
        let refdata = reference_data(source.clone());
        let _handle = refdata.start(Duration::from_secs(3600)).unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!refdata.is_ready());

        source.set_unavailable(false);
        tokio::time::sleep(INITIAL_RETRY_DELAY + Duration::from_millis(10)).await;
        assert!(refdata.is_ready());

        refdata.shutdown().await;
    }
}
