//! Reference-data sources. Each table's reload fetches its full row set
//! from a source; a failed fetch aborts that reload and keeps the live
//! snapshot in place.
use crate::types::{Campaign, IpRange, Operator, PrefixEntry};
use async_trait::async_trait;
use ipnet::Ipv4Net;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error("I/O error reading {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("could not parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("control plane unavailable")]
    RetriesExceeded,

    #[error("source unavailable")]
    Unavailable,
}

#[async_trait]
pub trait ReferenceSource: Send + Sync {
    async fn ip_ranges(&self) -> Result<Vec<IpRange>, SourceError>;

    async fn prefixes(&self) -> Result<Vec<PrefixEntry>, SourceError>;

    async fn operators(&self) -> Result<Vec<Operator>, SourceError>;

    async fn campaigns(&self) -> Result<Vec<Campaign>, SourceError>;

    /// Private networks to use from now on. `None` keeps the current list.
    async fn private_networks(&self) -> Result<Option<Vec<Ipv4Net>>, SourceError> {
        Ok(None)
    }
}

/// Row sets held in memory. Useful for embedding and tests; rows can be
/// swapped and the source can be switched into a failing state.
#[derive(Default)]
pub struct MemorySource {
    data: RwLock<MemoryData>,
    unavailable: AtomicBool,
}

#[derive(Clone, Default, Debug)]
pub struct MemoryData {
    pub ip_ranges: Vec<IpRange>,
    pub prefixes: Vec<PrefixEntry>,
    pub operators: Vec<Operator>,
    pub campaigns: Vec<Campaign>,
    pub private_networks: Option<Vec<Ipv4Net>>,
}

impl MemorySource {
    pub fn new(data: MemoryData) -> Self {
        MemorySource {
            data: RwLock::new(data),
            unavailable: AtomicBool::new(false),
        }
    }

    pub fn update(&self, f: impl FnOnce(&mut MemoryData)) {
        f(&mut self.data.write());
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }

    fn read<T>(&self, f: impl FnOnce(&MemoryData) -> T) -> Result<T, SourceError> {
        if self.unavailable.load(Ordering::Relaxed) {
            return Err(SourceError::Unavailable);
        }
        Ok(f(&self.data.read()))
    }
}

#[async_trait]
impl ReferenceSource for MemorySource {
    async fn ip_ranges(&self) -> Result<Vec<IpRange>, SourceError> {
        self.read(|d| d.ip_ranges.clone())
    }

    async fn prefixes(&self) -> Result<Vec<PrefixEntry>, SourceError> {
        self.read(|d| d.prefixes.clone())
    }

    async fn operators(&self) -> Result<Vec<Operator>, SourceError> {
        self.read(|d| d.operators.clone())
    }

    async fn campaigns(&self) -> Result<Vec<Campaign>, SourceError> {
        self.read(|d| d.campaigns.clone())
    }

    async fn private_networks(&self) -> Result<Option<Vec<Ipv4Net>>, SourceError> {
        self.read(|d| d.private_networks.clone())
    }
}

pub const IP_RANGES_FILE: &str = "ip_ranges.yaml";
pub const PREFIXES_FILE: &str = "prefixes.yaml";
pub const OPERATORS_FILE: &str = "operators.yaml";
pub const CAMPAIGNS_FILE: &str = "campaigns.yaml";
pub const PRIVATE_NETWORKS_FILE: &str = "private_networks.yaml";

/// Reads one YAML file per table from a base directory.
pub struct FilesystemSource {
    base_dir: PathBuf,
}

impl FilesystemSource {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        FilesystemSource {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    async fn read_rows<T>(&self, filename: &str) -> Result<Vec<T>, SourceError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let path = self.base_dir.join(filename);
        tokio::task::spawn_blocking(move || read_yaml(path))
            .await
            .map_err(|_| SourceError::Unavailable)?
    }
}

fn read_yaml<T: DeserializeOwned>(path: PathBuf) -> Result<T, SourceError> {
    let file = match File::open(&path) {
        Ok(file) => file,
        Err(source) => return Err(SourceError::Io { path, source }),
    };
    serde_yaml::from_reader(BufReader::new(file)).map_err(|source| SourceError::Parse { path, source })
}

#[async_trait]
impl ReferenceSource for FilesystemSource {
    async fn ip_ranges(&self) -> Result<Vec<IpRange>, SourceError> {
        self.read_rows(IP_RANGES_FILE).await
    }

    async fn prefixes(&self) -> Result<Vec<PrefixEntry>, SourceError> {
        self.read_rows(PREFIXES_FILE).await
    }

    async fn operators(&self) -> Result<Vec<Operator>, SourceError> {
        self.read_rows(OPERATORS_FILE).await
    }

    async fn campaigns(&self) -> Result<Vec<Campaign>, SourceError> {
        self.read_rows(CAMPAIGNS_FILE).await
    }

    async fn private_networks(&self) -> Result<Option<Vec<Ipv4Net>>, SourceError> {
        // Optional file; the configured list stays in effect without it.
        if !self.base_dir.join(PRIVATE_NETWORKS_FILE).exists() {
            return Ok(None);
        }
        self.read_rows(PRIVATE_NETWORKS_FILE).await.map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CampaignStatus;
    use std::io::Write;
    use std::net::Ipv4Addr;

    fn write_file(dir: &Path, name: &str, contents: &str) {
        let mut file = File::create(dir.join(name)).unwrap();
        write!(file, "{contents}").unwrap();
    }

    #[tokio::test]
    async fn test_filesystem_source() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            IP_RANGES_FILE,
            r#"
- id: 1
  operator_code: 100
  country_code: 92
  ip_from: 41.2.0.0
  ip_to: 41.2.255.255
  msisdn_headers: [X-Msisdn]
"#,
        );
        write_file(
            dir.path(),
            PREFIXES_FILE,
            r#"
- prefix: "92300"
  operator_code: 100
"#,
        );
        write_file(
            dir.path(),
            OPERATORS_FILE,
            r#"
- code: 100
  name: Jazz
  rate_limit: 10
  settings: {mo_tarifficate: true}
"#,
        );
        write_file(
            dir.path(),
            CAMPAIGNS_FILE,
            r#"
- id: 7
  link: summer-promo
  hash: 0123456789abcdef0123456789abcdef
  welcome_page_id: 1
  success_page_id: 2
  error_page_id: 3
  can_auto_click: true
  status: active
"#,
        );

        let source = FilesystemSource::new(dir.path());

        let ranges = source.ip_ranges().await.unwrap();
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].ip_from, Ipv4Addr::new(41, 2, 0, 0));
        assert_eq!(ranges[0].msisdn_headers, vec!["X-Msisdn".to_string()]);

        assert_eq!(source.prefixes().await.unwrap()[0].prefix, "92300");

        let operators = source.operators().await.unwrap();
        assert_eq!(operators[0].name, "Jazz");
        assert_eq!(operators[0].settings["mo_tarifficate"], true);

        let campaigns = source.campaigns().await.unwrap();
        assert_eq!(campaigns[0].status, CampaignStatus::Active);
        assert!(campaigns[0].can_auto_click);

        assert_eq!(source.private_networks().await.unwrap(), None);
        write_file(dir.path(), PRIVATE_NETWORKS_FILE, "- 10.0.0.0/8\n");
        assert_eq!(
            source.private_networks().await.unwrap(),
            Some(vec!["10.0.0.0/8".parse().unwrap()])
        );
    }

    #[tokio::test]
    async fn test_filesystem_source_errors() {
        let dir = tempfile::tempdir().unwrap();
        let source = FilesystemSource::new(dir.path());

        assert!(matches!(
            source.campaigns().await,
            Err(SourceError::Io { .. })
        ));

        write_file(dir.path(), OPERATORS_FILE, "- code: not-a-number\n");
        assert!(matches!(
            source.operators().await,
            Err(SourceError::Parse { .. })
        ));
    }

    #[tokio::test]
    async fn test_memory_source_unavailable() {
        let source = MemorySource::new(MemoryData::default());
        assert!(source.prefixes().await.unwrap().is_empty());

        source.set_unavailable(true);
        assert!(matches!(
            source.prefixes().await,
            Err(SourceError::Unavailable)
        ));
    }
}
