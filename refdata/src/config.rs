use ipnet::Ipv4Net;
use serde::Deserialize;
use std::path::PathBuf;
use url::Url;

#[derive(Clone, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "snake_case")]
#[serde(tag = "type")]
pub enum SourceConfig {
    Filesystem {
        base_dir: PathBuf,
    },
    ControlPlane {
        url: Url,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_reload_interval_secs() -> u64 {
    300
}

/// Addresses that never identify a carrier. Checked before the range table.
pub fn default_private_networks() -> Vec<Ipv4Net> {
    [
        "10.0.0.0/8",
        "172.16.0.0/12",
        "192.168.0.0/16",
        "127.0.0.0/8",
        "169.254.0.0/16",
        "100.64.0.0/10",
    ]
    .iter()
    .filter_map(|net| net.parse().ok())
    .collect()
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct Config {
    pub source: SourceConfig,
    #[serde(default = "default_private_networks")]
    pub private_networks: Vec<Ipv4Net>,
    /// Full reload period for every table. Zero disables periodic reloads.
    #[serde(default = "default_reload_interval_secs")]
    pub reload_interval_secs: u64,
}
