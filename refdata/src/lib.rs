pub mod campaigns;
pub mod carrier;
pub mod config;
pub mod control_plane;
pub mod metrics_defs;
pub mod operators;
pub mod prefix_table;
pub mod range_table;
pub mod reference_data;
pub mod snapshot;
pub mod source;
pub mod types;

#[cfg(test)]
mod testutils;

use config::SourceConfig;
use control_plane::ControlPlaneSource;
use source::{FilesystemSource, ReferenceSource, SourceError};
use std::sync::Arc;
use std::time::Duration;

pub use reference_data::{Command, ReferenceData, ReloadError, Table};

/// Builds the reference-data source selected in the config.
pub fn get_source(config: &SourceConfig) -> Result<Arc<dyn ReferenceSource>, SourceError> {
    let source: Arc<dyn ReferenceSource> = match config {
        SourceConfig::Filesystem { base_dir } => Arc::new(FilesystemSource::new(base_dir)),
        SourceConfig::ControlPlane { url, timeout_secs } => Arc::new(ControlPlaneSource::new(
            url.as_str(),
            Duration::from_secs(*timeout_secs),
        )?),
    };
    Ok(source)
}
