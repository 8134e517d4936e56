use refdata::types::{CampaignId, CountryCode, OperatorCode};
use serde::Deserialize;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Campaign hash length cannot be 0")]
    InvalidHashLength,

    #[error("Collaborator timeout cannot be 0")]
    InvalidTimeout,

    #[error("Partner {0} has an empty destination URL")]
    EmptyPartnerUrl(u64),
}

/// Dispatch front end configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Public listener serving campaign links
    pub listener: Listener,
    /// Admin listener for health, readiness and reload endpoints
    pub admin_listener: Listener,
    #[serde(default = "default_hash_length")]
    pub campaign_hash_length: usize,
    /// Where unresolvable requests are sent instead of an error page
    pub fallback_url: Url,
    /// Headers tried for the MSISDN when the matched IP range lists none
    #[serde(default)]
    pub msisdn_headers: Vec<String>,
    #[serde(default)]
    pub policy: PolicyConfig,
    pub collaborators: CollaboratorsConfig,
}

fn default_hash_length() -> usize {
    32
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;

        if self.campaign_hash_length == 0 {
            return Err(ConfigError::InvalidHashLength);
        }
        if self.policy.collaborator_timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout);
        }
        match &self.collaborators {
            CollaboratorsConfig::Memory { partners, .. } => {
                if let Some(partner) = partners.iter().find(|p| p.url.is_empty()) {
                    return Err(ConfigError::EmptyPartnerUrl(partner.partner_id));
                }
            }
            CollaboratorsConfig::Remote { timeout_ms, .. } => {
                if *timeout_ms == 0 {
                    return Err(ConfigError::InvalidTimeout);
                }
            }
        }
        Ok(())
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    pub host: String,
    pub port: u16,
}

impl Listener {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct PolicyConfig {
    /// Send previously rejected subscribers to a redirect partner
    #[serde(default = "default_true")]
    pub rejection_enabled: bool,
    /// Rotate subscribers away from campaigns they were already served
    #[serde(default = "default_true")]
    pub campaign_redirect_enabled: bool,
    #[serde(default = "default_collaborator_timeout_ms")]
    pub collaborator_timeout_ms: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        PolicyConfig {
            rejection_enabled: true,
            campaign_redirect_enabled: true,
            collaborator_timeout_ms: default_collaborator_timeout_ms(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_collaborator_timeout_ms() -> u64 {
    200
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
#[serde(tag = "type")]
pub enum CollaboratorsConfig {
    /// In-process caches. State is lost on restart and not shared between instances.
    Memory {
        #[serde(default = "default_rejection_ttl_secs")]
        rejection_ttl_secs: u64,
        /// Campaign ids offered in order to subscribers already served elsewhere
        #[serde(default)]
        campaign_rotation: Vec<CampaignId>,
        #[serde(default)]
        partners: Vec<PartnerConfig>,
    },
    /// HTTP/JSON collaborator service
    Remote {
        url: Url,
        /// Client-side request timeout. The policy timeout still applies on top.
        #[serde(default = "default_remote_timeout_ms")]
        timeout_ms: u64,
    },
}

fn default_remote_timeout_ms() -> u64 {
    1000
}

fn default_rejection_ttl_secs() -> u64 {
    24 * 60 * 60
}

/// A rejected-traffic partner destination. Unset codes match anything.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct PartnerConfig {
    pub partner_id: u64,
    pub destination_id: u64,
    pub url: String,
    #[serde(default)]
    pub price_per_hit: f64,
    #[serde(default)]
    pub country_code: Option<CountryCode>,
    #[serde(default)]
    pub operator_code: Option<OperatorCode>,
}
