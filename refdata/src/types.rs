use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::sync::Arc;

/// Numeric operator code. Zero means "unknown operator".
pub type OperatorCode = u32;
pub type CountryCode = u32;
pub type CampaignId = u64;

/// One row of the operator IP range table.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct IpRange {
    pub id: u64,
    pub operator_code: OperatorCode,
    pub country_code: CountryCode,
    pub ip_from: Ipv4Addr,
    pub ip_to: Ipv4Addr,
    /// Headers the operator injects the subscriber MSISDN into.
    #[serde(default)]
    pub msisdn_headers: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct PrefixEntry {
    pub prefix: String,
    pub operator_code: OperatorCode,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Operator {
    pub code: OperatorCode,
    pub name: String,
    #[serde(default)]
    pub rate_limit: u32,
    #[serde(default)]
    pub country_code: Option<CountryCode>,
    /// Opaque operator settings, passed through to collaborators untouched.
    #[serde(default)]
    pub settings: serde_json::Value,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Active,
    Inactive,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub link: String,
    pub hash: String,
    pub welcome_page_id: u64,
    pub success_page_id: u64,
    pub error_page_id: u64,
    #[serde(default)]
    pub can_auto_click: bool,
    pub status: CampaignStatus,
    /// Stable key used with the rejection cache. Several campaigns of the
    /// same service share it.
    #[serde(default)]
    pub service_code: Option<String>,
}

impl Campaign {
    pub fn rejection_key(&self) -> String {
        match &self.service_code {
            Some(code) if !code.is_empty() => code.clone(),
            _ => self.id.to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ResolvedVia {
    Ip,
    Msisdn,
    #[default]
    None,
}

impl ResolvedVia {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ResolvedVia::Ip => "ip",
            ResolvedVia::Msisdn => "msisdn",
            ResolvedVia::None => "none",
        }
    }
}

/// Carrier identification result for one request.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct CarrierInfo {
    pub ip: Option<Ipv4Addr>,
    pub operator_code: OperatorCode,
    pub country_code: CountryCode,
    pub msisdn_headers: Arc<[String]>,
    pub supported: bool,
    pub is_private_address: bool,
    pub resolved_via: ResolvedVia,
}

impl CarrierInfo {
    pub fn private(ip: Ipv4Addr) -> Self {
        CarrierInfo {
            ip: Some(ip),
            is_private_address: true,
            ..Default::default()
        }
    }
}

/// Returns false for addresses that can never identify a subscriber's
/// carrier. Mirrors `Ipv4Addr::is_global`: private (RFC 1918), "this network"
/// (0.0.0.0/8), loopback, link-local, shared address space (100.64.0.0/10),
/// IETF protocol assignments (192.0.0.0/24, except the globally routable
/// .9 and .10), benchmarking (198.18.0.0/15), documentation, multicast,
/// reserved (240.0.0.0/4) and broadcast.
pub fn is_global_unicast(ip: Ipv4Addr) -> bool {
    let octets = ip.octets();
    let this_network = octets[0] == 0;
    let shared = octets[0] == 100 && (octets[1] & 0xc0) == 64;
    let protocol_assignment = octets[0] == 192
        && octets[1] == 0
        && octets[2] == 0
        && octets[3] != 9
        && octets[3] != 10;
    let benchmarking = octets[0] == 198 && (octets[1] & 0xfe) == 18;
    let reserved = octets[0] >= 240;

    !(this_network
        || ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_multicast()
        || ip.is_documentation()
        || shared
        || protocol_assignment
        || benchmarking
        || reserved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_unicast() {
        for ip in [[41, 2, 3, 4], [100, 128, 0, 1], [8, 8, 8, 8], [192, 0, 0, 9]] {
            assert!(is_global_unicast(Ipv4Addr::from(ip)), "{ip:?}");
        }

        for ip in [
            [0, 0, 0, 0],
            [0, 1, 2, 3],
            [10, 0, 0, 1],
            [172, 16, 0, 1],
            [192, 168, 1, 1],
            [127, 0, 0, 1],
            [169, 254, 0, 1],
            [100, 64, 0, 1],
            [192, 0, 0, 8],
            [192, 0, 2, 1],
            [198, 51, 100, 1],
            [203, 0, 113, 1],
            [198, 18, 0, 1],
            [198, 19, 255, 255],
            [224, 0, 0, 1],
            [240, 0, 0, 1],
            [255, 255, 255, 255],
        ] {
            assert!(!is_global_unicast(Ipv4Addr::from(ip)), "{ip:?}");
        }
    }

    #[test]
    fn test_rejection_key() {
        let mut campaign = Campaign {
            id: 7,
            link: "summer-promo".into(),
            hash: "abc".into(),
            welcome_page_id: 1,
            success_page_id: 2,
            error_page_id: 3,
            can_auto_click: false,
            status: CampaignStatus::Active,
            service_code: None,
        };
        assert_eq!(campaign.rejection_key(), "7");

        campaign.service_code = Some("svc-games".into());
        assert_eq!(campaign.rejection_key(), "svc-games");
    }
}
