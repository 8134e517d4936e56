use crate::snapshot::{LoadError, Snapshot, TableSnapshot};
use crate::source::ReferenceSource;
use crate::types::{CarrierInfo, CountryCode, IpRange, OperatorCode, is_global_unicast};
use ipnet::Ipv4Net;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

struct RangeEntry {
    from: u32,
    to: u32,
    operator_code: OperatorCode,
    country_code: CountryCode,
    msisdn_headers: Arc<[String]>,
}

/// Country and MSISDN headers of an operator, taken from its first range.
#[derive(Clone, Debug, PartialEq)]
pub struct OperatorLocation {
    pub country_code: CountryCode,
    pub msisdn_headers: Arc<[String]>,
}

pub(crate) struct RangeSnapshot {
    private_networks: Vec<Ipv4Net>,
    // Kept in source order. Overlapping ranges resolve to the first match.
    ranges: Vec<RangeEntry>,
    by_operator: HashMap<OperatorCode, OperatorLocation>,
}

impl RangeSnapshot {
    fn build(rows: Vec<IpRange>, private_networks: Vec<Ipv4Net>) -> Self {
        let mut ranges = Vec::with_capacity(rows.len());
        let mut by_operator = HashMap::new();

        for row in rows {
            let (from, to) = (u32::from(row.ip_from), u32::from(row.ip_to));
            if from > to {
                tracing::warn!(
                    id = row.id,
                    ip_from = %row.ip_from,
                    ip_to = %row.ip_to,
                    "Skipping inverted IP range"
                );
                continue;
            }

            let msisdn_headers: Arc<[String]> = row.msisdn_headers.into();
            by_operator
                .entry(row.operator_code)
                .or_insert_with(|| OperatorLocation {
                    country_code: row.country_code,
                    msisdn_headers: msisdn_headers.clone(),
                });

            ranges.push(RangeEntry {
                from,
                to,
                operator_code: row.operator_code,
                country_code: row.country_code,
                msisdn_headers,
            });
        }

        RangeSnapshot {
            private_networks,
            ranges,
            by_operator,
        }
    }

    fn is_private(&self, ip: Ipv4Addr) -> bool {
        !is_global_unicast(ip) || self.private_networks.iter().any(|net| net.contains(&ip))
    }
}

impl TableSnapshot for RangeSnapshot {
    fn len(&self) -> usize {
        self.ranges.len()
    }
}

/// Operator IP ranges plus the private-network list that is checked before them.
pub struct RangeTable {
    snapshot: Snapshot<RangeSnapshot>,
}

impl RangeTable {
    pub fn new(private_networks: Vec<Ipv4Net>) -> Self {
        RangeTable {
            snapshot: Snapshot::new(
                "ip_ranges",
                RangeSnapshot::build(Vec::new(), private_networks),
            ),
        }
    }

    /// Replaces all ranges from `source`. If the source supplies a private
    /// network list it replaces the current one too.
    pub async fn reload(&self, source: &dyn ReferenceSource) -> Result<usize, LoadError> {
        self.snapshot
            .reload_with(|previous| async move {
                let rows = source.ip_ranges().await?;
                let private_networks = match source.private_networks().await? {
                    Some(networks) => networks,
                    None => previous.private_networks.clone(),
                };
                Ok(RangeSnapshot::build(rows, private_networks))
            })
            .await
    }

    /// Finds the carrier owning `ip`.
    ///
    /// Private and non-unicast addresses short-circuit to a private,
    /// unsupported result without consulting the ranges. Otherwise the first
    /// range in table order containing `ip` wins; `None` when no range
    /// matches or `ip` is not IPv4.
    pub fn lookup(&self, ip: IpAddr) -> Option<CarrierInfo> {
        let ip = as_ipv4(ip)?;
        let snapshot = self.snapshot.load();

        if snapshot.is_private(ip) {
            return Some(CarrierInfo::private(ip));
        }

        let value = u32::from(ip);
        snapshot
            .ranges
            .iter()
            .find(|range| range.from <= value && value <= range.to)
            .map(|range| CarrierInfo {
                ip: Some(ip),
                operator_code: range.operator_code,
                country_code: range.country_code,
                msisdn_headers: range.msisdn_headers.clone(),
                supported: range.operator_code != 0,
                ..Default::default()
            })
    }

    pub fn operator_location(&self, code: OperatorCode) -> Option<OperatorLocation> {
        self.snapshot.load().by_operator.get(&code).cloned()
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

/// IPv4-mapped IPv6 addresses are treated as their IPv4 form.
pub(crate) fn as_ipv4(ip: IpAddr) -> Option<Ipv4Addr> {
    match ip {
        IpAddr::V4(ip) => Some(ip),
        IpAddr::V6(ip) => ip.to_ipv4_mapped(),
    }
}
