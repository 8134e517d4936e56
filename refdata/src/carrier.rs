use crate::metrics_defs::CARRIER_RESOLVED;
use crate::operators::OperatorDirectory;
use crate::prefix_table::PrefixTable;
use crate::range_table::{RangeTable, as_ipv4};
use crate::types::{CarrierInfo, ResolvedVia, is_global_unicast};
use shared::counter;
use std::net::IpAddr;
use std::sync::Arc;

/// Identifies the carrier of a request from its IP addresses, falling back to
/// the MSISDN prefix.
///
/// IP detection is tried first: it is cheaper and harder to tamper with than a
/// client-supplied phone number.
#[derive(Clone)]
pub struct CarrierResolver {
    ranges: Arc<RangeTable>,
    prefixes: Arc<PrefixTable>,
    operators: Arc<OperatorDirectory>,
}

impl CarrierResolver {
    pub fn new(
        ranges: Arc<RangeTable>,
        prefixes: Arc<PrefixTable>,
        operators: Arc<OperatorDirectory>,
    ) -> Self {
        CarrierResolver {
            ranges,
            prefixes,
            operators,
        }
    }

    /// `candidate_ips` must be ordered most trusted first. Addresses that are
    /// not globally routable unicast, or that fall in a configured private
    /// network, are skipped. The first IP whose range names a non-zero
    /// operator wins. Otherwise a non-empty `msisdn` is matched against the
    /// prefix table.
    pub fn resolve(&self, candidate_ips: &[IpAddr], msisdn: &str) -> CarrierInfo {
        self.resolve_with(candidate_ips, |_| Some(msisdn.to_string())).0
    }

    /// Like [`CarrierResolver::resolve`], but the MSISDN is extracted once the
    /// IP pass is done. `msisdn_for` receives the MSISDN headers of the matched
    /// range, or an empty slice when no IP identified a carrier.
    pub fn resolve_with<F>(
        &self,
        candidate_ips: &[IpAddr],
        msisdn_for: F,
    ) -> (CarrierInfo, Option<String>)
    where
        F: FnOnce(&[String]) -> Option<String>,
    {
        let (info, msisdn) = self.resolve_inner(candidate_ips, msisdn_for);
        counter!(CARRIER_RESOLVED, "via" => info.resolved_via.as_str()).increment(1);
        (info, msisdn)
    }

    fn resolve_inner<F>(
        &self,
        candidate_ips: &[IpAddr],
        msisdn_for: F,
    ) -> (CarrierInfo, Option<String>)
    where
        F: FnOnce(&[String]) -> Option<String>,
    {
        let mut first_usable = None;
        let mut saw_private = false;

        for ip in candidate_ips.iter().copied().filter_map(as_ipv4) {
            if !is_global_unicast(ip) {
                saw_private = true;
                continue;
            }
            match self.ranges.lookup(IpAddr::V4(ip)) {
                Some(info) if info.supported => {
                    let msisdn = msisdn_for(&info.msisdn_headers).filter(|m| !m.is_empty());
                    let info = CarrierInfo {
                        resolved_via: ResolvedVia::Ip,
                        ..info
                    };
                    return (info, msisdn);
                }
                Some(info) if info.is_private_address => saw_private = true,
                _ => {
                    first_usable.get_or_insert(ip);
                }
            }
        }

        let msisdn = msisdn_for(&[]).filter(|m| !m.is_empty());

        if let Some(number) = msisdn.as_deref()
            && let Some(operator_code) = self.prefixes.lookup(number)
            && operator_code != 0
        {
            let location = self.ranges.operator_location(operator_code);
            let country_code = self
                .operators
                .get_by_code(operator_code)
                .and_then(|operator| operator.country_code)
                .or_else(|| location.as_ref().map(|l| l.country_code))
                .unwrap_or_default();

            let info = CarrierInfo {
                ip: first_usable,
                operator_code,
                country_code,
                msisdn_headers: location.map(|l| l.msisdn_headers).unwrap_or_default(),
                supported: true,
                is_private_address: false,
                resolved_via: ResolvedVia::Msisdn,
            };
            return (info, msisdn);
        }

        let info = CarrierInfo {
            ip: first_usable,
            is_private_address: first_usable.is_none() && saw_private,
            ..Default::default()
        };
        (info, msisdn)
    }
}
