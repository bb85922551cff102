//! Record diffing
//!
//! Pure function from (desired records, zone records, public addresses) to
//! the provider calls that make the zone match. Only A and AAAA records are
//! considered; other types in the zone are never touched.

use crate::config::{RecordConfig, RecordType};
use crate::traits::{DnsRecord, PublicAddrs, RecordContent};

/// One provider call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordAction {
    /// Desired record missing from the zone
    Create(RecordContent),
    /// Record exists with stale content or proxy flag
    Update {
        /// Provider record ID
        id: String,
        /// Content to write
        content: RecordContent,
    },
    /// Duplicate or undesired A/AAAA record
    Delete(DnsRecord),
}

fn address_for(record_type: RecordType, addrs: &PublicAddrs) -> Option<String> {
    match record_type {
        RecordType::A => addrs.v4.map(|ip| ip.to_string()),
        RecordType::Aaaa => addrs.v6.map(|ip| ip.to_string()),
    }
}

fn same_name(a: &str, b: &str) -> bool {
    a.trim_end_matches('.').eq_ignore_ascii_case(b.trim_end_matches('.'))
}

/// Compute the actions that reconcile `actual` with `desired`
///
/// - Missing records are created when an address of their family is known
/// - The first existing match is kept and updated if its content or proxy
///   flag differs; further matches are deleted
/// - Managed-type records with no desired counterpart are deleted
/// - Records whose family has no known address are left as they are
pub fn plan(
    desired: &[RecordConfig],
    actual: &[DnsRecord],
    addrs: PublicAddrs,
) -> Vec<RecordAction> {
    let managed: Vec<(&DnsRecord, RecordType)> = actual
        .iter()
        .filter_map(|r| RecordType::from_wire(&r.record_type).map(|t| (r, t)))
        .collect();

    let mut claimed = vec![false; managed.len()];
    let mut changes = Vec::new();
    let mut deletes = Vec::new();
    let mut seen: Vec<(&str, RecordType)> = Vec::new();

    for want in desired {
        if seen
            .iter()
            .any(|(name, t)| *t == want.record_type && same_name(name, &want.name))
        {
            continue;
        }
        seen.push((want.name.as_str(), want.record_type));

        let address = address_for(want.record_type, &addrs);
        let mut kept = false;

        for (i, (record, record_type)) in managed.iter().enumerate() {
            if *record_type != want.record_type || !same_name(&record.name, &want.name) {
                continue;
            }
            claimed[i] = true;

            if kept {
                deletes.push(RecordAction::Delete((*record).clone()));
                continue;
            }
            kept = true;

            if let Some(address) = &address {
                if record.content != *address || record.proxied != want.proxied {
                    changes.push(RecordAction::Update {
                        id: record.id.clone(),
                        content: RecordContent {
                            name: record.name.clone(),
                            record_type: want.record_type,
                            content: address.clone(),
                            proxied: want.proxied,
                        },
                    });
                }
            }
        }

        if !kept {
            if let Some(address) = address {
                changes.push(RecordAction::Create(RecordContent {
                    name: want.name.clone(),
                    record_type: want.record_type,
                    content: address,
                    proxied: want.proxied,
                }));
            }
        }
    }

    for (i, (record, _)) in managed.iter().enumerate() {
        if !claimed[i] {
            deletes.push(RecordAction::Delete((*record).clone()));
        }
    }

    changes.extend(deletes);
    changes
}
