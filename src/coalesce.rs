//! Merging descriptor lists from several layers into one catalog view.

use serde::Serialize;

use crate::models::ServerDescriptor;

/// A catalog entry with its provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoalescedServer {
    #[serde(flatten)]
    pub descriptor: ServerDescriptor,
    /// Came from (or was re-declared by) the local, user-editable layer.
    pub local: bool,
}

/// Descriptors from one layer, in layer order.
#[derive(Debug, Clone, Copy)]
pub struct LayerInput<'a> {
    pub descriptors: &'a [ServerDescriptor],
    pub local: bool,
}

/// True when both name the same type, server and group. The active flag is ignored.
pub fn same_identity(a: &ServerDescriptor, b: &ServerDescriptor) -> bool {
    a.data_type() == b.data_type()
        && a.server_name() == b.server_name()
        && a.group_name() == b.group_name()
}

/// Merge layers in the order given. An entry whose type, server and group
/// were already seen keeps the earlier position, takes the later values,
/// and stays local if either occurrence was local.
pub fn coalesce(layers: &[LayerInput<'_>]) -> Vec<CoalescedServer> {
    let mut result: Vec<CoalescedServer> = Vec::new();
    for layer in layers {
        for sd in layer.descriptors {
            merge_one(&mut result, sd.clone(), layer.local);
        }
    }
    result
}

fn merge_one(result: &mut Vec<CoalescedServer>, descriptor: ServerDescriptor, local: bool) {
    match result.iter_mut().find(|c| same_identity(&c.descriptor, &descriptor)) {
        Some(existing) => {
            existing.descriptor = descriptor;
            existing.local |= local;
        }
        None => result.push(CoalescedServer { descriptor, local }),
    }
}

/// Entries of `data_type` (all types when `None`), optionally only active ones.
pub fn servers_with_type<'a>(
    servers: &'a [CoalescedServer],
    data_type: Option<&str>,
    only_active: bool,
) -> Vec<&'a CoalescedServer> {
    servers
        .iter()
        .filter(|c| data_type.map_or(true, |t| c.descriptor.is_data_type(t)))
        .filter(|c| !only_active || c.descriptor.is_active())
        .collect()
}

/// Result of folding a legacy flat list into the catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Migration {
    /// The catalog with migrated entries merged in.
    pub servers: Vec<CoalescedServer>,
    /// Descriptors parsed from the legacy list, in list order.
    pub migrated: Vec<ServerDescriptor>,
    /// Legacy entries that could not be parsed.
    pub rejected: Vec<String>,
    /// True when every entry was migrated, so the legacy list can go.
    pub delete_legacy: bool,
}

/// Parse a legacy `host/group` (or bare `host`) entry.
pub fn parse_legacy_entry(entry: &str, data_type: &str) -> Option<ServerDescriptor> {
    let entry = entry.trim();
    let (host, group) = entry.split_once('/').unwrap_or((entry, ""));
    let host = host.trim();
    if host.is_empty() {
        return None;
    }
    Some(ServerDescriptor::with_active(data_type, host, group.trim(), true))
}

/// Merge `legacy` entries into `existing` as local, active servers of `data_type`.
pub fn migrate_legacy(
    legacy: &[String],
    existing: Vec<CoalescedServer>,
    data_type: &str,
) -> Migration {
    let mut servers = existing;
    let mut migrated = Vec::new();
    let mut rejected = Vec::new();

    for entry in legacy {
        let trimmed = entry.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        match parse_legacy_entry(trimmed, data_type) {
            Some(sd) => {
                merge_one(&mut servers, sd.clone(), true);
                migrated.push(sd);
            }
            None => rejected.push(entry.clone()),
        }
    }

    let delete_legacy = rejected.is_empty();
    Migration {
        servers,
        migrated,
        rejected,
        delete_legacy,
    }
}
