//! Structural validation of a normalized cluster.

use std::collections::{HashMap, HashSet};

use vto_topology::{Cluster, Linked, Tablet, MAX_TABLET_HOSTNAME_LENGTH};

use super::error::ValidationError;

/// Check cluster-level invariants in a fixed order, returning the first violation.
pub fn validate_cluster(cluster: &Cluster) -> Result<(), ValidationError> {
    if cluster.lockserver().is_none() {
        return Err(ValidationError::NoLockserverForCluster);
    }

    let cells = cluster.cells();
    if cells.is_empty() {
        return Err(ValidationError::NoCells);
    }

    if let Some(cell) = cells.iter().find(|cell| cell.lockserver().is_none()) {
        return Err(ValidationError::NoLockserverForCell {
            cell: cell.name().to_string(),
        });
    }

    if cluster.keyspaces().is_empty() {
        return Err(ValidationError::NoKeyspaces);
    }

    let shards = cluster.shards();
    if shards.is_empty() {
        return Err(ValidationError::NoShards);
    }

    let mut key_ranges = HashSet::with_capacity(shards.len());
    for shard in &shards {
        let key_range = shard.key_range().to_string();
        if !key_ranges.insert(key_range.clone()) {
            return Err(ValidationError::OverlappingKeyrange { key_range });
        }
    }

    let tablets = cluster.tablets();
    if tablets.is_empty() {
        return Err(ValidationError::NoTablets);
    }

    if let Some(tablet) = tablets.iter().find(|tablet| tablet.cell().is_none()) {
        return Err(ValidationError::NoCellForTablet {
            tablet: tablet.name().to_string(),
            cell_id: tablet.spec.cell_id.clone(),
        });
    }

    // One stateful set per cell, shard and tablet type.
    let mut owners = HashMap::with_capacity(tablets.len());
    for tablet in &tablets {
        let name = tablet.stateful_set_name();
        if let Some(first) = owners.insert(name.clone(), tablet.name()) {
            return Err(ValidationError::DuplicateStatefulSet {
                name,
                first: first.to_string(),
                second: tablet.name().to_string(),
            });
        }
    }

    Ok(())
}

/// Reject a tablet whose longest possible pod hostname reaches the replication limit.
pub fn validate_tablet(tablet: &Linked<'_, Tablet>) -> Result<(), ValidationError> {
    let length = tablet.max_hostname_length();
    if length >= MAX_TABLET_HOSTNAME_LENGTH {
        return Err(ValidationError::TabletNameTooLong {
            tablet: tablet.name().to_string(),
            length,
        });
    }
    Ok(())
}
