//! Checks that must pass before normalization runs.

use vto_topology::Cluster;

use super::error::SanityError;

/// Reject a cluster, or any embedded cell, that sets both an embedded
/// lockserver and a lockserver reference.
pub fn test_cluster_sanity(cluster: &Cluster) -> Result<(), SanityError> {
    if cluster.spec.lockserver.is_some() && cluster.spec.lockserver_ref.is_some() {
        return Err(SanityError::ClusterLockserverAndRef);
    }

    for cell in &cluster.spec.cells {
        if cell.spec.lockserver.is_some() && cell.spec.lockserver_ref.is_some() {
            return Err(SanityError::CellLockserverAndRef {
                cell: cell.name().to_string(),
            });
        }
    }

    Ok(())
}
