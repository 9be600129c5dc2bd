use crate::client::{ChildKind, ControlPlane};
use crate::crd::PageKey;
use crate::error::Result;
use tracing::{debug, info};

/// Deletes both children of a page that no longer exists.
///
/// The workload goes first, mirroring creation order. A child that is
/// already gone counts as deleted.
pub async fn cleanup(client: &dyn ControlPlane, key: &PageKey) -> Result<()> {
    let name = key.child_name();
    for kind in [ChildKind::Workload, ChildKind::Content] {
        match client.delete(kind, &key.namespace, &name).await {
            Ok(()) => info!(%kind, %name, "deleted orphaned child"),
            Err(e) if e.is_not_found() => debug!(%kind, %name, "child already absent"),
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
