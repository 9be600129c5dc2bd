//! Level-triggered convergence of one `StaticPage` and its children.
//!
//! Every call re-reads the parent and its workload and derives the needed
//! writes from scratch; nothing is remembered between calls. Running it
//! twice with no outside change issues no writes the second time.

pub mod builders;
pub mod cleanup;
pub mod fetch;
pub mod locks;

use crate::client::{ChildObject, ControlPlane};
use crate::config::ControllerConfig;
use crate::crd::{PageKey, StaticPage};
use crate::error::Result;
use crate::types::ChildResource;
use self::locks::KeyLocks;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::runtime::controller::Action;
use kube::{Resource, ResourceExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// API server default for a Deployment without `spec.replicas`.
const DEFAULT_REPLICAS: i32 = 1;

#[derive(Clone)]
pub struct Reconciler {
    client: Arc<dyn ControlPlane>,
    owner_references: bool,
    resync_interval: Option<Duration>,
    locks: KeyLocks,
}

impl Reconciler {
    pub fn new(client: Arc<dyn ControlPlane>, config: &ControllerConfig) -> Self {
        Self {
            client,
            owner_references: config.owner_references,
            resync_interval: config.resync_interval,
            locks: KeyLocks::new(),
        }
    }

    pub fn client(&self) -> &dyn ControlPlane {
        self.client.as_ref()
    }

    /// Per-page locks shared by every clone of this reconciler.
    pub fn locks(&self) -> &KeyLocks {
        &self.locks
    }

    /// Converges the page identified by `key`.
    ///
    /// NotFound and AlreadyExists are handled here; any other control-plane
    /// error aborts the pass and is returned for the caller to retry.
    /// Passes for the same key never overlap, whichever clone runs them.
    #[instrument(skip_all, fields(staticpage = %key))]
    pub async fn reconcile(&self, key: &PageKey) -> Result<Action> {
        let _guard = self.locks.lock(key).await;
        debug!("reconciling staticpage");
        let client = self.client();

        let Some(page) = fetch::get_parent(client, key).await? else {
            info!("staticpage is gone, removing its children");
            cleanup::cleanup(client, key).await?;
            return Ok(Action::await_change());
        };

        let name = key.child_name();
        let Some(mut workload) = fetch::get_workload(client, &key.namespace, &name).await? else {
            self.create_children(key, &page).await?;
            info!(%name, "staticpage created");
            return Ok(self.converged());
        };

        // Image and contents are fixed at creation; only replicas are corrected.
        let desired = page.spec.replicas;
        let current = workload
            .spec
            .as_ref()
            .and_then(|s| s.replicas)
            .unwrap_or(DEFAULT_REPLICAS);
        if current != desired {
            workload.spec.get_or_insert_with(Default::default).replicas = Some(desired);
            client
                .update(&key.namespace, ChildObject::Workload(workload))
                .await?;
            info!(%name, from = current, to = desired, "staticpage replicas updated");
            return Ok(self.converged());
        }

        debug!(%name, "staticpage is up-to-date");
        Ok(self.converged())
    }

    /// Content before workload: the workload mounts the content by name.
    async fn create_children(&self, key: &PageKey, page: &StaticPage) -> Result<()> {
        let client = self.client();
        let name = key.child_name();
        let owner = if self.owner_references {
            owner_reference(page)
        } else {
            None
        };

        let content = builders::build_content(&name, &page.spec.contents);
        debug!(name = content.name(), "creating content");
        match client
            .create(
                &key.namespace,
                ChildObject::Content(content.into_k8s(&key.namespace, owner.clone())),
            )
            .await
        {
            Ok(_) => {}
            Err(e) if e.is_already_exists() => debug!(%name, "content already exists"),
            Err(e) => return Err(e),
        }

        let workload = builders::build_workload(&name, &page.spec.image, page.spec.replicas);
        debug!(name = workload.name(), "creating workload");
        client
            .create(
                &key.namespace,
                ChildObject::Workload(workload.into_k8s(&key.namespace, owner)),
            )
            .await?;
        Ok(())
    }

    fn converged(&self) -> Action {
        match self.resync_interval {
            Some(interval) => Action::requeue(interval),
            None => Action::await_change(),
        }
    }
}

/// Controller reference from a child to its page; `None` until the page has a uid.
pub fn owner_reference(page: &StaticPage) -> Option<OwnerReference> {
    Some(OwnerReference {
        api_version: StaticPage::api_version(&()).to_string(),
        kind: StaticPage::kind(&()).to_string(),
        name: page.name_any(),
        uid: page.uid()?,
        controller: Some(true),
        block_owner_deletion: Some(true),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ChildKind, MockControlPlane};
    use crate::crd::StaticPageSpec;
    use crate::error::{api_error, Error};
    use k8s_openapi::api::apps::v1::Deployment;
    use mockall::Sequence;

    fn page(replicas: i32) -> StaticPage {
        let mut page = StaticPage::new(
            "a",
            StaticPageSpec {
                contents: "<h1>hi</h1>".to_string(),
                image: "nginx:latest".to_string(),
                replicas,
            },
        );
        page.metadata.namespace = Some("web".to_string());
        page.metadata.uid = Some("uid-a".to_string());
        page
    }

    fn existing_workload(replicas: Option<i32>) -> ChildObject {
        let mut deploy: Deployment = builders::build_workload("staticpage-a", "nginx:latest", 1)
            .into_k8s("web", None);
        if let Some(spec) = deploy.spec.as_mut() {
            spec.replicas = replicas;
        }
        ChildObject::Workload(deploy)
    }

    fn reconciler(mock: MockControlPlane) -> Reconciler {
        Reconciler::new(Arc::new(mock), &ControllerConfig::default())
    }

    fn key() -> PageKey {
        PageKey::new("web", "a")
    }

    #[tokio::test]
    async fn parent_fetch_failure_is_returned() {
        let mut mock = MockControlPlane::new();
        mock.expect_get_page()
            .returning(|_| Err(api_error(500, "InternalError")));
        mock.expect_get().never();
        mock.expect_delete().never();

        let err = reconciler(mock).reconcile(&key()).await.unwrap_err();
        assert!(matches!(err, Error::Kube(kube::Error::Api(ref e)) if e.code == 500));
    }

    #[tokio::test]
    async fn workload_fetch_failure_creates_nothing() {
        let mut mock = MockControlPlane::new();
        mock.expect_get_page().returning(|_| Ok(page(2)));
        mock.expect_get()
            .returning(|_, _, _| Err(api_error(429, "TooManyRequests")));
        mock.expect_create().never();

        assert!(reconciler(mock).reconcile(&key()).await.is_err());
    }

    #[tokio::test]
    async fn content_failure_stops_before_workload() {
        let mut mock = MockControlPlane::new();
        mock.expect_get_page().returning(|_| Ok(page(2)));
        mock.expect_get()
            .returning(|_, _, _| Err(api_error(404, "NotFound")));
        mock.expect_create()
            .times(1)
            .withf(|_, obj| obj.kind() == ChildKind::Content)
            .returning(|_, _| Err(api_error(503, "ServiceUnavailable")));

        assert!(reconciler(mock).reconcile(&key()).await.is_err());
    }

    #[tokio::test]
    async fn workload_already_exists_is_retryable() {
        let mut mock = MockControlPlane::new();
        let mut seq = Sequence::new();
        mock.expect_get_page().returning(|_| Ok(page(2)));
        mock.expect_get()
            .returning(|_, _, _| Err(api_error(404, "NotFound")));
        mock.expect_create()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|_, obj| obj.kind() == ChildKind::Content)
            .returning(|_, obj| Ok(obj));
        mock.expect_create()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|_, obj| obj.kind() == ChildKind::Workload)
            .returning(|_, _| Err(api_error(409, "AlreadyExists")));

        let err = reconciler(mock).reconcile(&key()).await.unwrap_err();
        assert!(err.is_already_exists());
    }

    #[tokio::test]
    async fn unset_replicas_compare_as_one() {
        let mut mock = MockControlPlane::new();
        mock.expect_get_page().returning(|_| Ok(page(1)));
        mock.expect_get()
            .returning(|_, _, _| Ok(existing_workload(None)));
        mock.expect_update().never();

        let action = reconciler(mock).reconcile(&key()).await.unwrap();
        assert_eq!(action, Action::await_change());
    }

    #[tokio::test]
    async fn update_conflict_is_returned() {
        let mut mock = MockControlPlane::new();
        mock.expect_get_page().returning(|_| Ok(page(5)));
        mock.expect_get()
            .returning(|_, _, _| Ok(existing_workload(Some(2))));
        mock.expect_update()
            .times(1)
            .withf(|_, obj| {
                matches!(obj, ChildObject::Workload(d)
                    if d.spec.as_ref().and_then(|s| s.replicas) == Some(5))
            })
            .returning(|_, _| Err(api_error(409, "Conflict")));

        let err = reconciler(mock).reconcile(&key()).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn cleanup_delete_failure_is_returned() {
        let mut mock = MockControlPlane::new();
        mock.expect_get_page()
            .returning(|_| Err(api_error(404, "NotFound")));
        mock.expect_delete()
            .times(1)
            .withf(|kind, _, _| *kind == ChildKind::Workload)
            .returning(|_, _, _| Err(api_error(500, "InternalError")));

        assert!(reconciler(mock).reconcile(&key()).await.is_err());
    }

    #[tokio::test]
    async fn resync_interval_requeues_converged_pages() {
        let mut mock = MockControlPlane::new();
        mock.expect_get_page().returning(|_| Ok(page(1)));
        mock.expect_get()
            .returning(|_, _, _| Ok(existing_workload(Some(1))));

        let config = ControllerConfig::new().resync_interval(Duration::from_secs(600));
        let action = Reconciler::new(Arc::new(mock), &config)
            .reconcile(&key())
            .await
            .unwrap();
        assert_eq!(action, Action::requeue(Duration::from_secs(600)));
    }

    #[test]
    fn owner_reference_needs_uid() {
        let mut p = page(1);
        let owner = owner_reference(&p).unwrap();
        assert_eq!(owner.kind, "StaticPage");
        assert_eq!(owner.api_version, "kubernetes.chinzzii.com/v1");
        assert_eq!(owner.controller, Some(true));

        p.metadata.uid = None;
        assert!(owner_reference(&p).is_none());
    }
}
