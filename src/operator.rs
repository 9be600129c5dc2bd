use crate::client::{ChildKind, ControlPlane, KubeControlPlane};
use crate::config::ControllerConfig;
use crate::crd::{PageKey, StaticPage};
use crate::error::{Error, Result};
use crate::reconciler::builders::managed_selector;
use crate::reconciler::{fetch, Reconciler};
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::Api;
use kube::core::NamespaceResourceScope;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::reflector::{ObjectRef, Store};
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Client, Resource, ResourceExt};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Runs the `StaticPage` controller until a shutdown signal arrives.
pub struct Operator {
    config: ControllerConfig,
}

impl Operator {
    pub fn new(config: ControllerConfig) -> Self {
        Self { config }
    }

    pub async fn run(self) -> Result<()> {
        let client = Client::try_default().await.map_err(Error::Kube)?;

        info!(
            "Starting operator for {}/{} in {}",
            StaticPage::group(&()),
            StaticPage::kind(&()),
            self.config.namespace.as_deref().unwrap_or("all namespaces")
        );

        let control_plane: Arc<dyn ControlPlane> = Arc::new(KubeControlPlane::new(
            client.clone(),
            self.config.field_manager.clone(),
        ));
        let reconciler = Reconciler::new(control_plane, &self.config);

        let namespace = self.config.namespace.as_deref();
        let pages: Api<StaticPage> = scoped_api(&client, namespace);
        let deployments: Api<Deployment> = scoped_api(&client, namespace);
        let configmaps: Api<ConfigMap> = scoped_api(&client, namespace);
        let children = WatcherConfig::default().labels(&managed_selector());

        let controller_ctx = Arc::new(ControllerContext {
            reconciler: reconciler.clone(),
            error_requeue: self.config.error_requeue,
        });

        let controller = Controller::new(pages.clone(), WatcherConfig::default());
        let handler = DeletionHandler::new(
            reconciler.clone(),
            controller.store(),
            self.config.error_requeue,
        );

        let controller = controller
            .watches(deployments, children.clone(), |d| parent_ref(&d))
            .watches(configmaps, children, |cm| parent_ref(&cm))
            .shutdown_on_signal()
            .run(reconcile, error_policy, controller_ctx)
            .for_each(|result| async move {
                match result {
                    Ok((page, action)) => {
                        info!("Reconciled {} - {:?}", page.name, action);
                    }
                    Err(e) => {
                        error!("Reconciliation error: {:?}", e);
                    }
                }
            });

        let deletions = watch_deletions(pages, handler, self.config.namespace.clone());

        // The controller stream ends on shutdown; the deletion watch never does.
        tokio::select! {
            _ = controller => info!("Controller stopped"),
            _ = deletions => warn!("Deletion watch ended"),
        }

        Ok(())
    }
}

struct ControllerContext {
    reconciler: Reconciler,
    error_requeue: Duration,
}

async fn reconcile(page: Arc<StaticPage>, ctx: Arc<ControllerContext>) -> Result<Action> {
    ctx.reconciler.reconcile(&PageKey::from(page.as_ref())).await
}

fn error_policy(page: Arc<StaticPage>, error: &Error, ctx: Arc<ControllerContext>) -> Action {
    error!("Error reconciling {}: {:?}", PageKey::from(page.as_ref()), error);
    Action::requeue(ctx.error_requeue)
}

fn scoped_api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope>,
    K::DynamicType: Default,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

/// Maps a managed child back to the page it was named after.
pub fn parent_ref<K: Resource>(child: &K) -> Option<ObjectRef<StaticPage>> {
    let key = PageKey::from_child(child.namespace()?, &child.name_any())?;
    Some(ObjectRef::new(&key.name).within(&key.namespace))
}

/// Runs cleanup for deleted pages outside the controller, at most one loop
/// per key. A key the controller's store holds again belongs to the
/// controller and is skipped.
#[derive(Clone)]
pub struct DeletionHandler {
    reconciler: Reconciler,
    pages: Store<StaticPage>,
    pending: PendingCleanups,
    retry_after: Duration,
}

impl DeletionHandler {
    pub fn new(reconciler: Reconciler, pages: Store<StaticPage>, retry_after: Duration) -> Self {
        Self {
            reconciler,
            pages,
            pending: PendingCleanups::default(),
            retry_after,
        }
    }

    /// Starts a cleanup loop for `key`. Returns `false` when one is already
    /// running for it.
    pub fn on_delete(&self, key: PageKey) -> bool {
        let Some(claim) = self.pending.claim(&key) else {
            debug!(staticpage = %key, "cleanup already running");
            return false;
        };
        let handler = self.clone();
        tokio::spawn(async move {
            let _claim = claim;
            handler.cleanup_until_done(&key).await;
        });
        true
    }

    pub fn is_pending(&self, key: &PageKey) -> bool {
        self.pending.contains(key)
    }

    fn is_live(&self, key: &PageKey) -> bool {
        let page = ObjectRef::new(&key.name).within(&key.namespace);
        self.pages.get(&page).is_some()
    }

    async fn cleanup_until_done(&self, key: &PageKey) {
        loop {
            if self.is_live(key) {
                info!(staticpage = %key, "staticpage recreated, leaving it to the controller");
                return;
            }
            match self.reconciler.reconcile(key).await {
                Ok(_) => return,
                Err(e) => {
                    error!("Error reconciling {}: {:?}", key, e);
                    tokio::time::sleep(self.retry_after).await;
                }
            }
        }
    }
}

#[derive(Clone, Default)]
struct PendingCleanups(Arc<Mutex<HashSet<PageKey>>>);

impl PendingCleanups {
    fn claim(&self, key: &PageKey) -> Option<CleanupClaim> {
        self.0.lock().insert(key.clone()).then(|| CleanupClaim {
            pending: self.clone(),
            key: key.clone(),
        })
    }

    fn contains(&self, key: &PageKey) -> bool {
        self.0.lock().contains(key)
    }
}

struct CleanupClaim {
    pending: PendingCleanups,
    key: PageKey,
}

impl Drop for CleanupClaim {
    fn drop(&mut self) {
        self.pending.0.lock().remove(&self.key);
    }
}

/// The controller only reconciles pages still in its cache, so deleted pages
/// are cleaned up from here. Every relist also triggers an orphan sweep.
async fn watch_deletions(
    api: Api<StaticPage>,
    handler: DeletionHandler,
    namespace: Option<String>,
) {
    let mut events = watcher(api, WatcherConfig::default())
        .default_backoff()
        .boxed();

    while let Some(event) = events.next().await {
        match event {
            Ok(watcher::Event::Delete(page)) => {
                let key = PageKey::from(&page);
                info!(staticpage = %key, "staticpage deleted");
                handler.on_delete(key);
            }
            Ok(watcher::Event::InitDone) => {
                let reconciler = handler.reconciler.clone();
                let namespace = namespace.clone();
                tokio::spawn(async move {
                    match sweep_orphans(&reconciler, namespace).await {
                        Ok(swept) if !swept.is_empty() => {
                            info!(count = swept.len(), "cleaned up orphaned staticpage children")
                        }
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "orphan sweep failed"),
                    }
                });
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "staticpage watch error"),
        }
    }
}

/// Runs the reconciler for every page whose managed children still exist
/// but whose `StaticPage` does not. Returns the keys that were cleaned up.
pub async fn sweep_orphans(
    reconciler: &Reconciler,
    namespace: Option<String>,
) -> Result<Vec<PageKey>> {
    let client = reconciler.client();

    let mut keys = BTreeSet::new();
    for kind in [ChildKind::Workload, ChildKind::Content] {
        for child in client.list(kind, namespace.clone(), managed_selector()).await? {
            if let Some(key) = child
                .namespace()
                .and_then(|ns| PageKey::from_child(ns, &child.name()))
            {
                keys.insert(key);
            }
        }
    }

    let mut swept = Vec::new();
    for key in keys {
        if fetch::get_parent(client, &key).await?.is_some() {
            continue;
        }
        match reconciler.reconcile(&key).await {
            Ok(_) => swept.push(key),
            Err(e) => warn!(staticpage = %key, error = %e, "failed to clean up orphan"),
        }
    }
    Ok(swept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockControlPlane;
    use crate::crd::StaticPageSpec;
    use crate::error::api_error;
    use kube::api::ObjectMeta;
    use kube::runtime::reflector;

    fn live_page(name: &str) -> StaticPage {
        let mut page = StaticPage::new(
            name,
            StaticPageSpec {
                contents: "x".to_string(),
                image: "nginx".to_string(),
                replicas: 1,
            },
        );
        page.metadata.namespace = Some("web".to_string());
        page
    }

    fn handler(mock: MockControlPlane, pages: Store<StaticPage>) -> DeletionHandler {
        let reconciler = Reconciler::new(Arc::new(mock), &ControllerConfig::default());
        DeletionHandler::new(reconciler, pages, Duration::from_secs(30))
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_deletes_share_one_cleanup_loop() {
        let mut mock = MockControlPlane::new();
        mock.expect_get_page()
            .returning(|_| Err(api_error(404, "NotFound")));
        mock.expect_delete()
            .returning(|_, _, _| Err(api_error(403, "Forbidden")));
        let (pages, _writer) = reflector::store();
        let handler = handler(mock, pages);
        let key = PageKey::new("web", "a");

        assert!(handler.on_delete(key.clone()));
        assert!(!handler.on_delete(key.clone()));
        tokio::task::yield_now().await;
        assert!(!handler.on_delete(key.clone()));
        assert!(handler.is_pending(&key));

        assert!(handler.on_delete(PageKey::new("web", "b")));
    }

    #[tokio::test]
    async fn finished_cleanup_releases_the_key() {
        let mut mock = MockControlPlane::new();
        mock.expect_get_page()
            .returning(|_| Err(api_error(404, "NotFound")));
        mock.expect_delete()
            .times(4)
            .returning(|_, _, _| Err(api_error(404, "NotFound")));
        let (pages, _writer) = reflector::store();
        let handler = handler(mock, pages);
        let key = PageKey::new("web", "a");

        assert!(handler.on_delete(key.clone()));
        while handler.is_pending(&key) {
            tokio::task::yield_now().await;
        }
        assert!(handler.on_delete(key.clone()));
        while handler.is_pending(&key) {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn recreated_page_is_left_to_the_controller() {
        let mut mock = MockControlPlane::new();
        mock.expect_get_page().never();
        mock.expect_delete().never();
        let (pages, mut writer) = reflector::store();
        writer.apply_watcher_event(&watcher::Event::Apply(live_page("a")));
        let handler = handler(mock, pages);

        handler.cleanup_until_done(&PageKey::new("web", "a")).await;
    }

    #[tokio::test]
    async fn cleanup_waits_for_running_reconcile() {
        let mut mock = MockControlPlane::new();
        mock.expect_get_page()
            .returning(|_| Err(api_error(404, "NotFound")));
        mock.expect_delete()
            .returning(|_, _, _| Err(api_error(404, "NotFound")));
        let (pages, _writer) = reflector::store();
        let handler = handler(mock, pages);
        let key = PageKey::new("web", "a");

        let held = handler.reconciler.locks().lock(&key).await;
        assert!(handler.on_delete(key.clone()));
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(handler.is_pending(&key));

        drop(held);
        while handler.is_pending(&key) {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn child_maps_to_parent_ref() {
        let deploy = Deployment {
            metadata: ObjectMeta {
                name: Some("staticpage-landing".to_string()),
                namespace: Some("web".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let parent = parent_ref(&deploy).unwrap();
        assert_eq!(parent.name, "landing");
        assert_eq!(parent.namespace.as_deref(), Some("web"));
    }

    #[test]
    fn unrelated_child_maps_to_nothing() {
        let cm = ConfigMap {
            metadata: ObjectMeta {
                name: Some("kube-root-ca.crt".to_string()),
                namespace: Some("web".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(parent_ref(&cm).is_none());
    }
}
