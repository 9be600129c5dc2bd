//! Control-plane access for the reconciler.
//!
//! The reconciler only ever touches two child kinds, so instead of a generic
//! object client the surface is a closed set of operations keyed by
//! [`ChildKind`]. Implementations return API errors untouched; callers decide
//! which ones are benign with [`Error::is_not_found`] and friends.

use crate::crd::{PageKey, StaticPage};
use crate::error::{Error, Result};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::{Client, ResourceExt};
use std::fmt;

#[cfg(test)]
use mockall::automock;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChildKind {
    Content,
    Workload,
}

impl ChildKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChildKind::Content => "ConfigMap",
            ChildKind::Workload => "Deployment",
        }
    }
}

impl fmt::Display for ChildKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ChildObject {
    Content(ConfigMap),
    Workload(Deployment),
}

impl ChildObject {
    pub fn kind(&self) -> ChildKind {
        match self {
            ChildObject::Content(_) => ChildKind::Content,
            ChildObject::Workload(_) => ChildKind::Workload,
        }
    }

    pub fn name(&self) -> String {
        match self {
            ChildObject::Content(cm) => cm.name_any(),
            ChildObject::Workload(deploy) => deploy.name_any(),
        }
    }

    pub fn namespace(&self) -> Option<String> {
        match self {
            ChildObject::Content(cm) => cm.namespace(),
            ChildObject::Workload(deploy) => deploy.namespace(),
        }
    }

    pub fn into_content(self) -> Result<ConfigMap> {
        match self {
            ChildObject::Content(cm) => Ok(cm),
            other => Err(Error::UnexpectedKind {
                expected: ChildKind::Content.as_str(),
                found: other.kind().as_str(),
            }),
        }
    }

    pub fn into_workload(self) -> Result<Deployment> {
        match self {
            ChildObject::Workload(deploy) => Ok(deploy),
            other => Err(Error::UnexpectedKind {
                expected: ChildKind::Workload.as_str(),
                found: other.kind().as_str(),
            }),
        }
    }
}

/// CRUD surface the reconciler needs from the cluster.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn get_page(&self, key: &PageKey) -> Result<StaticPage>;

    async fn get(&self, kind: ChildKind, namespace: &str, name: &str) -> Result<ChildObject>;

    async fn create(&self, namespace: &str, object: ChildObject) -> Result<ChildObject>;

    /// Full replace. The object's resourceVersion is sent as-is, so a stale
    /// copy fails with a conflict.
    async fn update(&self, namespace: &str, object: ChildObject) -> Result<ChildObject>;

    async fn delete(&self, kind: ChildKind, namespace: &str, name: &str) -> Result<()>;

    /// Lists children of one kind, across all namespaces when `namespace` is `None`.
    async fn list(
        &self,
        kind: ChildKind,
        namespace: Option<String>,
        label_selector: String,
    ) -> Result<Vec<ChildObject>>;
}

/// [`ControlPlane`] backed by the Kubernetes API server.
#[derive(Clone)]
pub struct KubeControlPlane {
    client: Client,
    field_manager: String,
}

impl KubeControlPlane {
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
        }
    }

    fn post_params(&self) -> PostParams {
        PostParams {
            field_manager: Some(self.field_manager.clone()),
            ..Default::default()
        }
    }

    fn configmaps(&self, namespace: &str) -> Api<ConfigMap> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn deployments(&self, namespace: &str) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ControlPlane for KubeControlPlane {
    async fn get_page(&self, key: &PageKey) -> Result<StaticPage> {
        let api: Api<StaticPage> = Api::namespaced(self.client.clone(), &key.namespace);
        api.get(&key.name).await.map_err(Error::Kube)
    }

    async fn get(&self, kind: ChildKind, namespace: &str, name: &str) -> Result<ChildObject> {
        match kind {
            ChildKind::Content => self
                .configmaps(namespace)
                .get(name)
                .await
                .map(ChildObject::Content)
                .map_err(Error::Kube),
            ChildKind::Workload => self
                .deployments(namespace)
                .get(name)
                .await
                .map(ChildObject::Workload)
                .map_err(Error::Kube),
        }
    }

    async fn create(&self, namespace: &str, object: ChildObject) -> Result<ChildObject> {
        let pp = self.post_params();
        match object {
            ChildObject::Content(cm) => self
                .configmaps(namespace)
                .create(&pp, &cm)
                .await
                .map(ChildObject::Content)
                .map_err(Error::Kube),
            ChildObject::Workload(deploy) => self
                .deployments(namespace)
                .create(&pp, &deploy)
                .await
                .map(ChildObject::Workload)
                .map_err(Error::Kube),
        }
    }

    async fn update(&self, namespace: &str, object: ChildObject) -> Result<ChildObject> {
        let pp = self.post_params();
        match object {
            ChildObject::Content(cm) => self
                .configmaps(namespace)
                .replace(&cm.name_any(), &pp, &cm)
                .await
                .map(ChildObject::Content)
                .map_err(Error::Kube),
            ChildObject::Workload(deploy) => self
                .deployments(namespace)
                .replace(&deploy.name_any(), &pp, &deploy)
                .await
                .map(ChildObject::Workload)
                .map_err(Error::Kube),
        }
    }

    async fn delete(&self, kind: ChildKind, namespace: &str, name: &str) -> Result<()> {
        let dp = DeleteParams::background();
        match kind {
            ChildKind::Content => self
                .configmaps(namespace)
                .delete(name, &dp)
                .await
                .map(|_| ())
                .map_err(Error::Kube),
            ChildKind::Workload => self
                .deployments(namespace)
                .delete(name, &dp)
                .await
                .map(|_| ())
                .map_err(Error::Kube),
        }
    }

    async fn list(
        &self,
        kind: ChildKind,
        namespace: Option<String>,
        label_selector: String,
    ) -> Result<Vec<ChildObject>> {
        let lp = ListParams::default().labels(&label_selector);
        match kind {
            ChildKind::Content => {
                let api: Api<ConfigMap> = match namespace.as_deref() {
                    Some(ns) => self.configmaps(ns),
                    None => Api::all(self.client.clone()),
                };
                let list = api.list(&lp).await.map_err(Error::Kube)?;
                Ok(list.items.into_iter().map(ChildObject::Content).collect())
            }
            ChildKind::Workload => {
                let api: Api<Deployment> = match namespace.as_deref() {
                    Some(ns) => self.deployments(ns),
                    None => Api::all(self.client.clone()),
                };
                let list = api.list(&lp).await.map_err(Error::Kube)?;
                Ok(list.items.into_iter().map(ChildObject::Workload).collect())
            }
        }
    }
}
