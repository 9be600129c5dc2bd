use crate::client::{ChildKind, ControlPlane};
use crate::crd::{PageKey, StaticPage};
use crate::error::Result;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::ConfigMap;

/// Turns NotFound into `None`; every other error is returned unchanged.
fn found<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(obj) => Ok(Some(obj)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

pub async fn get_parent(client: &dyn ControlPlane, key: &PageKey) -> Result<Option<StaticPage>> {
    found(client.get_page(key).await)
}

pub async fn get_workload(
    client: &dyn ControlPlane,
    namespace: &str,
    name: &str,
) -> Result<Option<Deployment>> {
    found(client.get(ChildKind::Workload, namespace, name).await)?
        .map(|obj| obj.into_workload())
        .transpose()
}

pub async fn get_content(
    client: &dyn ControlPlane,
    namespace: &str,
    name: &str,
) -> Result<Option<ConfigMap>> {
    found(client.get(ChildKind::Content, namespace, name).await)?
        .map(|obj| obj.into_content())
        .transpose()
}
