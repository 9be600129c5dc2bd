use super::Labels;
use crate::types::ChildResource;
use k8s_openapi::api::core::v1 as k8s;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq)]
pub struct ConfigMap {
    pub name: String,
    pub labels: Labels,
    pub data: BTreeMap<String, String>,
}

impl ConfigMap {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: Labels::new(),
            data: BTreeMap::new(),
        }
    }

    pub fn labels(mut self, labels: Labels) -> Self {
        self.labels = labels;
        self
    }

    pub fn data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

impl ChildResource for ConfigMap {
    type K8sType = k8s::ConfigMap;

    fn name(&self) -> &str {
        &self.name
    }

    fn into_k8s(self, namespace: &str, owner_ref: Option<OwnerReference>) -> Self::K8sType {
        k8s::ConfigMap {
            metadata: ObjectMeta {
                name: Some(self.name),
                namespace: Some(namespace.to_string()),
                labels: if self.labels.is_empty() {
                    None
                } else {
                    Some(self.labels.into_inner())
                },
                owner_references: owner_ref.map(|r| vec![r]),
                ..Default::default()
            },
            data: if self.data.is_empty() {
                None
            } else {
                Some(self.data)
            },
            ..Default::default()
        }
    }
}
