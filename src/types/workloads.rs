use super::{Container, Labels, Selector, Volume};
use crate::types::ChildResource;
use k8s_openapi::api::apps::v1 as apps;
use k8s_openapi::api::core::v1 as core;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};

#[derive(Clone, Debug, PartialEq)]
pub struct Deployment {
    pub name: String,
    pub replicas: i32,
    pub labels: Labels,
    pub selector: Selector,
    pub containers: Vec<Container>,
    pub volumes: Vec<Volume>,
}

impl Deployment {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            name: name.clone(),
            replicas: 1,
            labels: Labels::new().insert("app", &name),
            selector: Selector::new().match_labels("app", &name),
            containers: Vec::new(),
            volumes: Vec::new(),
        }
    }

    pub fn replicas(mut self, n: i32) -> Self {
        self.replicas = n;
        self
    }

    /// Replaces the labels and derives the pod selector from them.
    pub fn labels(mut self, labels: Labels) -> Self {
        self.selector = labels.selector();
        self.labels = labels;
        self
    }

    pub fn container(mut self, container: Container) -> Self {
        self.containers.push(container);
        self
    }

    pub fn volume(mut self, volume: Volume) -> Self {
        self.volumes.push(volume);
        self
    }
}

impl ChildResource for Deployment {
    type K8sType = apps::Deployment;

    fn name(&self) -> &str {
        &self.name
    }

    fn into_k8s(self, namespace: &str, owner_ref: Option<OwnerReference>) -> Self::K8sType {
        let labels_map = self.labels.into_inner();
        apps::Deployment {
            metadata: ObjectMeta {
                name: Some(self.name),
                namespace: Some(namespace.to_string()),
                labels: Some(labels_map.clone()),
                owner_references: owner_ref.map(|r| vec![r]),
                ..Default::default()
            },
            spec: Some(apps::DeploymentSpec {
                replicas: Some(self.replicas),
                selector: LabelSelector {
                    match_labels: Some(self.selector.into_inner()),
                    match_expressions: None,
                },
                template: core::PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(labels_map),
                        ..Default::default()
                    }),
                    spec: Some(core::PodSpec {
                        containers: self.containers.into_iter().map(|c| c.into_k8s()).collect(),
                        volumes: if self.volumes.is_empty() {
                            None
                        } else {
                            Some(self.volumes.into_iter().map(|v| v.into_k8s()).collect())
                        },
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}
