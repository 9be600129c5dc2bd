use k8s_openapi::api::core::v1 as k8s;

#[derive(Clone, Debug, PartialEq)]
pub struct Volume {
    pub name: String,
    pub source: VolumeSource,
}

impl Volume {
    pub fn configmap(name: impl Into<String>, configmap_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: VolumeSource::ConfigMap {
                name: configmap_name.into(),
            },
        }
    }

    pub fn into_k8s(self) -> k8s::Volume {
        match self.source {
            VolumeSource::ConfigMap { name } => k8s::Volume {
                name: self.name,
                config_map: Some(k8s::ConfigMapVolumeSource {
                    name,
                    ..Default::default()
                }),
                ..Default::default()
            },
        }
    }
}

/// Only ConfigMap-backed volumes are mounted by managed workloads.
#[derive(Clone, Debug, PartialEq)]
pub enum VolumeSource {
    ConfigMap { name: String },
}
