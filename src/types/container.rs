use k8s_openapi::api::core::v1 as k8s;

#[derive(Clone, Debug, PartialEq)]
pub struct Container {
    pub name: String,
    pub image: String,
    pub ports: Vec<ContainerPort>,
    pub volume_mounts: Vec<VolumeMount>,
}

impl Container {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            ports: Vec::new(),
            volume_mounts: Vec::new(),
        }
    }

    pub fn named_port(mut self, name: impl Into<String>, port: i32) -> Self {
        self.ports.push(ContainerPort {
            container_port: port,
            name: Some(name.into()),
            protocol: Some("TCP".to_string()),
        });
        self
    }

    pub fn volume_mount_readonly(
        mut self,
        name: impl Into<String>,
        mount_path: impl Into<String>,
    ) -> Self {
        self.volume_mounts.push(VolumeMount {
            name: name.into(),
            mount_path: mount_path.into(),
            read_only: true,
        });
        self
    }

    pub fn into_k8s(self) -> k8s::Container {
        k8s::Container {
            name: self.name,
            image: Some(self.image),
            ports: if self.ports.is_empty() {
                None
            } else {
                Some(self.ports.into_iter().map(|p| p.into_k8s()).collect())
            },
            volume_mounts: if self.volume_mounts.is_empty() {
                None
            } else {
                Some(
                    self.volume_mounts
                        .into_iter()
                        .map(|v| v.into_k8s())
                        .collect(),
                )
            },
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ContainerPort {
    pub container_port: i32,
    pub name: Option<String>,
    pub protocol: Option<String>,
}

impl ContainerPort {
    pub fn into_k8s(self) -> k8s::ContainerPort {
        k8s::ContainerPort {
            container_port: self.container_port,
            name: self.name,
            protocol: self.protocol,
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct VolumeMount {
    pub name: String,
    pub mount_path: String,
    pub read_only: bool,
}

impl VolumeMount {
    pub fn into_k8s(self) -> k8s::VolumeMount {
        k8s::VolumeMount {
            name: self.name,
            mount_path: self.mount_path,
            read_only: Some(self.read_only),
            ..Default::default()
        }
    }
}
