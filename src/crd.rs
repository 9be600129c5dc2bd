use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix shared by every child object name.
pub const CHILD_PREFIX: &str = "staticpage-";

/// Desired state of a static page served by nginx.
#[derive(CustomResource, Debug, Serialize, Deserialize, Default, Clone, PartialEq, JsonSchema)]
#[kube(
    group = "kubernetes.chinzzii.com",
    version = "v1",
    kind = "StaticPage",
    plural = "staticpages",
    shortname = "sp",
    namespaced,
    printcolumn = r#"{"name":"Image","type":"string","jsonPath":".spec.image"}"#,
    printcolumn = r#"{"name":"Replicas","type":"integer","jsonPath":".spec.replicas"}"#
)]
pub struct StaticPageSpec {
    /// Served as `index.html`.
    pub contents: String,
    pub image: String,
    #[schemars(range(min = 0))]
    pub replicas: i32,
}

/// Namespace-qualified identity of a `StaticPage`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageKey {
    pub namespace: String,
    pub name: String,
}

impl PageKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Name shared by the ConfigMap and Deployment managed for this page.
    pub fn child_name(&self) -> String {
        format!("{CHILD_PREFIX}{}", self.name)
    }

    /// Recovers the parent key from a child object name.
    pub fn from_child(namespace: impl Into<String>, child_name: &str) -> Option<Self> {
        child_name
            .strip_prefix(CHILD_PREFIX)
            .filter(|name| !name.is_empty())
            .map(|name| Self::new(namespace, name))
    }
}

impl From<&StaticPage> for PageKey {
    fn from(page: &StaticPage) -> Self {
        Self::new(page.namespace().unwrap_or_default(), page.name_any())
    }
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
