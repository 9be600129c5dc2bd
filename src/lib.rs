pub mod client;
pub mod config;
pub mod crd;
pub mod error;
pub mod operator;
pub mod reconciler;
pub mod types;

pub use client::{ChildKind, ChildObject, ControlPlane, KubeControlPlane};
pub use config::ControllerConfig;
pub use crd::{PageKey, StaticPage, StaticPageSpec};
pub use error::{Error, Result};
pub use operator::Operator;
pub use reconciler::Reconciler;

pub mod prelude {
    pub use crate::client::{ChildKind, ChildObject, ControlPlane};
    pub use crate::config::ControllerConfig;
    pub use crate::crd::{PageKey, StaticPage, StaticPageSpec};
    pub use crate::error::{Error, Result};
    pub use crate::operator::Operator;
    pub use crate::reconciler::builders::{build_content, build_workload};
    pub use crate::reconciler::Reconciler;
    pub use crate::types::ChildResource;

    pub use kube::runtime::controller::Action;

    pub use std::sync::Arc;
    pub use std::time::Duration;
}
