//! Desired state of the two children managed for every `StaticPage`.
//!
//! Both builders are pure: the same input always produces the same object,
//! so they can be called as often as the engine likes.

use crate::crd::CHILD_PREFIX;
use crate::types::{ConfigMap, Container, Deployment, Labels, Volume};
use sha2::{Digest, Sha256};

pub const APP_NAME: &str = "staticpage";
pub const MANAGED_BY: &str = "staticpage-operator";
pub const CONTENT_KEY: &str = "index.html";
pub const CONTAINER_NAME: &str = "staticpage";
pub const HTTP_PORT: i32 = 80;
pub const CONTENT_VOLUME: &str = "contents";
pub const CONTENT_MOUNT_PATH: &str = "/usr/share/nginx/html";

/// Longest value the API server accepts for a label.
pub const MAX_LABEL_VALUE: usize = 63;
const HASH_SUFFIX_LEN: usize = 8;

/// Labels carried by every managed child named `name`.
pub fn child_labels(name: &str) -> Labels {
    Labels::for_instance(APP_NAME, &instance_label(name), MANAGED_BY)
}

/// Instance label value for the child `name`.
///
/// This is the owning page's name. Page names may be longer than a label
/// value allows; those are cut short and given a hash of the full name, so
/// two long names sharing a prefix still get distinct values.
pub fn instance_label(name: &str) -> String {
    let page = name
        .strip_prefix(CHILD_PREFIX)
        .filter(|rest| !rest.is_empty())
        .unwrap_or(name);
    if page.len() <= MAX_LABEL_VALUE {
        return page.to_string();
    }

    let mut hasher = Sha256::new();
    hasher.update(page.as_bytes());
    let digest = hex::encode(hasher.finalize());
    let suffix = &digest[..HASH_SUFFIX_LEN];

    let keep = MAX_LABEL_VALUE - HASH_SUFFIX_LEN - 1;
    let head: String = page
        .char_indices()
        .take_while(|(i, c)| i + c.len_utf8() <= keep)
        .map(|(_, c)| c)
        .collect();
    // Label values must start and end with an alphanumeric character.
    let head = head.trim_end_matches(|c: char| !c.is_ascii_alphanumeric());
    if head.is_empty() {
        suffix.to_string()
    } else {
        format!("{head}-{suffix}")
    }
}

/// Selector matching every child created by this operator.
pub fn managed_selector() -> String {
    format!("{}={MANAGED_BY}", crate::types::MANAGED_BY_LABEL)
}

pub fn build_content(name: &str, contents: &str) -> ConfigMap {
    ConfigMap::new(name)
        .labels(child_labels(name))
        .data(CONTENT_KEY, contents)
}

pub fn build_workload(name: &str, image: &str, replicas: i32) -> Deployment {
    Deployment::new(name)
        .replicas(replicas)
        .labels(child_labels(name))
        .container(
            Container::new(CONTAINER_NAME, image)
                .named_port("http", HTTP_PORT)
                .volume_mount_readonly(CONTENT_VOLUME, CONTENT_MOUNT_PATH),
        )
        // Mounts the ConfigMap of the same name, which must exist first.
        .volume(Volume::configmap(CONTENT_VOLUME, name))
}
