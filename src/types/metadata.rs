use std::collections::BTreeMap;

pub const NAME_LABEL: &str = "app.kubernetes.io/name";
pub const INSTANCE_LABEL: &str = "app.kubernetes.io/instance";
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Labels(pub BTreeMap<String, String>);

impl Labels {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Recommended labels for an object belonging to one page instance.
    pub fn for_instance(app: &str, instance: &str, manager: &str) -> Self {
        Self::new()
            .insert(NAME_LABEL, app)
            .insert(INSTANCE_LABEL, instance)
            .insert(MANAGED_BY_LABEL, manager)
    }

    pub fn insert(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&String> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> BTreeMap<String, String> {
        self.0
    }

    /// Selector derived from the identifying labels only, so it stays stable
    /// if more labels are added later.
    pub fn selector(&self) -> Selector {
        [NAME_LABEL, INSTANCE_LABEL]
            .into_iter()
            .filter_map(|k| self.get(k).map(|v| (k, v.clone())))
            .collect()
    }
}

impl<K, V> FromIterator<(K, V)> for Labels
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Selector(pub BTreeMap<String, String>);

impl Selector {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn match_labels(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn into_inner(self) -> BTreeMap<String, String> {
        self.0
    }
}

impl<K, V> FromIterator<(K, V)> for Selector
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_keeps_identifying_labels() {
        let labels = Labels::for_instance("staticpage", "landing", "staticpage-operator");
        let selector = labels.selector();
        let selected = selector.into_inner();
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[INSTANCE_LABEL], "landing");
        assert_eq!(selected[NAME_LABEL], "staticpage");
        assert!(!selected.contains_key(MANAGED_BY_LABEL));
    }
}
