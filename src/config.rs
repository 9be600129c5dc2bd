use crate::error::{Error, Result};
use std::time::Duration;

pub const DEFAULT_FIELD_MANAGER: &str = "staticpage-operator";

#[derive(Clone, Debug, PartialEq)]
pub struct ControllerConfig {
    /// Restricts watches to one namespace; `None` watches the whole cluster.
    pub namespace: Option<String>,
    /// Attach a controller owner reference from each child to its page.
    pub owner_references: bool,
    pub error_requeue: Duration,
    /// Requeue converged pages after this long instead of waiting for a change.
    pub resync_interval: Option<Duration>,
    pub field_manager: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            owner_references: false,
            error_requeue: Duration::from_secs(60),
            resync_interval: None,
            field_manager: DEFAULT_FIELD_MANAGER.to_string(),
        }
    }
}

impl ControllerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn namespace(mut self, ns: impl Into<String>) -> Self {
        self.namespace = Some(ns.into());
        self
    }

    pub fn owner_references(mut self, enabled: bool) -> Self {
        self.owner_references = enabled;
        self
    }

    pub fn error_requeue(mut self, duration: Duration) -> Self {
        self.error_requeue = duration;
        self
    }

    pub fn resync_interval(mut self, duration: Duration) -> Self {
        self.resync_interval = Some(duration);
        self
    }

    pub fn field_manager(mut self, name: impl Into<String>) -> Self {
        self.field_manager = name.into();
        self
    }

    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("WATCH_NAMESPACE") {
            if !val.is_empty() {
                config.namespace = Some(val);
            }
        }

        if let Ok(val) = std::env::var("OWNER_REFERENCES") {
            config.owner_references = val.parse().map_err(|_| {
                Error::InvalidConfig(format!("OWNER_REFERENCES must be true or false, got {val:?}"))
            })?;
        }

        if let Ok(val) = std::env::var("ERROR_REQUEUE_SECS") {
            config.error_requeue = Duration::from_secs(parse_secs("ERROR_REQUEUE_SECS", &val)?);
        }

        if let Ok(val) = std::env::var("RESYNC_SECS") {
            config.resync_interval = match parse_secs("RESYNC_SECS", &val)? {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            };
        }

        if let Ok(val) = std::env::var("FIELD_MANAGER") {
            if val.is_empty() {
                return Err(Error::InvalidConfig("FIELD_MANAGER must not be empty".to_string()));
            }
            config.field_manager = val;
        }

        Ok(config)
    }
}

fn parse_secs(var: &str, val: &str) -> Result<u64> {
    val.parse()
        .map_err(|_| Error::InvalidConfig(format!("{var} must be a whole number of seconds, got {val:?}")))
}
