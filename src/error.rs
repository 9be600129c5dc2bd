use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Expected {expected} object, control plane returned {found}")]
    UnexpectedKind {
        expected: &'static str,
        found: &'static str,
    },
}

impl Error {
    /// The object does not exist on the API server.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Kube(kube::Error::Api(e)) if e.code == 404)
    }

    /// A create raced with another writer that already made the object.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Error::Kube(kube::Error::Api(e)) if e.code == 409 && e.reason == "AlreadyExists")
    }

    /// An update carried a stale resourceVersion.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Kube(kube::Error::Api(e)) if e.code == 409 && e.reason == "Conflict")
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
pub(crate) fn api_error(code: u16, reason: &str) -> Error {
    Error::Kube(kube::Error::Api(kube::core::ErrorResponse {
        status: "Failure".to_string(),
        message: format!("{reason} (test)"),
        reason: reason.to_string(),
        code,
    }))
}
