use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Response category the boundary layer should use for a failure.
///
/// The core never acts on this; only the API surface reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportHint {
    NotFound,
    Forbidden,
    Unspecified,
}

/// The closed set of failure kinds that may cross the core's boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    #[serde(rename = "NoSuchHostError")]
    NoSuchHost,
    #[serde(rename = "NoSuchJobError")]
    NoSuchJob,
    #[serde(rename = "NoSuchQueueError")]
    NoSuchQueue,
    #[serde(rename = "NoSuchUserError")]
    NoSuchUser,
    #[serde(rename = "ResourceDoesntExistError")]
    ResourceDoesntExist,
    /// The scheduler is unreachable or answered with an error that has no
    /// more specific kind.
    #[serde(rename = "ClusterInterfaceError")]
    ClusterInterface,
    #[serde(rename = "PermissionDeniedError")]
    PermissionDenied,
    #[serde(rename = "JobSubmitError")]
    JobSubmit,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 8] = [
        ErrorKind::NoSuchHost,
        ErrorKind::NoSuchJob,
        ErrorKind::NoSuchQueue,
        ErrorKind::NoSuchUser,
        ErrorKind::ResourceDoesntExist,
        ErrorKind::ClusterInterface,
        ErrorKind::PermissionDenied,
        ErrorKind::JobSubmit,
    ];

    /// Name emitted as `exception_class` in failure records.
    pub fn class_name(self) -> &'static str {
        match self {
            ErrorKind::NoSuchHost => "NoSuchHostError",
            ErrorKind::NoSuchJob => "NoSuchJobError",
            ErrorKind::NoSuchQueue => "NoSuchQueueError",
            ErrorKind::NoSuchUser => "NoSuchUserError",
            ErrorKind::ResourceDoesntExist => "ResourceDoesntExistError",
            ErrorKind::ClusterInterface => "ClusterInterfaceError",
            ErrorKind::PermissionDenied => "PermissionDeniedError",
            ErrorKind::JobSubmit => "JobSubmitError",
        }
    }

    pub fn from_class_name(name: &str) -> Option<ErrorKind> {
        ErrorKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.class_name() == name)
    }

    pub fn transport_hint(self) -> TransportHint {
        match self {
            ErrorKind::NoSuchHost
            | ErrorKind::NoSuchJob
            | ErrorKind::NoSuchQueue
            | ErrorKind::NoSuchUser
            | ErrorKind::ResourceDoesntExist => TransportHint::NotFound,
            ErrorKind::PermissionDenied => TransportHint::Forbidden,
            ErrorKind::ClusterInterface | ErrorKind::JobSubmit => TransportHint::Unspecified,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.class_name())
    }
}

/// Keys a failure record always owns; extras never overwrite them.
const RESERVED_KEYS: [&str; 2] = ["exception_class", "message"];

/// A failure in the cluster vocabulary: kind, message, and the diagnostic
/// extras supplied where it was raised.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{message}")]
pub struct ClusterError {
    kind: ErrorKind,
    message: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    extras: Map<String, Value>,
}

impl ClusterError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            extras: Map::new(),
        }
    }

    pub fn no_such_host(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NoSuchHost, message)
    }

    pub fn no_such_job(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NoSuchJob, message)
    }

    pub fn no_such_queue(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NoSuchQueue, message)
    }

    pub fn no_such_user(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NoSuchUser, message)
    }

    pub fn resource_doesnt_exist(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ResourceDoesntExist, message)
    }

    pub fn cluster_interface(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ClusterInterface, message)
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PermissionDenied, message)
    }

    pub fn job_submit(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::JobSubmit, message)
    }

    /// Build a failure of the kind named by `class_name`, with a fixed
    /// message. Used to exercise error handling end to end.
    pub fn exception_test(class_name: &str) -> Option<Self> {
        ErrorKind::from_class_name(class_name).map(|kind| Self::new(kind, "Exception Test"))
    }

    /// Attach a diagnostic field. Reserved keys are ignored.
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        if !RESERVED_KEYS.contains(&key.as_str()) {
            self.extras.insert(key, value.into());
        }
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn extras(&self) -> &Map<String, Value> {
        &self.extras
    }

    pub fn extra(&self, key: &str) -> Option<&Value> {
        self.extras.get(key)
    }

    pub fn transport_hint(&self) -> TransportHint {
        self.kind.transport_hint()
    }

    /// Flatten into `{exception_class, message, ...extras}`.
    pub fn to_record(&self) -> Value {
        let mut record = Map::new();
        record.insert(
            "exception_class".to_string(),
            Value::String(self.kind.class_name().to_string()),
        );
        record.insert("message".to_string(), Value::String(self.message.clone()));
        for (key, value) in &self.extras {
            if !RESERVED_KEYS.contains(&key.as_str()) {
                record.insert(key.clone(), value.clone());
            }
        }
        Value::Object(record)
    }
}

pub type Result<T> = std::result::Result<T, ClusterError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_has_class_message_then_extras() {
        let err = ClusterError::no_such_job("Job not found").with_extra("code", 1);
        assert_eq!(
            err.to_record(),
            json!({"exception_class": "NoSuchJobError", "message": "Job not found", "code": 1})
        );
        let keys: Vec<_> = err.to_record().as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["exception_class", "message", "code"]);
    }

    #[test]
    fn extras_cannot_shadow_reserved_keys() {
        let err = ClusterError::permission_denied("nope").with_extra("message", "spoofed");
        assert!(err.extras().is_empty());
        assert_eq!(err.to_record()["message"], "nope");
    }

    #[test]
    fn transport_hints() {
        assert_eq!(ClusterError::no_such_host("x").transport_hint(), TransportHint::NotFound);
        assert_eq!(
            ClusterError::resource_doesnt_exist("x").transport_hint(),
            TransportHint::NotFound
        );
        assert_eq!(
            ClusterError::permission_denied("x").transport_hint(),
            TransportHint::Forbidden
        );
        assert_eq!(
            ClusterError::cluster_interface("x").transport_hint(),
            TransportHint::Unspecified
        );
        assert_eq!(ClusterError::job_submit("x").transport_hint(), TransportHint::Unspecified);
    }

    #[test]
    fn exception_test_builds_every_kind() {
        for kind in ErrorKind::ALL {
            let err = ClusterError::exception_test(kind.class_name()).unwrap();
            assert_eq!(err.kind(), kind);
            assert_eq!(err.message(), "Exception Test");
        }
        assert!(ClusterError::exception_test("ValueError").is_none());
    }

    #[test]
    fn serializes_kind_as_class_name() {
        let err = ClusterError::cluster_interface("down").with_extra("code", 60);
        let wire = serde_json::to_value(&err).unwrap();
        assert_eq!(wire["kind"], "ClusterInterfaceError");
        let back: ClusterError = serde_json::from_value(wire).unwrap();
        assert_eq!(back, err);
    }
}
