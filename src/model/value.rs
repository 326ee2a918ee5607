use std::fmt;

use thiserror::Error;

use crate::error::ClusterError;
use crate::model::job::JobId;
use crate::model::status::JobStatus;

/// Result of reading one attribute from an entity.
pub type Attr<T> = std::result::Result<T, AttributeError>;

/// Failure of a single attribute accessor.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AttributeError {
    /// The backend does not provide this attribute.
    #[error("{entity}.{attribute} is not implemented for this scheduler backend")]
    Unsupported {
        entity: &'static str,
        attribute: String,
    },

    /// The backend tried to answer and failed.
    #[error(transparent)]
    Cluster(#[from] ClusterError),
}

impl From<AttributeError> for ClusterError {
    fn from(err: AttributeError) -> Self {
        match err {
            AttributeError::Cluster(inner) => inner,
            AttributeError::Unsupported { entity, attribute } => {
                let message = format!(
                    "{entity}.{attribute} is not implemented for this scheduler backend"
                );
                ClusterError::cluster_interface(message)
                    .with_extra("entity", entity)
                    .with_extra("attribute", attribute)
            }
        }
    }
}

/// Shorthand for the default body of an accessor a backend does not override.
pub fn unsupported<T>(entity: &'static str, attribute: &str) -> Attr<T> {
    Err(AttributeError::Unsupported {
        entity,
        attribute: attribute.to_string(),
    })
}

/// A weak back reference to another entity: relation plus lookup key.
///
/// References are always projected as stubs and never expanded, which keeps
/// projections bounded even when entities refer to each other.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityRef {
    Host { name: String },
    ExecutionHost { name: String, num_slots: u32 },
    Queue { name: String },
    User { name: String },
    Job(JobRef),
}

impl EntityRef {
    pub fn host(name: impl Into<String>) -> Self {
        EntityRef::Host { name: name.into() }
    }

    pub fn queue(name: impl Into<String>) -> Self {
        EntityRef::Queue { name: name.into() }
    }

    pub fn user(name: impl Into<String>) -> Self {
        EntityRef::User { name: name.into() }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            EntityRef::Host { .. } => "Host",
            EntityRef::ExecutionHost { .. } => "ExecutionHost",
            EntityRef::Queue { .. } => "Queue",
            EntityRef::User { .. } => "User",
            EntityRef::Job(_) => "Job",
        }
    }
}

/// The fields a job stub carries when a job is referenced from elsewhere.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRef {
    pub id: JobId,
    pub name: String,
    pub user_name: String,
    pub status: JobStatus,
    pub submit_time: i64,
    pub start_time: i64,
    pub end_time: i64,
}

/// A value object projected in full wherever it appears (status codes,
/// limits, load indexes, processes).
pub trait Record: fmt::Debug + Send + Sync {
    fn type_name(&self) -> &'static str;

    /// Field names in projection order.
    fn manifest(&self) -> Vec<&str>;

    fn field(&self, name: &str) -> Attr<Value<'_>>;
}

/// A computation the encoder must run before it can project the result.
pub struct Deferred<'a>(Box<dyn FnOnce() -> Attr<Value<'a>> + 'a>);

impl<'a> Deferred<'a> {
    pub fn new(compute: impl FnOnce() -> Attr<Value<'a>> + 'a) -> Self {
        Self(Box::new(compute))
    }

    pub fn resolve(self) -> Attr<Value<'a>> {
        (self.0)()
    }
}

impl fmt::Debug for Deferred<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Deferred(..)")
    }
}

/// An attribute value as produced by an accessor, before projection.
#[derive(Debug)]
pub enum Value<'a> {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Projected as elapsed seconds.
    Duration(chrono::Duration),
    List(Vec<Value<'a>>),
    Reference(EntityRef),
    Record(Box<dyn Record + 'a>),
    /// Already-plain data, passed through untouched.
    Json(serde_json::Value),
    Deferred(Deferred<'a>),
}

impl<'a> Value<'a> {
    pub fn record(record: impl Record + 'a) -> Self {
        Value::Record(Box::new(record))
    }

    pub fn records<R: Record + 'a>(records: Vec<R>) -> Self {
        Value::List(records.into_iter().map(Value::record).collect())
    }

    pub fn references(refs: Vec<EntityRef>) -> Self {
        Value::List(refs.into_iter().map(Value::Reference).collect())
    }

    pub fn deferred(compute: impl FnOnce() -> Attr<Value<'a>> + 'a) -> Self {
        Value::Deferred(Deferred::new(compute))
    }
}

impl From<bool> for Value<'_> {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value<'_> {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<i64> for Value<'_> {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u32> for Value<'_> {
    fn from(v: u32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<u64> for Value<'_> {
    fn from(v: u64) -> Self {
        match i64::try_from(v) {
            Ok(v) => Value::Int(v),
            Err(_) => Value::Float(v as f64),
        }
    }
}

impl From<f64> for Value<'_> {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value<'_> {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value<'_> {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<chrono::Duration> for Value<'_> {
    fn from(v: chrono::Duration) -> Self {
        Value::Duration(v)
    }
}

impl From<EntityRef> for Value<'_> {
    fn from(v: EntityRef) -> Self {
        Value::Reference(v)
    }
}

impl From<JobRef> for Value<'_> {
    fn from(v: JobRef) -> Self {
        Value::Reference(EntityRef::Job(v))
    }
}

impl<'a, T: Into<Value<'a>>> From<Option<T>> for Value<'a> {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl<'a, T: Into<Value<'a>>> From<Vec<T>> for Value<'a> {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}
