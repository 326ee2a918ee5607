//! Projection encoder: turns model entities into plain JSON documents.
//!
//! A top-level entity is projected in full mode: `{type}` followed by one key
//! per manifest attribute, in manifest order. Anything an attribute refers to
//! is projected in reference mode, a bounded stub with a locator, so mutually
//! referencing entities can never recurse.

use serde_json::{json, Map, Number, Value as Json};
use thiserror::Error;

use crate::error::ClusterError;
use crate::model::{AttributeError, Entity, EntityRef, JobId, Record, Value};

/// Default URL prefix used by locators.
pub const DEFAULT_PREFIX: &str = "/olw";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProjectionError {
    #[error("cannot project {entity}.{attribute}: {source}")]
    Attribute {
        entity: &'static str,
        attribute: String,
        #[source]
        source: AttributeError,
    },
}

impl From<ProjectionError> for ClusterError {
    fn from(err: ProjectionError) -> Self {
        let ProjectionError::Attribute {
            entity,
            attribute,
            source,
        } = err;
        ClusterError::from(source)
            .with_extra("entity", entity)
            .with_extra("attribute", attribute)
    }
}

/// Builds resource locators under a URL prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    prefix: String,
}

impl Locator {
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self {
            prefix: prefix.trim_end_matches('/').to_string(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn host(&self, name: &str) -> String {
        format!("{}/hosts/{}/", self.prefix, name)
    }

    pub fn queue(&self, name: &str) -> String {
        format!("{}/queues/{}/", self.prefix, name)
    }

    pub fn user(&self, name: &str) -> String {
        format!("{}/users/{}/", self.prefix, name)
    }

    pub fn job(&self, id: JobId) -> String {
        format!("{}/jobs/{}/{}/", self.prefix, id.job_id, id.array_index)
    }
}

impl Default for Locator {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Projector {
    locator: Locator,
}

impl Projector {
    pub fn new(locator: Locator) -> Self {
        Self { locator }
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self::new(Locator::new(prefix))
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    /// Full-mode projection of one entity.
    ///
    /// Fails as a whole if any manifest attribute cannot be read.
    pub fn project(&self, entity: Entity<'_>) -> Result<Json, ProjectionError> {
        let entity_name = entity.type_name();
        let mut document = Map::new();
        document.insert("type".to_string(), Json::from(entity_name));
        for attribute in entity.manifest() {
            let value = entity
                .resolve(attribute)
                .and_then(|value| self.element(value))
                .map_err(|source| ProjectionError::Attribute {
                    entity: entity_name,
                    attribute: attribute.to_string(),
                    source,
                })?;
            document.insert(attribute.to_string(), value);
        }
        Ok(Json::Object(document))
    }

    /// Full-mode projection of each entity, in order.
    pub fn project_all<'a>(
        &self,
        entities: impl IntoIterator<Item = Entity<'a>>,
    ) -> Result<Json, ProjectionError> {
        entities
            .into_iter()
            .map(|entity| self.project(entity))
            .collect::<Result<Vec<_>, _>>()
            .map(Json::Array)
    }

    /// Reference-mode stub for an entity.
    pub fn reference(&self, reference: &EntityRef) -> Json {
        match reference {
            EntityRef::Host { name } => json!({
                "type": "Host",
                "name": name,
                "url": self.locator.host(name),
            }),
            EntityRef::ExecutionHost { name, num_slots } => json!({
                "type": "ExecutionHost",
                "name": name,
                "num_slots": num_slots,
                "url": self.locator.host(name),
            }),
            EntityRef::Queue { name } => json!({
                "type": "Queue",
                "name": name,
                "url": self.locator.queue(name),
            }),
            EntityRef::User { name } => json!({
                "type": "User",
                "name": name,
                "url": self.locator.user(name),
            }),
            EntityRef::Job(job) => json!({
                "type": "Job",
                "name": job.name,
                "job_id": job.id.job_id,
                "array_index": job.id.array_index,
                "url": self.locator.job(job.id),
                "user_name": job.user_name,
                "user_url": self.locator.user(&job.user_name),
                "status": {
                    "type": "JobStatus",
                    "name": job.status.name(),
                    "description": job.status.description(),
                    "status": job.status.code(),
                    "friendly": job.status.friendly(),
                },
                "submit_time": job.submit_time,
                "start_time": job.start_time,
                "end_time": job.end_time,
            }),
        }
    }

    /// Value objects are always projected in full, with their type name.
    pub fn record(&self, record: &dyn Record) -> Result<Json, AttributeError> {
        let mut document = Map::new();
        document.insert("type".to_string(), Json::from(record.type_name()));
        for field in record.manifest() {
            let value = self.element(record.field(field)?)?;
            document.insert(field.to_string(), value);
        }
        Ok(Json::Object(document))
    }

    fn element(&self, value: Value<'_>) -> Result<Json, AttributeError> {
        Ok(match value {
            Value::Null => Json::Null,
            Value::Bool(v) => Json::Bool(v),
            Value::Int(v) => Json::from(v),
            Value::Float(v) => float(v),
            Value::Text(v) => Json::String(v),
            Value::Duration(d) => float(seconds(d)),
            Value::List(items) => Json::Array(
                items
                    .into_iter()
                    .map(|item| self.element(item))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Reference(reference) => self.reference(&reference),
            Value::Record(record) => self.record(record.as_ref())?,
            Value::Json(v) => v,
            Value::Deferred(deferred) => self.element(deferred.resolve()?)?,
        })
    }
}

/// Non-finite floats have no JSON form and project as null.
fn float(v: f64) -> Json {
    Number::from_f64(v).map_or(Json::Null, Json::Number)
}

fn seconds(duration: chrono::Duration) -> f64 {
    match duration.num_microseconds() {
        Some(us) => us as f64 / 1_000_000.0,
        None => duration.num_seconds() as f64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locators_strip_trailing_slash() {
        let locator = Locator::new("/olw/");
        assert_eq!(locator.host("node01"), "/olw/hosts/node01/");
        assert_eq!(locator.job(JobId::new(9767, 0)), "/olw/jobs/9767/0/");
    }

    #[test]
    fn durations_project_as_seconds() {
        assert_eq!(seconds(chrono::Duration::minutes(2)), 120.0);
        assert_eq!(seconds(chrono::Duration::milliseconds(1500)), 1.5);
    }

    #[test]
    fn nan_projects_as_null() {
        assert_eq!(float(f64::NAN), Json::Null);
        assert_eq!(float(0.25), json!(0.25));
    }
}
