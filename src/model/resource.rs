use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Map;

use crate::model::value::{unsupported, Attr, Record, Value};

/// Display form of an absent limit, unit or description. Distinct from "0".
pub const NO_LIMIT: &str = "None";

fn display_or_marker(value: Option<impl fmt::Display>) -> String {
    value.map_or_else(|| NO_LIMIT.to_string(), |v| v.to_string())
}

fn no_limit() -> String {
    NO_LIMIT.to_string()
}

/// A soft/hard limit on resource usage of a job, queue, host or user.
///
/// All fields are display strings; the scheduler reports them that way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimit {
    pub name: String,
    #[serde(default = "no_limit")]
    pub soft_limit: String,
    #[serde(default = "no_limit")]
    pub hard_limit: String,
    #[serde(default = "no_limit")]
    pub description: String,
    #[serde(default = "no_limit")]
    pub unit: String,
}

impl ResourceLimit {
    pub fn new(
        name: impl Into<String>,
        soft_limit: Option<impl fmt::Display>,
        hard_limit: Option<impl fmt::Display>,
    ) -> Self {
        Self {
            name: name.into(),
            soft_limit: display_or_marker(soft_limit),
            hard_limit: display_or_marker(hard_limit),
            description: no_limit(),
            unit: no_limit(),
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

impl fmt::Display for ResourceLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} ({})", self.name, self.soft_limit, self.hard_limit)
    }
}

impl Record for ResourceLimit {
    fn type_name(&self) -> &'static str {
        "ResourceLimit"
    }

    fn manifest(&self) -> Vec<&str> {
        vec!["name", "soft_limit", "hard_limit", "description", "unit"]
    }

    fn field(&self, name: &str) -> Attr<Value<'_>> {
        match name {
            "name" => Ok(self.name.as_str().into()),
            "soft_limit" => Ok(self.soft_limit.as_str().into()),
            "hard_limit" => Ok(self.hard_limit.as_str().into()),
            "description" => Ok(self.description.as_str().into()),
            "unit" => Ok(self.unit.as_str().into()),
            other => unsupported("ResourceLimit", other),
        }
    }
}

/// A resource consumed by a job or user, with its optional limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumedResource {
    pub name: String,
    pub value: String,
    #[serde(default = "no_limit")]
    pub limit: String,
    #[serde(default = "no_limit")]
    pub unit: String,
}

impl ConsumedResource {
    pub fn new(
        name: impl Into<String>,
        value: impl fmt::Display,
        limit: Option<impl fmt::Display>,
        unit: Option<impl fmt::Display>,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.to_string(),
            limit: display_or_marker(limit),
            unit: display_or_marker(unit),
        }
    }

    pub fn has_limit(&self) -> bool {
        self.limit != NO_LIMIT
    }
}

impl fmt::Display for ConsumedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.value)?;
        if self.unit != NO_LIMIT {
            write!(f, "{}", self.unit)?;
        }
        if self.has_limit() {
            write!(f, " ({})", self.limit)?;
        }
        Ok(())
    }
}

impl Record for ConsumedResource {
    fn type_name(&self) -> &'static str {
        "ConsumedResource"
    }

    fn manifest(&self) -> Vec<&str> {
        vec!["name", "value", "limit", "unit"]
    }

    fn field(&self, name: &str) -> Attr<Value<'_>> {
        match name {
            "name" => Ok(self.name.as_str().into()),
            "value" => Ok(self.value.as_str().into()),
            "limit" => Ok(self.limit.as_str().into()),
            "unit" => Ok(self.unit.as_str().into()),
            other => unsupported("ConsumedResource", other),
        }
    }
}

/// A host load reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadIndex {
    pub name: String,
    pub value: f64,
    #[serde(default)]
    pub description: String,
}

impl LoadIndex {
    pub fn new(name: impl Into<String>, value: f64, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value,
            description: description.into(),
        }
    }
}

impl Record for LoadIndex {
    fn type_name(&self) -> &'static str {
        "LoadIndex"
    }

    fn manifest(&self) -> Vec<&str> {
        vec!["name", "value", "description"]
    }

    fn field(&self, name: &str) -> Attr<Value<'_>> {
        match name {
            "name" => Ok(self.name.as_str().into()),
            "value" => Ok(self.value.into()),
            "description" => Ok(self.description.as_str().into()),
            other => unsupported("LoadIndex", other),
        }
    }
}

/// A named resource defined by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl Resource {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

impl Record for Resource {
    fn type_name(&self) -> &'static str {
        "Resource"
    }

    fn manifest(&self) -> Vec<&str> {
        vec!["name", "description"]
    }

    fn field(&self, name: &str) -> Attr<Value<'_>> {
        match name {
            "name" => Ok(self.name.as_str().into()),
            "description" => Ok(self.description.as_str().into()),
            other => unsupported("Resource", other),
        }
    }
}

const PROCESS_FIELDS: [&str; 2] = ["hostname", "process_id"];

/// A process started by a job, plus whatever extra fields the scheduler
/// tracks for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Process {
    pub hostname: String,
    pub process_id: i64,
    /// Scheduler-specific fields, in the order they were added.
    #[serde(default)]
    pub extensions: Map<String, serde_json::Value>,
}

impl Process {
    pub fn new(hostname: impl Into<String>, process_id: i64) -> Self {
        Self {
            hostname: hostname.into(),
            process_id,
            extensions: Map::new(),
        }
    }

    /// Add an extension field. Names that collide with core fields are ignored.
    pub fn with_extension(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        let name = name.into();
        if !PROCESS_FIELDS.contains(&name.as_str()) {
            self.extensions.insert(name, value.into());
        }
        self
    }
}

impl fmt::Display for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hostname, self.process_id)
    }
}

impl Record for Process {
    fn type_name(&self) -> &'static str {
        "Process"
    }

    fn manifest(&self) -> Vec<&str> {
        PROCESS_FIELDS
            .iter()
            .copied()
            .chain(
                self.extensions
                    .keys()
                    .map(String::as_str)
                    .filter(|name| !PROCESS_FIELDS.contains(name)),
            )
            .collect()
    }

    fn field(&self, name: &str) -> Attr<Value<'_>> {
        match name {
            "hostname" => Ok(self.hostname.as_str().into()),
            "process_id" => Ok(self.process_id.into()),
            other => match self.extensions.get(other) {
                Some(value) => Ok(Value::Json(value.clone())),
                None => unsupported("Process", other),
            },
        }
    }
}
