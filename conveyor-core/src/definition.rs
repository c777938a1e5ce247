//! Declarative pipeline definition
//!
//! These structures mirror the plan document exactly as written (Lua table or
//! JSON object). Nothing here is validated; see
//! [`PipelinePlan::from_definition`](crate::domain::plan::PipelinePlan::from_definition)
//! for the checks that turn a definition into an executable plan.

use serde::de::{self, MapAccess, Visitor, value::MapAccessDeserializer};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

/// Top-level pipeline document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineDefinition {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Ordered stage list. Declaration order is execution order.
    #[serde(default)]
    pub stages: Vec<StageEntry>,
    /// Jobs declared outside their stage; each must name its `stage`.
    #[serde(default)]
    pub jobs: Vec<JobDefinition>,
    /// Pipeline-wide environment applied to every job
    #[serde(default, deserialize_with = "environment")]
    pub variables: HashMap<String, String>,
    #[serde(default)]
    pub services: Vec<ServiceDefinition>,
}

/// A stage entry: either a bare name or an inline stage with its jobs
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StageEntry {
    Name(String),
    Inline(StageDefinition),
}

// Inline stages must be read from the source deserializer, not a buffered
// copy: Lua encodes an empty table as a map.
impl<'de> Deserialize<'de> for StageEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct StageEntryVisitor;

        impl<'de> Visitor<'de> for StageEntryVisitor {
            type Value = StageEntry;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a stage name or a stage table")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<StageEntry, E> {
                Ok(StageEntry::Name(value.to_string()))
            }

            fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<StageEntry, A::Error> {
                StageDefinition::deserialize(MapAccessDeserializer::new(map)).map(StageEntry::Inline)
            }
        }

        deserializer.deserialize_any(StageEntryVisitor)
    }
}

impl StageEntry {
    pub fn name(&self) -> &str {
        match self {
            StageEntry::Name(name) => name,
            StageEntry::Inline(stage) => &stage.name,
        }
    }
}

impl From<&str> for StageEntry {
    fn from(name: &str) -> Self {
        StageEntry::Name(name.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageDefinition {
    pub name: String,
    #[serde(default)]
    pub jobs: Vec<JobDefinition>,
}

/// A single job as declared in the plan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobDefinition {
    pub name: String,
    /// Owning stage. Required for top-level jobs.
    #[serde(default)]
    pub stage: Option<String>,
    /// Shell command line
    #[serde(default)]
    pub command: Option<String>,
    /// Shell lines run in order, stopping at the first failure
    #[serde(default)]
    pub script: Vec<String>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    #[serde(default, deserialize_with = "environment")]
    pub environment: HashMap<String, String>,
    #[serde(default)]
    pub allow_failure: bool,
    /// Names of required services
    #[serde(default)]
    pub services: Vec<String>,
    /// Timeout in seconds
    #[serde(default)]
    pub timeout: Option<u64>,
}

impl JobDefinition {
    /// Creates a job definition with a command and defaults everywhere else
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: Some(command.into()),
            ..Default::default()
        }
    }

    /// Sets the owning stage
    pub fn in_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }
}

/// A named external dependency (database, cache, ...)
///
/// Conveyor does not start services; it resolves them so that jobs requiring
/// a service receive its environment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "environment")]
    pub environment: HashMap<String, String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

/// Reads an environment table, accepting numbers and booleans as their
/// string form
fn environment<'de, D: Deserializer<'de>>(deserializer: D) -> Result<HashMap<String, String>, D::Error> {
    struct EnvValue(String);

    impl<'de> Deserialize<'de> for EnvValue {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            struct EnvValueVisitor;

            impl<'de> Visitor<'de> for EnvValueVisitor {
                type Value = EnvValue;

                fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str("a string, number or boolean")
                }

                fn visit_str<E: de::Error>(self, value: &str) -> Result<EnvValue, E> {
                    Ok(EnvValue(value.to_string()))
                }

                fn visit_bool<E: de::Error>(self, value: bool) -> Result<EnvValue, E> {
                    Ok(EnvValue(value.to_string()))
                }

                fn visit_i64<E: de::Error>(self, value: i64) -> Result<EnvValue, E> {
                    Ok(EnvValue(value.to_string()))
                }

                fn visit_u64<E: de::Error>(self, value: u64) -> Result<EnvValue, E> {
                    Ok(EnvValue(value.to_string()))
                }

                fn visit_f64<E: de::Error>(self, value: f64) -> Result<EnvValue, E> {
                    Ok(EnvValue(value.to_string()))
                }
            }

            deserializer.deserialize_any(EnvValueVisitor)
        }
    }

    let values = HashMap::<String, EnvValue>::deserialize(deserializer)?;
    Ok(values.into_iter().map(|(key, EnvValue(value))| (key, value)).collect())
}
