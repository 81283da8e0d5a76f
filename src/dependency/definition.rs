use crate::error::{Error, Result};
use crate::probe::ReadinessCondition;
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// One "depends on" edge, optionally gated by a readiness condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub service: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<ReadinessCondition>,
}

impl DependencyEdge {
    pub fn new(service: impl Into<String>, condition: Option<ReadinessCondition>) -> Self {
        Self {
            service: service.into(),
            condition,
        }
    }
}

/// Zero, one or many dependency edges.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "edges", rename_all = "snake_case")]
pub enum Dependencies {
    #[default]
    None,
    Single(DependencyEdge),
    Multiple(Vec<DependencyEdge>),
}

impl Dependencies {
    pub fn edges(&self) -> &[DependencyEdge] {
        match self {
            Dependencies::None => &[],
            Dependencies::Single(edge) => std::slice::from_ref(edge),
            Dependencies::Multiple(edges) => edges,
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.edges().iter().map(|e| e.service.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.edges().is_empty()
    }

    /// Add an edge, promoting `None -> Single -> Multiple`.
    pub fn push(&mut self, edge: DependencyEdge) {
        *self = match std::mem::take(self) {
            Dependencies::None => Dependencies::Single(edge),
            Dependencies::Single(first) => Dependencies::Multiple(vec![first, edge]),
            Dependencies::Multiple(mut edges) => {
                edges.push(edge);
                Dependencies::Multiple(edges)
            }
        };
    }

    fn validate(&self, owner: &str) -> Result<()> {
        let mut seen = HashSet::new();
        for edge in self.edges() {
            if edge.service.trim().is_empty() {
                return Err(Error::invalid_definition(owner, "empty dependency name"));
            }
            if !seen.insert(edge.service.as_str()) {
                return Err(Error::invalid_definition(
                    owner,
                    format!("'{}' is listed twice in depends_on", edge.service),
                ));
            }
            if let Some(condition) = &edge.condition {
                condition.validate_shape()?;
            }
        }
        Ok(())
    }
}

/// A service to deploy as part of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawServiceDefinition", into = "RawServiceDefinition")]
pub struct ServiceDefinition {
    pub name: String,
    pub image: String,
    /// Container port to host port.
    pub ports: BTreeMap<String, String>,
    pub env_vars: BTreeMap<String, String>,
    pub dependencies: Dependencies,
    /// Condition on the service itself, probed once its container is up.
    pub readiness: Option<ReadinessCondition>,
}

impl ServiceDefinition {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            ports: BTreeMap::new(),
            env_vars: BTreeMap::new(),
            dependencies: Dependencies::None,
            readiness: None,
        }
    }

    pub fn port(mut self, container: impl Into<String>, host: impl Into<String>) -> Self {
        self.ports.insert(container.into(), host.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.insert(key.into(), value.into());
        self
    }

    pub fn depends_on(
        mut self,
        service: impl Into<String>,
        condition: Option<ReadinessCondition>,
    ) -> Self {
        self.dependencies
            .push(DependencyEdge::new(service, condition));
        self
    }

    pub fn ready_when(mut self, condition: ReadinessCondition) -> Self {
        self.readiness = Some(condition);
        self
    }

    pub fn dependency_names(&self) -> Vec<&str> {
        self.dependencies.names()
    }

    /// Decode one entry of a group document, keeping the validation error
    /// and the name of the service it belongs to.
    pub fn from_yaml_value(value: serde_yaml::Value) -> Result<Self> {
        let name = value
            .get("name")
            .and_then(|n| n.as_str())
            .map(str::to_string);
        let raw: RawServiceDefinition = serde_yaml::from_value(value).map_err(|e| match &name {
            Some(name) => Error::invalid_definition(name, e.to_string()),
            None => Error::Yaml(e),
        })?;
        Self::try_from(raw)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::invalid_definition("", "service name is empty"));
        }
        if self.image.trim().is_empty() {
            return Err(Error::invalid_definition(&self.name, "image is empty"));
        }
        if let Some(condition) = &self.readiness {
            condition.validate_shape()?;
        }
        self.dependencies.validate(&self.name)
    }
}

/// Wire form: `depends_on` is a string or a list, and conditions come as
/// `wait_condition` or a positional `wait_conditions` list. Without
/// `depends_on`, `wait_condition` is the service's own readiness.
#[derive(Serialize, Deserialize)]
struct RawServiceDefinition {
    name: String,
    image: String,
    #[serde(default, deserialize_with = "scalar_map")]
    ports: BTreeMap<String, String>,
    #[serde(default, alias = "env", deserialize_with = "scalar_map")]
    env_vars: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    depends_on: Option<OneOrMany>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    wait_condition: Option<ReadinessCondition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    wait_conditions: Vec<Option<ReadinessCondition>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    readiness: Option<ReadinessCondition>,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl TryFrom<RawServiceDefinition> for ServiceDefinition {
    type Error = Error;

    fn try_from(raw: RawServiceDefinition) -> Result<Self> {
        let name = raw.name;
        if raw.wait_condition.is_some() && !raw.wait_conditions.is_empty() {
            return Err(Error::invalid_definition(
                &name,
                "use either wait_condition or wait_conditions, not both",
            ));
        }

        let mut readiness = raw.readiness;
        let mut wait_condition = raw.wait_condition;
        let no_dependencies = match &raw.depends_on {
            None => true,
            Some(OneOrMany::Many(services)) => services.is_empty(),
            Some(OneOrMany::One(_)) => false,
        };
        if no_dependencies {
            if !raw.wait_conditions.is_empty() {
                return Err(Error::invalid_definition(
                    &name,
                    "wait_conditions given without depends_on",
                ));
            }
            if let Some(condition) = wait_condition.take() {
                if readiness.is_some() {
                    return Err(Error::invalid_definition(
                        &name,
                        "use either wait_condition or readiness, not both",
                    ));
                }
                readiness = Some(condition);
            }
        }

        let dependencies = match raw.depends_on {
            None => Dependencies::None,
            Some(OneOrMany::One(service)) => {
                if raw.wait_conditions.len() > 1 {
                    return Err(Error::invalid_definition(
                        &name,
                        "more wait_conditions than depends_on entries",
                    ));
                }
                let condition = wait_condition
                    .or_else(|| raw.wait_conditions.into_iter().next().flatten());
                Dependencies::Single(DependencyEdge::new(service, condition))
            }
            Some(OneOrMany::Many(services)) => {
                if raw.wait_conditions.len() > services.len() {
                    return Err(Error::invalid_definition(
                        &name,
                        "more wait_conditions than depends_on entries",
                    ));
                }
                if services.is_empty() {
                    Dependencies::None
                } else {
                    let mut conditions = raw.wait_conditions.into_iter();
                    // A single wait_condition gates the first dependency.
                    let mut first = wait_condition;
                    let edges = services
                        .into_iter()
                        .map(|service| {
                            let condition = first.take().or_else(|| conditions.next().flatten());
                            DependencyEdge::new(service, condition)
                        })
                        .collect();
                    Dependencies::Multiple(edges)
                }
            }
        };

        let definition = ServiceDefinition {
            name,
            image: raw.image,
            ports: raw.ports,
            env_vars: raw.env_vars,
            dependencies,
            readiness,
        };
        definition.validate().map_err(|e| match e {
            Error::InvalidCondition(reason) => Error::invalid_definition(&definition.name, reason),
            other => other,
        })?;
        Ok(definition)
    }
}

impl From<ServiceDefinition> for RawServiceDefinition {
    fn from(def: ServiceDefinition) -> Self {
        let (depends_on, wait_condition, mut wait_conditions) = match def.dependencies {
            Dependencies::None => (None, None, Vec::new()),
            Dependencies::Single(edge) => (Some(OneOrMany::One(edge.service)), edge.condition, Vec::new()),
            Dependencies::Multiple(edges) => {
                let (names, conditions): (Vec<_>, Vec<_>) =
                    edges.into_iter().map(|e| (e.service, e.condition)).unzip();
                (Some(OneOrMany::Many(names)), None, conditions)
            }
        };
        while matches!(wait_conditions.last(), Some(None)) {
            wait_conditions.pop();
        }
        RawServiceDefinition {
            name: def.name,
            image: def.image,
            ports: def.ports,
            env_vars: def.env_vars,
            depends_on,
            wait_condition,
            wait_conditions,
            readiness: def.readiness,
        }
    }
}

/// Scalar accepted as a map key or value: YAML and JSON users write
/// `80: 8080` as often as `"80": "8080"`.
#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl From<Scalar> for String {
    fn from(value: Scalar) -> Self {
        match value {
            Scalar::Bool(b) => b.to_string(),
            Scalar::Int(i) => i.to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::Str(s) => s,
        }
    }
}

fn scalar_map<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<BTreeMap<String, String>, D::Error> {
    struct ScalarMapVisitor;

    impl<'de> Visitor<'de> for ScalarMapVisitor {
        type Value = BTreeMap<String, String>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a map of scalar values")
        }

        fn visit_unit<E: serde::de::Error>(self) -> std::result::Result<Self::Value, E> {
            Ok(BTreeMap::new())
        }

        fn visit_map<A: MapAccess<'de>>(
            self,
            mut map: A,
        ) -> std::result::Result<Self::Value, A::Error> {
            let mut out = BTreeMap::new();
            while let Some((key, value)) = map.next_entry::<Scalar, Scalar>()? {
                out.insert(String::from(key), String::from(value));
            }
            Ok(out)
        }
    }

    deserializer.deserialize_any(ScalarMapVisitor)
}
