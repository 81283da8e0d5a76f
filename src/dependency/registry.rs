use super::{Dependencies, DependencyEdge, ServiceDefinition};
use crate::error::{EntityKind, Error, Result};
use crate::probe::ReadinessCondition;
use crate::store::{validate_name, JsonStore};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An explicitly defined dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyRecord {
    pub service: String,
    pub dependencies: Dependencies,
    pub created_at: DateTime<Utc>,
}

impl DependencyRecord {
    pub fn depends_on(&self) -> Vec<&str> {
        self.dependencies.names()
    }

    pub fn conditions(&self) -> Vec<Option<&ReadinessCondition>> {
        self.dependencies
            .edges()
            .iter()
            .map(|e| e.condition.as_ref())
            .collect()
    }
}

/// Dependencies defined ahead of deployment, keyed by dependent service.
///
/// Redefining a service replaces its record. With a store attached every
/// change is written through, so definitions outlive the process.
#[derive(Default)]
pub struct DependencyRegistry {
    records: RwLock<HashMap<String, DependencyRecord>>,
    store: Option<JsonStore>,
}

impl DependencyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_store(store: JsonStore) -> Result<Self> {
        let records: HashMap<String, DependencyRecord> = store
            .load_all::<DependencyRecord>()?
            .into_iter()
            .map(|r| (r.service.clone(), r))
            .collect();
        tracing::debug!(
            "Loaded {} dependency record(s) from {}",
            records.len(),
            store.dir().display()
        );
        Ok(Self {
            records: RwLock::new(records),
            store: Some(store),
        })
    }

    /// Record that `service` waits for `depends_on` under `condition`.
    pub fn define(
        &self,
        service: &str,
        depends_on: &str,
        condition: Option<ReadinessCondition>,
    ) -> Result<DependencyRecord> {
        self.define_all(
            service,
            Dependencies::Single(DependencyEdge::new(depends_on, condition)),
        )
    }

    pub fn define_all(&self, service: &str, dependencies: Dependencies) -> Result<DependencyRecord> {
        if service.trim().is_empty() {
            return Err(Error::invalid_definition(service, "service name is empty"));
        }
        validate_name(EntityKind::Dependency, service)?;
        // Reuse the definition checks for names and condition shape.
        let candidate = ServiceDefinition {
            dependencies: dependencies.clone(),
            ..ServiceDefinition::new(service, "-")
        };
        candidate.validate()?;

        let record = DependencyRecord {
            service: service.to_string(),
            dependencies,
            created_at: Utc::now(),
        };
        let previous = self
            .records
            .write()
            .insert(service.to_string(), record.clone());
        if let Some(store) = &self.store {
            if let Err(e) = store.save(service, &record) {
                let mut records = self.records.write();
                match previous {
                    Some(previous) => records.insert(service.to_string(), previous),
                    None => records.remove(service),
                };
                return Err(e);
            }
        }
        let replaced = previous.is_some();
        tracing::info!(
            "{} dependency for {} on {}",
            if replaced { "Replaced" } else { "Defined" },
            service,
            record.depends_on().join(", ")
        );
        Ok(record)
    }

    pub fn get(&self, service: &str) -> Option<DependencyRecord> {
        self.records.read().get(service).cloned()
    }

    pub fn remove(&self, service: &str) -> Result<DependencyRecord> {
        let removed = self
            .records
            .write()
            .remove(service)
            .ok_or_else(|| Error::not_found(EntityKind::Dependency, service))?;
        if let Some(store) = &self.store {
            store.delete(service)?;
        }
        tracing::info!("Removed dependency record for {}", service);
        Ok(removed)
    }

    /// All records, sorted by service name.
    pub fn list(&self) -> Vec<DependencyRecord> {
        let mut records: Vec<_> = self.records.read().values().cloned().collect();
        records.sort_by(|a, b| a.service.cmp(&b.service));
        records
    }

    /// Give definitions without inline dependencies their registered ones.
    pub fn apply(&self, definitions: &[ServiceDefinition]) -> Vec<ServiceDefinition> {
        let records = self.records.read();
        definitions
            .iter()
            .map(|def| match records.get(&def.name) {
                Some(record) if def.dependencies.is_empty() => ServiceDefinition {
                    dependencies: record.dependencies.clone(),
                    ..def.clone()
                },
                _ => def.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_define_replaces_previous() {
        let registry = DependencyRegistry::new();
        let first = registry
            .define("api", "db", Some(ReadinessCondition::tcp("db", 5432)))
            .unwrap();
        assert_eq!(first.depends_on(), vec!["db"]);

        registry.define("api", "cache", None).unwrap();
        let record = registry.get("api").unwrap();
        assert_eq!(record.depends_on(), vec!["cache"]);
        assert_eq!(record.conditions(), vec![None]);
        assert_eq!(registry.list().len(), 1);
    }

    #[test]
    fn test_define_rejects_bad_condition() {
        let registry = DependencyRegistry::new();
        let result = registry.define("api", "db", Some(ReadinessCondition::tcp("db", 0)));
        assert!(matches!(result, Err(Error::InvalidCondition(_))));
        assert!(registry.get("api").is_none());
    }

    #[test]
    fn test_store_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        {
            let registry =
                DependencyRegistry::with_store(JsonStore::open(dir.path()).unwrap()).unwrap();
            registry
                .define("api", "db", Some(ReadinessCondition::tcp("db", 5432)))
                .unwrap();
            registry.define("web", "api", None).unwrap();
            registry.remove("web").unwrap();
        }

        let reopened =
            DependencyRegistry::with_store(JsonStore::open(dir.path()).unwrap()).unwrap();
        let record = reopened.get("api").unwrap();
        assert_eq!(record.depends_on(), vec!["db"]);
        assert_eq!(
            record.conditions(),
            vec![Some(&ReadinessCondition::tcp("db", 5432))]
        );
        assert!(reopened.get("web").is_none());
        assert!(!dir.path().join("web.json").exists());
    }

    #[test]
    fn test_remove_unknown_and_bad_names() {
        let registry = DependencyRegistry::new();
        assert!(matches!(
            registry.remove("ghost"),
            Err(Error::NotFound { kind: EntityKind::Dependency, .. })
        ));
        assert!(matches!(
            registry.define("../api", "db", None),
            Err(Error::InvalidName { .. })
        ));
    }

    #[test]
    fn test_apply_only_fills_definitions_without_inline_deps() {
        let registry = DependencyRegistry::new();
        registry.define("api", "db", None).unwrap();
        registry.define("web", "db", None).unwrap();

        let batch = vec![
            ServiceDefinition::new("db", "postgres"),
            ServiceDefinition::new("api", "api"),
            ServiceDefinition::new("web", "nginx").depends_on("api", None),
        ];
        let applied = registry.apply(&batch);
        assert!(applied[0].dependencies.is_empty());
        assert_eq!(applied[1].dependency_names(), vec!["db"]);
        assert_eq!(applied[2].dependency_names(), vec!["api"]);
    }
}
