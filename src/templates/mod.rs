//! Reusable service templates.
//!
//! A template fixes an image, ports, environment and an optional health
//! check. Running a template merges per-run overrides into a fresh
//! [`RunSpec`]; the stored template is never touched by a run.

use crate::config::{serde_duration, DEFAULT_HEALTH_INTERVAL};
use crate::error::{EntityKind, Error, Result};
use crate::health::{infer_endpoint, HealthEndpoint};
use crate::runtime::RunSpec;
use crate::store::{validate_name, JsonStore};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

fn default_interval() -> Duration {
    DEFAULT_HEALTH_INTERVAL
}

/// Health check attached to containers started from a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateHealthCheck {
    /// `host:port` or an http(s) URL. Inferred from image and ports when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default = "default_interval", with = "serde_duration")]
    pub interval: Duration,
    #[serde(default)]
    pub auto_restart: bool,
}

impl Default for TemplateHealthCheck {
    fn default() -> Self {
        Self {
            endpoint: None,
            interval: DEFAULT_HEALTH_INTERVAL,
            auto_restart: false,
        }
    }
}

/// Caller input for creating or updating a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateSpec {
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub ports: BTreeMap<String, String>,
    #[serde(default)]
    pub env_vars: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check: Option<TemplateHealthCheck>,
}

impl TemplateSpec {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            ports: BTreeMap::new(),
            env_vars: BTreeMap::new(),
            health_check: None,
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

    pub fn health_check(mut self, health_check: TemplateHealthCheck) -> Self {
        self.health_check = Some(health_check);
        self
    }

    fn validate(&self) -> Result<()> {
        validate_name(EntityKind::Template, &self.name)?;
        if self.image.trim().is_empty() {
            return Err(Error::invalid_definition(&self.name, "image is empty"));
        }
        if let Some(hc) = &self.health_check {
            if let Some(endpoint) = &hc.endpoint {
                endpoint.parse::<HealthEndpoint>()?;
            }
            if hc.interval.is_zero() {
                return Err(Error::invalid_definition(
                    &self.name,
                    "health check interval must be greater than zero",
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub name: String,
    pub image: String,
    pub ports: BTreeMap<String, String>,
    pub env_vars: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check: Option<TemplateHealthCheck>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-run changes layered over a template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Merged over the template's ports, key by key.
    #[serde(default)]
    pub ports: BTreeMap<String, String>,
    /// Merged over the template's environment, key by key.
    #[serde(default)]
    pub env_vars: BTreeMap<String, String>,
    /// Container name. Unnamed containers get a runtime-chosen name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// A template with overrides applied, ready to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedTemplate {
    pub template: String,
    pub spec: RunSpec,
    pub ports: BTreeMap<String, String>,
    pub health: Option<RenderedHealthCheck>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedHealthCheck {
    pub endpoint: HealthEndpoint,
    pub interval: Duration,
    pub auto_restart: bool,
}

impl Template {
    /// Apply `overrides` without modifying the template.
    pub fn render(&self, overrides: &TemplateOverrides) -> Result<RenderedTemplate> {
        let image = overrides.image.clone().unwrap_or_else(|| self.image.clone());
        let mut ports = self.ports.clone();
        ports.extend(overrides.ports.clone());
        let mut env_vars = self.env_vars.clone();
        env_vars.extend(overrides.env_vars.clone());

        let mut spec = RunSpec::new(image.clone()).ports(&ports).env(&env_vars);
        spec.name = overrides.name.clone();

        let health = match &self.health_check {
            None => None,
            Some(hc) => {
                let endpoint = match &hc.endpoint {
                    Some(explicit) => Some(explicit.parse::<HealthEndpoint>()?),
                    None => infer_endpoint(&image, &ports),
                };
                match endpoint {
                    Some(endpoint) => Some(RenderedHealthCheck {
                        endpoint,
                        interval: hc.interval,
                        auto_restart: hc.auto_restart,
                    }),
                    None => {
                        tracing::warn!(
                            "Template {} has a health check but no endpoint could be inferred for {}",
                            self.name,
                            image
                        );
                        None
                    }
                }
            }
        };

        Ok(RenderedTemplate {
            template: self.name.clone(),
            spec,
            ports,
            health,
        })
    }
}

pub struct TemplateStore {
    templates: RwLock<BTreeMap<String, Template>>,
    store: Option<JsonStore>,
}

impl Default for TemplateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateStore {
    pub fn new() -> Self {
        Self {
            templates: RwLock::new(BTreeMap::new()),
            store: None,
        }
    }

    /// Template store backed by `store`, starting from its contents.
    pub fn with_store(store: JsonStore) -> Result<Self> {
        let templates: BTreeMap<String, Template> = store
            .load_all::<Template>()?
            .into_iter()
            .map(|t| (t.name.clone(), t))
            .collect();
        tracing::debug!(
            "Loaded {} template(s) from {}",
            templates.len(),
            store.dir().display()
        );
        Ok(Self {
            templates: RwLock::new(templates),
            store: Some(store),
        })
    }

    pub fn create(&self, spec: TemplateSpec) -> Result<Template> {
        spec.validate()?;
        let now = Utc::now();
        let template = Template {
            name: spec.name,
            image: spec.image,
            ports: spec.ports,
            env_vars: spec.env_vars,
            health_check: spec.health_check,
            created_at: now,
            updated_at: now,
        };

        {
            let mut templates = self.templates.write();
            if templates.contains_key(&template.name) {
                return Err(Error::already_exists(EntityKind::Template, &template.name));
            }
            templates.insert(template.name.clone(), template.clone());
        }
        if let Some(store) = &self.store {
            if let Err(e) = store.save(&template.name, &template) {
                self.templates.write().remove(&template.name);
                return Err(e);
            }
        }
        tracing::info!("Created template {} ({})", template.name, template.image);
        Ok(template)
    }

    /// Replace a template's contents. `created_at` is kept.
    pub fn update(&self, spec: TemplateSpec) -> Result<Template> {
        spec.validate()?;
        let (previous, template) = {
            let mut templates = self.templates.write();
            let existing = templates
                .get_mut(&spec.name)
                .ok_or_else(|| Error::not_found(EntityKind::Template, &spec.name))?;
            let previous = existing.clone();
            *existing = Template {
                name: spec.name,
                image: spec.image,
                ports: spec.ports,
                env_vars: spec.env_vars,
                health_check: spec.health_check,
                created_at: previous.created_at,
                updated_at: Utc::now().max(previous.updated_at),
            };
            (previous, existing.clone())
        };
        if let Some(store) = &self.store {
            if let Err(e) = store.save(&template.name, &template) {
                self.templates.write().insert(previous.name.clone(), previous);
                return Err(e);
            }
        }
        tracing::info!("Updated template {}", template.name);
        Ok(template)
    }

    pub fn get(&self, name: &str) -> Option<Template> {
        self.templates.read().get(name).cloned()
    }

    /// All templates, sorted by name.
    pub fn list(&self) -> Vec<Template> {
        self.templates.read().values().cloned().collect()
    }

    pub fn delete(&self, name: &str) -> Result<Template> {
        let removed = self
            .templates
            .write()
            .remove(name)
            .ok_or_else(|| Error::not_found(EntityKind::Template, name))?;
        if let Some(store) = &self.store {
            store.delete(name)?;
        }
        tracing::info!("Deleted template {}", name);
        Ok(removed)
    }

    /// Look up `name` and apply `overrides`.
    pub fn render(&self, name: &str, overrides: &TemplateOverrides) -> Result<RenderedTemplate> {
        self.get(name)
            .ok_or_else(|| Error::not_found(EntityKind::Template, name))?
            .render(overrides)
    }
}
