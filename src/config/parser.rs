use super::Config;
use crate::dependency::ServiceDefinition;
use crate::error::{Error, Result};
use serde_yaml::Value;
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAMES: [&str; 2] = ["conductor.yaml", "conductor.yml"];

pub struct Parser;

impl Parser {
    pub fn new() -> Self {
        Self
    }

    /// Find config file starting from current directory
    pub fn find_config_file(&self) -> Result<PathBuf> {
        let current_dir = std::env::current_dir()?;
        Self::find_config_in_dir(&current_dir)
    }

    pub fn find_config_in_dir(dir: &Path) -> Result<PathBuf> {
        for name in CONFIG_FILE_NAMES {
            let candidate = dir.join(name);
            if candidate.exists() {
                return Ok(candidate);
            }
        }

        if let Some(parent) = dir.parent() {
            return Self::find_config_in_dir(parent);
        }

        Err(Error::Config(
            "Could not find conductor.yaml in current directory or any parent".to_string(),
        ))
    }

    /// Load config from file path
    pub fn load_config<P: AsRef<Path>>(&self, path: P) -> Result<Config> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;

        self.parse_config(&content)
    }

    /// Parse and validate config content.
    pub fn parse_config(&self, content: &str) -> Result<Config> {
        let config: Config = if content.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(content)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Load the explicit config file, the discovered one, or defaults.
    pub fn load_or_default(&self, explicit: Option<&Path>) -> Result<Config> {
        match explicit {
            Some(path) => self.load_config(path),
            None => match self.find_config_file() {
                Ok(path) => {
                    tracing::debug!("Using config file {}", path.display());
                    self.load_config(path)
                }
                Err(_) => Ok(Config::default()),
            },
        }
    }

    /// Load a deployment group file (YAML or JSON).
    pub fn load_group<P: AsRef<Path>>(&self, path: P) -> Result<Vec<ServiceDefinition>> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Config(format!(
                "Failed to read group file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;
        self.parse_group(&content)
    }

    /// A group is either a bare list of definitions or a map with a
    /// `services:` list.
    pub fn parse_group(&self, content: &str) -> Result<Vec<ServiceDefinition>> {
        // JSON is a subset of YAML, so one parser covers both formats.
        let document: Value = serde_yaml::from_str(content)?;
        let entries = match document {
            Value::Sequence(entries) => entries,
            Value::Mapping(mut map) => match map.remove("services") {
                Some(Value::Sequence(entries)) => entries,
                Some(_) => {
                    return Err(Error::Config(
                        "'services' in group file must be a list".to_string(),
                    ))
                }
                None => {
                    return Err(Error::Config(
                        "group file map has no 'services' list".to_string(),
                    ))
                }
            },
            _ => {
                return Err(Error::Config(
                    "group file must be a list of services or a map with a 'services' list"
                        .to_string(),
                ))
            }
        };
        entries
            .into_iter()
            .map(ServiceDefinition::from_yaml_value)
            .collect()
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependency::Dependencies;

    #[test]
    fn test_find_config_in_parent_dir() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("conductor.yml"), "log_level: debug\n").unwrap();
        let nested = temp.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();

        let found = Parser::find_config_in_dir(&nested).unwrap();
        assert_eq!(found, temp.path().join("conductor.yml"));

        let config = Parser::new().load_config(found).unwrap();
        assert_eq!(config.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_empty_config_file_is_default() {
        let config = Parser::new().parse_config("\n").unwrap();
        assert_eq!(config.runtime.binary, "docker");
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let result = Parser::new().parse_config("probe:\n  log_tail_lines: 0\n");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_parse_group_list_and_wrapped_forms() {
        let parser = Parser::new();
        let list = r#"
- name: db
  image: postgres:15
- name: api
  image: my-api
  depends_on: db
  wait_condition: {type: tcp, port: 5432}
"#;
        let defs = parser.parse_group(list).unwrap();
        assert_eq!(defs.len(), 2);
        assert!(matches!(defs[1].dependencies, Dependencies::Single(_)));

        let wrapped = r#"{"services": [{"name": "web", "image": "nginx", "ports": {"80": 8080}}]}"#;
        let defs = parser.parse_group(wrapped).unwrap();
        assert_eq!(defs[0].ports.get("80").map(String::as_str), Some("8080"));
    }

    #[test]
    fn test_parse_group_own_wait_condition() {
        let defs = Parser::new()
            .parse_group(
                r#"- { name: web, image: nginx, wait_condition: { type: http, url: "http://127.0.0.1:1/health" } }"#,
            )
            .unwrap();
        assert!(defs[0].dependencies.is_empty());
        assert_eq!(defs[0].readiness.as_ref().map(|c| c.kind()), Some("http"));
    }

    #[test]
    fn test_parse_group_reports_bad_service() {
        let parser = Parser::new();
        let content = r#"
services:
  - name: db
    image: postgres:16
  - name: api
    image: my-api
    depends_on: db
    wait_condition: {type: http, url: "not a url"}
"#;
        let err = parser.parse_group(content).unwrap_err();
        assert!(
            matches!(&err, Error::InvalidDefinition { name, .. } if name == "api"),
            "got {:?}",
            err
        );
        assert!(err.to_string().contains("'api'"));

        let err = parser.parse_group("- {name: cache, image: redis, depends_on: [a, a]}").unwrap_err();
        assert!(err.to_string().contains("'cache'"));

        assert!(matches!(parser.parse_group("services: web"), Err(Error::Config(_))));
        assert!(matches!(parser.parse_group("42"), Err(Error::Config(_))));
    }
}
