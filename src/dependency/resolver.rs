use super::ServiceDefinition;
use crate::error::{Error, Result};
use std::collections::HashSet;

/// Order a batch so every definition comes after the ones it depends on.
///
/// Each pass scans the remaining definitions left to right and moves the
/// first one whose dependencies are all placed. Ties therefore keep input
/// order. When a pass finds nothing eligible the batch has a cycle or names
/// a service outside the batch, and the error lists every definition that
/// could not be placed.
pub fn order(definitions: &[ServiceDefinition]) -> Result<Vec<ServiceDefinition>> {
    let mut names = HashSet::new();
    for def in definitions {
        if !names.insert(def.name.as_str()) {
            return Err(Error::invalid_definition(
                &def.name,
                "service name appears more than once in the batch",
            ));
        }
    }

    let mut remaining: Vec<&ServiceDefinition> = definitions.iter().collect();
    let mut ordered = Vec::with_capacity(definitions.len());
    let mut placed: HashSet<&str> = HashSet::new();

    while !remaining.is_empty() {
        let eligible = remaining.iter().position(|def| {
            def.dependencies
                .edges()
                .iter()
                .all(|edge| placed.contains(edge.service.as_str()))
        });

        match eligible {
            Some(idx) => {
                let def = remaining.remove(idx);
                placed.insert(def.name.as_str());
                ordered.push(def.clone());
            }
            None => {
                let stuck = remaining.iter().map(|d| d.name.clone()).collect();
                return Err(Error::CycleOrMissingDependency(stuck));
            }
        }
    }

    Ok(ordered)
}
