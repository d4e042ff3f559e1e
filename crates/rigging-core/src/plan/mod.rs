//! Static system plan: which components exist, how they are wired and which
//! roles they grant each other.

pub mod parser;
pub mod schema;

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::Serialize;

use crate::error::OrchestrationError;
use crate::types::{ComponentDescriptor, DependencyEdge, ModuleKey, RoleGrantEdge};
use schema::PlanFile;

/// Validated plan. Components are in deployment order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SystemPlan {
    pub components: Vec<ComponentDescriptor>,
    pub wiring: Vec<DependencyEdge>,
    pub grants: Vec<RoleGrantEdge>,
}

impl SystemPlan {
    pub fn load(path: &Path) -> Result<Self, OrchestrationError> {
        let file = parser::parse_plan_toml(path)
            .map_err(|e| OrchestrationError::Configuration(format!("{e:#}")))?;
        Self::from_file(file)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, OrchestrationError> {
        let file = parser::parse_plan_str(content)
            .map_err(|e| OrchestrationError::Configuration(format!("Invalid plan: {e:#}")))?;
        Self::from_file(file)
    }

    pub fn from_file(file: PlanFile) -> Result<Self, OrchestrationError> {
        let mut declared = Vec::with_capacity(file.components.len());
        let mut seen = HashSet::new();
        for entry in &file.components {
            let key = ModuleKey::new(&entry.group, &entry.name)?;
            if !seen.insert(key.clone()) {
                return Err(OrchestrationError::configuration(format!(
                    "Component '{key}' is declared more than once"
                )));
            }
            let mut component = ComponentDescriptor::new(key);
            if let Some(artifact) = &entry.artifact {
                component = component.with_artifact(artifact.clone());
            }
            for dep in &entry.depends_on {
                component = component.with_dependency(ModuleKey::parse(dep)?);
            }
            declared.push(component);
        }

        for component in &declared {
            for dep in &component.depends_on {
                ensure_declared(&seen, dep, || {
                    format!("dependency of '{}'", component.module_key)
                })?;
            }
        }

        let mut wiring = Vec::with_capacity(file.wires.len());
        for wire in &file.wires {
            let source = ModuleKey::parse(&wire.source)?;
            let target = ModuleKey::parse(&wire.target)?;
            let edge = match &wire.setter {
                Some(setter) => DependencyEdge::new(source, setter.clone(), target),
                None => DependencyEdge::conventional(source, target),
            };
            ensure_declared(&seen, &edge.source, || format!("source of wire '{}'", edge.setter))?;
            ensure_declared(&seen, &edge.target, || format!("target of wire '{}'", edge.setter))?;
            wiring.push(edge);
        }

        let mut grants = Vec::with_capacity(file.grants.len());
        for grant in &file.grants {
            let mut edge = RoleGrantEdge::new(
                ModuleKey::parse(&grant.source)?,
                grant.role.clone(),
                ModuleKey::parse(&grant.grantee)?,
            );
            if let Some(operation) = &grant.operation {
                edge = edge.with_operation(operation.clone());
            }
            ensure_declared(&seen, &edge.granting, || format!("source of {} grant", edge.role))?;
            ensure_declared(&seen, &edge.grantee, || format!("grantee of {} grant", edge.role))?;
            grants.push(edge);
        }

        Ok(Self {
            components: deployment_order(declared)?,
            wiring,
            grants,
        })
    }

    pub fn component(&self, key: &ModuleKey) -> Option<&ComponentDescriptor> {
        self.components.iter().find(|c| &c.module_key == key)
    }

    /// Look a component up by its bare name (the part after `#`).
    pub fn component_named(&self, name: &str) -> Option<&ComponentDescriptor> {
        self.components.iter().find(|c| c.name == name)
    }
}

fn ensure_declared(
    declared: &HashSet<ModuleKey>,
    key: &ModuleKey,
    role: impl FnOnce() -> String,
) -> Result<(), OrchestrationError> {
    if declared.contains(key) {
        return Ok(());
    }
    Err(OrchestrationError::configuration(format!(
        "Unknown component '{}' ({})",
        key,
        role()
    )))
}

/// Kahn's algorithm; among ready components the earliest declared goes first.
fn deployment_order(
    components: Vec<ComponentDescriptor>,
) -> Result<Vec<ComponentDescriptor>, OrchestrationError> {
    let index: HashMap<&ModuleKey, usize> = components
        .iter()
        .enumerate()
        .map(|(i, c)| (&c.module_key, i))
        .collect();

    let mut remaining: Vec<usize> = components.iter().map(|c| c.depends_on.len()).collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); components.len()];
    for (i, component) in components.iter().enumerate() {
        for dep in &component.depends_on {
            if let Some(&d) = index.get(dep) {
                dependents[d].push(i);
            }
        }
    }

    let mut placed = vec![false; components.len()];
    let mut order = Vec::with_capacity(components.len());
    while order.len() < components.len() {
        let Some(next) = (0..components.len()).find(|&i| !placed[i] && remaining[i] == 0) else {
            let stuck: Vec<String> = components
                .iter()
                .enumerate()
                .filter(|(i, _)| !placed[*i])
                .map(|(_, c)| c.module_key.to_string())
                .collect();
            return Err(OrchestrationError::configuration(format!(
                "Dependency cycle between components: {}",
                stuck.join(", ")
            )));
        };
        placed[next] = true;
        order.push(next);
        for &dependent in &dependents[next] {
            remaining[dependent] -= 1;
        }
    }

    let mut slots: Vec<Option<ComponentDescriptor>> = components.into_iter().map(Some).collect();
    Ok(order.into_iter().filter_map(|i| slots[i].take()).collect())
}
