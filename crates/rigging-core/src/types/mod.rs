//! Shared core types used across the registry, plan and execution layers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Length of an address in bytes.
const ADDRESS_BYTES: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Invalid address '{0}': expected 0x followed by 40 hex digits")]
    Address(String),
    #[error("Invalid module key '{0}': expected '<Group>#<Name>'")]
    ModuleKey(String),
}

/// Deployed component address.
///
/// Stored in canonical lowercase form so that two spellings of the same
/// address compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let trimmed = input.trim();
        let hex = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or_else(|| ParseError::Address(input.to_string()))?;
        if hex.len() != ADDRESS_BYTES * 2 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ParseError::Address(input.to_string()));
        }
        Ok(Self(format!("0x{}", hex.to_ascii_lowercase())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The all-zero address, which never identifies a deployed component.
    pub fn is_zero(&self) -> bool {
        self.0[2..].chars().all(|c| c == '0')
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.0
    }
}

/// Stable key of a component in persisted state: `"<Group>#<Name>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModuleKey(String);

impl ModuleKey {
    pub fn new(group: &str, name: &str) -> Result<Self, ParseError> {
        Self::parse(&format!("{group}#{name}"))
    }

    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let mut parts = input.split('#');
        let group = parts.next().unwrap_or_default();
        let name = parts.next().unwrap_or_default();
        if group.trim().is_empty() || name.trim().is_empty() || parts.next().is_some() {
            return Err(ParseError::ModuleKey(input.to_string()));
        }
        if group != group.trim() || name != name.trim() {
            return Err(ParseError::ModuleKey(input.to_string()));
        }
        Ok(Self(input.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn group(&self) -> &str {
        self.0.split('#').next().unwrap_or_default()
    }

    /// Component name, the part after `#`.
    pub fn name(&self) -> &str {
        self.0.split('#').nth(1).unwrap_or_default()
    }
}

impl fmt::Display for ModuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ModuleKey {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ModuleKey {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ModuleKey> for String {
    fn from(value: ModuleKey) -> Self {
        value.0
    }
}

/// One deployable unit of the target system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentDescriptor {
    /// Human-readable component name
    pub name: String,
    /// Key used to look the address up in persisted state
    pub module_key: ModuleKey,
    /// Build artifact name (without extension)
    pub artifact: String,
    /// Components that must be deployed first
    #[serde(default)]
    pub depends_on: Vec<ModuleKey>,
    /// Recorded address; filled in from the registry by the deployer
    #[serde(default)]
    pub address: Option<Address>,
}

impl ComponentDescriptor {
    pub fn new(module_key: ModuleKey) -> Self {
        let name = module_key.name().to_string();
        Self {
            artifact: name.clone(),
            name,
            module_key,
            depends_on: Vec::new(),
            address: None,
        }
    }

    pub fn with_artifact(mut self, artifact: impl Into<String>) -> Self {
        self.artifact = artifact.into();
        self
    }

    pub fn with_dependency(mut self, key: ModuleKey) -> Self {
        self.depends_on.push(key);
        self
    }

    pub fn is_deployed(&self) -> bool {
        self.address.is_some()
    }
}

/// "Tell `source` the address of `target` via `setter`."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub source: ModuleKey,
    pub setter: String,
    pub target: ModuleKey,
}

impl DependencyEdge {
    pub fn new(source: ModuleKey, setter: impl Into<String>, target: ModuleKey) -> Self {
        Self {
            source,
            setter: setter.into(),
            target,
        }
    }

    /// Edge with the conventional `set<Target>Address` setter.
    pub fn conventional(source: ModuleKey, target: ModuleKey) -> Self {
        let setter = format!("set{}Address", target.name());
        Self::new(source, setter, target)
    }

    pub fn describe(&self) -> String {
        format!(
            "set {}'s address on {} via {}",
            self.target.name(),
            self.source.name(),
            self.setter
        )
    }
}

/// "`granting` grants `role` to the address of `grantee`."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleGrantEdge {
    pub granting: ModuleKey,
    pub role: String,
    pub grantee: ModuleKey,
    /// Operation invoked on `granting`
    pub operation: String,
}

impl RoleGrantEdge {
    pub fn new(granting: ModuleKey, role: impl Into<String>, grantee: ModuleKey) -> Self {
        let role = role.into();
        let operation = grant_operation(&role);
        Self {
            granting,
            role,
            grantee,
            operation,
        }
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = operation.into();
        self
    }

    pub fn describe(&self) -> String {
        format!(
            "grant {} role on {} to {}",
            self.role,
            self.granting.name(),
            self.grantee.name()
        )
    }
}

/// Conventional grant operation for a role: `grant<Role>Role`.
pub fn grant_operation(role: &str) -> String {
    format!("grant{}Role", capitalize(role))
}

/// Conventional read-only check for a role: `has<Role>Role`.
pub fn has_role_query(role: &str) -> String {
    format!("has{}Role", capitalize(role))
}

pub(crate) fn capitalize(input: &str) -> String {
    let mut chars = input.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
