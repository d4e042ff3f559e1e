//! Plan file schema (rigging plan TOML).
//!
//! ```toml
//! [[component]]
//! group = "Core"
//! name = "Identity"
//!
//! [[component]]
//! group = "Core"
//! name = "Tasks"
//! depends_on = ["Core#Identity"]
//!
//! [[wire]]
//! source = "Core#Tasks"
//! target = "Core#Identity"
//!
//! [[grant]]
//! source = "Core#Identity"
//! role = "admin"
//! grantee = "Core#Tasks"
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlanFile {
    #[serde(default, rename = "component")]
    pub components: Vec<ComponentEntry>,
    #[serde(default, rename = "wire")]
    pub wires: Vec<WireEntry>,
    #[serde(default, rename = "grant")]
    pub grants: Vec<GrantEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComponentEntry {
    pub group: String,
    pub name: String,
    /// Artifact name; defaults to `name`
    #[serde(default)]
    pub artifact: Option<String>,
    /// Module keys deployed before this one
    #[serde(default)]
    pub depends_on: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WireEntry {
    pub source: String,
    /// Setter on `source`; defaults to `set<TargetName>Address`
    #[serde(default)]
    pub setter: Option<String>,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GrantEntry {
    pub source: String,
    pub role: String,
    pub grantee: String,
    /// Grant operation on `source`; defaults to `grant<Role>Role`
    #[serde(default)]
    pub operation: Option<String>,
}
