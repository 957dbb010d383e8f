use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::TensorContract;

/// Resolved configuration for one loaded model, as handed over by the
/// configuration layer. Parsing and validation of the raw config happen
/// before this struct exists.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelConfig {
    pub name: String,
    /// Raw configured value; zero or below means the model does not batch.
    pub max_batch_size: i64,
    pub contract: TensorContract,
    /// Logical artifact name used when no capability-specific one matches.
    pub default_artifact: String,
    /// Capability class (as `major.minor`) to logical artifact name.
    #[serde(default)]
    pub cc_artifacts: HashMap<String, String>,
    pub instance_groups: Vec<InstanceGroup>,
}

/// How many model instances to create, and where.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InstanceGroup {
    pub name: String,
    pub count: u32,
    pub kind: InstanceKind,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum InstanceKind {
    Cpu,
    Gpu { device_ids: Vec<u32> },
}
