use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{DType, Shape};

/// Name of one model input or output, unique within its direction.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IoName(pub String);

impl IoName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IoName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IoName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for IoName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// One declared model input or output. `dims` is the batch-of-one shape;
/// the batch dimension is never part of the contract.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContractEntry {
    pub name: IoName,
    pub dtype: DType,
    pub dims: Shape,
}

impl ContractEntry {
    /// Byte size of one instance's worth of this tensor.
    pub fn batch1_byte_size(&self) -> usize {
        self.dims.numel() * self.dtype.byte_size()
    }
}

/// Declared inputs and outputs of a loaded model. Immutable after load and
/// shared read-only by every execution context of the model.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TensorContract {
    pub inputs: Vec<ContractEntry>,
    pub outputs: Vec<ContractEntry>,
}

impl TensorContract {
    pub fn input(&self, name: &IoName) -> Option<&ContractEntry> {
        self.inputs.iter().find(|e| &e.name == name)
    }

    pub fn output(&self, name: &IoName) -> Option<&ContractEntry> {
        self.outputs.iter().find(|e| &e.name == name)
    }
}

/// Dynamic-batching limit of one context. A configured max batch size of
/// zero or below means the model does not batch at all; that case is its
/// own variant rather than a zero that could leak into size arithmetic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchLimit {
    NoBatching,
    Max(u32),
}

impl BatchLimit {
    pub fn from_config(max_batch_size: i64) -> Self {
        if max_batch_size <= 0 {
            BatchLimit::NoBatching
        } else {
            BatchLimit::Max(max_batch_size as u32)
        }
    }

    pub fn batching(self) -> bool {
        matches!(self, BatchLimit::Max(_))
    }

    /// Whether a combined batch of `total` instances may execute. A total of
    /// one is always admitted; models that do not batch admit nothing else.
    pub fn admits(self, total: usize) -> bool {
        match self {
            BatchLimit::NoBatching => total == 1,
            BatchLimit::Max(max) => total == 1 || total <= max as usize,
        }
    }
}

impl fmt::Display for BatchLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchLimit::NoBatching => write!(f, "<none>"),
            BatchLimit::Max(max) => write!(f, "{max}"),
        }
    }
}
