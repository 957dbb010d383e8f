use std::fmt;

use tensormux_core::{ArtifactError, BatchLimit, DType, EngineError, IoName};
use thiserror::Error;

#[derive(Clone, Copy, Debug)]
pub enum IoDirection {
    Input,
    Output,
}

impl fmt::Display for IoDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IoDirection::Input => write!(f, "input"),
            IoDirection::Output => write!(f, "output"),
        }
    }
}

/// Failures that prevent an execution context from becoming usable. The
/// model as a whole fails to load when any required context hits one.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("unexpected inference {io} '{name}' for model '{model}', not exposed by the session")]
    UnknownTensor {
        model: String,
        io: IoDirection,
        name: IoName,
    },
    #[error("unsupported datatype {dtype} for {io} '{name}' for model '{model}'")]
    UnsupportedDtype {
        model: String,
        io: IoDirection,
        name: IoName,
        dtype: DType,
    },
}

/// Failures that abort an entire run. No payload receives outputs; payloads
/// keep their own per-request status untouched unless already failed.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("unexpected runner index {index}, max allowed {max}")]
    UnknownRunner { index: usize, max: usize },
    #[error("context for runner index {index} is already in use")]
    ContextBusy { index: usize },
    #[error("unexpected payload with failed status given to runner for '{context}'")]
    FailedPayload { context: String },
    #[error("dynamic batch size {total} for '{context}', max allowed is {limit}")]
    BatchSizeExceeded {
        context: String,
        total: usize,
        limit: BatchLimit,
    },
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("output tensor '{name}' not found")]
    MissingOutput { name: IoName },
    #[error(
        "unexpected size for output '{name}', byte-size {actual} does not equal {total_batch} * {batch1}"
    )]
    OutputSizeMismatch {
        name: IoName,
        actual: usize,
        total_batch: usize,
        batch1: usize,
    },
}
