use std::path::Path;

use thiserror::Error;

use crate::{DType, Device, IoName, Tensor};

/// Session knobs shared by every context of a model. A prototype value is
/// built once per model and handed to each session creation.
#[derive(Clone, Copy, Debug)]
pub struct SessionOptions {
    pub intra_op_threads: usize,
    pub graph_optimization: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            intra_op_threads: 1,
            graph_optimization: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine initialization failed: {0}")]
    Init(String),
    #[error("session creation failed: {0}")]
    Session(String),
    #[error("engine run failed: {0}")]
    Run(String),
}

/// A computation engine. The process-scoped environment is created once by
/// the embedder and passed into every session creation; init and shutdown
/// ordering relative to context lifetimes stays in the embedder's hands.
pub trait Engine: Send + Sync + 'static {
    type Env: Send + Sync;
    type Session: EngineSession;

    fn name(&self) -> &'static str;

    fn create_env(&self) -> Result<Self::Env, EngineError>;

    fn create_session(
        &self,
        env: &Self::Env,
        artifact: &Path,
        device: Device,
        options: &SessionOptions,
    ) -> Result<Self::Session, EngineError>;
}

/// One loaded model bound to one device. `run` is a single synchronous
/// batched computation; the engine may parallelize internally but never
/// returns before the outputs are complete.
pub trait EngineSession: Send + 'static {
    fn input_names(&self) -> &[IoName];

    fn output_names(&self) -> &[IoName];

    fn supports_dtype(&self, dtype: DType) -> bool;

    /// Execute once over all bound inputs, producing the requested outputs
    /// in request order.
    fn run(
        &mut self,
        inputs: &[(IoName, Tensor)],
        outputs: &[IoName],
    ) -> Result<Vec<Tensor>, EngineError>;
}
