//! Loopback engine: each requested output is answered with the input bound
//! at the same position. Stands in for a real computation engine in tests
//! and local development, and exercises the engine seam end to end.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tensormux_core::{DType, Device, Engine, EngineError, EngineSession, IoName, SessionOptions, Tensor};
use tracing::debug;

const ALL_DTYPES: [DType; 5] = [DType::F32, DType::F16, DType::I64, DType::I32, DType::U8];

pub struct EchoEngine {
    inputs: Vec<IoName>,
    outputs: Vec<IoName>,
    supported: Vec<DType>,
    output_dtype: Option<DType>,
    run_count: Arc<AtomicUsize>,
}

impl EchoEngine {
    /// An engine whose sessions expose the given input and output names.
    pub fn new<I, O>(inputs: I, outputs: O) -> Self
    where
        I: IntoIterator,
        I::Item: Into<IoName>,
        O: IntoIterator,
        O::Item: Into<IoName>,
    {
        Self {
            inputs: inputs.into_iter().map(Into::into).collect(),
            outputs: outputs.into_iter().map(Into::into).collect(),
            supported: ALL_DTYPES.to_vec(),
            output_dtype: None,
            run_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Restrict the element types sessions claim to support.
    pub fn with_supported_dtypes(mut self, dtypes: Vec<DType>) -> Self {
        self.supported = dtypes;
        self
    }

    /// Relabel every produced output with `dtype` without converting the
    /// bytes, to exercise consumers' size verification.
    pub fn with_output_dtype(mut self, dtype: DType) -> Self {
        self.output_dtype = Some(dtype);
        self
    }

    /// How many batched computations sessions of this engine have run.
    pub fn run_count(&self) -> usize {
        self.run_count.load(Ordering::SeqCst)
    }
}

impl Engine for EchoEngine {
    type Env = ();
    type Session = EchoSession;

    fn name(&self) -> &'static str {
        "echo"
    }

    fn create_env(&self) -> Result<Self::Env, EngineError> {
        Ok(())
    }

    fn create_session(
        &self,
        _env: &Self::Env,
        artifact: &Path,
        device: Device,
        options: &SessionOptions,
    ) -> Result<Self::Session, EngineError> {
        debug!(
            artifact = %artifact.display(),
            device = %device,
            intra_op_threads = options.intra_op_threads,
            "creating echo session"
        );
        Ok(EchoSession {
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
            supported: self.supported.clone(),
            output_dtype: self.output_dtype,
            run_count: self.run_count.clone(),
        })
    }
}

pub struct EchoSession {
    inputs: Vec<IoName>,
    outputs: Vec<IoName>,
    supported: Vec<DType>,
    output_dtype: Option<DType>,
    run_count: Arc<AtomicUsize>,
}

impl EngineSession for EchoSession {
    fn input_names(&self) -> &[IoName] {
        &self.inputs
    }

    fn output_names(&self) -> &[IoName] {
        &self.outputs
    }

    fn supports_dtype(&self, dtype: DType) -> bool {
        self.supported.contains(&dtype)
    }

    fn run(
        &mut self,
        inputs: &[(IoName, Tensor)],
        outputs: &[IoName],
    ) -> Result<Vec<Tensor>, EngineError> {
        self.run_count.fetch_add(1, Ordering::SeqCst);

        let mut produced = Vec::with_capacity(outputs.len());
        for (idx, name) in outputs.iter().enumerate() {
            let Some((_, tensor)) = inputs.get(idx) else {
                return Err(EngineError::Run(format!(
                    "no input to echo for output '{name}'"
                )));
            };
            let mut tensor = tensor.clone();
            if let Some(dtype) = self.output_dtype {
                tensor.dtype = dtype;
            }
            produced.push(tensor);
        }
        Ok(produced)
    }
}
