use std::sync::Arc;

use tensormux_core::{
    resolve_artifact, ArtifactCatalog, BatchLimit, ContractEntry, Device, DeviceProbe, Engine,
    EngineSession, HostAllocator, IoName, ModelConfig, SessionOptions, Tensor, TensorContract,
};
use tracing::{debug, info};

use crate::assemble::{pack_input, InputKind, InputPlan};
use crate::error::{ContextError, IoDirection, RunError};
use crate::payload::Payload;
use crate::scatter::read_outputs;

/// One model instance bound to one device: owns the engine session, the
/// allocator handle, and the tensors transiently bound for the run in
/// flight. Exactly one runner slot addresses a context at a time.
pub struct ExecutionContext<S: EngineSession> {
    name: String,
    device: Device,
    batch_limit: BatchLimit,
    contract: Arc<TensorContract>,
    // Teardown follows declaration order: transient tensors first, then the
    // session, then the allocator.
    bound_inputs: Vec<(IoName, Tensor)>,
    bound_outputs: Vec<(IoName, Tensor)>,
    session: S,
    allocator: HostAllocator,
}

impl<S: EngineSession> ExecutionContext<S> {
    /// Create one context: resolve the artifact for the device, open the
    /// engine session, and validate the contract against it. A context that
    /// fails any of these never becomes eligible to receive runs.
    #[allow(clippy::too_many_arguments)]
    pub fn create<E: Engine<Session = S>>(
        engine: &E,
        env: &E::Env,
        instance_name: impl Into<String>,
        device: Device,
        config: &ModelConfig,
        contract: Arc<TensorContract>,
        catalog: &ArtifactCatalog,
        probe: &dyn DeviceProbe,
        options: &SessionOptions,
    ) -> Result<Self, ContextError> {
        let name = instance_name.into();
        let artifact = resolve_artifact(config, catalog, device, probe)?;

        match artifact.capability {
            None => info!(
                instance = %name,
                artifact = %artifact.name,
                "creating instance on CPU"
            ),
            Some(cc) => info!(
                instance = %name,
                device = %device,
                capability = %cc,
                artifact = %artifact.name,
                "creating instance on GPU"
            ),
        }

        let session = engine.create_session(env, &artifact.path, device, options)?;

        validate_entries(
            &config.name,
            &session,
            &contract.inputs,
            session.input_names(),
            IoDirection::Input,
        )?;
        validate_entries(
            &config.name,
            &session,
            &contract.outputs,
            session.output_names(),
            IoDirection::Output,
        )?;

        Ok(Self {
            name,
            device,
            batch_limit: BatchLimit::from_config(config.max_batch_size),
            contract,
            bound_inputs: Vec::new(),
            bound_outputs: Vec::new(),
            session,
            allocator: HostAllocator::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn batch_limit(&self) -> BatchLimit {
        self.batch_limit
    }

    pub fn allocator(&self) -> &HostAllocator {
        &self.allocator
    }

    /// Execute one batch. Batch-fatal conditions come back as `Err`;
    /// per-payload faults stay on the payloads and leave the call `Ok`.
    /// Transient tensors are released on every exit path.
    pub fn run(&mut self, payloads: &mut [Payload]) -> Result<(), RunError> {
        let result = self.run_batch(payloads);
        self.release_run_resources();
        result
    }

    fn run_batch(&mut self, payloads: &mut [Payload]) -> Result<(), RunError> {
        debug!(
            context = %self.name,
            payloads = payloads.len(),
            "running batch"
        );

        // A payload must never reach the engine in a failed state; the
        // dispatcher upstream filters those out before batching.
        let mut total_batch_size = 0;
        for payload in payloads.iter() {
            if !payload.is_ok() {
                return Err(RunError::FailedPayload {
                    context: self.name.clone(),
                });
            }
            total_batch_size += payload.batch_size;
        }

        if total_batch_size == 0 {
            return Ok(());
        }

        // Checked before any buffer is allocated.
        if !self.batch_limit.admits(total_batch_size) {
            return Err(RunError::BatchSizeExceeded {
                context: self.name.clone(),
                total: total_batch_size,
                limit: self.batch_limit,
            });
        }

        for plan in self.plan_inputs(payloads) {
            let tensor = pack_input(
                &self.allocator,
                &plan,
                self.batch_limit,
                total_batch_size,
                payloads,
            );
            self.bound_inputs.push((plan.name, tensor));
        }

        let output_names: Vec<IoName> = self
            .contract
            .outputs
            .iter()
            .map(|entry| entry.name.clone())
            .collect();

        let produced = self.session.run(&self.bound_inputs, &output_names)?;
        if produced.len() < output_names.len() {
            return Err(RunError::MissingOutput {
                name: output_names[produced.len()].clone(),
            });
        }
        self.bound_outputs = output_names.into_iter().zip(produced).collect();

        read_outputs(
            &self.contract,
            &self.bound_outputs,
            self.batch_limit,
            total_batch_size,
            payloads,
        )
    }

    /// One tensor per declared input, in contract order, then one per
    /// override name in first-seen payload order. An override naming a
    /// declared input supersedes it in place. All payloads carry
    /// equally-shaped inputs, so the first payload's echoed dims stand in
    /// for the batch; the contract supplies dims a request did not echo.
    fn plan_inputs(&self, payloads: &[Payload]) -> Vec<InputPlan> {
        let mut plans: Vec<InputPlan> = self
            .contract
            .inputs
            .iter()
            .map(|entry| {
                let dims = payloads
                    .first()
                    .and_then(|p| p.binding(&entry.name))
                    .map(|binding| binding.dims.clone())
                    .unwrap_or_else(|| entry.dims.clone());
                InputPlan {
                    name: entry.name.clone(),
                    dtype: entry.dtype,
                    dims,
                    kind: InputKind::Declared,
                }
            })
            .collect();

        for payload in payloads {
            let Some(overrides) = payload.overrides.as_ref() else {
                continue;
            };
            for (name, overridden) in overrides.iter() {
                if let Some(existing) = plans.iter_mut().find(|plan| &plan.name == name) {
                    if existing.kind == InputKind::Declared {
                        existing.dtype = overridden.dtype;
                        existing.dims = overridden.dims.clone();
                        existing.kind = InputKind::Override;
                    }
                } else {
                    plans.push(InputPlan {
                        name: name.clone(),
                        dtype: overridden.dtype,
                        dims: overridden.dims.clone(),
                        kind: InputKind::Override,
                    });
                }
            }
        }

        plans
    }

    /// Drop every tensor bound for the run in flight. Idempotent; runs on
    /// every exit path and again when the context itself is torn down.
    pub fn release_run_resources(&mut self) {
        self.bound_inputs.clear();
        self.bound_outputs.clear();
    }
}

impl<S: EngineSession> Drop for ExecutionContext<S> {
    fn drop(&mut self) {
        debug!(context = %self.name, "releasing execution context");
        self.release_run_resources();
    }
}

fn validate_entries<S: EngineSession>(
    model: &str,
    session: &S,
    entries: &[ContractEntry],
    exposed: &[IoName],
    io: IoDirection,
) -> Result<(), ContextError> {
    for entry in entries {
        if !exposed.contains(&entry.name) {
            return Err(ContextError::UnknownTensor {
                model: model.to_string(),
                io,
                name: entry.name.clone(),
            });
        }
        if !session.supports_dtype(entry.dtype) {
            return Err(ContextError::UnsupportedDtype {
                model: model.to_string(),
                io,
                name: entry.name.clone(),
                dtype: entry.dtype,
            });
        }
    }
    Ok(())
}
